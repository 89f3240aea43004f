//! Boundary traits between the control core and the platform layer.
//!
//! The core never touches hardware directly. The platform (or a simulator)
//! provides the triac gate output and the persistent parameter storage
//! through these traits; everything else the core needs arrives as plain
//! data with each tick.

/// Binary triac gate output. HIGH drives the gate, LOW releases it.
///
/// Called from the tick path, so the operation is infallible by contract:
/// a GPIO write either happens or the platform is already beyond recovery.
/// Implementations must leave the pin LOW on construction.
pub trait GatePin {
    fn set(&mut self, on: bool);
}

/// Fixed-address float parameter map, the emulated-EEPROM contract.
///
/// Reads that find nothing return `None` and the caller falls back to its
/// compiled default; `configure()` therefore never fails. Writes happen
/// only outside the tick hot path (calibration completion).
pub trait ParamStore {
    /// Read the value stored for `key`, if any.
    fn read_f32(&self, key: ParamKey) -> Option<f32>;

    /// Persist `value` under `key`.
    fn write_f32(
        &mut self,
        key: ParamKey,
        value: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Keys of the persistent parameter map. The discriminants are the fixed
/// storage addresses and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ParamKey {
    /// Nominal maximum power, W.
    PowerMax = 0,
    /// Motor winding resistance, Ohm.
    MotorResistance = 1,
    /// Motor winding inductance, H.
    MotorInductance = 2,
    /// Mechanical maximum speed, RPM.
    RpmMax = 3,
    /// Upper user-visible speed bound, RPM.
    RpmMaxLimit = 4,
    /// Lower user-visible speed bound, RPM.
    RpmMinLimit = 5,
    /// Shunt resistance, mOhm.
    ShuntResistance = 6,
    /// Proportional PI gain.
    PidP = 7,
    /// Integral time constant, s.
    PidI = 8,
    /// Knob deadband width, fraction of full scale.
    DeadZoneWidth = 9,
    /// Calibrated equivalent-resistance-to-speed scale.
    RekvToSpeedFactor = 10,
}

impl ParamKey {
    /// Storage address of this key.
    pub const fn addr(self) -> u16 {
        self as u16
    }

    /// Stable name used by file-backed stores.
    pub const fn name(self) -> &'static str {
        match self {
            ParamKey::PowerMax => "power_max",
            ParamKey::MotorResistance => "motor_resistance",
            ParamKey::MotorInductance => "motor_inductance",
            ParamKey::RpmMax => "rpm_max",
            ParamKey::RpmMaxLimit => "rpm_max_limit",
            ParamKey::RpmMinLimit => "rpm_min_limit",
            ParamKey::ShuntResistance => "shunt_resistance",
            ParamKey::PidP => "pid_p",
            ParamKey::PidI => "pid_i",
            ParamKey::DeadZoneWidth => "dead_zone_width",
            ParamKey::RekvToSpeedFactor => "rekv_to_speed_factor",
        }
    }

    /// All keys, in address order.
    pub const ALL: [ParamKey; 11] = [
        ParamKey::PowerMax,
        ParamKey::MotorResistance,
        ParamKey::MotorInductance,
        ParamKey::RpmMax,
        ParamKey::RpmMaxLimit,
        ParamKey::RpmMinLimit,
        ParamKey::ShuntResistance,
        ParamKey::PidP,
        ParamKey::PidI,
        ParamKey::DeadZoneWidth,
        ParamKey::RekvToSpeedFactor,
    ];
}
