//! Runtime configuration of the control core.
//!
//! Values live in the persistent parameter map (`grinder_traits::ParamStore`)
//! and are loaded once at `configure()` time; a missing or unreadable key
//! falls back to its compiled default, so loading never fails. The float
//! values here are converted to cached Q16.16 constants by the components
//! that consume them.

use grinder_traits::{ParamKey, ParamStore};

use crate::error::CoreError;

/// Physical and tuning parameters, in engineering units.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Nominal maximum power, W.
    pub power_max: f32,
    /// Motor winding resistance, Ohm.
    pub motor_resistance: f32,
    /// Motor winding inductance, H.
    pub motor_inductance: f32,
    /// Mechanical maximum speed, RPM.
    pub rpm_max: f32,
    /// Upper user-visible speed bound, RPM.
    pub rpm_max_limit: f32,
    /// Lower user-visible speed bound, RPM.
    pub rpm_min_limit: f32,
    /// Shunt resistance, mOhm (amplifier gain 50 is applied on top).
    pub shunt_resistance_mohm: f32,
    /// Proportional PI gain.
    pub pid_p: f32,
    /// Integral time constant, s.
    pub pid_i: f32,
    /// Knob deadband width, fraction of full scale.
    pub dead_zone_width: f32,
    /// Calibrated equivalent-resistance-to-speed scale; 1.0 until the
    /// speed-scale calibration has run.
    pub rekv_to_speed_factor: f32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            power_max: 1000.0,
            motor_resistance: 2.0,
            motor_inductance: 0.02,
            rpm_max: 30_000.0,
            rpm_max_limit: 30_000.0,
            rpm_min_limit: 5_000.0,
            shunt_resistance_mohm: 10.0,
            pid_p: 2.0,
            pid_i: 0.5,
            dead_zone_width: 0.05,
            rekv_to_speed_factor: 1.0,
        }
    }
}

impl CoreConfig {
    /// Load from the parameter store, taking the compiled default for any
    /// key the store does not hold.
    pub fn load<P: ParamStore>(store: &P) -> Self {
        let d = Self::default();
        let get = |key: ParamKey, default: f32| {
            let v = store.read_f32(key).unwrap_or(default);
            if v.is_finite() {
                v
            } else {
                default
            }
        };
        let cfg = Self {
            power_max: get(ParamKey::PowerMax, d.power_max),
            motor_resistance: get(ParamKey::MotorResistance, d.motor_resistance),
            motor_inductance: get(ParamKey::MotorInductance, d.motor_inductance),
            rpm_max: get(ParamKey::RpmMax, d.rpm_max),
            rpm_max_limit: get(ParamKey::RpmMaxLimit, d.rpm_max_limit),
            rpm_min_limit: get(ParamKey::RpmMinLimit, d.rpm_min_limit),
            shunt_resistance_mohm: get(ParamKey::ShuntResistance, d.shunt_resistance_mohm),
            pid_p: get(ParamKey::PidP, d.pid_p),
            pid_i: get(ParamKey::PidI, d.pid_i),
            dead_zone_width: get(ParamKey::DeadZoneWidth, d.dead_zone_width),
            rekv_to_speed_factor: get(ParamKey::RekvToSpeedFactor, d.rekv_to_speed_factor),
        };
        tracing::debug!(?cfg, "core config loaded");
        cfg
    }

    /// Sanity checks for operator-supplied profiles. The tick path never
    /// calls this; it is for the application boundary.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.power_max > 0.0) {
            return Err(CoreError::InvalidConfig("power_max must be > 0"));
        }
        if !(self.motor_resistance > 0.0) {
            return Err(CoreError::InvalidConfig("motor_resistance must be > 0"));
        }
        if self.motor_inductance < 0.0 {
            return Err(CoreError::InvalidConfig("motor_inductance must be >= 0"));
        }
        if !(self.rpm_max > 0.0) {
            return Err(CoreError::InvalidConfig("rpm_max must be > 0"));
        }
        if !(self.rpm_min_limit >= 0.0 && self.rpm_min_limit < self.rpm_max_limit) {
            return Err(CoreError::InvalidConfig(
                "rpm limits must satisfy 0 <= min < max",
            ));
        }
        if self.rpm_max_limit > self.rpm_max {
            return Err(CoreError::InvalidConfig(
                "rpm_max_limit must not exceed rpm_max",
            ));
        }
        if !(self.shunt_resistance_mohm > 0.0) {
            return Err(CoreError::InvalidConfig("shunt_resistance must be > 0"));
        }
        if !(self.pid_p > 0.0) || !(self.pid_i > 0.0) {
            return Err(CoreError::InvalidConfig("PI gains must be > 0"));
        }
        if !(0.0..1.0).contains(&self.dead_zone_width) {
            return Err(CoreError::InvalidConfig(
                "dead_zone_width must be in [0, 1)",
            ));
        }
        if !(self.rekv_to_speed_factor > 0.0) {
            return Err(CoreError::InvalidConfig(
                "rekv_to_speed_factor must be > 0",
            ));
        }
        Ok(())
    }
}
