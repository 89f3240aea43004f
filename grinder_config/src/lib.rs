//! Device profile loading and file-backed parameter storage.
//!
//! A profile is the operator-facing TOML description of one device
//! (motor constants, shunt, PI tuning). On a real unit those values live
//! in emulated EEPROM; on the host they are seeded into a
//! [`FileParamStore`], which implements the same `ParamStore` contract
//! and persists calibration results between runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grinder_traits::{ParamKey, ParamStore};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid profile: {0}")]
    Invalid(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotorCfg {
    /// Nominal maximum power, W.
    pub power_max_w: f32,
    /// Winding resistance, Ohm.
    pub resistance_ohm: f32,
    /// Winding inductance, H.
    pub inductance_h: f32,
    /// Mechanical maximum speed, RPM.
    pub rpm_max: f32,
    /// Upper user-visible speed bound, RPM.
    pub rpm_max_limit: f32,
    /// Lower user-visible speed bound, RPM.
    pub rpm_min_limit: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShuntCfg {
    /// Shunt resistance, mOhm (amplifier gain 50 applied in hardware).
    pub resistance_mohm: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlCfg {
    pub pid_p: f32,
    /// Integral time constant, s.
    pub pid_i: f32,
    /// Knob deadband, fraction of full travel.
    pub dead_zone_width: f32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub motor: MotorCfg,
    pub shunt: ShuntCfg,
    pub control: ControlCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Profile, toml::de::Error> {
    toml::from_str::<Profile>(s)
}

pub fn load_file(path: &Path) -> Result<Profile, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(load_toml(&text)?)
}

impl Profile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.motor.power_max_w > 0.0) {
            return Err(ConfigError::Invalid("power_max_w must be > 0"));
        }
        if !(self.motor.resistance_ohm > 0.0) {
            return Err(ConfigError::Invalid("resistance_ohm must be > 0"));
        }
        if self.motor.inductance_h < 0.0 {
            return Err(ConfigError::Invalid("inductance_h must be >= 0"));
        }
        if !(self.motor.rpm_max > 0.0) {
            return Err(ConfigError::Invalid("rpm_max must be > 0"));
        }
        if !(self.motor.rpm_min_limit >= 0.0
            && self.motor.rpm_min_limit < self.motor.rpm_max_limit)
        {
            return Err(ConfigError::Invalid(
                "rpm limits must satisfy 0 <= min < max",
            ));
        }
        if self.motor.rpm_max_limit > self.motor.rpm_max {
            return Err(ConfigError::Invalid("rpm_max_limit must not exceed rpm_max"));
        }
        if !(self.shunt.resistance_mohm > 0.0) {
            return Err(ConfigError::Invalid("resistance_mohm must be > 0"));
        }
        if !(self.control.pid_p > 0.0) || !(self.control.pid_i > 0.0) {
            return Err(ConfigError::Invalid("PI gains must be > 0"));
        }
        if !(0.0..1.0).contains(&self.control.dead_zone_width) {
            return Err(ConfigError::Invalid("dead_zone_width must be in [0, 1)"));
        }
        Ok(())
    }

    /// Push every profile value into a parameter store, as the flashing
    /// tool does for the emulated EEPROM. Calibration results already in
    /// the store are left alone.
    pub fn seed_store<P: ParamStore>(
        &self,
        store: &mut P,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let pairs = [
            (ParamKey::PowerMax, self.motor.power_max_w),
            (ParamKey::MotorResistance, self.motor.resistance_ohm),
            (ParamKey::MotorInductance, self.motor.inductance_h),
            (ParamKey::RpmMax, self.motor.rpm_max),
            (ParamKey::RpmMaxLimit, self.motor.rpm_max_limit),
            (ParamKey::RpmMinLimit, self.motor.rpm_min_limit),
            (ParamKey::ShuntResistance, self.shunt.resistance_mohm),
            (ParamKey::PidP, self.control.pid_p),
            (ParamKey::PidI, self.control.pid_i),
            (ParamKey::DeadZoneWidth, self.control.dead_zone_width),
        ];
        for (key, value) in pairs {
            store.write_f32(key, value)?;
        }
        Ok(())
    }
}

/// TOML-file-backed parameter map: the host-side stand-in for emulated
/// EEPROM. The whole map is rewritten on every store, which is fine for a
/// value that changes once per calibration.
#[derive(Debug)]
pub struct FileParamStore {
    path: PathBuf,
    values: BTreeMap<String, f32>,
}

impl FileParamStore {
    /// Open a store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str::<BTreeMap<String, f32>>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> std::io::Result<()> {
        let mut text = String::new();
        for (name, value) in &self.values {
            text.push_str(&format!("{name} = {value:?}\n"));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)
    }
}

impl ParamStore for FileParamStore {
    fn read_f32(&self, key: ParamKey) -> Option<f32> {
        self.values.get(key.name()).copied()
    }

    fn write_f32(
        &mut self,
        key: ParamKey,
        value: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.values.insert(key.name().to_string(), value);
        self.flush()?;
        Ok(())
    }
}
