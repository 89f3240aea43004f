//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grinder", version, about = "AC motor speed regulator (simulated plant)")]
pub struct Cli {
    /// Device profile TOML; compiled defaults when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/grinder.toml")]
    pub profile: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the closed loop against the simulated plant
    Simulate {
        /// Simulated wall-clock length, seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
        /// Knob position, percent of full travel
        #[arg(long, default_value_t = 50.0)]
        knob: f64,
        /// Telemetry line period, ms of simulated time (0 = final line only)
        #[arg(long, value_name = "MS", default_value_t = 100)]
        report_ms: u64,
        /// Simulated motor: equivalent resistance at full speed, Ohm
        #[arg(long, default_value_t = 90.0)]
        rekv: f64,
        /// Simulated motor: mechanical time constant, s
        #[arg(long, default_value_t = 0.3)]
        tau: f64,
    },
    /// Run the speed-scale calibration and persist the result
    Calibrate {
        /// Parameter store file (the emulated EEPROM)
        #[arg(long, value_name = "FILE", default_value = "etc/grinder_params.toml")]
        params: PathBuf,
        /// Simulated motor: equivalent resistance at full speed, Ohm
        #[arg(long, default_value_t = 90.0)]
        rekv: f64,
        /// Simulated motor: mechanical time constant, s
        #[arg(long, default_value_t = 0.3)]
        tau: f64,
    },
    /// Quick pipeline health check against the simulator
    SelfCheck,
}
