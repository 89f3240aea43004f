#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core of a single-phase AC universal-motor speed regulator.
//!
//! The core is a fixed-rate synchronous pipeline: every tick consumes one
//! oversampled ADC window, conditions it, updates the sensors (zero-cross
//! tracking, power integration, back-EMF speed estimation), runs a dual PI
//! regulator with a power-limit override and schedules the triac gate
//! pulse for phase-angle control. Hardware is reached only through
//! `grinder_traits`; everything here is deterministic Q16.16 integer math.
//!
//! ## Architecture
//!
//! - **Fixed point**: Q16.16 arithmetic and the firing linearisation
//!   (`fix16` module)
//! - **Filtering**: outlier-rejecting oversample mean, running median
//!   (`filter` module)
//! - **Sensors**: normalization, zero cross, period, power, speed
//!   (`sensors` module)
//! - **Triac**: per-half-wave firing state machine (`triac` module)
//! - **Control**: dual PI with min-selector and bumpless handover
//!   (`controller` module)
//! - **Calibration**: speed-scale routine (`calibrator` module)
//! - **Orchestration**: the per-tick wiring order (`core` module)
//! - **Simulation**: deterministic plant for tests and the CLI
//!   (`sim` module)

pub mod calibrator;
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod filter;
pub mod fix16;
pub mod sensors;
pub mod sim;
pub mod triac;

/// Tick rate of the pipeline, Hz. Derived from the ADC completion rate.
pub const F_TICK: u32 = 17_857;

/// ADC oversamples per channel per tick.
pub const ADC_OVERSAMPLE: usize = 8;

/// Sampled channels, interleaved `[voltage, current, knob, vrefin]`.
pub const ADC_CHANNELS: usize = 4;

pub use crate::calibrator::SpeedScaleCalibrator;
pub use crate::config::CoreConfig;
pub use crate::controller::SpeedController;
pub use crate::core::{Core, Mode};
pub use crate::error::CoreError;
pub use crate::fix16::Fix16;
pub use crate::sensors::Sensors;
pub use crate::triac::{TriacDriver, MIN_IGNITION_VOLTAGE};
