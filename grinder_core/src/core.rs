//! Tick orchestrator: one owned value wiring sensors, controller, triac
//! driver and calibrator in the binding per-tick order.
//!
//! The platform's tick interrupt forwards to [`Core::tick`]; nothing else
//! observes the interior state between ticks. The order matters: the
//! controller must see this tick's sensor values, the triac the newest
//! setpoint, and the sensors the conduction state produced this tick for
//! the next tick's speed gating.

use grinder_traits::{GatePin, ParamStore};

use crate::calibrator::SpeedScaleCalibrator;
use crate::config::CoreConfig;
use crate::controller::SpeedController;
use crate::fix16::Fix16;
use crate::sensors::Sensors;
use crate::triac::TriacDriver;

/// Operating mode of the tick pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Normal closed-loop regulation.
    Run,
    /// Speed-scale calibration drives the triac directly.
    Calibrate,
}

pub struct Core<G: GatePin, P: ParamStore> {
    sensors: Sensors,
    controller: SpeedController,
    triac: TriacDriver<G>,
    calibrator: SpeedScaleCalibrator,
    store: P,
    mode: Mode,
}

impl<G: GatePin, P: ParamStore> Core<G, P> {
    /// Build and configure from the parameter store. The gate pin comes up
    /// released.
    pub fn new(gate: G, store: P) -> Self {
        let mut core = Self {
            sensors: Sensors::new(),
            controller: SpeedController::new(),
            triac: TriacDriver::new(gate),
            calibrator: SpeedScaleCalibrator::new(),
            store,
            mode: Mode::Run,
        };
        core.configure();
        core
    }

    /// Reload configuration from persistent storage. Never fails: missing
    /// keys take compiled defaults.
    pub fn configure(&mut self) {
        let cfg = CoreConfig::load(&self.store);
        self.sensors.configure(&cfg);
        self.controller.configure(&cfg);
    }

    /// One pipeline tick. `ring` holds DMA samples, channel-interleaved;
    /// `offset` selects the window the DMA has finished writing.
    pub fn tick(&mut self, ring: &[u16], offset: usize) {
        self.sensors.adc_raw_data_load(ring, offset);
        self.sensors.tick();

        match self.mode {
            Mode::Run => {
                self.triac.voltage = self.sensors.voltage();

                self.controller.in_knob = self.sensors.knob();
                self.controller.in_speed = self.sensors.speed();
                self.controller.in_power = self.sensors.power();
                self.controller.tick();

                self.triac.setpoint = self.controller.out_power;
                self.triac.tick();
            }
            Mode::Calibrate => {
                let done =
                    self.calibrator
                        .tick(&mut self.sensors, &mut self.triac, &mut self.store);
                if done {
                    self.mode = Mode::Run;
                    self.controller.reset();
                }
            }
        }

        self.sensors.set_in_triac_on(self.triac.is_conducting());
    }

    /// Switch to the calibration routine at the next tick.
    pub fn start_calibration(&mut self) {
        self.calibrator = SpeedScaleCalibrator::new();
        self.mode = Mode::Calibrate;
        tracing::debug!("entering calibration mode");
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Physical gate pin level after the last tick.
    pub fn gate_level(&self) -> bool {
        self.triac.gate_level()
    }

    pub fn sensors(&self) -> &Sensors {
        &self.sensors
    }

    pub fn controller(&self) -> &SpeedController {
        &self.controller
    }

    pub fn triac(&self) -> &TriacDriver<G> {
        &self.triac
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Commanded duty after the last tick.
    pub fn out_power(&self) -> Fix16 {
        self.controller.out_power
    }
}
