//! Speed-scale calibration routine.
//!
//! Runs the motor to its maximum unloaded speed and records the
//! equivalent-resistance value observed there as the speed scale, so that
//! the sensors publish 1.0 at full speed afterwards. Drives the triac
//! directly; the speed controller is bypassed while this runs.

use grinder_traits::{GatePin, ParamKey, ParamStore};

use crate::fix16::Fix16;
use crate::sensors::Sensors;
use crate::triac::TriacDriver;
use crate::F_TICK;

/// Spin-up ramp length.
const STARTUP_TICKS: u32 = 3 * F_TICK;
/// One stability-measurement window.
const MEASURE_TICKS: u32 = F_TICK / 5;
/// Spin-down hold before reporting completion.
const STOP_TICKS: u32 = F_TICK;

/// Accepted speed deviation between measurement windows, percent.
const STABLE_PERCENT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Measure,
    Stop,
}

pub struct SpeedScaleCalibrator {
    state: State,
    ticks_cnt: u32,
    prev_speed: i32,
}

impl Default for SpeedScaleCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedScaleCalibrator {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            ticks_cnt: 0,
            prev_speed: 0,
        }
    }

    /// One calibration step; returns `true` on the tick the routine
    /// completes. Call once per tick instead of the normal controller
    /// path, after `sensors.tick()`.
    pub fn tick<G: GatePin, P: ParamStore>(
        &mut self,
        sensors: &mut Sensors,
        triac: &mut TriacDriver<G>,
        store: &mut P,
    ) -> bool {
        match self.state {
            // Gently ramp the motor to full duty over three seconds, with
            // the speed scale reset so the raw equivalent resistance is
            // what the sensors publish.
            State::Start => {
                if self.ticks_cnt == 0 {
                    sensors.set_rekv_to_speed_factor(Fix16::ONE);
                    self.prev_speed = 0;
                    tracing::debug!("speed-scale calibration: spin-up");
                }
                triac.voltage = sensors.voltage();
                triac.setpoint =
                    Fix16::from_fraction(self.ticks_cnt as i32, STARTUP_TICKS as i32);
                triac.tick();

                self.ticks_cnt += 1;
                if self.ticks_cnt >= STARTUP_TICKS {
                    self.set_state(State::Measure);
                }
            }

            // Hold full duty; once two consecutive windows agree within
            // the stability margin, the motor is as fast as it gets.
            State::Measure => {
                triac.voltage = sensors.voltage();
                triac.setpoint = Fix16::ONE;
                triac.tick();

                self.ticks_cnt += 1;
                if self.ticks_cnt >= MEASURE_TICKS {
                    // Integer compare is enough: the raw scale is in the
                    // hundreds for small motors.
                    let current_speed = sensors.speed().to_int();
                    let stable = current_speed > 0
                        && (current_speed - self.prev_speed).abs() * 100 / current_speed
                            < STABLE_PERCENT;
                    if stable {
                        let factor = sensors.speed();
                        if let Err(e) =
                            store.write_f32(ParamKey::RekvToSpeedFactor, factor.to_f32())
                        {
                            tracing::warn!(error = %e, "speed scale not persisted");
                        }
                        sensors.set_rekv_to_speed_factor(factor);
                        tracing::debug!(factor = %factor, "speed-scale calibration: measured");
                        self.set_state(State::Stop);
                    } else {
                        self.prev_speed = current_speed;
                        self.set_state(State::Measure);
                    }
                }
            }

            // Release the triac and let the motor coast before handing
            // control back.
            State::Stop => {
                triac.voltage = sensors.voltage();
                triac.setpoint = Fix16::ZERO;
                triac.tick();

                self.ticks_cnt += 1;
                if self.ticks_cnt >= STOP_TICKS {
                    self.set_state(State::Start);
                    tracing::debug!("speed-scale calibration: done");
                    return true;
                }
            }
        }
        false
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
        self.ticks_cnt = 0;
    }
}
