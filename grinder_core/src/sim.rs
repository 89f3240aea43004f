//! Deterministic plant simulation and test doubles.
//!
//! `SimPlant` models the mains and a universal motor well enough to close
//! the control loop: a rectified 50 Hz sine, a triac that latches from the
//! ignition pulse to the current zero, a first-order winding (R, L) and a
//! first-order mechanical response whose equivalent resistance grows with
//! speed. It emits the same channel-interleaved 12-bit ADC windows the DMA
//! ring would hold, so tests and the CLI drive the real pipeline.
//!
//! Floating point is fine here; this module never runs on the tick path
//! of a real device.

use std::collections::HashMap;
use std::f64::consts::PI;

use grinder_traits::{GatePin, ParamKey, ParamStore};

use crate::config::CoreConfig;
use crate::core::Core;
use crate::{ADC_CHANNELS, ADC_OVERSAMPLE, F_TICK};

/// ADC full-scale supply, V.
const VREF_SUPPLY: f64 = 3.3;
/// Internal reference, V.
const VREFIN: f64 = 1.2;
/// Mains divider ratio.
const DIVIDER_RATIO: f64 = 201.0;
/// Simulated mains frequency, Hz.
const MAINS_HZ: f64 = 50.0;
/// Simulated mains amplitude, V.
const AMPLITUDE: f64 = 311.0;

/// Mechanical side of the simulated motor.
#[derive(Debug, Clone, Copy)]
pub struct SimMotor {
    /// Equivalent resistance at full unloaded speed, Ohm.
    pub rekv_at_full: f64,
    /// Mechanical time constant, s.
    pub tau_s: f64,
}

impl Default for SimMotor {
    fn default() -> Self {
        Self {
            rekv_at_full: 90.0,
            tau_s: 0.3,
        }
    }
}

/// One DMA window per call plant model.
pub struct SimPlant {
    resistance: f64,
    inductance: f64,
    shunt_v_per_a: f64,
    motor: SimMotor,

    knob: f64,
    tick_idx: u64,
    half_idx: u64,
    speed: f64,
    conducting: bool,
    current: f64,
    energy_on: f64,
    energy_total: f64,
}

impl SimPlant {
    /// Electrical parameters come from the same profile the core is
    /// configured with, so the estimator's model matches the plant.
    pub fn new(profile: &CoreConfig, motor: SimMotor) -> Self {
        Self {
            resistance: f64::from(profile.motor_resistance),
            inductance: f64::from(profile.motor_inductance).max(1.0e-6),
            shunt_v_per_a: f64::from(profile.shunt_resistance_mohm) * 50.0 / 1000.0,
            motor,
            knob: 0.0,
            tick_idx: 0,
            half_idx: 0,
            speed: 0.0,
            conducting: false,
            current: 0.0,
            energy_on: 0.0,
            energy_total: 0.0,
        }
    }

    /// Commanded knob position, `[0, 1]` of full travel.
    pub fn set_knob(&mut self, knob: f64) {
        self.knob = knob.clamp(0.0, 1.0);
    }

    /// Mechanical speed state, `[0, 1]`.
    pub fn speed_state(&self) -> f64 {
        self.speed
    }

    /// True while the simulated triac conducts.
    pub fn conducting(&self) -> bool {
        self.conducting
    }

    /// Latch conduction on the ignition pulse. Wire the core's gate level
    /// back here after every `Core::tick`.
    pub fn apply_gate(&mut self, gate: bool) {
        if gate {
            self.conducting = true;
        }
    }

    /// Advance one tick and emit its ADC window.
    pub fn next_window(&mut self) -> [u16; ADC_OVERSAMPLE * ADC_CHANNELS] {
        let dt = 1.0 / F_TICK as f64;
        let pos = self.tick_idx as f64 * 2.0 * MAINS_HZ / F_TICK as f64;
        let half = pos as u64;
        let frac = pos - half as f64;

        if half != self.half_idx {
            // A half-wave ended. The positive half carries the energy
            // bookkeeping that drives the mechanical state; the firing
            // latch never survives a zero cross.
            if self.half_idx % 2 == 0 {
                let ef = if self.energy_total > 0.0 {
                    self.energy_on / self.energy_total
                } else {
                    0.0
                };
                let a = (1.0 / (2.0 * MAINS_HZ) / self.motor.tau_s).min(1.0);
                self.speed += (ef - self.speed) * a;
            }
            self.energy_on = 0.0;
            self.energy_total = 0.0;
            self.conducting = false;
            self.half_idx = half;
        }

        let positive = half % 2 == 0;
        let r_total = self.resistance + self.motor.rekv_at_full * self.speed;

        let sensed_voltage;
        if positive {
            let v = AMPLITUDE * (PI * frac).sin();
            sensed_voltage = v;
            self.energy_total += v * v;
            if self.conducting {
                // Winding equation v = i*R + L di/dt, explicit Euler. The
                // clamp bounds the step for profiles stiffer than the
                // integration can follow.
                self.current += dt * (v - self.current * r_total) / self.inductance;
                self.current = self.current.clamp(0.0, AMPLITUDE / self.resistance);
                self.energy_on += v * v;
            } else {
                self.current = 0.0;
            }
        } else {
            // Sensed voltage is pinned to zero while the actual mains is
            // negative; the inductive tail keeps the current flowing until
            // the winding discharges.
            sensed_voltage = 0.0;
            if self.current > 0.0 {
                let v = -AMPLITUDE * (PI * frac).sin();
                self.current += dt * (v - self.current * r_total) / self.inductance;
                if self.current <= 0.0 {
                    self.current = 0.0;
                }
            }
        }

        self.tick_idx += 1;
        self.build_window(sensed_voltage)
    }

    fn build_window(&self, sensed_voltage: f64) -> [u16; ADC_OVERSAMPLE * ADC_CHANNELS] {
        let v = to_counts(sensed_voltage / (VREF_SUPPLY * DIVIDER_RATIO));
        let c = to_counts(self.current * self.shunt_v_per_a / VREF_SUPPLY);
        let k = to_counts(self.knob);
        let r = to_counts(VREFIN / VREF_SUPPLY);
        let mut window = [0u16; ADC_OVERSAMPLE * ADC_CHANNELS];
        for i in 0..ADC_OVERSAMPLE {
            let base = i * ADC_CHANNELS;
            window[base] = v;
            window[base + 1] = c;
            window[base + 2] = k;
            window[base + 3] = r;
        }
        window
    }
}

fn to_counts(frac: f64) -> u16 {
    (frac * 4096.0).round().clamp(0.0, 4095.0) as u16
}

/// Drive one closed-loop step: plant window in, gate level back out.
pub fn step<G: GatePin, P: ParamStore>(core: &mut Core<G, P>, plant: &mut SimPlant) {
    let window = plant.next_window();
    core.tick(&window, 0);
    plant.apply_gate(core.gate_level());
}

/// Gate pin that goes nowhere; the core mirrors the level itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGatePin;

impl GatePin for NullGatePin {
    fn set(&mut self, _on: bool) {}
}

/// In-memory parameter map mirroring the emulated EEPROM.
#[derive(Debug, Default, Clone)]
pub struct MemParamStore {
    values: HashMap<u16, f32>,
}

impl MemParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every key a profile covers, as the flashing tool would.
    pub fn from_profile(profile: &CoreConfig) -> Self {
        let mut store = Self::new();
        let pairs = [
            (ParamKey::PowerMax, profile.power_max),
            (ParamKey::MotorResistance, profile.motor_resistance),
            (ParamKey::MotorInductance, profile.motor_inductance),
            (ParamKey::RpmMax, profile.rpm_max),
            (ParamKey::RpmMaxLimit, profile.rpm_max_limit),
            (ParamKey::RpmMinLimit, profile.rpm_min_limit),
            (ParamKey::ShuntResistance, profile.shunt_resistance_mohm),
            (ParamKey::PidP, profile.pid_p),
            (ParamKey::PidI, profile.pid_i),
            (ParamKey::DeadZoneWidth, profile.dead_zone_width),
            (ParamKey::RekvToSpeedFactor, profile.rekv_to_speed_factor),
        ];
        for (key, value) in pairs {
            store.values.insert(key.addr(), value);
        }
        store
    }
}

impl ParamStore for MemParamStore {
    fn read_f32(&self, key: ParamKey) -> Option<f32> {
        self.values.get(&key.addr()).copied()
    }

    fn write_f32(
        &mut self,
        key: ParamKey,
        value: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.values.insert(key.addr(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectified_sine_has_expected_half_period() {
        let mut plant = SimPlant::new(&CoreConfig::default(), SimMotor::default());
        // Count ticks of the first full positive half-wave.
        let mut positive = 0u32;
        let mut seen_positive = false;
        for _ in 0..1000 {
            let w = plant.next_window();
            if w[0] > 0 {
                positive += 1;
                seen_positive = true;
            } else if seen_positive {
                break;
            }
        }
        // F_TICK / (2 * 50 Hz) is about 178.6 ticks; the boundary ticks
        // themselves can quantize to zero counts.
        assert!((176..=180).contains(&positive), "half period {positive}");
    }

    #[test]
    fn no_gate_no_current() {
        let mut plant = SimPlant::new(&CoreConfig::default(), SimMotor::default());
        for _ in 0..2000 {
            let w = plant.next_window();
            assert_eq!(w[1], 0, "current without ignition");
        }
        assert_eq!(plant.speed_state(), 0.0);
    }

    #[test]
    fn permanent_gate_spins_up_and_leaves_a_tail() {
        let profile = CoreConfig {
            motor_inductance: 0.01,
            ..CoreConfig::default()
        };
        let mut plant = SimPlant::new(&profile, SimMotor::default());
        let mut tail_seen = false;
        for _ in 0..(F_TICK as usize) {
            let w = plant.next_window();
            plant.apply_gate(true);
            if w[0] == 0 && w[1] > 0 {
                tail_seen = true;
            }
        }
        assert!(plant.speed_state() > 0.8, "speed {}", plant.speed_state());
        assert!(tail_seen, "no inductive tail into the zero half");
    }

    #[test]
    fn mem_store_round_trips() {
        let mut store = MemParamStore::new();
        assert_eq!(store.read_f32(ParamKey::PidP), None);
        store.write_f32(ParamKey::PidP, 1.25).unwrap();
        assert_eq!(store.read_f32(ParamKey::PidP), Some(1.25));
    }
}
