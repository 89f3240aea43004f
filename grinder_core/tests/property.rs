//! Property tests for the pipeline invariants.

use grinder_core::controller::SpeedController;
use grinder_core::filter::truncated_mean;
use grinder_core::fix16::Fix16;
use grinder_core::sensors::Sensors;
use grinder_core::triac::{fire_delay_ticks, TriacDriver};
use grinder_core::{CoreConfig, ADC_CHANNELS, ADC_OVERSAMPLE};
use grinder_traits::GatePin;
use proptest::prelude::*;

#[derive(Default)]
struct NullGate;
impl GatePin for NullGate {
    fn set(&mut self, _on: bool) {}
}

/// One flat ADC window for the sensors: every channel held constant.
fn window(v: u16, c: u16) -> Vec<u16> {
    let vrefin = 1489; // 1.2 V reference at 3.3 V full scale
    let mut w = Vec::with_capacity(ADC_OVERSAMPLE * ADC_CHANNELS);
    for _ in 0..ADC_OVERSAMPLE {
        w.extend_from_slice(&[v, c, 0, vrefin]);
    }
    w
}

proptest! {
    // Truncated mean stays within the sample range for any window.
    #[test]
    fn truncated_mean_within_bounds(
        src in prop::collection::vec(0u16..4096, 1..=16),
        w_milli in 1000u32..=2000,
    ) {
        let w = Fix16::from_fraction(w_milli as i32, 1000);
        let m = truncated_mean(&src, w);
        let lo = *src.iter().min().unwrap();
        let hi = *src.iter().max().unwrap();
        prop_assert!(m >= lo && m <= hi, "{m} outside [{lo}, {hi}]");
    }

    // sinusize is monotone non-decreasing over [0, 1].
    #[test]
    fn sinusize_is_monotone(a in 0i32..=65536, b in 0i32..=65536) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let sa = Fix16::from_raw(lo).sinusize();
        let sb = Fix16::from_raw(hi).sinusize();
        prop_assert!(sa <= sb);
    }

    // The firing delay is monotone non-increasing in the setpoint.
    #[test]
    fn fire_delay_monotone_in_setpoint(
        period in 2u32..=400,
        a in 0i32..=65536,
        b in 0i32..=65536,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let d_lo = fire_delay_ticks(Fix16::from_raw(lo), period);
        let d_hi = fire_delay_ticks(Fix16::from_raw(hi), period);
        prop_assert!(d_hi <= d_lo);
    }

    // The gate is released on every zero-cross (rearm) tick, whatever the
    // setpoint sequence. The synthetic wave ramps through the ignition
    // threshold like a real half-sine, so firing at phase zero is
    // impossible and a crossing always finds or forces the gate low.
    #[test]
    fn gate_is_low_on_every_rearm_tick(
        halves in prop::collection::vec((150u32..=200, 0i32..=65536), 2..8),
    ) {
        let mut triac = TriacDriver::new(NullGate);
        for (len, sp_raw) in halves {
            let setpoint = Fix16::from_raw(sp_raw);
            // positive half: quantized sine, amplitude 311, nonzero from
            // the first tick so the crossing lands on i == 0
            for i in 0..len {
                let theta = core::f64::consts::PI * f64::from(i + 1) / f64::from(len + 1);
                let volts = (311.0 * theta.sin()).max(1.0) as i32;
                triac.setpoint = setpoint;
                triac.voltage = Fix16::from_int(volts);
                let crossing = i == 0;
                triac.tick();
                if crossing {
                    prop_assert!(!triac.gate_level(), "gate high on up-cross rearm");
                }
            }
            // zero half, same length
            for i in 0..len {
                triac.setpoint = setpoint;
                triac.voltage = Fix16::ZERO;
                let crossing = i == 0;
                triac.tick();
                if crossing {
                    prop_assert!(!triac.gate_level(), "gate high on down-cross rearm");
                }
            }
        }
    }

    // Both PI integrators stay inside their clamp bounds after every tick,
    // whatever the input sequence.
    #[test]
    fn integrators_stay_within_clamp_bounds(
        inputs in prop::collection::vec((0u32..=65536, 0u32..=80000, 0u32..=80000), 1..400),
    ) {
        let mut c = SpeedController::new();
        c.configure(&CoreConfig::default());
        let (lo, hi) = c.output_bounds();
        for (knob, speed, power) in inputs {
            c.in_knob = Fix16::from_raw(knob as i32);
            c.in_speed = Fix16::from_raw(speed as i32);
            c.in_power = Fix16::from_raw(power as i32);
            c.tick();
            prop_assert!(c.speed_integral() >= lo && c.speed_integral() <= hi);
            prop_assert!(
                c.power_integral() >= Fix16::ZERO && c.power_integral() <= Fix16::ONE
            );
            prop_assert!(
                c.out_power >= Fix16::ZERO && c.out_power <= Fix16::ONE,
                "out_power {} out of range", c.out_power
            );
        }
    }

    // Half-period tracking: the recorded period equals the tick count
    // between consecutive crossings.
    #[test]
    fn period_matches_ticks_between_crossings(
        segments in prop::collection::vec(120u32..=220, 2..6),
    ) {
        let mut s = Sensors::new();
        // settle one zero tick so the first positive tick is an up-cross
        let w0 = window(0, 0);
        s.adc_raw_data_load(&w0, 0);
        s.tick();

        let mut expected: Option<u32> = None;
        let mut first_crossing_seen = false;
        for (i, len) in segments.iter().enumerate() {
            let counts = if i % 2 == 0 { 900 } else { 0 };
            for j in 0..*len {
                let w = window(counts, 0);
                s.adc_raw_data_load(&w, 0);
                s.tick();
                if j == 0 && (s.zero_cross_up() || s.zero_cross_down()) {
                    if let Some(exp) = expected {
                        prop_assert_eq!(s.period_in_ticks(), exp);
                    }
                    if first_crossing_seen {
                        expected = Some(*len);
                    } else {
                        first_crossing_seen = true;
                        expected = Some(*len);
                    }
                }
            }
        }
    }
}
