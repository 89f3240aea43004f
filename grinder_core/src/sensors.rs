//! Sampling, zero-cross detection, power integration and speed estimation.
//!
//! One `tick()` consumes one conditioned ADC window and republishes the
//! normalized physical state: voltage, current, knob, active power (once
//! per half-period) and mechanical speed (equivalent-resistance method,
//! median-filtered, once per half-period).
//!
//! Faults are handled by omission, never by propagation: a division whose
//! guard fails or a buffer index past capacity simply leaves the affected
//! output untouched for that tick.

use crate::config::CoreConfig;
use crate::filter::{truncated_mean, MedianFilter};
use crate::fix16::Fix16;
use crate::{ADC_CHANNELS, ADC_OVERSAMPLE, F_TICK};

/// Capacity of the negative-half-wave voltage replay buffer, in ticks.
/// About two half-periods at 50 Hz and the 17 857 Hz tick rate.
pub const VOLTAGE_BUFFER_SIZE: usize = 400;

/// Outlier window of the oversample conditioner.
const CONDITION_WINDOW: Fix16 = Fix16::from_raw(72_090); // 1.1

/// Internal ADC reference, V.
const VREFIN_VOLTS: Fix16 = Fix16::from_raw(78_643); // 1.2

/// Mains divider ratio, 301.5 / 1.5.
const DIVIDER_RATIO: Fix16 = Fix16::from_raw(201 << 16);

/// Tick rate as fixed point, for di/dt scaling.
const TICK_RATE: Fix16 = Fix16::from_raw((F_TICK as i32) << 16);

/// Consecutive conduction ticks required before speed samples are trusted.
const SPEED_GATE_TICKS: u32 = 3;

pub struct Sensors {
    // Published state
    voltage: Fix16,
    current: Fix16,
    knob: Fix16,
    speed: Fix16,
    power: Fix16,
    zero_cross_up: bool,
    zero_cross_down: bool,
    period_in_ticks: u32,
    phase_counter: u32,

    // Input from the triac driver: conducting this half-wave.
    in_triac_on: bool,
    triac_on_ticks: u32,

    // Cached configuration
    shunt_resistance_inv: Fix16,
    power_max_inv: Fix16,
    rekv_to_speed_factor: Fix16,
    motor_resistance: Fix16,
    motor_inductance: Fix16,
    power_max_w: f32,
    rpm_max: f32,

    // Raw oversample windows, one per channel
    raw_voltage: [u16; ADC_OVERSAMPLE],
    raw_current: [u16; ADC_OVERSAMPLE],
    raw_knob: [u16; ADC_OVERSAMPLE],
    raw_vrefin: [u16; ADC_OVERSAMPLE],

    // Zero-cross and period tracking
    prev_voltage: Fix16,
    prev_current: Fix16,
    once_zero_crossed: bool,
    once_period_counted: bool,

    // Power integration
    voltage_buffer: [Fix16; VOLTAGE_BUFFER_SIZE],
    p_sum: i64,
    power_tick_counter: usize,
    voltage_zero_cross_tick: usize,

    // Speed estimation
    median: MedianFilter,
}

impl Default for Sensors {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensors {
    pub fn new() -> Self {
        let mut s = Self {
            voltage: Fix16::ZERO,
            current: Fix16::ZERO,
            knob: Fix16::ZERO,
            speed: Fix16::ZERO,
            power: Fix16::ZERO,
            zero_cross_up: false,
            zero_cross_down: false,
            period_in_ticks: 0,
            phase_counter: 0,
            in_triac_on: false,
            triac_on_ticks: 0,
            shunt_resistance_inv: Fix16::ZERO,
            power_max_inv: Fix16::ZERO,
            rekv_to_speed_factor: Fix16::ONE,
            motor_resistance: Fix16::ZERO,
            motor_inductance: Fix16::ZERO,
            power_max_w: 0.0,
            rpm_max: 0.0,
            raw_voltage: [0; ADC_OVERSAMPLE],
            raw_current: [0; ADC_OVERSAMPLE],
            raw_knob: [0; ADC_OVERSAMPLE],
            raw_vrefin: [0; ADC_OVERSAMPLE],
            prev_voltage: Fix16::ZERO,
            prev_current: Fix16::ZERO,
            once_zero_crossed: false,
            once_period_counted: false,
            voltage_buffer: [Fix16::ZERO; VOLTAGE_BUFFER_SIZE],
            p_sum: 0,
            power_tick_counter: 0,
            voltage_zero_cross_tick: 0,
            median: MedianFilter::new(),
        };
        s.configure(&CoreConfig::default());
        s
    }

    /// Cache the derived Q16.16 constants for the tick path.
    pub fn configure(&mut self, cfg: &CoreConfig) {
        // Shunt config is mOhm; the amplifier multiplies by 50.
        self.shunt_resistance_inv =
            Fix16::from_f32(1000.0 / (cfg.shunt_resistance_mohm * 50.0));
        self.power_max_inv = Fix16::from_f32(1.0 / cfg.power_max);
        self.rekv_to_speed_factor = Fix16::from_f32(cfg.rekv_to_speed_factor);
        self.motor_resistance = Fix16::from_f32(cfg.motor_resistance);
        self.motor_inductance = Fix16::from_f32(cfg.motor_inductance);
        self.power_max_w = cfg.power_max;
        self.rpm_max = cfg.rpm_max;
    }

    /// Copy one tick's worth of oversamples from the DMA ring, starting at
    /// `offset`. The ring is channel-interleaved `[voltage, current, knob,
    /// vrefin]`. A window that would run past the ring is dropped.
    pub fn adc_raw_data_load(&mut self, ring: &[u16], offset: usize) {
        let needed = ADC_OVERSAMPLE * ADC_CHANNELS;
        // Safety net, not an expected path: drop windows that would run
        // past the ring instead of reading garbage.
        let Some(window) = ring.get(offset..offset + needed) else {
            return;
        };
        for i in 0..ADC_OVERSAMPLE {
            let base = i * ADC_CHANNELS;
            self.raw_voltage[i] = window[base];
            self.raw_current[i] = window[base + 1];
            self.raw_knob[i] = window[base + 2];
            self.raw_vrefin[i] = window[base + 3];
        }
    }

    /// One pipeline step; call exactly once per tick, after
    /// [`Sensors::adc_raw_data_load`].
    pub fn tick(&mut self) {
        self.zero_cross_up = false;
        self.zero_cross_down = false;

        // Condition: outlier-rejecting mean of each oversample window,
        // then align the 12-bit result into Q16.16 [0, 1).
        let adc_voltage = truncated_mean(&self.raw_voltage, CONDITION_WINDOW);
        let adc_current = truncated_mean(&self.raw_current, CONDITION_WINDOW);
        let adc_knob = truncated_mean(&self.raw_knob, CONDITION_WINDOW);
        let adc_vrefin = truncated_mean(&self.raw_vrefin, CONDITION_WINDOW);
        if adc_vrefin == 0 {
            // Reference channel dead; treat as a missed tick.
            return;
        }
        let v_frac = Fix16::from_raw(i32::from(adc_voltage) << 4);
        let c_frac = Fix16::from_raw(i32::from(adc_current) << 4);
        let k_frac = Fix16::from_raw(i32::from(adc_knob) << 4);
        let ref_frac = Fix16::from_raw(i32::from(adc_vrefin) << 4);

        // Normalize. v_ref is the ADC full-scale voltage recovered from
        // the internal 1.2 V reference. A zero conditioned sample stays
        // exactly zero through the multiplications, which the zero-cross
        // predicates below rely on.
        let v_ref = VREFIN_VOLTS.div(ref_frac);
        self.current = c_frac.mul(v_ref).mul(self.shunt_resistance_inv);
        self.voltage = v_frac.mul(v_ref).mul(DIVIDER_RATIO);
        self.knob = Fix16::from_raw(
            ((15 * i64::from(self.knob.raw()) + i64::from(k_frac.raw()) + 8) >> 4) as i32,
        );

        // Zero crossings of the rectified mains.
        self.zero_cross_up = self.prev_voltage == Fix16::ZERO && self.voltage > Fix16::ZERO;
        self.zero_cross_down = self.prev_voltage > Fix16::ZERO && self.voltage == Fix16::ZERO;

        // Half-period tracking. The first crossing only arms the counter;
        // a length is recorded once a full half-period has been seen.
        if self.zero_cross_up || self.zero_cross_down {
            if self.once_zero_crossed {
                self.period_in_ticks = self.phase_counter;
                self.once_period_counted = true;
            }
            self.once_zero_crossed = true;
            self.phase_counter = 0;
        }

        if self.in_triac_on {
            self.triac_on_ticks += 1;
        } else {
            self.triac_on_ticks = 0;
        }

        self.power_tick();
        self.speed_tick();

        self.prev_voltage = self.voltage;
        self.prev_current = self.current;
        self.phase_counter += 1;
    }

    /// Active-power integration with negative-half-wave extrapolation.
    ///
    /// During the positive half-wave the instantaneous v*i is accumulated
    /// and the voltage recorded. Once the voltage is pinned to zero but
    /// the inductive current still flows, the voltage is replayed from the
    /// start of the recorded half-wave and that energy (returned to the
    /// supply) is subtracted. The average over the half-period is
    /// published when the current finally ceases.
    fn power_tick(&mut self) {
        if !self.once_period_counted {
            return;
        }

        if self.voltage > Fix16::ZERO && self.current > Fix16::ZERO {
            self.p_sum += i64::from(self.voltage.mul(self.current).raw());
            if self.power_tick_counter < VOLTAGE_BUFFER_SIZE {
                self.voltage_buffer[self.power_tick_counter] = self.voltage;
            }
            self.power_tick_counter += 1;
        } else if self.voltage == Fix16::ZERO {
            if self.zero_cross_down {
                self.voltage_zero_cross_tick = self.power_tick_counter;
            }
            if self.current > Fix16::ZERO {
                let idx = self
                    .power_tick_counter
                    .saturating_sub(self.voltage_zero_cross_tick);
                let replayed = if idx < VOLTAGE_BUFFER_SIZE {
                    self.voltage_buffer[idx]
                } else {
                    Fix16::ZERO
                };
                self.p_sum -= i64::from(replayed.mul(self.current).raw());
                self.power_tick_counter += 1;
            }
        }

        if self.prev_current > Fix16::ZERO && self.current == Fix16::ZERO {
            if self.period_in_ticks > 0 {
                let avg_raw = (self.p_sum / i64::from(self.period_in_ticks))
                    .clamp(0, i64::from(i32::MAX));
                self.power = Fix16::from_raw(avg_raw as i32).mul(self.power_max_inv);
                tracing::trace!(power = %self.power, "half-period power published");
            }
            self.p_sum = 0;
            self.power_tick_counter = 0;
        }
    }

    /// Equivalent-resistance speed estimation.
    ///
    /// r_ekv = v/i - R_motor - L*(di/dt)/i is proportional to mechanical
    /// speed in a universal motor. Samples are taken only in the second
    /// half of the conduction window (past the switching transient and
    /// the previous half-period's tail) and median-filtered; the median
    /// is published at the zero-cross-down edge.
    fn speed_tick(&mut self) {
        if self.once_period_counted
            && self.triac_on_ticks > SPEED_GATE_TICKS
            && self.voltage > Fix16::ZERO
            && self.current > Fix16::ZERO
            && self.phase_counter >= self.period_in_ticks / 2
        {
            let di = self.current - self.prev_current;
            let l_di_dt = self.motor_inductance.mul(di).mul(TICK_RATE);
            let r_ekv = self.voltage.div(self.current)
                - self.motor_resistance
                - l_di_dt.div(self.current);
            self.median.add(r_ekv.div(self.rekv_to_speed_factor));
        }

        if self.zero_cross_down {
            if !self.median.is_empty() {
                self.speed = self.median.result();
                tracing::trace!(speed = %self.speed, "half-period speed published");
            }
            self.median.reset();
        }
    }

    // Published state -----------------------------------------------------

    pub fn voltage(&self) -> Fix16 {
        self.voltage
    }
    pub fn current(&self) -> Fix16 {
        self.current
    }
    pub fn knob(&self) -> Fix16 {
        self.knob
    }
    pub fn speed(&self) -> Fix16 {
        self.speed
    }
    pub fn power(&self) -> Fix16 {
        self.power
    }
    pub fn zero_cross_up(&self) -> bool {
        self.zero_cross_up
    }
    pub fn zero_cross_down(&self) -> bool {
        self.zero_cross_down
    }
    pub fn period_in_ticks(&self) -> u32 {
        self.period_in_ticks
    }
    pub fn phase_counter(&self) -> u32 {
        self.phase_counter
    }

    /// Triac conduction input for the next tick's speed gating.
    pub fn set_in_triac_on(&mut self, on: bool) {
        self.in_triac_on = on;
    }

    /// Replace the speed scale, used by the calibration routine.
    pub fn set_rekv_to_speed_factor(&mut self, factor: Fix16) {
        self.rekv_to_speed_factor = factor;
    }

    /// Telemetry only: speed in RPM.
    pub fn speed_rpm(&self) -> f32 {
        self.speed.to_f32() * self.rpm_max
    }

    /// Telemetry only: active power in W.
    pub fn power_watts(&self) -> f32 {
        self.power.to_f32() * self.power_max_w
    }
}
