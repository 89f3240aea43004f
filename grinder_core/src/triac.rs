//! Per-half-wave triac firing state machine.
//!
//! Every zero cross rearms the driver: the gate is forced low and the
//! open/close flags reset, so a missed tick can never leave the gate
//! driven across a half-wave boundary. Within a half-wave the gate is
//! asserted exactly once, for one tick, no earlier than the learned
//! safe-ignition threshold and no earlier than the linearised firing
//! point for the commanded setpoint.

use grinder_traits::GatePin;

use crate::fix16::Fix16;

/// Minimal instantaneous voltage for guaranteed triac latching, V.
pub const MIN_IGNITION_VOLTAGE: i32 = 25;

pub struct TriacDriver<G: GatePin> {
    /// Commanded duty, `[0, 1]`.
    pub setpoint: Fix16,
    /// Instantaneous mains voltage, wired from the sensors each tick.
    pub voltage: Fix16,

    gate: G,
    gate_level: bool,

    phase_counter: u32,
    period_in_ticks: u32,
    triac_open_done: bool,
    triac_close_done: bool,
    // Ticks after zero cross at which the voltage first clears
    // MIN_IGNITION_VOLTAGE; measured on each half-wave, reused on the next.
    safe_ignition_threshold: u32,
    prev_voltage: Fix16,
    once_zero_crossed: bool,
    once_period_counted: bool,
}

impl<G: GatePin> TriacDriver<G> {
    pub fn new(mut gate: G) -> Self {
        gate.set(false);
        Self {
            setpoint: Fix16::ZERO,
            voltage: Fix16::ZERO,
            gate,
            gate_level: false,
            phase_counter: 0,
            period_in_ticks: 0,
            triac_open_done: false,
            triac_close_done: false,
            safe_ignition_threshold: 0,
            prev_voltage: Fix16::ZERO,
            once_zero_crossed: false,
            once_period_counted: false,
        }
    }

    /// One state-machine step; call exactly once per tick with `setpoint`
    /// and `voltage` already updated.
    pub fn tick(&mut self) {
        if (self.prev_voltage == Fix16::ZERO && self.voltage > Fix16::ZERO)
            || (self.prev_voltage > Fix16::ZERO && self.voltage == Fix16::ZERO)
        {
            self.rearm();
        }

        let min_ignition = Fix16::from_int(MIN_IGNITION_VOLTAGE);
        if self.voltage >= min_ignition && self.prev_voltage < min_ignition {
            self.safe_ignition_threshold = self.phase_counter;
        }

        // Until a full half-period has been measured only track the phase;
        // firing with an unknown period would misplace the pulse.
        if !self.once_period_counted {
            self.phase_counter += 1;
            self.prev_voltage = self.voltage;
            return;
        }

        // The gate pulse is one tick wide.
        if self.triac_open_done && !self.triac_close_done {
            self.triac_close_done = true;
            self.set_gate(false);
        }

        if !self.triac_open_done && self.phase_counter >= self.safe_ignition_threshold {
            let fire_at = fire_delay_ticks(self.setpoint, self.period_in_ticks);
            // A firing point at or past the crossing means zero duty: stay
            // off instead of clipping a sliver when the measured period
            // jitters a tick short of the actual half-wave.
            if fire_at < self.period_in_ticks && self.phase_counter >= fire_at {
                self.triac_open_done = true;
                self.set_gate(true);
            }
        }

        self.phase_counter += 1;
        self.prev_voltage = self.voltage;
    }

    /// Zero-cross reset of the per-half-wave state. Also measures the
    /// half-period length and unconditionally releases the gate.
    fn rearm(&mut self) {
        if self.once_zero_crossed {
            self.once_period_counted = true;
            self.period_in_ticks = self.phase_counter;
        }
        self.once_zero_crossed = true;
        self.phase_counter = 0;
        self.triac_open_done = false;
        self.triac_close_done = false;
        self.set_gate(false);
    }

    #[inline]
    fn set_gate(&mut self, on: bool) {
        self.gate_level = on;
        self.gate.set(on);
    }

    /// Physical gate pin level (the one-tick ignition pulse).
    pub fn gate_level(&self) -> bool {
        self.gate_level
    }

    /// True from the firing point until the next rearm; the triac itself
    /// latches conduction for the rest of the half-wave.
    pub fn is_conducting(&self) -> bool {
        self.triac_open_done
    }

    pub fn phase_counter(&self) -> u32 {
        self.phase_counter
    }

    pub fn period_in_ticks(&self) -> u32 {
        self.period_in_ticks
    }

    pub fn safe_ignition_threshold(&self) -> u32 {
        self.safe_ignition_threshold
    }
}

/// Firing delay in ticks after the zero cross for a commanded duty:
/// `(1 - sinusize(setpoint)) * period`.
pub fn fire_delay_ticks(setpoint: Fix16, period_in_ticks: u32) -> u32 {
    let normalized = setpoint.sinusize();
    let period = Fix16::from_int(period_in_ticks as i32);
    (Fix16::ONE - normalized).mul(period).to_int().max(0) as u32
}
