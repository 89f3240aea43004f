//! Dual-PI speed controller with a power-limit override.
//!
//! Two PI regulators run against the same output range: one tracks the
//! knob-derived speed target, the other caps normalized power at 1.0. A
//! min-selector picks the lower command; when the speed branch takes over
//! again its integrator is back-calculated from the published output, so
//! the handover is bumpless and the integrator cannot wind up while the
//! branch is inactive.
//!
//! The controller runs at the tick rate. `pid_i` is an integral time
//! constant in seconds; the per-tick integrator gain `1 / (pid_i * F_TICK)`
//! is precomputed at configure time.

use crate::config::CoreConfig;
use crate::fix16::Fix16;
use crate::F_TICK;

pub struct SpeedController {
    /// Knob position, `[0, 1]`.
    pub in_knob: Fix16,
    /// Measured speed, normalized.
    pub in_speed: Fix16,
    /// Measured power, normalized.
    pub in_power: Fix16,

    /// Commanded duty for the triac driver, `[0, 1]`.
    pub out_power: Fix16,

    pid_speed_integral: Fix16,
    pid_power_integral: Fix16,
    power_limit: bool,

    // Cached configuration
    pid_p: Fix16,
    pid_i_inv: Fix16,
    dead_zone_width: Fix16,
    knob_norm_coeff: Fix16,
    out_min: Fix16,
    out_max: Fix16,
}

impl Default for SpeedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedController {
    pub fn new() -> Self {
        let mut c = Self {
            in_knob: Fix16::ZERO,
            in_speed: Fix16::ZERO,
            in_power: Fix16::ZERO,
            out_power: Fix16::ZERO,
            pid_speed_integral: Fix16::ZERO,
            pid_power_integral: Fix16::ZERO,
            power_limit: false,
            pid_p: Fix16::ZERO,
            pid_i_inv: Fix16::ZERO,
            dead_zone_width: Fix16::ZERO,
            knob_norm_coeff: Fix16::ZERO,
            out_min: Fix16::ZERO,
            out_max: Fix16::ONE,
        };
        c.configure(&CoreConfig::default());
        c
    }

    /// Cache gains and clamp bounds; resets the regulator state.
    pub fn configure(&mut self, cfg: &CoreConfig) {
        self.pid_p = Fix16::from_f32(cfg.pid_p);
        self.pid_i_inv = Fix16::from_f32(1.0 / (cfg.pid_i * F_TICK as f32));
        self.dead_zone_width = Fix16::from_f32(cfg.dead_zone_width).clamp_zero_one();
        self.out_min = Fix16::from_f32(cfg.rpm_min_limit / cfg.rpm_max).clamp_zero_one();
        self.out_max = Fix16::from_f32(cfg.rpm_max_limit / cfg.rpm_max).clamp_zero_one();
        if self.out_max < self.out_min {
            self.out_max = self.out_min;
        }
        self.knob_norm_coeff =
            (self.out_max - self.out_min).div(Fix16::ONE - self.dead_zone_width);
        self.reset();
    }

    /// Clear the regulator state (integrators and limit flag).
    pub fn reset(&mut self) {
        self.pid_speed_integral = self.out_min;
        self.pid_power_integral = Fix16::ZERO;
        self.power_limit = false;
        self.out_power = Fix16::ZERO;
    }

    /// One regulator step; call exactly once per tick with the inputs
    /// already wired from the sensors.
    pub fn tick(&mut self) {
        // Deadband, then map the remaining knob travel onto the user speed
        // window [out_min, out_max]. Inside the deadband the speed branch
        // commands exactly zero: the motor must stop, not idle at out_min.
        let knob_norm = if self.in_knob < self.dead_zone_width {
            Fix16::ZERO
        } else {
            (self.in_knob - self.dead_zone_width)
                .mul(self.knob_norm_coeff)
                + self.out_min
        };

        let err_speed = knob_norm - self.in_speed;
        let u_speed = if knob_norm == Fix16::ZERO {
            Fix16::ZERO
        } else {
            // The integrator only moves while this branch owns the output;
            // during power limiting it is frozen and later back-calculated.
            if !self.power_limit {
                self.pid_speed_integral = (self.pid_speed_integral
                    + self.pid_i_inv.mul(err_speed))
                .clamp(self.out_min, self.out_max);
            }
            (self.pid_p.mul(err_speed) + self.pid_speed_integral)
                .clamp(self.out_min, self.out_max)
        };

        let err_power = Fix16::ONE - self.in_power;
        self.pid_power_integral = (self.pid_power_integral + self.pid_i_inv.mul(err_power))
            .clamp_zero_one();
        let u_power = (self.pid_p.mul(err_power) + self.pid_power_integral).clamp_zero_one();

        if u_speed <= u_power {
            if knob_norm > Fix16::ZERO {
                // Bumpless handover and anti-windup in one move: make the
                // integrator consistent with the output actually published.
                self.pid_speed_integral = (u_speed - self.pid_p.mul(err_speed))
                    .clamp(self.out_min, self.out_max);
            }
            self.power_limit = false;
            self.out_power = u_speed;
        } else {
            self.power_limit = true;
            self.out_power = u_power;
        }
    }

    pub fn power_limit_active(&self) -> bool {
        self.power_limit
    }

    pub fn speed_integral(&self) -> Fix16 {
        self.pid_speed_integral
    }

    pub fn power_integral(&self) -> Fix16 {
        self.pid_power_integral
    }

    pub fn output_bounds(&self) -> (Fix16, Fix16) {
        (self.out_min, self.out_max)
    }

    /// Upper bound of one integrator move, for handover tolerance checks.
    pub fn integrator_step(&self) -> Fix16 {
        self.pid_i_inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(cfg: &CoreConfig) -> SpeedController {
        let mut c = SpeedController::new();
        c.configure(cfg);
        c
    }

    fn cfg() -> CoreConfig {
        CoreConfig {
            pid_p: 0.5,
            pid_i: 0.05,
            dead_zone_width: 0.1,
            rpm_min_limit: 3_000.0,
            rpm_max_limit: 30_000.0,
            rpm_max: 30_000.0,
            ..CoreConfig::default()
        }
    }

    #[test]
    fn knob_in_deadband_commands_zero() {
        let mut c = controller(&cfg());
        c.in_knob = Fix16::from_f32(0.05);
        c.in_speed = Fix16::from_f32(0.3);
        c.in_power = Fix16::from_f32(0.2);
        for _ in 0..1000 {
            c.tick();
        }
        assert_eq!(c.out_power, Fix16::ZERO);
        assert!(!c.power_limit_active());
    }

    #[test]
    fn knob_maps_onto_user_speed_window() {
        let mut c = controller(&cfg());
        // Track perfectly: speed equals the normalized knob target, so the
        // proportional term vanishes and the output settles on the target.
        c.in_knob = Fix16::ONE;
        c.in_power = Fix16::ZERO;
        for _ in 0..200_000 {
            c.in_speed = c.out_power;
            c.tick();
        }
        let (_, out_max) = c.output_bounds();
        assert!(
            (c.out_power - out_max).abs() < Fix16::from_f32(0.01),
            "out {} vs max {}",
            c.out_power,
            out_max
        );
    }

    #[test]
    fn integrators_stay_clamped() {
        let mut c = controller(&cfg());
        c.in_knob = Fix16::ONE;
        c.in_speed = Fix16::ZERO;
        c.in_power = Fix16::ZERO;
        let (lo, hi) = c.output_bounds();
        for _ in 0..500_000 {
            c.tick();
            assert!(c.speed_integral() >= lo && c.speed_integral() <= hi);
            assert!(
                c.power_integral() >= Fix16::ZERO && c.power_integral() <= Fix16::ONE
            );
        }
    }

    #[test]
    fn overpower_engages_limit_quickly() {
        let mut c = controller(&cfg());
        c.in_knob = Fix16::ONE;
        c.in_speed = Fix16::from_f32(0.5);
        c.in_power = Fix16::from_f32(1.2);
        let mut engaged_at = None;
        for i in 0..10 {
            c.tick();
            if c.power_limit_active() {
                engaged_at = Some(i);
                break;
            }
        }
        assert!(engaged_at.is_some(), "power limit never engaged");
    }

    #[test]
    fn limited_output_decreases_while_overpowered() {
        let mut c = controller(&cfg());
        c.in_knob = Fix16::ONE;
        c.in_speed = Fix16::from_f32(0.5);
        c.in_power = Fix16::from_f32(0.9);
        // Wind the power branch up first under a modest load.
        for _ in 0..200_000 {
            c.tick();
        }
        c.in_power = Fix16::from_f32(1.2);
        let mut prev = c.out_power;
        let mut decreased = false;
        for _ in 0..50_000 {
            c.tick();
            assert!(c.out_power <= prev);
            if c.out_power < prev {
                decreased = true;
            }
            prev = c.out_power;
        }
        assert!(decreased, "output never moved down under overload");
    }

    #[test]
    fn handover_back_to_speed_branch_is_bumpless() {
        let mut c = controller(&cfg());
        c.in_knob = Fix16::ONE;
        c.in_speed = Fix16::from_f32(0.9);
        // Hard overload drives the power branch to the floor.
        c.in_power = Fix16::from_f32(1.2);
        for _ in 0..1_000 {
            c.tick();
        }
        assert!(c.power_limit_active());
        // Load eases to just under the cap: the power branch recovers
        // integrator-driven, a couple of raw steps per tick, until the
        // speed branch takes the min-selector back. The released output
        // must continue where the limited one left off.
        c.in_power = Fix16::from_f32(0.98);
        let mut prev = c.out_power;
        let mut crossed = false;
        for _ in 0..2_000_000 {
            let was_limited = c.power_limit_active();
            c.tick();
            if was_limited && !c.power_limit_active() {
                let jump = (c.out_power - prev).abs();
                let tol = c.integrator_step() + Fix16::from_raw(16);
                assert!(jump <= tol, "handover jump {jump} exceeds {tol}");
                crossed = true;
                break;
            }
            prev = c.out_power;
        }
        assert!(crossed, "power limit never released");
    }
}
