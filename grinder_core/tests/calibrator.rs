//! Speed-scale calibration against the simulated plant.

use grinder_core::sim::{step, MemParamStore, NullGatePin, SimMotor, SimPlant};
use grinder_core::{Core, CoreConfig, Mode, F_TICK};
use grinder_traits::{ParamKey, ParamStore};

fn calib_profile() -> CoreConfig {
    CoreConfig {
        power_max: 3000.0,
        motor_resistance: 10.0,
        // Keeps the winding time constant a couple of ticks even at the
        // full-speed equivalent resistance.
        motor_inductance: 0.05,
        rpm_max: 30_000.0,
        rpm_max_limit: 30_000.0,
        rpm_min_limit: 3_000.0,
        shunt_resistance_mohm: 10.0,
        pid_p: 1.0,
        pid_i: 0.2,
        dead_zone_width: 0.05,
        rekv_to_speed_factor: 1.0,
    }
}

#[test]
fn calibration_records_the_full_speed_equivalent_resistance() {
    let profile = calib_profile();
    let store = MemParamStore::from_profile(&profile);
    let mut core = Core::new(NullGatePin, store);
    let mut plant = SimPlant::new(
        &profile,
        SimMotor {
            rekv_at_full: 500.0,
            tau_s: 0.2,
        },
    );

    core.start_calibration();
    assert_eq!(core.mode(), Mode::Calibrate);

    // Spin-up is three seconds, each measurement window 0.2 s, spin-down
    // one second; eight simulated seconds is plenty.
    let budget = 8 * F_TICK;
    let mut spent = 0;
    while core.mode() == Mode::Calibrate && spent < budget {
        step(&mut core, &mut plant);
        spent += 1;
    }
    assert_eq!(core.mode(), Mode::Run, "calibration never completed");

    let factor = core
        .store()
        .read_f32(ParamKey::RekvToSpeedFactor)
        .expect("factor persisted");
    // The steady-state equivalent resistance at full duty is 500 Ohm.
    assert!(
        (factor - 500.0).abs() <= 15.0,
        "persisted factor {factor}, expected 500 +- 3%"
    );

    // The running sensors use the new scale immediately: at full speed
    // they must now read about 1.0.
    plant.set_knob(1.0);
    for _ in 0..(2 * F_TICK) {
        step(&mut core, &mut plant);
    }
    let speed = core.sensors().speed().to_f32();
    assert!(
        (0.9..=1.1).contains(&speed),
        "post-calibration speed {speed}"
    );
}
