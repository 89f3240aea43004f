mod cli;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grinder_config::FileParamStore;
use grinder_core::sim::{step, MemParamStore, NullGatePin, SimMotor, SimPlant};
use grinder_core::{Core, CoreConfig, Mode, F_TICK};
use grinder_traits::{ParamKey, ParamStore};

use crate::cli::{Cli, Commands};

fn init_tracing(json: bool, level: &str) {
    // Prefer RUST_LOG when set; otherwise the CLI level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(false)).init();
    } else {
        registry
            .with(fmt::layer().pretty().with_target(false))
            .init();
    }
}

/// Operator-facing rendering of the common failure modes.
fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<grinder_config::ConfigError>() {
        return match ce {
            grinder_config::ConfigError::Invalid(msg) => format!(
                "What happened: The device profile is invalid ({msg}).\nHow to fix: Edit the profile TOML and rerun."
            ),
            grinder_config::ConfigError::Parse(_) => "What happened: The profile TOML did not parse.\nHow to fix: Check the file against the sample in the README.".to_string(),
            grinder_config::ConfigError::Io(_) => "What happened: The profile or parameter file could not be read or written.\nHow to fix: Check the path and permissions.".to_string(),
        };
    }
    format!("Something went wrong: {err}")
}

/// Load the profile into a config, or take compiled defaults when the
/// profile file is absent.
fn load_config<P: ParamStore>(profile_path: &Path, store: &mut P) -> eyre::Result<CoreConfig> {
    if profile_path.exists() {
        let profile = grinder_config::load_file(profile_path)
            .wrap_err("loading device profile")?;
        profile.validate().wrap_err("validating device profile")?;
        profile
            .seed_store(store)
            .map_err(|e| eyre::eyre!("{e}"))
            .wrap_err("seeding parameter store")?;
        if let Some(level) = &profile.logging.level {
            tracing::debug!(%level, "profile requests log level");
        }
    } else {
        tracing::info!(path = %profile_path.display(), "no profile file, using compiled defaults");
    }
    let cfg = CoreConfig::load(store);
    cfg.validate().wrap_err("validating effective config")?;
    Ok(cfg)
}

fn telemetry_line<P: ParamStore>(t_ms: u64, core: &Core<NullGatePin, P>) -> serde_json::Value {
    let s = core.sensors();
    serde_json::json!({
        "t_ms": t_ms,
        "knob": s.knob().to_f32(),
        "speed": s.speed().to_f32(),
        "speed_rpm": s.speed_rpm(),
        "power_w": s.power_watts(),
        "out_power": core.out_power().to_f32(),
        "power_limit": core.controller().power_limit_active(),
        "period_ticks": s.period_in_ticks(),
    })
}

fn cmd_simulate(
    profile: &Path,
    seconds: f64,
    knob_percent: f64,
    report_ms: u64,
    motor: SimMotor,
) -> eyre::Result<()> {
    let mut store = MemParamStore::new();
    let cfg = load_config(profile, &mut store)?;
    let mut core = Core::new(NullGatePin, store);
    let mut plant = SimPlant::new(&cfg, motor);
    plant.set_knob(knob_percent / 100.0);

    let total = (seconds * f64::from(F_TICK)).max(1.0) as u64;
    let report_every = report_ms.saturating_mul(u64::from(F_TICK)) / 1000;
    for t in 0..total {
        step(&mut core, &mut plant);
        if report_every > 0 && t % report_every == report_every - 1 {
            let t_ms = t * 1000 / u64::from(F_TICK);
            println!("{}", telemetry_line(t_ms, &core));
        }
    }
    let t_ms = total * 1000 / u64::from(F_TICK);
    println!("{}", telemetry_line(t_ms, &core));
    Ok(())
}

fn cmd_calibrate(profile: &Path, params: &Path, motor: SimMotor) -> eyre::Result<()> {
    let mut store = FileParamStore::open(params).wrap_err("opening parameter store")?;
    let cfg = load_config(profile, &mut store)?;
    let mut core = Core::new(NullGatePin, store);
    let mut plant = SimPlant::new(&cfg, motor);

    core.start_calibration();
    let budget = 15 * u64::from(F_TICK);
    let mut spent = 0u64;
    while core.mode() == Mode::Calibrate && spent < budget {
        step(&mut core, &mut plant);
        spent += 1;
    }
    if core.mode() == Mode::Calibrate {
        eyre::bail!("calibration did not converge within {budget} ticks");
    }
    let factor = core
        .store()
        .read_f32(ParamKey::RekvToSpeedFactor)
        .ok_or_else(|| eyre::eyre!("calibration finished but no factor was stored"))?;
    println!(
        "{}",
        serde_json::json!({
            "calibrated": true,
            "rekv_to_speed_factor": factor,
            "params_file": params.display().to_string(),
        })
    );
    Ok(())
}

fn cmd_self_check(profile: &Path) -> eyre::Result<()> {
    let mut store = MemParamStore::new();
    let cfg = load_config(profile, &mut store)?;
    let mut core = Core::new(NullGatePin, store);
    let mut plant = SimPlant::new(&cfg, SimMotor::default());
    plant.set_knob(0.5);
    for _ in 0..u64::from(F_TICK) / 2 {
        step(&mut core, &mut plant);
    }
    let period = core.sensors().period_in_ticks();
    if !(170..=190).contains(&period) {
        eyre::bail!("mains tracking failed: period {period} ticks");
    }
    println!("self-check OK (half-period {period} ticks)");
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json, &cli.log_level);

    let result = match cli.cmd {
        Commands::Simulate {
            seconds,
            knob,
            report_ms,
            rekv,
            tau,
        } => cmd_simulate(
            &cli.profile,
            seconds,
            knob,
            report_ms,
            SimMotor {
                rekv_at_full: rekv,
                tau_s: tau,
            },
        ),
        Commands::Calibrate { params, rekv, tau } => cmd_calibrate(
            &cli.profile,
            &params,
            SimMotor {
                rekv_at_full: rekv,
                tau_s: tau,
            },
        ),
        Commands::SelfCheck => cmd_self_check(&cli.profile),
    };

    if let Err(err) = result {
        tracing::error!(error = ?err, "command failed");
        eprintln!("{}", humanize(&err));
        std::process::exit(1);
    }
}
