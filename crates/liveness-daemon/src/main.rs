//! Liveness daemon entry point.
//!
//! Runs a simulated capture pipeline with activity probes on its pads and
//! serves the `/ishealthy` endpoint an orchestrator polls.

mod pipeline;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use liveness_common::config::{parse_bool, parse_idle_seconds, DaemonConfig};
use liveness_common::time::format_clock_time;
use liveness_http::Supervisor;
use liveness_monitor::ObservationPoint;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

use crate::pipeline::{PipelineStats, SimulatedPipeline, UnitOutcome};
use crate::signals::SignalHandler;

/// Liveness daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "liveness-daemon",
    about = "Media pipeline with an HTTP liveness probe",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable the health check endpoint (yes/no, true/false, on/off, 1/0).
    #[arg(long, value_name = "BOOL", value_parser = parse_bool_arg)]
    health_check_enabled: Option<bool>,

    /// Seconds without data before the pipeline is reported idle.
    #[arg(long, value_name = "SECONDS", value_parser = parse_idle_seconds_arg)]
    health_check_idle_seconds: Option<Duration>,

    /// Observation point to probe, as `element` or `element:pad` (repeatable).
    #[arg(long, value_name = "POINT")]
    observe: Vec<String>,

    /// Maximum data units to produce (0 = infinite).
    #[arg(long, default_value = "0")]
    max_units: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn parse_bool_arg(value: &str) -> Result<bool, String> {
    parse_bool(value).ok_or_else(|| format!("{value:?} is not a boolean"))
}

fn parse_idle_seconds_arg(value: &str) -> Result<Duration, String> {
    parse_idle_seconds(value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting liveness daemon");

    let config = resolve_config(&args)?;

    info!(
        health_check = config.health_check.enabled,
        idle_threshold = ?config.health_check.idle_threshold,
        bind = %config.health_check.bind_addr(),
        binding = ?config.health_check.binding,
        timestamp_mode = %config.pipeline.timestamp_mode,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run_daemon(&config, &signal_handler, args.max_units)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = [
        "liveness_daemon",
        "liveness_http",
        "liveness_monitor",
        "liveness_common",
    ]
    .map(|target| format!("{target}={level}"))
    .join(",");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load the configuration file, then apply environment and command-line
/// overrides in that order, and validate the result.
fn resolve_config(args: &Args) -> Result<DaemonConfig> {
    let mut config = load_config(args)?;
    config
        .health_check
        .apply_env()
        .context("Invalid HEALTH_CHECK_* environment variable")?;
    apply_args(&mut config, args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_args(config: &mut DaemonConfig, args: &Args) {
    if let Some(enabled) = args.health_check_enabled {
        config.health_check.enabled = enabled;
    }
    if let Some(threshold) = args.health_check_idle_seconds {
        config.health_check.idle_threshold = threshold;
    }
    if !args.observe.is_empty() {
        config.pipeline.observe.clone_from(&args.observe);
    }
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `LIVENESS_CONFIG_PATH` environment variable
/// 3. `/etc/stream-liveness/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<DaemonConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return DaemonConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("LIVENESS_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from LIVENESS_CONFIG_PATH");
            return DaemonConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from LIVENESS_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "LIVENESS_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for path in ["/etc/stream-liveness/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(path);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return DaemonConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(DaemonConfig::default())
}

/// Wire probes into the pipeline, start the health check, and run until
/// shutdown.
fn run_daemon(
    config: &DaemonConfig,
    signal_handler: &SignalHandler,
    max_units: u64,
) -> Result<()> {
    let mut pipeline =
        SimulatedPipeline::new(&config.pipeline).context("Failed to build pipeline")?;

    let mut supervisor = Supervisor::new(config.health_check.clone());
    for spec in &config.pipeline.observe {
        let point: ObservationPoint = spec
            .parse()
            .with_context(|| format!("Invalid observation point {spec:?}"))?;
        supervisor
            .add_probe(pipeline.topology_mut(), point)
            .with_context(|| format!("Failed to add probe at {spec}"))?;
    }

    // The endpoint must be up before the first data unit flows
    supervisor
        .start()
        .context("Failed to start health check server")?;

    let started = Instant::now();
    let result = run_pipeline_loop(&mut pipeline, signal_handler, max_units);

    info!("Shutting down...");
    supervisor.stop();
    let stats = result.context("Pipeline stopped with an error")?;

    let uptime_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
    info!(
        emitted = stats.emitted,
        delivered = stats.delivered,
        dropped = stats.dropped,
        corrected = stats.corrected,
        signals = signal_handler.state().signal_count(),
        uptime = %format_clock_time(uptime_ns),
        "Daemon shutdown complete"
    );

    Ok(())
}

/// Produce one unit per interval until shutdown, the unit limit, or a
/// stream error.
fn run_pipeline_loop(
    pipeline: &mut SimulatedPipeline,
    signal_handler: &SignalHandler,
    max_units: u64,
) -> Result<PipelineStats> {
    let started = Instant::now();
    let mut stall_logged = false;

    while !signal_handler.shutdown_requested() {
        match pipeline.step(started.elapsed())? {
            UnitOutcome::Delivered(timestamp) => {
                trace!(%timestamp, "Data unit reached sink");
            }
            UnitOutcome::Dropped => {}
            UnitOutcome::Stalled => {
                if !stall_logged {
                    warn!("Source stalled, no further data units will be produced");
                    stall_logged = true;
                }
            }
        }

        let stats = pipeline.stats();
        if max_units > 0 && stats.emitted >= max_units {
            info!(units = stats.emitted, "Maximum unit count reached");
            break;
        }
        if !stall_logged && stats.emitted > 0 && stats.emitted % 1000 == 0 {
            info!(
                emitted = stats.emitted,
                delivered = stats.delivered,
                dropped = stats.dropped,
                "Periodic status"
            );
        }

        std::thread::sleep(pipeline.unit_interval());
    }

    Ok(pipeline.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveness_common::config::TrackerBinding;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["liveness-daemon", "-c", "test.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("test.toml")));
        assert!(args.health_check_enabled.is_none());
        assert!(args.observe.is_empty());
        assert_eq!(args.max_units, 0);
    }

    #[test]
    fn test_health_check_flags() {
        let args = Args::parse_from([
            "liveness-daemon",
            "--health-check-enabled",
            "Yes",
            "--health-check-idle-seconds",
            "2.5",
            "--observe",
            "timestampcvt:src",
            "--observe",
            "sink",
        ]);
        assert_eq!(args.health_check_enabled, Some(true));
        assert_eq!(args.health_check_idle_seconds, Some(Duration::from_millis(2500)));

        let mut config = DaemonConfig::default();
        apply_args(&mut config, &args);
        assert!(config.health_check.enabled);
        assert_eq!(config.health_check.idle_threshold, Duration::from_millis(2500));
        assert_eq!(config.pipeline.observe, vec!["timestampcvt:src", "sink"]);
        assert_eq!(config.health_check.binding, TrackerBinding::Shared);
    }

    #[test]
    fn test_bad_flag_values_are_rejected() {
        for (flag, value) in [
            ("--health-check-enabled", "maybe"),
            ("--health-check-idle-seconds", "0"),
            ("--health-check-idle-seconds", "1e10"),
        ] {
            assert!(
                Args::try_parse_from(["liveness-daemon", flag, value]).is_err(),
                "{flag} {value} should be rejected"
            );
        }
    }

    #[test]
    fn test_loop_stops_at_unit_limit() {
        let config = liveness_common::config::PipelineConfig {
            unit_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let mut pipeline = SimulatedPipeline::new(&config).unwrap();
        let stats = run_pipeline_loop(&mut pipeline, &SignalHandler::detached(), 5).unwrap();
        assert_eq!(stats.emitted, 5);
        assert_eq!(stats.delivered, 5);
    }

    #[test]
    fn test_loop_stops_on_shutdown() {
        let mut pipeline = SimulatedPipeline::new(&Default::default()).unwrap();
        let handler = SignalHandler::detached();
        handler.request_shutdown();
        let stats = run_pipeline_loop(&mut pipeline, &handler, 0).unwrap();
        assert_eq!(stats.emitted, 0);
    }

    #[test]
    fn test_unknown_observation_point_is_fatal() {
        let mut config = DaemonConfig::default();
        config.health_check.enabled = true;
        config.health_check.bind_host = "127.0.0.1".into();
        config.health_check.bind_port = 0;
        config.pipeline.observe = vec!["decoder:src".into()];

        let err = run_daemon(&config, &SignalHandler::detached(), 1).unwrap_err();
        assert!(format!("{err:#}").contains("unable to get element decoder"));
    }

    #[test]
    fn test_daemon_runs_to_unit_limit() {
        let mut config = DaemonConfig::default();
        config.health_check.enabled = true;
        config.health_check.bind_host = "127.0.0.1".into();
        config.health_check.bind_port = 0;
        config.pipeline.unit_interval = Duration::from_millis(1);

        assert!(run_daemon(&config, &SignalHandler::detached(), 3).is_ok());
    }
}
