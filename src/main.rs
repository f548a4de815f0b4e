//! Binary entry: load `config.json` from the working directory, run one
//! simulation, print the report. Exit code 0 on success, 1 when the
//! configuration is invalid or the run fails.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bobasim::{ConfigSource, Engine, SimulationConfig};

const CONFIG_PATH: &str = "config.json";

/// `HH:MM:SS` wall-clock prefix (UTC) for every log line.
struct ClockTime;

impl fmt::time::FormatTime for ClockTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        write!(
            w,
            "{:02}:{:02}:{:02} -",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60
        )
    }
}

fn init_logging(cfg: &SimulationConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_file = File::create(&cfg.log_file)
        .with_context(|| format!("cannot create log file '{}'", cfg.log_file))?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .with_timer(ClockTime);
    let stdout_layer = cfg.log_to_stdout.then(|| {
        fmt::layer()
            .with_target(false)
            .with_timer(ClockTime)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, source) = SimulationConfig::load_or_default(Path::new(CONFIG_PATH));
    cfg.validate().context("configuration rejected")?;
    init_logging(&cfg)?;

    match source {
        ConfigSource::File => info!(path = CONFIG_PATH, "configuration loaded"),
        ConfigSource::WroteDefaults => {
            warn!(path = CONFIG_PATH, "no configuration found, wrote defaults")
        }
        ConfigSource::FallbackToDefaults(reason) => {
            warn!(path = CONFIG_PATH, %reason, "configuration unusable, using defaults")
        }
    }

    let report = Engine::new(cfg).run().await;
    println!("{report}");
    Ok(())
}
