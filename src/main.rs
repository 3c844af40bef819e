//! MJPEG-RTP streaming CLI application

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mjpeg_rtp_dualcam::config::{Config, ConfigError};
use mjpeg_rtp_dualcam::manager::DualCameraManager;
use mjpeg_rtp_dualcam::stats_reporter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-rtp")]
#[command(about = "RFC 2435 MJPEG-RTP streaming for dual-camera embedded Linux hosts")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Streaming mode. Only "mjpeg-rtp" is implemented by this binary.
    #[arg(long, default_value = "mjpeg-rtp")]
    mode: String,

    /// Log level, overrides `--verbose` and RUST_LOG's default when set.
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_RUNTIME_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if let Some(level) = &cli.log_level {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(cli: Cli) -> Result<u8> {
    info!("mjpeg-rtp streamer starting");

    if cli.mode != "mjpeg-rtp" {
        bail!(
            "mode \"{}\" is not implemented by this binary; only \"mjpeg-rtp\" is supported",
            cli.mode
        );
    }

    info!(config_path = %cli.config, "loading configuration");
    let config = Config::load(&cli.config).context("failed to load configuration")?;

    if !config.mjpeg_rtp.enabled {
        info!("mjpeg-rtp mode is disabled in configuration");
        return Ok(EXIT_OK);
    }

    let mjpeg = &config.mjpeg_rtp;
    let mut cameras = Vec::new();
    if mjpeg.camera1.enabled {
        cameras.push((
            "camera1".to_string(),
            DualCameraManager::streamer_config(&mjpeg.camera1, mjpeg.mtu, mjpeg.dscp),
        ));
    }
    if mjpeg.camera2.enabled {
        cameras.push((
            "camera2".to_string(),
            DualCameraManager::streamer_config(&mjpeg.camera2, mjpeg.mtu, mjpeg.dscp),
        ));
    }

    if cameras.is_empty() {
        info!("no cameras enabled, exiting");
        return Ok(EXIT_OK);
    }

    let manager = Arc::new(Mutex::new(DualCameraManager::new()));
    {
        let mut guard = manager.lock().await;
        if let Err(e) = guard.start_all(cameras).await {
            error!(error = %e, "no cameras could be started");
            return Err(ConfigError::Invalid(e.to_string()).into());
        }
    }

    info!("streaming started, press Ctrl+C to stop");

    let cancel = CancellationToken::new();
    let reporter = tokio::spawn(stats_reporter::run(
        Arc::clone(&manager),
        Duration::from_secs(mjpeg.stats_interval_seconds),
        cancel.clone(),
    ));

    let mut health_check = tokio::time::interval(Duration::from_secs(1));
    let exit_code = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break EXIT_OK;
            }
            _ = health_check.tick() => {
                if manager.lock().await.all_failed() {
                    error!("all cameras have failed, shutting down");
                    break EXIT_RUNTIME_FAILURE;
                }
            }
        }
    };

    cancel.cancel();
    manager.lock().await.stop_all().await;
    if let Err(e) = reporter.await {
        warn!(error = %e, "stats reporter task panicked");
    }

    info!("shut down cleanly");
    Ok(exit_code)
}
