//! EXG Monitor - headless acquisition front end
//!
//! Loads a session configuration, opens the configured transport, streams
//! into the ring buffer and periodically reports channel statistics and band
//! power. Optionally records the session to JSON.

mod monitor;

use anyhow::{bail, Context, Result};
use clap::Parser;
use exg_acquisition::{LoopExit, Recorder, Session, SessionConfig, SimulatorConfig, SourceConfig};
use exg_core::AcquisitionStatus;
use monitor::{log_report, Monitor};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for exg-monitor
#[derive(Parser, Debug)]
#[command(name = "exg-monitor")]
#[command(about = "Headless multi-channel ExG acquisition monitor")]
#[command(version)]
struct Args {
    /// Session configuration (TOML); defaults apply when omitted
    #[arg(short, long, env = "EXG_CONFIG")]
    config: Option<PathBuf>,

    /// Use the simulated device regardless of the configured source
    #[arg(long, conflicts_with = "host")]
    simulate: bool,

    /// Device host for a TCP source
    #[arg(long, requires = "port")]
    host: Option<String>,

    /// Device port for a TCP source
    #[arg(long, requires = "host")]
    port: Option<u16>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Record the session to this JSON file
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Seconds between reports
    #[arg(long, default_value_t = 1.0)]
    report_interval: f64,

    /// Print every report as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if args.simulate {
        if !matches!(config.source, SourceConfig::Simulated(_)) {
            config.source = SourceConfig::Simulated(SimulatorConfig::default());
        }
    } else if let (Some(host), Some(port)) = (&args.host, args.port) {
        let verify_crc = match &config.source {
            SourceConfig::Tcp { verify_crc, .. } => *verify_crc,
            SourceConfig::Simulated(_) => true,
        };
        config.source = SourceConfig::Tcp {
            host: host.clone(),
            port,
            verify_crc,
            connect_timeout_ms: 5000,
        };
    }

    config.validate().context("Invalid session configuration")?;
    Ok(config)
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {}: {}", what, value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = session_config(&args)?;
    let report_every = seconds(args.report_interval, "report interval")?;
    let run_for = args.duration.map(|d| seconds(d, "duration")).transpose()?;

    let mut session = Session::new(config.clone()).context("Failed to create session")?;
    let transport = tokio::task::spawn_blocking(move || config.open_transport())
        .await
        .context("Transport setup task failed")?
        .context("Failed to open transport")?;
    session.connect(transport).context("Failed to connect session")?;

    let mut monitor = Monitor::for_session(&session).context("Failed to set up display")?;
    let mut recorder = args.record.as_ref().map(|_| {
        Recorder::start(
            std::sync::Arc::clone(session.ring()),
            session.config().device.sampling_rate,
            session.config().device.channel_names.clone(),
        )
    });

    let mut events = session.subscribe();
    session.start().context("Failed to start acquisition")?;
    info!(session = %session.id(), "Streaming; press Ctrl+C to stop");

    let mut display = interval(Duration::from_millis(session.config().display.refresh_ms));
    display.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(report_every);
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = async {
        match run_for {
            Some(limit) => sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = display.tick() => {
                monitor.render();
                if let Some(recorder) = recorder.as_mut() {
                    recorder.poll();
                }
            }
            _ = report.tick() => {
                let report = monitor.report(session.status(), session.stats());
                log_report(&report);
                if args.json {
                    println!("{}", serde_json::to_string(&report).context("Failed to encode report")?);
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    info!(from = %event.from, to = %event.to, "Status changed");
                    if event.to == AcquisitionStatus::Stopped {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed status events"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }
    }

    tokio::task::block_in_place(|| session.stop()).context("Failed to stop session")?;
    let stats = session.stats();
    info!(
        frames = stats.frames_received,
        blocks = stats.blocks_written,
        dropped = stats.frames_dropped,
        rendered = monitor.frames_rendered(),
        "Session finished"
    );

    if let (Some(recorder), Some(path)) = (recorder, &args.record) {
        let recording = recorder.finish();
        recording
            .write_json(path)
            .with_context(|| format!("Failed to write recording to {}", path.display()))?;
    }

    if let Some(LoopExit::Failed(reason)) = session.last_exit() {
        bail!("Acquisition failed: {}", reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("exg-monitor").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_use_simulator() {
        let config = session_config(&parse(&[])).unwrap();
        assert!(matches!(config.source, SourceConfig::Simulated(_)));
        assert_eq!(config.device.channel_count(), 8);
    }

    #[test]
    fn test_host_and_port_select_tcp() {
        let config = session_config(&parse(&["--host", "10.0.0.2", "--port", "4000"])).unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Tcp {
                host: "10.0.0.2".into(),
                port: 4000,
                verify_crc: true,
                connect_timeout_ms: 5000
            }
        );
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Args::try_parse_from(["exg-monitor", "--simulate", "--host", "h", "--port", "1"]).is_err());
        assert!(Args::try_parse_from(["exg-monitor", "--host", "h"]).is_err());
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let error = session_config(&parse(&["--config", "/nonexistent/exg.toml"])).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/exg.toml"));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(seconds(-1.0, "duration").is_err());
        assert_eq!(seconds(0.5, "duration").unwrap(), Duration::from_millis(500));
    }
}
