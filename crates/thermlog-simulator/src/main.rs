//! Host simulator for the thermlog data logger.
//!
//! Runs the unmodified lifecycle controller from `thermlog-core` against a
//! simulated deployment: synthetic thermistors following a daily temperature
//! swing, a battery that drains over every sleep, a running RTC and a
//! sleep-retained memory block. Output lands in a directory, using the same
//! file names and formats as the SD card.
//!
//! ```text
//! thermlog-simulator --out run1 --boots 288 --fail-channel 3
//! RUST_LOG=debug thermlog-simulator --config field.toml
//! ```

mod fs_storage;
mod world;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::info;
use serde::Deserialize;

use thermlog_core::time::Timebase;
use thermlog_core::{Logger, LoggerConfig, PowerState, ResetCause, SleepRequest};

use fs_storage::FsStorage;
use world::{SimWorld, WorldConfig};

// ---------------------------------------------------------------------------
// Command line and configuration file
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "thermlog-simulator", version, about = "Simulate a thermlog deployment")]
struct Cli {
    /// TOML file with optional `[logger]` and `[world]` tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving THERMLOG.CSV and BASELINE.TXT
    #[arg(long, default_value = "thermlog-out")]
    out: PathBuf,

    /// Boots to run, the first one being the cold start
    #[arg(long, default_value_t = 24)]
    boots: u32,

    /// Seconds of deep sleep between cycles
    #[arg(long)]
    interval: Option<u32>,

    /// Simulate an open thermistor on this channel (repeatable)
    #[arg(long = "fail-channel")]
    fail_channels: Vec<u8>,

    /// Battery voltage at power-on
    #[arg(long)]
    battery_start: Option<f64>,

    /// Battery voltage lost over each sleep
    #[arg(long)]
    battery_drain: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimConfig {
    logger: LoggerConfig,
    world: WorldConfig,
}

impl SimConfig {
    fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => SimConfig::default(),
        };

        if let Some(interval) = cli.interval {
            config.logger.log_interval_secs = interval;
        }
        config.world.failed_channels.extend(&cli.fail_channels);
        if let Some(volts) = cli.battery_start {
            config.world.battery_start_volts = volts;
        }
        if let Some(volts) = cli.battery_drain {
            config.world.battery_drain_volts = volts;
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Simulation loop
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Summary {
    boots: u32,
    state: PowerState,
    halted: bool,
}

/// Boot repeatedly the way deep sleep re-enters the firmware entry point
fn simulate(config: &SimConfig, storage: &FsStorage, boots: u32) -> Result<Summary> {
    let world = SimWorld::new(config.world.clone(), &config.logger);
    let mut cause = ResetCause::Cold;
    let mut summary = Summary {
        boots: 0,
        state: PowerState::AwaitingStart,
        halted: false,
    };

    for _ in 0..boots {
        let mut board = world
            .board(&config.logger)
            .map_err(|e| anyhow!("invalid logger configuration: {e}"))?;
        let timebase = Timebase::new(
            config.logger.time_mode,
            world.clock(),
            storage,
            config.logger.log_interval_secs,
        );
        let mut logger = Logger::new(config.logger.clone(), timebase, storage, world.memory())
            .map_err(|e| anyhow!("{e}"))?;

        let request = logger.boot(&mut board, cause);
        summary.boots += 1;
        summary.state = logger.state();

        match request {
            SleepRequest::Timed { seconds } => {
                world.sleep(seconds);
                cause = ResetCause::Warm;
            }
            SleepRequest::Indefinite => {
                info!(
                    "Indefinite sleep after {} boots ({:?}, battery {:.2} V)",
                    summary.boots,
                    summary.state,
                    world.battery_volts()
                );
                summary.halted = true;
                break;
            }
        }
    }

    if let Some(now) = world.now() {
        info!(
            "Simulated clock at {}, indicator lit {} times",
            now,
            world.led_pulses()
        );
    }
    Ok(summary)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = SimConfig::load(&cli)?;
    let storage = FsStorage::new(&cli.out)
        .with_context(|| format!("creating output directory {}", cli.out.display()))?;

    info!(
        "Simulating {} boots, {} s interval, {:?} time, output in {}",
        cli.boots,
        config.logger.log_interval_secs,
        config.logger.time_mode,
        cli.out.display()
    );
    let summary = simulate(&config, &storage, cli.boots)?;
    info!(
        "Done: {} boots, final state {:?}{}",
        summary.boots,
        summary.state,
        if summary.halted { ", halted" } else { "" }
    );
    info!("Log written to {}", storage.log_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(storage: &FsStorage) -> Vec<String> {
        fs::read_to_string(storage.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn elapsed_deployment_writes_one_row_per_boot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        let config = SimConfig::default();

        let summary = simulate(&config, &storage, 13).unwrap();

        assert!(!summary.halted);
        assert_eq!(summary.state, PowerState::Measuring);
        let lines = rows(&storage);
        assert_eq!(lines[0], "elapsed,ch0_C,ch1_C,ch2_C,ch3_C,ch4_C,ch5_C,bat_%");
        assert_eq!(lines.len(), 14);
        assert!(lines[1].starts_with("000h:00m,"));
        assert!(lines[2].starts_with("000h:05m,"));
        assert!(lines[13].starts_with("001h:00m,"));
        assert!(storage.baseline_path().exists());
    }

    #[test]
    fn open_channel_logs_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        let mut config = SimConfig::default();
        config.world.failed_channels = vec![2];

        simulate(&config, &storage, 2).unwrap();

        for row in &rows(&storage)[1..] {
            let fields: Vec<&str> = row.split(',').collect();
            assert_eq!(fields.len(), 8);
            assert_eq!(fields[3], "ERR");
            assert_ne!(fields[2], "ERR");
        }
    }

    #[test]
    fn drained_battery_halts_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        let mut config = SimConfig::default();
        config.world.battery_start_volts = 3.2;
        config.world.battery_drain_volts = 0.05;

        let summary = simulate(&config, &storage, 10).unwrap();

        assert!(summary.halted);
        assert_eq!(summary.boots, 3);
        assert_eq!(summary.state, PowerState::LowBatteryShutdown);
        assert_eq!(rows(&storage).len(), 1 + 2);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            [logger]
            log_interval_secs = 60
            channel_count = 2
            calibration_offsets = [0.0, -0.25]
            time_mode = "cycle_counter"
            row_layout = "detailed"

            [world]
            start_after_polls = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.logger.log_interval_secs, 60);
        assert_eq!(config.logger.timing.settle_ms, 30);

        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        simulate(&config, &storage, 3).unwrap();

        let lines = rows(&storage);
        assert!(lines[0].starts_with("time_counter,ch0_raw,ch0_V,ch0_Ohm,ch0_C,"));
        assert!(lines[3].starts_with("000h:02m,"));
        assert!(!storage.baseline_path().exists());
    }
}
