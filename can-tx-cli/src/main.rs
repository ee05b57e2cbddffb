//! CAN Signal Transmitter CLI Application
//!
//! This is the command-line front end for the can-tx-scheduler library.
//! It stands in for an operator panel:
//! - Loads signal definitions from a TOML file
//! - Enables them on a scheduler thread and prints every frame sent
//! - Replays timed edits (values, cycle times, enable/disable)
//! - Sends a single raw frame in one-shot mode

use anyhow::{Context, Result};
use can_tx_scheduler::{FrameStatus, OutboundTransport, SchedulerHandle, Signal};
use clap::Parser;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

mod config;
mod console;

use config::ScriptStep;
use console::ConsoleTransport;

/// CAN Signal Transmitter - compose and send cyclic CAN frames
#[derive(Parser, Debug)]
#[command(name = "can-tx-cli")]
#[command(about = "Compose signals into CAN frames and transmit them cyclically", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml) with signal definitions
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Send a single frame with this hex CAN ID
    #[arg(long, value_name = "HEX")]
    id: Option<String>,

    /// Data bytes for the single frame, hex (e.g. "11 22 33");
    /// fewer than 8 bytes are zero-padded, frames always carry 8 bytes
    #[arg(long, value_name = "HEX", default_value = "")]
    data: String,

    /// Require a 29-bit identifier limit for --id
    #[arg(long, conflicts_with = "standard")]
    extended: bool,

    /// Require an 11-bit identifier for --id
    #[arg(long)]
    standard: bool,

    /// Channel name shown in the output (overrides the config file)
    #[arg(long, value_name = "NAME")]
    channel: Option<String>,

    /// How long to transmit, in milliseconds (overrides the config file)
    #[arg(short, long, value_name = "MS")]
    duration_ms: Option<u64>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Signal Transmitter CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using scheduler library v{}", can_tx_scheduler::VERSION);

    if let Some(id) = &args.id {
        one_shot_mode(id, &args)?;
    } else if let Some(config_path) = &args.config {
        cyclic_mode(config_path, &args)?;
    } else {
        println!("CAN Signal Transmitter - No input specified");
        println!("\nQuick Start:");
        println!("  can-tx-cli --id 0x08 --data \"11 22 33 44 55 66 77 88\"");
        println!("\nCyclic transmission:");
        println!("  can-tx-cli --config signals.toml --duration-ms 2000");
        println!("\nUse --help for more options");
    }

    Ok(())
}

/// One-shot mode - send a single raw frame
fn one_shot_mode(id: &str, args: &Args) -> Result<()> {
    let extended = match (args.extended, args.standard) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let (frame_id, payload) = config::parse_frame(id, &args.data, extended)?;
    let is_extended = can_tx_scheduler::is_extended_id(frame_id);

    let channel = args.channel.clone().unwrap_or_else(|| "can0".to_string());
    let mut transport = ConsoleTransport::new(channel.clone(), io::stdout());

    match transport.send(frame_id, is_extended, payload) {
        Ok(()) => log::info!("Message sent on {}", channel),
        Err(e) => {
            log::error!("Failed to send message: {}", e);
            return Err(e.into());
        }
    }
    transport.close()?;

    Ok(())
}

/// Cyclic mode - enable every configured signal and transmit for a while
fn cyclic_mode(config_path: &Path, args: &Args) -> Result<()> {
    log::info!("Loading configuration from: {:?}", config_path);
    let config = config::load_config(config_path)?;

    let channel = args.channel.clone().unwrap_or_else(|| config.bus.channel.clone());
    let duration = Duration::from_millis(args.duration_ms.unwrap_or(config.run.duration_ms));

    println!("═══════════════════════════════════════════════");
    println!("  CAN Signal Transmitter");
    println!("═══════════════════════════════════════════════");
    println!(
        "  Bus: {} / {} @ {} bit/s",
        config.bus.interface, channel, config.bus.bitrate
    );
    println!("  Signals: {}   Duration: {} ms\n", config.signals.len(), duration.as_millis());

    let transport = ConsoleTransport::new(channel, io::stdout());
    let scheduler = SchedulerHandle::spawn(transport).context("Failed to start scheduler thread")?;

    // Keep our own copy of each signal; clones share the live value
    let mut signals: HashMap<String, Signal> = HashMap::new();
    for signal_config in &config.signals {
        let signal = signal_config
            .to_signal()
            .with_context(|| format!("Invalid signal '{}'", signal_config.name))?;

        if let Err(e) = scheduler.enable(signal.clone()) {
            log::error!("Cannot enable signal '{}': {}", signal.name(), e);
        }
        signals.insert(signal.name().to_string(), signal);
    }

    let start = Instant::now();
    let mut steps = config.script.clone();
    steps.sort_by_key(|step| step.at_ms);

    for step in &steps {
        let at = Duration::from_millis(step.at_ms);
        if at >= duration {
            break;
        }
        sleep_until(start + at);
        apply_step(&scheduler, &mut signals, step);
    }

    sleep_until(start + duration);
    let statuses = scheduler.statuses()?;
    scheduler.shutdown();

    print_summary(&statuses);
    Ok(())
}

/// Apply one timed edit; failures are reported and the run continues
fn apply_step(scheduler: &SchedulerHandle, signals: &mut HashMap<String, Signal>, step: &ScriptStep) {
    let Some(signal) = signals.get(&step.signal) else {
        log::error!("Unknown signal '{}' in script", step.signal);
        return;
    };
    let frame_id = signal.frame_id();

    if step.enabled == Some(false) {
        match scheduler.disable(frame_id, &step.signal) {
            // The returned copy carries any cycle time changed while enabled
            Ok(disabled) => {
                signals.insert(step.signal.clone(), disabled);
            }
            Err(e) => log::error!("Cannot disable '{}': {}", step.signal, e),
        }
    }

    if let Some(value) = &step.value {
        if let Some(signal) = signals.get(&step.signal) {
            log::info!("{} = {}", step.signal, value);
            signal.value_handle().set(value.clone());
        }
    }

    if let Some(cycle_time_ms) = step.cycle_time_ms {
        if let Err(e) = scheduler.update_cycle_time(frame_id, cycle_time_ms) {
            log::error!("Cannot change cycle time of frame 0x{:X}: {}", frame_id, e);
        }
    }

    if step.enabled == Some(true) {
        if let Some(signal) = signals.get(&step.signal) {
            if let Err(e) = scheduler.enable(signal.clone()) {
                log::error!("Cannot enable '{}': {}", step.signal, e);
            }
        }
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

fn print_summary(statuses: &[FrameStatus]) {
    println!("\n📊 Frames still active at shutdown:");
    if statuses.is_empty() {
        println!("  (none)");
    }
    for status in statuses {
        println!("  {}", summary_line(status));
    }
}

fn summary_line(status: &FrameStatus) -> String {
    format!(
        "0x{:X}  {} ms  sent {}  failed {}  skipped {}  dropped {}  signals: {}",
        status.frame_id,
        status.cycle_time_ms,
        status.frames_sent,
        status.send_failures,
        status.skipped_ticks,
        status.dropped_ticks,
        status.signals.join(", ")
    )
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
