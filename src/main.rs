//! Sati Agent CLI
//!
//! Privacy-first stress signal fusion and intervention engine.

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use sati_agent::{
    audit::create_shared_log_with_persistence,
    config::Config,
    core::{BaselineStore, ChannelId},
    pipeline::{ControlEvent, Pipeline},
    sink::LogSink,
    source::{parse_jsonl, sample_channel, spawn_jsonl_reader, DEFAULT_QUEUE_CAPACITY},
    PRIVACY_DECLARATION, VERSION,
};
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sati-agent")]
#[command(version = VERSION)]
#[command(about = "Privacy-first stress signal fusion and intervention engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fusion pipeline
    Run {
        /// Read JSONL samples from a file instead of stdin
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Replay the input on its own timeline and exit (deterministic)
        #[arg(long)]
        replay: bool,
    },

    /// Show current configuration and session statistics
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,

    /// Reset learned baselines (one channel, or all)
    Recalibrate {
        /// Channel to reset (keyboard, mouse, breathing, posture, intent, voice)
        #[arg(long)]
        channel: Option<String>,
    },

    /// Suppress interventions for a while
    Snooze {
        /// Snooze duration in minutes
        #[arg(long, default_value = "15")]
        minutes: u64,
    },

    /// Re-enable interventions after a snooze
    Resume,

    /// Acknowledge the current intervention
    Ack,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input, replay } => cmd_run(input, replay),
        Commands::Status => cmd_status(),
        Commands::Privacy => cmd_privacy(),
        Commands::Config => cmd_config(),
        Commands::Recalibrate { channel } => cmd_recalibrate(channel),
        Commands::Snooze { minutes } => cmd_snooze(minutes),
        Commands::Resume => cmd_resume(),
        Commands::Ack => cmd_ack(),
    }
}

fn load_config_or_exit() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_run(input: Option<PathBuf>, replay: bool) {
    println!("Sati Agent v{VERSION}");
    println!();

    let config = load_config_or_exit();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: could not create data directory: {e}");
    }

    let audit = create_shared_log_with_persistence(config.audit_path());
    let baselines_path = config.baselines_path();

    let mut pipeline = match Pipeline::new(config.clone(), Box::new(LogSink), Arc::clone(&audit)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = pipeline.baselines().load(&baselines_path) {
        eprintln!("Warning: could not load baselines: {e}");
    }

    let enabled: Vec<&str> = config
        .channels
        .iter()
        .filter(|(_, cc)| cc.enabled)
        .map(|(c, _)| c.as_str())
        .collect();
    println!("Instance ID: {}", audit.instance_id());
    println!("Enabled channels: {}", enabled.join(", "));
    println!("Tick interval: {}s", config.tick_interval_s);
    println!("Stress threshold: {}", config.stress_threshold);
    println!();

    if replay {
        let Some(path) = input else {
            eprintln!("Error: --replay requires --input");
            std::process::exit(1);
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading {path:?}: {e}");
                std::process::exit(1);
            }
        };
        let samples = parse_jsonl(&content);
        println!("Replaying {} samples from {:?}", samples.len(), path);

        let scores = pipeline.replay(samples);
        for score in &scores {
            println!(
                "[{}] stress: {:.1}",
                score.timestamp.format("%H:%M:%S"),
                score.value
            );
        }
        if let Err(e) = pipeline.shutdown() {
            eprintln!("Warning: could not persist state: {e}");
        }
        println!();
        println!("{}", audit.summary());
        return;
    }

    println!("Reading JSONL samples from {}", match &input {
        Some(path) => format!("{path:?}"),
        None => "stdin".to_string(),
    });
    println!("Press Ctrl+C to stop");
    println!();

    let (emitter, receiver) = sample_channel(DEFAULT_QUEUE_CAPACITY);
    let _reader = match input {
        Some(path) => {
            let file = match std::fs::File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Error opening {path:?}: {e}");
                    std::process::exit(1);
                }
            };
            spawn_jsonl_reader(BufReader::new(file), emitter)
        }
        None => spawn_jsonl_reader(BufReader::new(std::io::stdin()), emitter),
    };

    // Control events come in through the config file; the in-process channel
    // exists for an embedding UI and stays empty in headless operation.
    let (_control_sender, control_receiver) = crossbeam_channel::bounded::<ControlEvent>(16);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }

    if let Err(e) = pipeline.run(receiver, control_receiver, running) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    println!();
    println!("{}", audit.summary());
}

fn cmd_status() {
    let config = load_config_or_exit();

    println!("Sati Agent Status");
    println!("=================");
    println!();

    println!("Configuration:");
    for (channel, cc) in &config.channels {
        println!(
            "  {channel}: {} (weight {}, timeout {}s)",
            if cc.enabled { "enabled" } else { "disabled" },
            cc.weight,
            cc.timeout_s
        );
    }
    println!("  Stress threshold: {}", config.stress_threshold);
    println!("  Sustain ticks: {}", config.sustain_ticks);
    println!("  Cooldown: {}s", config.cooldown_duration_s);
    match config.snoozed_until {
        Some(until) if until > Utc::now() => println!("  Snoozed until: {until}"),
        _ => {}
    }
    println!();

    let audit_path = config.audit_path();
    if audit_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&audit_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(n) = stats.get("samples_received") {
                    println!("  Samples received: {n}");
                }
                if let Some(n) = stats.get("low_confidence_drops") {
                    println!("  Low-confidence drops: {n}");
                }
                if let Some(n) = stats.get("ticks_completed") {
                    println!("  Fusion ticks: {n}");
                }
                if let Some(n) = stats.get("interventions_triggered") {
                    println!("  Interventions triggered: {n}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }

    let baselines_path = config.baselines_path();
    if baselines_path.exists() {
        let store = BaselineStore::new(config.baseline_window);
        if store.load(&baselines_path).is_ok() {
            println!();
            println!("Baselines:");
            for baseline in store.snapshot() {
                if baseline.sample_count > 0 {
                    println!(
                        "  {}: mean {:.2}, variance {:.2}, {} samples",
                        baseline.channel, baseline.mean, baseline.variance, baseline.sample_count
                    );
                }
            }
        }
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config() {
    let config = load_config_or_exit();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_recalibrate(channel: Option<String>) {
    let config = load_config_or_exit();
    let store = BaselineStore::new(config.baseline_window);
    let path = config.baselines_path();
    if let Err(e) = store.load(&path) {
        eprintln!("Warning: could not load baselines: {e}");
    }

    match channel {
        Some(name) => match ChannelId::from_str(&name) {
            Ok(channel) => {
                store.reset(channel);
                println!("Baseline for {channel} reset.");
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => {
            store.reset_all();
            println!("All baselines reset.");
        }
    }

    if let Err(e) = store.save(&path) {
        eprintln!("Error saving baselines: {e}");
        std::process::exit(1);
    }
}

fn cmd_snooze(minutes: u64) {
    let mut config = load_config_or_exit();
    let until = Utc::now() + ChronoDuration::minutes(minutes as i64);
    config.snoozed_until = Some(until);
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Interventions snoozed until {until}. Use 'sati-agent resume' to end early.");
}

fn cmd_resume() {
    let mut config = load_config_or_exit();
    config.snoozed_until = None;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Interventions resumed.");
}

fn cmd_ack() {
    let mut config = load_config_or_exit();
    config.pending_ack = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    // The running agent consumes the flag; no-op if no intervention is live.
    println!("Acknowledgment sent to the running agent.");
}
