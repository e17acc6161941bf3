use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use sfxpool::backend::{SimClock, SimulatedBackendFactory};
use sfxpool::clip;
use sfxpool::{CueBank, CueParameters, ManagerConfig, PlaybackManager, RodioBackendFactory, TickDriver};

#[derive(Parser)]
#[command(name = "sfxpool")]
#[command(about = "Pooled playback of short, high-frequency sound cues")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with manager settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the cap on simultaneously active voices
    #[arg(long, global = true)]
    max_active: Option<usize>,

    /// Override the cap on pooled voices
    #[arg(long, global = true)]
    max_pool: Option<usize>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play cues from a bank and wait until they finish
    Play {
        /// Cue bank JSON file
        #[arg(short, long)]
        bank: PathBuf,
        /// Cue names, played in order
        #[arg(required = true)]
        cues: Vec<String>,
        /// Randomize pitch slightly on every cue
        #[arg(long)]
        jitter: bool,
        /// Host tick rate in Hz
        #[arg(long, default_value_t = 60)]
        rate: u32,
    },
    /// Probe an audio file
    Inspect {
        /// Path to the audio file
        file: PathBuf,
    },
    /// Check that every clip in a bank can be read
    Check {
        /// Cue bank JSON file
        bank: PathBuf,
    },
    /// Push a burst of requests through the simulated backend
    Simulate {
        /// Total requests to submit
        #[arg(long, default_value_t = 200)]
        requests: usize,
        /// Requests submitted per tick
        #[arg(long, default_value_t = 3)]
        per_tick: usize,
        /// Base clip length in ticks
        #[arg(long, default_value_t = 45)]
        length: u64,
        /// Share of requests flagged frequent (0.0 to 1.0)
        #[arg(long, default_value_t = 0.25, value_parser = parse_ratio)]
        frequent_ratio: f64,
    },
    /// Trigger cues by name from stdin
    Interactive {
        /// Cue bank JSON file
        #[arg(short, long)]
        bank: PathBuf,
        /// Host tick rate in Hz
        #[arg(long, default_value_t = 60)]
        rate: u32,
    },
}

fn parse_ratio(s: &str) -> std::result::Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("{} is not between 0.0 and 1.0", s))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sfxpool=debug" } else { "sfxpool=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ManagerConfig> {
    let mut config = match &cli.config {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ManagerConfig::default(),
    };

    if let Some(max) = cli.max_active {
        config = config.with_max_active_voices(max);
    }
    if let Some(max) = cli.max_pool {
        config = config.with_max_pool_size(max);
    }

    config.validate().context("Invalid manager settings")?;
    Ok(config)
}

fn load_bank(path: &Path) -> Result<CueBank> {
    CueBank::load(path).with_context(|| format!("Failed to load cue bank {}", path.display()))
}

fn lookup<'a>(bank: &'a CueBank, name: &str) -> Result<&'a CueParameters> {
    bank.get(name).ok_or_else(|| {
        let known: Vec<&str> = bank.names().collect();
        anyhow!("Unknown cue '{}' (known: {})", name, known.join(", "))
    })
}

fn print_status(manager: &PlaybackManager) {
    let stats = manager.stats();
    let pool = manager.pool_stats();
    println!("=== Voice Status ===");
    println!("Active: {}/{}", manager.active_count(), manager.config().max_active_voices);
    println!(
        "Pool: {} created, {} free, {} checked out (max {})",
        pool.created, pool.free, pool.checked_out, pool.max_size
    );
    println!(
        "Admitted: {}  Rejected: {}  Evicted: {}  Completed: {}",
        stats.admitted.to_string().green(),
        stats.rejected.to_string().red(),
        stats.evicted.to_string().yellow(),
        stats.completed
    );
    println!("====================");
}

async fn handle_play(
    config: ManagerConfig,
    bank: PathBuf,
    cues: Vec<String>,
    jitter: bool,
    rate: u32,
) -> Result<()> {
    let bank = load_bank(&bank)?;
    let factory = RodioBackendFactory::open_default().context("No audio output available")?;

    for name in &cues {
        let cue = lookup(&bank, name)?;
        if let Some(path) = &cue.clip {
            factory
                .preload(path)
                .with_context(|| format!("Failed to decode clip for '{}'", name))?;
        }
    }

    let mut manager = PlaybackManager::new(config, Box::new(factory))?;

    for name in &cues {
        let cue = lookup(&bank, name)?.clone();
        let mut builder = manager.begin_request().with_cue(cue);
        if jitter {
            builder = builder.with_pitch_jitter();
        }
        if builder.submit()? {
            println!("🔊 {}", name.green());
        } else {
            println!("🔇 {} (no voice available)", name.red());
        }
    }

    let driver = TickDriver::from_rate(rate);
    tokio::select! {
        result = driver.tick_until_idle(&mut manager, |m, finished| {
            if finished > 0 {
                println!("{} finished, {} still playing", finished, m.active_count());
            }
        }) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted");
        }
    }

    print_status(&manager);
    manager.shutdown();
    Ok(())
}

fn handle_inspect(file: PathBuf) -> Result<()> {
    let info = clip::probe_clip(&file).with_context(|| format!("Failed to probe {}", file.display()))?;
    println!("{}", info);
    Ok(())
}

fn handle_check(bank: PathBuf) -> Result<()> {
    let cues = load_bank(&bank)?;
    let broken = cues.validate_clips();

    for name in cues.names() {
        if broken.iter().any(|b| b == name) {
            println!("  {} {}", "✗".red(), name);
        } else {
            println!("  {} {}", "✓".green(), name);
        }
    }

    if broken.is_empty() {
        println!("All {} cues playable", cues.len());
        Ok(())
    } else {
        Err(anyhow!("{} of {} cues have unreadable clips", broken.len(), cues.len()))
    }
}

fn handle_simulate(
    config: ManagerConfig,
    requests: usize,
    per_tick: usize,
    length: u64,
    frequent_ratio: f64,
) -> Result<()> {
    const CLIPS: usize = 8;

    let clock = SimClock::new();
    let mut factory = SimulatedBackendFactory::new(clock.clone(), length);
    for i in 0..CLIPS {
        factory = factory.with_clip_length(format!("sim{}.wav", i), length / 2 + (i as u64) * length / 4);
    }
    let counters = factory.counters();

    let cap = config.max_active_voices;
    let mut manager = PlaybackManager::new(config, Box::new(factory))?;
    let mut rng = rand::thread_rng();

    let mut submitted = 0;
    let mut peak = 0;
    let mut ticks = 0u64;
    while submitted < requests || manager.active_count() > 0 {
        for _ in 0..per_tick.max(1) {
            if submitted >= requests {
                break;
            }
            let cue = CueParameters::for_clip(format!("sim{}.wav", rng.gen_range(0..CLIPS)))
                .frequent(rng.gen_bool(frequent_ratio))
                .with_priority(rng.gen_range(0..=256));
            manager.begin_request().with_cue(cue).with_pitch_jitter().submit()?;
            submitted += 1;
            peak = peak.max(manager.active_count());
        }

        clock.advance();
        manager.tick()?;
        ticks += 1;
    }

    let live_frequent = manager
        .frequent_entries()
        .filter(|entry| manager.is_live(entry))
        .count();

    println!("Simulated {} requests over {} ticks", submitted, ticks);
    println!("Peak active voices: {} (cap {})", peak, cap);
    println!(
        "Backends created: {}  starts: {}  stops: {}",
        counters.created.get(),
        counters.starts.get(),
        counters.stops.get()
    );
    println!(
        "Frequent queue: {} entries, {} live",
        manager.frequent_entries().count(),
        live_frequent
    );
    print_status(&manager);
    manager.shutdown();
    Ok(())
}

/// One host frame: reclaim finished voices, then forget frequent entries
/// whose sound has ended so the queue stays bounded.
fn host_tick(manager: &mut PlaybackManager) -> Result<usize> {
    let finished = manager.tick()?;
    manager.prune_frequent();
    Ok(finished)
}

async fn handle_interactive(config: ManagerConfig, bank: PathBuf, rate: u32) -> Result<()> {
    let bank = load_bank(&bank)?;
    let factory = RodioBackendFactory::open_default().context("No audio output available")?;
    let mut manager = PlaybackManager::new(config, Box::new(factory))?;

    println!("🎵 sfxpool Interactive Mode");
    println!("Type a cue name to play it. Other commands: list, status, stop, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticks = TickDriver::from_rate(rate).interval();

    print!("sfxpool> ");
    std::io::stdout().flush()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "quit" | "exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "list" => {
                        for name in bank.names() {
                            println!("  {}", name);
                        }
                    }
                    "status" => print_status(&manager),
                    "stop" => {
                        let stopped = manager.stop_all()?;
                        println!("Stopped {} voices", stopped);
                    }
                    name => match bank.get(name) {
                        Some(cue) => {
                            let played = manager.begin_request().with_cue(cue.clone()).submit();
                            match played {
                                Ok(true) => println!("🔊 {}", name.green()),
                                Ok(false) => println!("🔇 {} (no voice available)", name.red()),
                                Err(e) => eprintln!("Error: {}", e),
                            }
                        }
                        None => eprintln!("Unknown cue: {}", name),
                    },
                }
                print!("sfxpool> ");
                std::io::stdout().flush()?;
            }
            _ = ticks.tick() => {
                host_tick(&mut manager)?;
            }
        }
    }

    manager.shutdown();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Play { bank, cues, jitter, rate } => handle_play(config, bank, cues, jitter, rate).await,
        Commands::Inspect { file } => handle_inspect(file),
        Commands::Check { bank } => handle_check(bank),
        Commands::Simulate {
            requests,
            per_tick,
            length,
            frequent_ratio,
        } => handle_simulate(config, requests, per_tick, length, frequent_ratio),
        Commands::Interactive { bank, rate } => handle_interactive(config, bank, rate).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequent_ratio_must_be_a_share() {
        assert_eq!(parse_ratio("0.5"), Ok(0.5));
        assert_eq!(parse_ratio("1"), Ok(1.0));
        assert!(parse_ratio("NaN").is_err());
        assert!(parse_ratio("1.5").is_err());
        assert!(parse_ratio("-0.1").is_err());
        assert!(parse_ratio("lots").is_err());

        assert!(Cli::try_parse_from(["sfxpool", "simulate", "--frequent-ratio", "NaN"]).is_err());
        assert!(Cli::try_parse_from(["sfxpool", "simulate", "--frequent-ratio", "0.1"]).is_ok());
    }

    #[test]
    fn test_host_tick_keeps_frequent_queue_bounded() -> Result<()> {
        let clock = SimClock::new();
        let factory = SimulatedBackendFactory::new(clock.clone(), 1);
        let mut manager = PlaybackManager::new(ManagerConfig::default(), Box::new(factory))?;

        for _ in 0..50 {
            manager
                .begin_request()
                .with_cue(CueParameters::for_clip("step.wav").frequent(true))
                .submit()?;
            clock.advance();
            host_tick(&mut manager)?;
            assert!(manager.frequent_entries().count() <= 1);
        }

        assert_eq!(manager.frequent_entries().count(), 0);
        assert_eq!(manager.stats().completed, 50);
        Ok(())
    }
}
