use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use golem_core::{ActionBus, GolemConfig, InProcessBus};
use golem_memory::MemoryStore;
use golem_reasoning::{CommandDecisionService, DecisionService, IdleScheduler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod sim;

use sim::{spawn_responder, ResponderConfig, SimWorld};

const CONFIG_FILE: &str = "golem.toml";

#[derive(Parser, Debug)]
#[command(name = "golem", author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config (defaults to ./golem.toml, then the user config dir)
    #[arg(short, long, global = true, env = "GOLEM_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the idle loop against a simulated café
    Run(RunArgs),
    /// Print what a character remembers
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct MemoryArgs {
    /// Character name (selects the memory file)
    #[arg(long)]
    character: Option<String>,

    /// Directory holding <character>_memory.json
    #[arg(long)]
    memory_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    memory: MemoryArgs,

    /// Decision command; the prompt is piped to its stdin, JSON is read from stdout
    #[arg(long, env = "GOLEM_DECIDER")]
    decider: Option<String>,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    seconds: Option<u64>,

    /// Probability that a simulated action fails
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f32,

    /// Seed both the scheduler and the simulated world
    #[arg(long)]
    seed: Option<u64>,

    /// Keep memory in RAM only
    #[arg(long)]
    no_persist: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    memory: MemoryArgs,

    /// How many episodes to list, by importance
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Print the listed episodes as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_json, cli.log_dir.as_deref());

    let mut config = match resolve_config_path(cli.config.as_deref()) {
        Some(path) => GolemConfig::load_or_default(path),
        None => GolemConfig::load_or_default(CONFIG_FILE),
    };
    for warning in config.validate() {
        warn!("Config: {}", warning);
    }

    match cli.command {
        Command::Run(args) => {
            apply_memory_args(&mut config, &args.memory);
            if args.no_persist {
                config.persistence.enabled = false;
            }
            run(config, args).await
        }
        Command::Inspect(args) => {
            apply_memory_args(&mut config, &args.memory);
            inspect(&config, &args)
        }
    }
}

/// Install the subscriber. The returned guard must live until exit so the
/// file writer flushes.
fn init_logging(
    json: bool,
    log_dir: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (plain, json_layer) = if json {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "golem.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json_layer)
        .with(file_layer)
        .init();
    guard
}

/// Explicit path wins; otherwise ./golem.toml, then `<config_dir>/golem/golem.toml`.
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("golem").join(CONFIG_FILE))
        .filter(|p| p.exists())
}

fn apply_memory_args(config: &mut GolemConfig, args: &MemoryArgs) {
    if let Some(name) = &args.character {
        config.decision.character_name = name.clone();
    }
    if let Some(dir) = &args.memory_dir {
        config.persistence.memory_dir = dir.clone();
    }
}

// ============================================================================
// run
// ============================================================================

async fn run(config: GolemConfig, args: RunArgs) -> Result<()> {
    let name = config.decision.character_name.clone();
    info!("Initializing {}...", name);

    let memory = MemoryStore::open(config.memory.clone(), config.persistence.clone(), &name)
        .into_shared();

    let world = Arc::new(SimWorld::cafe());
    let bus = Arc::new(InProcessBus::default());
    let responder = spawn_responder(
        world.clone(),
        bus.clone(),
        ResponderConfig {
            failure_rate: args.failure_rate.clamp(0.0, 1.0),
            seed: args.seed,
            ..ResponderConfig::default()
        },
    );

    let decider: Option<Arc<dyn DecisionService>> = match args.decider.as_deref() {
        Some(line) => match CommandDecisionService::from_command_line(line) {
            Some(svc) => {
                info!("Using decision command '{}'", svc.name());
                Some(Arc::new(svc) as Arc<dyn DecisionService>)
            }
            None => {
                warn!("Empty --decider, using fallback behaviour only");
                None
            }
        },
        None => None,
    };

    let mut scheduler = IdleScheduler::new(
        config,
        world.clone(),
        world.clone(),
        bus.clone() as Arc<dyn ActionBus>,
        memory.clone(),
        decider,
    );
    if let Some(seed) = args.seed {
        scheduler = scheduler.with_seed(seed);
    }

    let mut outcomes = scheduler.subscribe_outcomes();
    let printer = tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(r) => {
                    let target = r.target.as_deref().unwrap_or("-");
                    let status = if r.succeeded { "OK" } else { "FAILED" };
                    println!(
                        "[{}] {:<14} {:<12} {:<6} importance {:.2}",
                        chrono::Local::now().format("%H:%M:%S"),
                        r.action_name,
                        target,
                        status,
                        r.importance
                    );
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let handle = scheduler.spawn();
    println!("{} is idling. Press Ctrl-C to stop.", name);

    match args.seconds {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                r = tokio::signal::ctrl_c() => r.context("Failed to listen for Ctrl-C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    info!("Shutting down...");
    handle.shutdown().await.context("Scheduler task failed")?;
    responder.abort();
    printer.abort();

    let stats = memory.lock().await.stats();
    println!(
        "{} remembers {} episodes ({} reflections), knows {} skills ({} trusted).",
        name, stats.episodes, stats.reflections, stats.skills, stats.trusted_skills
    );
    Ok(())
}

// ============================================================================
// inspect
// ============================================================================

fn inspect(config: &GolemConfig, args: &InspectArgs) -> Result<()> {
    let name = &config.decision.character_name;
    let mut store = MemoryStore::new(config.memory.clone(), config.persistence.clone(), name);
    let loaded = store
        .try_load()
        .with_context(|| format!("Failed to load memory for {}", name))?;
    if !loaded {
        println!("No memory for {} at {}", name, store.path().display());
        return Ok(());
    }

    let top = store.episodic().retrieve_by_importance(args.top);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&top)?);
        return Ok(());
    }

    let stats = store.stats();
    println!("Memory of {} ({})", name, store.path().display());
    println!(
        "  {} episodes, {} reflections, mean importance {:.2}, success ratio {:.0}%",
        stats.episodes,
        stats.reflections,
        stats.mean_importance,
        stats.success_ratio * 100.0
    );

    println!("\nMost important episodes:");
    for ep in &top {
        let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ep.timestamp)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if ep.succeeded { "OK" } else { "FAILED" };
        println!(
            "  {:.2}  {}  {:<14} {:<6} {}",
            ep.importance, when, ep.action_name, status, ep.thought
        );
    }

    println!("\nSkills ({} trusted):", stats.trusted_skills);
    for skill in store.skills().skills() {
        println!(
            "  {:<40} → {:<14} {}/{} ({:.0}%)",
            skill.situation_pattern.as_str(),
            skill.action_name,
            skill.success_count,
            skill.use_count,
            skill.success_rate() * 100.0
        );
    }
    Ok(())
}
