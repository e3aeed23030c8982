use anima_core::{AnimaConfig, Event, StateVector, SystemClock};
use anima_limbic::{Heartbeat, HeartbeatConfig};
use anima_memory::{Embedder, HashingEmbedder, Organism, ReplyGenerator};
use async_trait::async_trait;
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

mod commands;

use commands::{Command, HELP};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (missing file means defaults)
    #[arg(short, long, env = "ANIMA_CONFIG", default_value = "anima.toml")]
    config: String,

    /// Override the memory database path
    #[arg(short, long)]
    db: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Offline stand-in for a language model: echoes the message, colored by mood.
struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate_reply(
        &self,
        prompt: &str,
        memories: &[String],
        snapshot: &StateVector,
    ) -> anyhow::Result<String> {
        let user_text = prompt.rsplit("[User]\n").next().unwrap_or(prompt).trim();
        let (emotion, intensity) = snapshot.emotion.dominant();
        let mut reply = format!("({} {:.2}) {}", emotion, intensity, user_text);
        if let Some(memory) = memories.first() {
            reply.push_str(&format!("\n  that reminds me of {}", memory));
        }
        Ok(reply)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }
}

#[cfg(feature = "fastembed")]
fn embedder() -> anyhow::Result<Arc<dyn Embedder>> {
    info!("Loading fastembed model...");
    Ok(Arc::new(anima_memory::FastEmbedder::new()?))
}

#[cfg(not(feature = "fastembed"))]
fn embedder() -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(Arc::new(HashingEmbedder::default()))
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Initializing Anima...");
    let mut config = AnimaConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.organism.db_path = db;
    }

    info!("Opening memory at {}...", config.organism.db_path);
    let organism = Arc::new(Organism::open(config.clone(), embedder()?, Arc::new(SystemClock)).await?);

    let heartbeat = Heartbeat::spawn(
        Arc::clone(organism.limbic()),
        HeartbeatConfig::from_config(&config.organism),
    );

    let autosave = if config.organism.autosave_secs > 0 {
        let organism = Arc::clone(&organism);
        let period = Duration::from_secs(config.organism.autosave_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = organism.persist().await {
                    warn!("Autosave failed: {}", e);
                }
            }
        }))
    } else {
        None
    };

    println!("Anima online. Type /help for commands, /quit to exit.");
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                prompt()?;
                continue;
            }
            Err(e) => {
                println!("{}", e);
                prompt()?;
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = run(&organism, command).await {
            error!("Command failed: {:#}", e);
            println!("[error] {:#}", e);
        }
        prompt()?;
    }

    if let Some(task) = autosave {
        task.abort();
    }
    heartbeat.shutdown().await?;
    organism.persist().await?;
    info!("State saved, goodbye.");
    Ok(())
}

async fn run(organism: &Organism, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Say(text) => {
            let turn = organism.respond(&text, &EchoGenerator).await?;
            println!("\nAnima: {}\n", turn.reply);
            if turn.novel {
                println!("  (that was new)");
            }
        }
        Command::State => {
            let state = organism.snapshot();
            println!("{}", serde_json::to_string_pretty(&state)?);
            println!("{}", state.describe_for_context());
            let limbic = organism.limbic();
            println!(
                "hormones: {:?}\nidle: {:.0}s, intensity: {:.2}, social: {}, tired: {}, stressed: {}",
                limbic.neurochemistry(),
                limbic.seconds_since_interaction(),
                limbic.conversation_intensity(),
                limbic.needs_social_interaction(),
                limbic.is_tired(),
                limbic.is_stressed()
            );
        }
        Command::Rest => organism.apply_event(&Event::Rest)?,
        Command::Novel => organism.apply_event(&Event::NovelTopic)?,
        Command::Stimulus { channel, magnitude } => {
            organism.apply_event(&Event::stimulus(channel, magnitude))?
        }
        Command::Recall(query) => {
            let top_k = organism.config().memory.recall_top_k;
            let hits = organism.recall_rendered(&query, top_k).await?;
            if hits.is_empty() {
                println!("(nothing comes to mind)");
            }
            for hit in hits {
                println!("- {}", hit);
            }
        }
        Command::Remember(text) => {
            let entry = organism.remember(&text, 0.5).await?;
            println!("remembered #{}", entry.id);
        }
        Command::Consolidate => {
            let report = organism.consolidate().await?;
            println!(
                "examined {}, forgot {}, kept {}",
                report.examined,
                report.pruned.len(),
                report.kept
            );
        }
        Command::Save => {
            organism.persist().await?;
            println!("saved");
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}
