//! CLI binary for dineai.

use clap::{Parser, Subcommand};
use dineai::audio::{CpalMicrophone, CpalSpeaker};
use dineai::credentials::ApiKeys;
use dineai::llm::GeminiClient;
use dineai::pipeline::session::{Collaborators, ConversationSession};
use dineai::stt::DeepgramLive;
use dineai::tts::DeepgramSpeak;
use dineai::AgentConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// DineAI: voice assistant for restaurant reservations and orders.
#[derive(Parser)]
#[command(name = "dineai", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a voice conversation.
    Chat,

    /// List available audio devices.
    Devices,

    /// Write the default configuration to the config path.
    InitConfig {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dineai=info,tungstenite=warn,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AgentConfig::default_config_path);

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(load_config(&config_path, cli.config.is_some())?).await,
        Command::Devices => list_devices(),
        Command::InitConfig { force } => init_config(&config_path, force),
    }
}

/// An explicit `--config` must exist; the default path is optional.
fn load_config(path: &Path, explicit: bool) -> anyhow::Result<AgentConfig> {
    if explicit || path.exists() {
        info!("loading config from {}", path.display());
        Ok(AgentConfig::from_file(path)?)
    } else {
        Ok(AgentConfig::default())
    }
}

async fn run_chat(config: AgentConfig) -> anyhow::Result<()> {
    let keys = ApiKeys::load()?;

    println!("DineAI Restaurant Assistant v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "=".repeat(50));

    let collaborators = Collaborators {
        transport: Box::new(DeepgramLive::new(&config.stt, keys.deepgram.clone())),
        microphone: Box::new(CpalMicrophone::new(&config.audio, &config.stt)),
        generator: Arc::new(GeminiClient::new(
            &config.llm,
            &config.conversation,
            keys.gemini.clone(),
        )?),
        synthesizer: Arc::new(DeepgramSpeak::new(&config.tts, keys.deepgram)?),
        output: Box::new(CpalSpeaker::new(&config.audio)?),
    };

    let cancel = CancellationToken::new();
    let session = ConversationSession::new(config, collaborators).with_cancel(cancel.clone());
    let handle = session.handle();

    // First Ctrl+C ends the conversation gracefully; a second one aborts playback.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, ending conversation...");
            handle.interrupt();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received second Ctrl+C, aborting");
            cancel.cancel();
        }
    });

    println!("\nStart speaking... Say \"goodbye\" or press Ctrl+C to stop.\n");

    let summary = session.run().await?;
    println!(
        "\nThank you for using DineAI! ({} turns)",
        summary.turns.len()
    );
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalMicrophone::list_input_devices()? {
        println!("  - {name}");
    }

    println!("\nOutput devices:");
    for name in CpalSpeaker::list_output_devices()? {
        println!("  - {name}");
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AgentConfig::default().save_to_file(path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}
