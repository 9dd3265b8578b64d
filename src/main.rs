use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use realtime_voice::config::EngineConfig;
use realtime_voice::core::realtime::{ConnectionError, SessionState, TranscriptEntry};
use realtime_voice::core::tools::{SharedDocument, ToolRegistry, ToolResult, document_tools};
use realtime_voice::session::{ConversationObserver, VoiceSession, spawn_observer};

/// Realtime voice - spoken conversations with an OpenAI Realtime model
#[derive(Parser, Debug)]
#[command(name = "realtime-voice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a conversation. Type to talk; /interrupt, /mute, /unmute, /quit
    Chat {
        /// Document the assistant can read and edit; written back on exit
        #[arg(short = 'd', long = "document", value_name = "FILE")]
        document: Option<PathBuf>,
    },

    /// Print the document tool definitions as JSON
    Tools,
}

/// Prints the conversation to the terminal.
struct ConsoleObserver;

impl ConversationObserver for ConsoleObserver {
    fn on_connection_state_changed(&mut self, state: SessionState) {
        eprintln!("* {state}");
    }

    fn on_transcript(&mut self, entry: &TranscriptEntry) {
        if entry.is_final {
            println!("[{}] {}", entry.role, entry.text);
        }
    }

    fn on_error(&mut self, error: &ConnectionError) {
        eprintln!("! {error}");
    }

    fn on_tool_invoked(&mut self, name: &str, arguments: &Value, result: &ToolResult) {
        let status = if result.success { "ok" } else { "failed" };
        eprintln!("> {name}({arguments}) {status}");
    }

    fn on_speech_started(&mut self) {
        eprintln!("* listening");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Must be installed before the first TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Tools => {
            let document = SharedDocument::new("");
            let definitions: Vec<_> = document_tools(&document)
                .into_iter()
                .map(|(definition, _)| definition)
                .collect();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
            Ok(())
        }
        Commands::Chat { document } => {
            let config = match &cli.config {
                Some(path) => {
                    info!("Loading configuration from {}", path.display());
                    EngineConfig::from_file(path)
                        .with_context(|| format!("loading {}", path.display()))?
                }
                None => EngineConfig::from_env().context("loading configuration from environment")?,
            };
            chat(config, document).await
        }
    }
}

async fn chat(config: EngineConfig, document_path: Option<PathBuf>) -> anyhow::Result<()> {
    let document = match &document_path {
        Some(path) if path.exists() => SharedDocument::new(
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        _ => SharedDocument::new(""),
    };

    let mut tools = ToolRegistry::builder();
    if document_path.is_some() {
        tools.register_all(document_tools(&document))?;
    }

    let builder = VoiceSession::builder(config.to_realtime_config())
        .tools(tools.build())
        .capture_config(config.capture_config())
        .playback_quantum(config.playback_quantum());

    #[cfg(feature = "device-cpal")]
    let builder = {
        use realtime_voice::core::audio::{CpalCaptureDevice, CpalPlaybackDevice};
        builder
            .capture_device(Arc::new(CpalCaptureDevice::default_device()))
            .playback_device(Arc::new(CpalPlaybackDevice::default_device()))
    };

    #[cfg(not(feature = "device-cpal"))]
    let builder = {
        use realtime_voice::core::audio::{MemoryPlaybackDevice, WIRE_SAMPLE_RATE};
        info!("Built without device-cpal, running text-only");
        builder.playback_device(Arc::new(MemoryPlaybackDevice::new(WIRE_SAMPLE_RATE)))
    };

    let mut session = builder.build()?;
    let events = session
        .take_events()
        .ok_or_else(|| anyhow!("event stream already taken"))?;
    let observer = spawn_observer(events, ConsoleObserver);

    session.connect().await.context("connecting to realtime endpoint")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Errors are already reported through the observer.
        let result = match line {
            "/quit" => break,
            "/interrupt" => session.interrupt().await.map(|_| ()),
            "/mute" => session.set_muted(true).await,
            "/unmute" => session.set_muted(false).await,
            text => session.send_text(text).await,
        };
        if result.is_err() && session.state() != SessionState::Active {
            warn!(state = %session.state(), "Session is no longer active");
            break;
        }
    }

    session.disconnect().await?;

    if let Some(path) = &document_path {
        std::fs::write(path, document.content())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Document saved to {}", path.display());
    }

    drop(session);
    observer.await?;
    Ok(())
}
