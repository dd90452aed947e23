use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use speechpad::{
    CaptureBackendFactory, CaptureConfig, Config, HttpTranscriptionClient, SessionStateMachine,
    UiState,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "speechpad")]
#[command(about = "Record or upload speech and fetch a transcription")]
struct Cli {
    /// Path to a config file (built-in defaults when omitted)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture from the microphone until Enter is pressed, then transcribe
    Record,
    /// Transcribe an existing audio file
    Transcribe { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!("speechpad v0.1.0 ({})", cfg.service.name);
    info!("Transcription endpoint: {}", cfg.transcription.endpoint);

    let backend = CaptureBackendFactory::create(CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        buffer_duration_ms: cfg.audio.buffer_duration_ms,
    });
    let transcriber = Arc::new(HttpTranscriptionClient::new(cfg.transcription.endpoint));

    let (machine, mut handle) = SessionStateMachine::new(backend, transcriber);
    let machine_task = tokio::spawn(machine.run());

    match cli.command {
        Command::Record => {
            handle.start_capture().await?;
            let state = handle.wait_until(|s| *s != UiState::Idle).await;
            if let UiState::Failed(message) = state {
                eprintln!("Could not start recording: {}", message);
                handle.acknowledge().await?;
                handle.shutdown().await?;
                machine_task.await?;
                return Ok(());
            }

            println!("Recording... press Enter to stop.");
            tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)
            })
            .await?
            .context("Failed to read from stdin")?;

            handle.stop_capture().await?;
        }
        Command::Transcribe { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload")
                .to_string();

            handle.upload_file(file_name, bytes).await?;
        }
    }

    let state = handle.wait_until(UiState::is_terminal).await;
    match state {
        UiState::Succeeded(text) => println!("{}", text),
        UiState::Failed(message) => eprintln!("Transcription failed: {}", message),
        _ => {}
    }

    handle.acknowledge().await?;
    handle.shutdown().await?;
    machine_task.await?;

    Ok(())
}
