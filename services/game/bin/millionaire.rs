//! Main Entrypoint for the Millionaire Quiz
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Initializing file logging (stdout belongs to the game).
//! 3. Building the question source, either the local model server or the
//!    built-in offline bank.
//! 4. Running the interactive game on stdin/stdout until the player leaves.

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use millionaire_core::GameConfig;
use millionaire_core::GenerationPolicy;
use millionaire_core::llm_client::{OllamaQuestionSource, QuestionSource, StaticQuestionSource};
use millionaire_core::persistence::SessionStore;
use millionaire_game::config::{Config, load_prompts};
use millionaire_game::runner::{GameServices, Runner};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

/// Who Wants to Be a Millionaire, with questions from a local language model.
#[derive(Parser)]
#[command(name = "millionaire", version)]
struct Cli {
    /// Model to generate questions with (overrides QUIZ_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Directory for saved sessions (overrides SESSIONS_DIR)
    #[arg(long)]
    sessions_dir: Option<PathBuf>,

    /// Use the built-in question bank instead of the model server
    #[arg(long)]
    offline: bool,

    /// Load this session file and continue playing it
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,
}

/// Raises the interrupt flag on the first `Ctrl+C`.
fn watch_for_interrupt() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt. Ending the game at the next safe point...");
            let _ = tx.send(true);
            // Keep the sender alive so the flag stays raised.
            std::future::pending::<()>().await;
        }
    });
    rx
}

async fn build_source(
    cli: &Cli,
    config: &Config,
    model: &str,
) -> anyhow::Result<Arc<dyn QuestionSource>> {
    if cli.offline {
        info!("Using the offline question bank.");
        return Ok(Arc::new(StaticQuestionSource));
    }

    let mut source = OllamaQuestionSource::new(&config.ollama_host, model);
    if let Some(dir) = &config.prompts_path {
        let prompts = load_prompts(dir)?;
        if let Some(template) = prompts.get("generate_question") {
            info!(path = %dir.display(), "Using custom question prompt.");
            source = source.with_prompt_template(template.clone());
        }
    }

    match source.has_model().await {
        Ok(true) => info!(model, host = %config.ollama_host, "Model server ready."),
        Ok(false) => {
            warn!(model, "Model is not available on the server");
            println!(
                "{}",
                format!(
                    "Warning: model '{}' is not available. Try `ollama pull {}`.",
                    model, model
                )
                .yellow()
            );
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Model server probe failed");
            println!(
                "{}",
                format!(
                    "Warning: cannot reach the model server at {}. Is Ollama running?",
                    config.ollama_host
                )
                .yellow()
            );
        }
    }
    Ok(Arc::new(source))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    info!("Configuration loaded. Initializing game...");

    // --- 3. Initialize Game Services ---
    let game_config = match &config.game_config_path {
        Some(path) => GameConfig::from_json_file(path)
            .with_context(|| format!("Invalid game config {}", path.display()))?,
        None => GameConfig::default(),
    };
    let model = cli.model.clone().unwrap_or_else(|| config.model.clone());
    let sessions_dir = cli
        .sessions_dir
        .clone()
        .unwrap_or_else(|| config.sessions_dir.clone());
    let source = build_source(&cli, &config, &model).await?;

    let services = GameServices {
        config: Arc::new(game_config),
        store: SessionStore::new(&sessions_dir),
        source,
        policy: GenerationPolicy {
            attempts: config.generation_attempts,
            timeout: config.generation_timeout,
            ..GenerationPolicy::default()
        },
        model_id: if cli.offline {
            "offline".to_string()
        } else {
            model.clone()
        },
    };
    info!(
        model = %services.model_id,
        sessions_dir = %sessions_dir.display(),
        attempts = config.generation_attempts,
        "Game configured. Starting..."
    );

    // --- 4. Run ---
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut runner =
        Runner::new(services, stdin, std::io::stdout()).with_interrupt(watch_for_interrupt());
    let result = runner.run(cli.resume.as_deref()).await;

    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "Unexpected error");
        eprintln!("{}", format!("\nAn unexpected error occurred: {:#}", e).red());
        eprintln!("{}", "Please check the log file for details.".red());
    }
    info!("Game has shut down.");

    // The stdin reader thread may still be blocked on a read, which would
    // hold up runtime shutdown.
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
