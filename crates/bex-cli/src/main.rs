//! BEX CLI
//!
//! Main entry point for chatting with BEX in a terminal or serving the chat
//! API to a browser widget.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use bex_tutor::{
    create_router, AppState, Config, Message, OnboardingForm, ResetOutcome, Sender,
    SessionEvent, StudentProfile, TutorPipeline, RESET_PROMPT,
};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Typed at the chat prompt to reset the session.
const RESET_COMMAND: &str = "/reset";

/// Typed at the chat prompt to leave.
const QUIT_COMMAND: &str = "/quit";

/// BEX - the Bugbox Tutor
///
/// A friendly coding tutor for kids, backed by a chat-completion model.
#[derive(Parser, Debug)]
#[command(name = "bex")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: bex.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with BEX in this terminal
    Chat,

    /// Serve the chat API and WebSocket events over HTTP
    Serve {
        /// Port for the HTTP API server (overrides bex.json)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config.with_credential_from_env(),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(1);
        }
    };

    // Priority: RUST_LOG env var > --verbose flag or "debug": true > default (info)
    let default_level = if args.verbose || config.debug {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("BEX starting");
    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        Command::Chat => run_chat(config).await,
        Command::Serve { port } => run_server(config, port).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration from the given path or from the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

// ============================================================================
// Server
// ============================================================================

/// Runs the HTTP API until Ctrl+C.
async fn run_server(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    print_config(&config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let pipeline = TutorPipeline::from_config(config)?;
    let router = create_router(AppState::new(pipeline));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Check if port {} is already in use or pass --port",
            addr.port()
        )
    })?;

    println!("BEX API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

// ============================================================================
// Terminal chat
// ============================================================================

/// Runs the interactive terminal chat.
///
/// Prompts run on the blocking pool so the runtime keeps driving the
/// pipeline and its events while the student types.
async fn run_chat(config: Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(TutorPipeline::from_config(config)?);

    if pipeline.is_offline() {
        println!(
            "No API key found in ${}; BEX will run in offline mode.",
            pipeline.config().api_key_env
        );
    }

    let profile = run_onboarding(&pipeline).await?;
    greet(&profile);

    let mut shown = print_new_messages(&pipeline.messages().await, 0);

    loop {
        let line = read_line("You").await?;

        match line.trim() {
            "" => {}
            QUIT_COMMAND => break,
            RESET_COMMAND => {
                let confirmed = confirm(RESET_PROMPT).await?;
                if pipeline.reset(&confirmed).await? == ResetOutcome::Reset {
                    println!();
                    let profile = run_onboarding(&pipeline).await?;
                    greet(&profile);
                    shown = print_new_messages(&pipeline.messages().await, 0);
                }
            }
            _ => {
                send_message(&pipeline, line).await?;
                shown = print_new_messages(&pipeline.messages().await, shown);
            }
        }
    }

    println!("Bye! Keep coding!");
    Ok(())
}

/// Submits `text` as typed and shows the typing notice while a reply is pending.
async fn send_message(pipeline: &Arc<TutorPipeline>, text: String) -> anyhow::Result<()> {
    let mut events = pipeline.subscribe();
    let reply = Arc::clone(pipeline).submit_detached(text);
    tokio::pin!(reply);

    loop {
        tokio::select! {
            biased;
            Ok(event) = events.recv() => {
                if matches!(event, SessionEvent::PendingChanged(ref p) if p.pending) {
                    println!("BEX is typing...");
                }
            }
            outcome = &mut reply => {
                let outcome = outcome?;
                tracing::debug!(outcome = outcome.as_str(), "Message resolved");
                return Ok(());
            }
        }
    }
}

/// Asks for name, age and lesson and stores them.
async fn run_onboarding(pipeline: &TutorPipeline) -> anyhow::Result<StudentProfile> {
    println!("Let's get to know each other first.");

    let name = read_line("What's your name?").await?;
    let age = read_line("How old are you?").await?;
    let lesson = read_line("What are we learning today? (optional)").await?;

    let form = OnboardingForm::new(name, age, lesson);
    Ok(pipeline.complete_onboarding(&form).await)
}

/// Reads one line of input; empty answers are allowed.
async fn read_line(prompt: &'static str) -> anyhow::Result<String> {
    let line = tokio::task::spawn_blocking(move || {
        let theme = ColorfulTheme::default();
        let line: String = Input::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok::<_, dialoguer::Error>(line)
    })
    .await??;
    Ok(line)
}

/// Asks a yes/no question, defaulting to no.
async fn confirm(prompt: &'static str) -> anyhow::Result<bool> {
    let answer = tokio::task::spawn_blocking(move || {
        let theme = ColorfulTheme::default();
        Confirm::with_theme(&theme)
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await??;
    Ok(answer)
}

fn greet(profile: &StudentProfile) {
    println!();
    if !profile.name.trim().is_empty() {
        println!("Welcome, {}!", profile.name.trim());
    }
    println!("Type {QUIT_COMMAND} to leave or {RESET_COMMAND} to start over.");
    println!();
}

/// Prints messages from index `from` onwards and returns the new count.
fn print_new_messages(messages: &[Message], from: usize) -> usize {
    for message in messages.iter().skip(from) {
        let who = match message.sender() {
            Sender::User => continue,
            Sender::Assistant => "BEX",
        };
        println!("[{}] {who}: {}", message.timestamp(), message.text());
        println!();
    }
    messages.len()
}

/// Prints configuration summary.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Model: {}", config.model);
    println!("  Endpoint: {}", config.endpoint);
    println!(
        "  Credential: {}",
        if config.is_offline() {
            "none (offline mode)"
        } else {
            "configured"
        }
    );
    println!("  Filter rules: {}", config.content_filter.rules.len());
    println!("  Port: {}", config.port);
}
