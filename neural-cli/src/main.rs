//! CLI entry point for the Neural assistant

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use neural_agent::Assistant;
use neural_core::backend::connect_backend;
use neural_core::config::{Config, ConfigLoader, StorageMode};
use neural_core::logging::init_logging;
use neural_core::{ConfigResolver, ConversationStore};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "neural")]
#[command(about = "A conversational assistant with per-user memory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the assistant
    Chat {
        /// User the conversation belongs to
        #[arg(short, long)]
        user: String,
        /// Send a single message and exit instead of starting a session
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Forget a user's conversation history
    Clear {
        /// User whose history is removed
        #[arg(short, long)]
        user: String,
    },
    /// Read or write settings in the remote store
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show status information
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Resolve a setting and show where it came from
    Get { key: String },
    /// Store a setting in the remote store
    Set { key: String, value: String },
}

/// A line typed into the interactive session
#[derive(Debug, PartialEq, Eq)]
enum SessionInput<'a> {
    Empty,
    Message(&'a str),
    Clear,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input<'a>(line: &'a str, prefix: &str) -> SessionInput<'a> {
    let line = line.trim();
    if line.is_empty() {
        return SessionInput::Empty;
    }
    let Some(command) = line.strip_prefix(prefix).filter(|_| !prefix.is_empty()) else {
        return SessionInput::Message(line);
    };
    match command.trim().to_lowercase().as_str() {
        "clear" => SessionInput::Clear,
        "help" => SessionInput::Help,
        "quit" | "exit" => SessionInput::Quit,
        _ => SessionInput::Unknown(command.trim()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let config = config_loader
        .load()
        .with_context(|| format!("Failed to load {}", config_loader.config_path().display()))?;
    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Chat { user, message } => {
            let assistant = Assistant::bootstrap(&config).await?;
            if let Some(msg) = message {
                info!("Processing one-shot message for user {}", user);
                run_once(&assistant, &user, &msg).await;
            } else {
                run_session(&assistant, &user).await?;
            }
        }
        Commands::Clear { user } => {
            let store = ConversationStore::new(
                connect_backend(&config.storage),
                config.assistant.persona.clone(),
            );
            println!("{}", store.clear(&user).await.summary());
        }
        Commands::Config { command } => {
            let resolver = ConfigResolver::new(connect_backend(&config.storage));
            match command {
                ConfigCommands::Get { key } => run_config_get(&resolver, &key).await,
                ConfigCommands::Set { key, value } => {
                    run_config_set(&resolver, &key, &value).await?
                }
            }
        }
        Commands::Status => run_status(&config_loader, &config).await,
    }

    Ok(())
}

async fn run_once(assistant: &Assistant, user: &str, message: &str) {
    let reply = assistant.reply(user, message).await;
    let answered = reply.answered;
    // The runtime stops when main returns, so wait for the background write
    let text = reply.persisted().await;
    print_reply(&text, answered);
}

async fn run_session(assistant: &Assistant, user: &str) -> Result<()> {
    let prefix = assistant.command_prefix().to_string();
    println!(
        "{} {}",
        style("Neural").bold().cyan(),
        style(format!("({})", assistant.model())).dim()
    );
    println!(
        "Type a message, or {}help for commands.\n",
        style(&prefix).yellow()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut last_reply = None;

    loop {
        stdout
            .write_all(format!("{} ", style("you>").green().bold()).as_bytes())
            .await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_input(&line, &prefix) {
            SessionInput::Empty => continue,
            SessionInput::Message(text) => {
                let reply = assistant.reply(user, text).await;
                print_reply(&reply.text, reply.answered);
                last_reply = Some(reply);
            }
            SessionInput::Clear => {
                println!("{}\n", assistant.clear(user).await.summary());
            }
            SessionInput::Help => print_help(assistant, &prefix),
            SessionInput::Quit => break,
            SessionInput::Unknown(command) => {
                println!(
                    "{} Unknown command '{}'. Try {}help.\n",
                    style("?").yellow(),
                    command,
                    prefix
                );
            }
        }
    }

    if let Some(reply) = last_reply {
        reply.persisted().await;
    }
    Ok(())
}

fn print_reply(text: &str, answered: bool) {
    let label = if answered {
        style("neural>").cyan().bold()
    } else {
        style("neural>").red().bold()
    };
    println!("{} {}\n", label, text);
}

fn print_help(assistant: &Assistant, prefix: &str) {
    println!("{}", style("About Neural").bold().cyan());
    println!("I'm an AI assistant ready to chat and help!\n");
    println!("  Model: {}", style(assistant.model()).yellow());
    println!("\n{}", style("Commands:").bold());
    println!("  {}clear  Clear your chat history", prefix);
    println!("  {}help   Show this information", prefix);
    println!("  {}quit   Leave the session", prefix);
    println!();
}

async fn run_config_get(resolver: &ConfigResolver, key: &str) {
    let resolution = resolver.resolve_detailed(key, None).await;
    match resolution.value() {
        Some(value) => println!(
            "{} = {} {}",
            key,
            value,
            style(format!("({})", resolution.source())).dim()
        ),
        None => println!("{} is {}", key, style("not set").red()),
    }
}

async fn run_config_set(resolver: &ConfigResolver, key: &str, value: &str) -> Result<()> {
    if !resolver.set(key, value).await {
        anyhow::bail!("Failed to store {} (is the remote store configured and reachable?)", key);
    }
    println!("{} {} updated in remote store", style("✓").green(), key);
    Ok(())
}

async fn run_status(loader: &ConfigLoader, config: &Config) {
    println!("{}", style("Neural Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    println!("  Command prefix: {}", config.assistant.command_prefix);
    println!("  History window: {} turns", config.assistant.history_window);
    println!();

    println!("{}", style("Storage:").bold());
    let backend = connect_backend(&config.storage);
    let mode = match config.storage.mode {
        StorageMode::Local => style("local").dim(),
        StorageMode::Supabase if backend.is_some() => style("supabase").green(),
        StorageMode::Supabase => {
            warn!("Supabase storage requested but unavailable");
            style("supabase (unavailable, using environment)").red()
        }
    };
    println!("  Mode: {}", mode);
    println!();

    let resolver = ConfigResolver::new(backend);
    println!("{}", style("Language model:").bold());
    let model = resolver
        .resolve_detailed("AI_MODEL", Some(config.assistant.default_model.as_str()))
        .await;
    println!(
        "  Model: {} {}",
        model.value().unwrap_or_default(),
        style(format!("({})", model.source())).dim()
    );
    let key_status = match resolver.resolve("GROQ_API_KEY", None).await {
        Some(key) if !key.trim().is_empty() => style("configured").green(),
        _ => style("not configured").red(),
    };
    println!("  API key: {}", key_status);
    println!("  Endpoint: {}", config.assistant.api_base);
}
