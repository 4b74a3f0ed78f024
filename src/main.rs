use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use neurochat::chat::{
    ChatSession, ChatStore, SavedChat, TurnError, TurnOutcome, DEFAULT_HISTORY_DIR,
};
use neurochat::config::{ChatProfile, Config, DEFAULT_CONFIG_FILE};
use neurochat::ollama::OllamaClient;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(
    name = "neurochat",
    version,
    about = "Chat with a local Ollama model and keep markdown transcripts"
)]
struct Cli {
    /// Model/API configuration file
    #[arg(long, env = "NEUROCHAT_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Model entry from the config (defaults to the configured default)
    #[arg(long, short, global = true)]
    model: Option<String>,

    /// API entry from the config
    #[arg(long, global = true)]
    api: Option<String>,

    /// Override the server URL from the config
    #[arg(long, env = "OLLAMA_HOST", global = true)]
    url: Option<String>,

    /// Directory holding saved transcripts
    #[arg(long, env = "NEUROCHAT_HISTORY_DIR", default_value = DEFAULT_HISTORY_DIR, global = true)]
    history_dir: PathBuf,

    /// Export spans to this OTLP collector
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    /// Print Prometheus metrics before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, env = "NEUROCHAT_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive chat (the default)
    Chat {
        /// Continue a saved transcript
        #[arg(long)]
        resume: Option<String>,
    },
    /// List saved transcripts, newest first
    List,
    /// Print a saved transcript
    Show { file: String },
    /// Delete a saved transcript
    Delete { file: String },
    /// Delete every saved transcript
    DeleteAll,
    /// List models installed on the server
    Models,
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    neurochat::tracing::init_tracing(
        "neurochat",
        cli.otlp_endpoint.as_deref(),
        cli.verbose,
        cli.log_json,
    )?;

    let result = run(&cli).await;

    if cli.print_metrics {
        eprintln!("{}", neurochat::metrics::gather_text());
    }
    if cli.otlp_endpoint.is_some() {
        neurochat::tracing::shutdown_tracing();
    }
    result
}

async fn run(cli: &Cli) -> Result<(), BoxError> {
    match cli.command.as_ref().unwrap_or(&Command::Chat { resume: None }) {
        Command::InitConfig { force } => {
            if cli.config.exists() && !force {
                return Err(format!("{} already exists (use --force)", cli.config.display()).into());
            }
            Config::write_default(&cli.config)?;
            println!("📝 Wrote {}", cli.config.display());
        }
        Command::Models => {
            let profile = load_profile(cli)?;
            let client = OllamaClient::new(&profile.base_url);
            for name in client.list_models().await? {
                let marker = if name == profile.model { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        Command::List => {
            let store = ChatStore::open(&cli.history_dir)?;
            print_saved(&store)?;
        }
        Command::Show { file } => {
            let store = ChatStore::open(&cli.history_dir)?;
            let mut session = ChatSession::new();
            store.load(&mut session, file)?;
            for message in session.messages() {
                println!("[{}]\n{}\n", message.role, message.text);
            }
        }
        Command::Delete { file } => {
            let store = ChatStore::open(&cli.history_dir)?;
            store.delete(file)?;
            println!("🗑️  Deleted {}", file);
        }
        Command::DeleteAll => {
            let store = ChatStore::open(&cli.history_dir)?;
            let removed = store.delete_all()?;
            println!("🗑️  Deleted {} file(s)", removed);
        }
        Command::Chat { resume } => {
            let profile = load_profile(cli)?;
            let store = ChatStore::open(&cli.history_dir)?;
            let mut session = ChatSession::new();
            if let Some(file) = resume {
                store.load(&mut session, file)?;
                for message in session.messages() {
                    println!("[{}] {}", message.role, message.text);
                }
            }
            chat_loop(&profile, &store, &mut session).await?;
        }
    }
    Ok(())
}

fn load_profile(cli: &Cli) -> Result<ChatProfile, BoxError> {
    let config = Config::load_or_default(&cli.config)?;
    let mut profile = config.profile(cli.model.as_deref(), cli.api.as_deref())?;
    if let Some(url) = &cli.url {
        profile.base_url = url.clone();
    }
    Ok(profile)
}

fn print_saved(store: &ChatStore) -> Result<(), BoxError> {
    let chats = store.list()?;
    if chats.is_empty() {
        println!("No saved chats in {}", store.base_dir().display());
    }
    for chat in &chats {
        println!("{}", saved_line(chat));
    }
    Ok(())
}

/// One row of the saved-chat listing: emoji, time, title, file
fn saved_line(chat: &SavedChat) -> String {
    let when = chat
        .modified
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let emoji = chat.emoji.map(|e| e.as_str()).unwrap_or("📄");
    format!("{} {:<16} {}  ({})", emoji, when, chat.title, chat.file_name)
}

async fn chat_loop(
    profile: &ChatProfile,
    store: &ChatStore,
    session: &mut ChatSession,
) -> Result<(), BoxError> {
    let client = OllamaClient::new(&profile.base_url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("💬 Chatting with {} at {}", profile.model, profile.base_url);
    println!("   Commands: /new /delete /load FILE /list /quit. Ctrl-C stops a reply.");

    loop {
        print!("{} > ", session.emoji());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();

        match input.split_once(' ').map_or((input, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => continue,
            ("/quit", _) | ("/exit", _) => break,
            ("/new", _) => {
                session.clear();
                println!("➕ New chat {}", session.emoji());
            }
            ("/delete", _) => {
                if let Some(file) = session.backing_file().map(str::to_string) {
                    store.delete(&file)?;
                    println!("🗑️  Deleted {}", file);
                }
                session.clear();
            }
            ("/load", file) => match store.load(session, file) {
                Ok(()) => {
                    for message in session.messages() {
                        println!("[{}] {}", message.role, message.text);
                    }
                }
                Err(e) => eprintln!("❌ {}", e),
            },
            ("/list", _) => print_saved(store)?,
            _ => {
                run_turn(&client, store, profile, session, input).await;
            }
        }
    }
    Ok(())
}

async fn run_turn(
    client: &OllamaClient,
    store: &ChatStore,
    profile: &ChatProfile,
    session: &mut ChatSession,
    prompt: &str,
) -> Option<TurnOutcome> {
    let stop = session.stop_flag();
    let turn = session.submit(client, store, profile, prompt, |fragment| {
        print!("{}", fragment);
        let _ = std::io::stdout().flush();
    });
    tokio::pin!(turn);

    // Ctrl-C only raises the stop flag; the turn itself decides when to end.
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            _ = tokio::signal::ctrl_c() => stop.request(),
        }
    };
    println!();

    // A failed save ends this turn only; the chat keeps going.
    match result {
        Ok(outcome) => {
            if outcome.cancelled {
                println!("⏹️  Generation stopped.");
            }
            for diagnostic in &outcome.diagnostics {
                eprintln!("⚠️  {}", diagnostic);
            }
            Some(outcome)
        }
        Err(TurnError::EmptyPrompt) => None,
        Err(e) => {
            eprintln!("❌ {}", e);
            None
        }
    }
}
