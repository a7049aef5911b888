//! signaldesk-daemon: run the agent console server, a terminal support chat
//! or the signal bot against a shared data directory.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use signaldesk_core::chat::{ChatSnapshot, Identity};
use signaldesk_core::event_bus::{matches_pattern, SIGNAL_EVENT};
use signaldesk_core::persistence::FileBlobStore;
use signaldesk_core::signals::{Signal, SignalSettings};
use signaldesk_core::{paths, DeskConfig, DeskContext};
use signaldesk_http::HttpSharedState;

#[derive(Parser)]
#[command(name = "signaldesk-daemon")]
#[command(about = "SignalDesk support desk: agent console, terminal chat and signal bot", long_about = None)]
struct Cli {
    /// Data directory (defaults to ~/.signaldesk).
    #[arg(long, global = true, env = "SIGNALDESK_HOME")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the agent console over HTTP and WebSocket
    Serve {
        #[arg(long, default_value = "127.0.0.1", env = "SIGNALDESK_HOST")]
        host: String,

        #[arg(short, long, default_value_t = 7340, env = "SIGNALDESK_PORT")]
        port: u16,
    },
    /// Chat with support from the terminal
    Chat {
        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },
    /// Run the automated signal bot and print accepted signals
    Signals {
        /// Seconds between ticks (30-300).
        #[arg(long)]
        interval: Option<u64>,

        /// Minimum confidence percent (60-95).
        #[arg(long)]
        min_confidence: Option<u8>,
    },
}

fn build_context(data_dir: Option<PathBuf>) -> Result<DeskContext, String> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => paths::data_dir()?,
    };
    let config = DeskConfig::load(&data_dir).map_err(|e| format!("Failed to load config: {e}"))?;
    let store_dir = paths::store_dir(&data_dir);
    log::info!("Using store at {}", store_dir.display());

    Ok(DeskContext::builder()
        .config(config)
        .blobs(Arc::new(FileBlobStore::new(store_dir)))
        .build())
}

async fn serve(ctx: DeskContext, host: String, port: u16) -> Result<(), String> {
    let state = Arc::new(HttpSharedState::new(ctx));
    let mut handle = signaldesk_http::start(state, host, port)?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for ctrl-c: {e}"))?;

    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .map_err(|e| format!("Server shutdown failed: {e}"))
}

fn print_new_messages(snapshot: &ChatSnapshot, seen: &mut HashSet<String>, was_typing: &mut bool) {
    for message in &snapshot.messages {
        if seen.insert(message.id.clone()) {
            println!("[{}] {}", message.sender.label(), message.text);
        }
    }
    if snapshot.is_typing && !*was_typing {
        println!("...");
    }
    *was_typing = snapshot.is_typing;
}

async fn chat(ctx: DeskContext, identity: Identity) -> Result<(), String> {
    let mut events = ctx.event_bus.subscribe();
    let session = ctx.open_chat(identity);

    let printer = tokio::spawn(async move {
        let mut seen = HashSet::new();
        let mut was_typing = false;
        loop {
            match events.recv().await {
                Ok(event) if matches_pattern(&event.event_type, "support:chat:*") => {
                    if let Ok(snapshot) = event.decode::<ChatSnapshot>() {
                        print_new_messages(&snapshot, &mut seen, &mut was_typing);
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                    log::warn!("Chat display lagged by {} events", count);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    session.open();
    println!("Type a message. /close, /open and /quit control the widget.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("Failed to read input: {e}"))?
    {
        match line.trim() {
            "/quit" => break,
            "/close" => session.close(),
            "/open" => session.open(),
            text => {
                session.submit(text);
            }
        }
    }

    session.close();
    printer.abort();
    if let Some(chat_id) = session.chat_id() {
        println!("Conversation saved as {chat_id}");
    }
    Ok(())
}

async fn signals(ctx: DeskContext, settings: SignalSettings) -> Result<(), String> {
    let mut events = ctx.event_bus.subscribe();
    let bot = ctx.signal_bot();
    bot.set_settings(settings);
    let settings = bot.settings();
    println!(
        "Signal bot running: every {}s, min {}% confidence, max {}/hour",
        settings.interval_secs, settings.min_confidence, settings.max_signals_per_hour
    );
    bot.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) if event.event_type == SIGNAL_EVENT => {
                    if let Ok(signal) = event.decode::<Signal>() {
                        println!("{signal}");
                    }
                }
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    bot.stop();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ctx = match build_context(cli.data_dir) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve { host, port } => serve(ctx, host, port).await,
        Commands::Chat {
            user_id,
            name,
            email,
        } => {
            let identity = Identity {
                user_id,
                display_name: name,
                email,
            };
            chat(ctx, identity).await
        }
        Commands::Signals {
            interval,
            min_confidence,
        } => {
            let mut settings = ctx.config.signals.clone();
            if let Some(secs) = interval {
                settings.interval_secs = secs;
            }
            if let Some(min) = min_confidence {
                settings.min_confidence = min;
            }
            signals(ctx, settings).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
