//! Command-line entry point.
//!
//! `serve` runs the webhook server; `receive` feeds a message file through
//! the pipeline without any HTTP in the way, which is the quickest way to
//! try a parser backend; `send` delivers a text message through the
//! configured channel, standing in for a human operator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use converse::channel::InboundMessage;
use converse::server::{self, AppState};
use converse::{AppConfig, Bot};

#[derive(Parser)]
#[command(
    name = "converse",
    version,
    about = "Chat-bot backend with pluggable NLU, storage and channel backends"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server
    Serve,
    /// Feed a fake inbound message through the pipeline and print the
    /// conversation it lands in
    Receive {
        /// Path to a JSON file holding the inbound message
        #[arg(long)]
        data: PathBuf,
    },
    /// Send a text message to a user through the configured channel
    Send {
        /// Platform id of the recipient
        #[arg(long)]
        to: String,
        /// Text to deliver
        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config).await?;
    init_tracing(config.debug);

    let bot = Arc::new(Bot::bootstrap(&config)?);

    match cli.command {
        Command::Serve => {
            let state = AppState {
                bot,
                verify_token: config.verify_token.clone(),
            };
            server::serve(state, config.listening_port).await
        }
        Command::Receive { data } => {
            let content = tokio::fs::read_to_string(&data)
                .await
                .with_context(|| format!("failed to read message file {}", data.display()))?;
            let message: InboundMessage =
                serde_json::from_str(&content).context("invalid inbound message file")?;

            let conversation = bot.handle_inbound(message).await?;
            println!("{}", serde_json::to_string_pretty(&conversation)?);
            Ok(())
        }
        Command::Send { to, text } => bot.send_text(&to, &text).await,
    }
}

fn init_tracing(debug: bool) {
    let default_directives = if debug {
        "converse=debug,tower_http=debug"
    } else {
        "converse=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
