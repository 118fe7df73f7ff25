//! pgnotify – listen on a PostgreSQL notification channel, or send to one.
//
//  $ pgnotify listen --channel orders
//  Received notification: created:42
//  $ pgnotify notify --channel orders created:42
use std::pin::pin;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pgnotify::config::Config;
use pgnotify::logging::init_logging;
use pgnotify::store::postgres::{send_notification, PgConnector};
use pgnotify::listen_with;

#[derive(Debug, Parser)]
#[command(name = "pgnotify", version, about = "Resilient PostgreSQL LISTEN/NOTIFY client")]
struct Cli {
    /// Path to config TOML (env PGNOTIFY_CONFIG is used when omitted)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Connection string, overriding config and CONNECTION_STRING
    #[arg(long, global = true)]
    connection: Option<String>,

    /// Channel name, overriding config and CHANNEL_NAME
    #[arg(long, global = true)]
    channel: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every notification on the channel until Ctrl+C.
    Listen,
    /// Send one notification to the channel.
    Notify {
        /// Payload (enclose in quotes for spaces)
        payload: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let cfg: Config = Config::load_unvalidated(cli.config.as_deref())?
        .with_overrides(cli.connection, cli.channel);
    cfg.validate()?;

    match cli.cmd {
        Command::Listen => run_listener(cfg).await?,
        Command::Notify { payload } => {
            send_notification(&cfg.connection_string, &cfg.channel, &payload).await?;
            println!("Sent notification on {}", cfg.channel);
        }
    }
    Ok(())
}

async fn run_listener(cfg: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl+C, stopping");
                cancel.cancel();
            }
        })
    };

    let listener = listen_with(
        PgConnector::new(&cfg.connection_string),
        &cfg.channel,
        cfg.subscription_options(),
        cancel,
    );

    let mut notifications = pin!(listener.stream());
    while let Some(n) = notifications.next().await {
        println!("Received notification: {}", n.payload());
    }
    println!("Stop listening channel");

    listener.shutdown().await?;
    ctrl_c.abort();
    println!("Stop listening");
    Ok(())
}
