//! lanbox sender: entry point.
//!
//! ```text
//! lanbox-sender                          Connect using lanbox-sender.toml or defaults
//! lanbox-sender --address 192.168.1.20   Override the receiver address
//! lanbox-sender --name alice a.pdf b.zip Register as alice and send two files
//! lanbox-sender --text "hello"           Send a text message
//! lanbox-sender --gen-config             Write default config to stdout
//! ```
//!
//! After the command-line files are sent, further file paths are read
//! from stdin, one per line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanbox_core::{Requester, TracingResponses};
use lanbox_sender::config::SenderConfig;
use lanbox_sender::session;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lanbox-sender", about = "Send files and text to a lanbox receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lanbox-sender.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Receiver IP address or host name.
    #[arg(short, long)]
    address: Option<String>,

    /// Receiver TCP port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Username to register; prompted for when omitted.
    #[arg(short, long)]
    name: Option<String>,

    /// Text message to send before any file (repeatable).
    #[arg(short, long)]
    text: Vec<String>,

    /// Files to send.
    files: Vec<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.network.receiver_address = address;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lanbox-sender v{}", env!("CARGO_PKG_VERSION"));

    let mut requester =
        Requester::connect(config.receiver_addr(), config.to_requester_config()).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let Some(name) = session::register(&mut requester, cli.name, &mut input).await? else {
        requester.close().await;
        return Ok(());
    };
    println!("Connected to receiver as {name}");
    requester.start_polling(Arc::new(TracingResponses))?;

    let outcome = tokio::select! {
        sent = session::send_all(&requester, &cli.text, &cli.files, &mut input) => sent,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, closing");
            Ok(())
        }
    };

    requester.close().await;
    println!("Closing sender");
    outcome?;
    Ok(())
}
