//! lanbox receiver: entry point.
//!
//! ```text
//! lanbox-receiver                       Listen with lanbox-receiver.toml or defaults
//! lanbox-receiver --config <path>       Load a custom config TOML
//! lanbox-receiver --port 6000           Override the listening port
//! lanbox-receiver --download-dir <dir>  Override where files are saved
//! lanbox-receiver --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanbox_receiver::config::ReceiverConfig;
use lanbox_receiver::service::ReceiverService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lanbox-receiver", about = "Receive files and text from a LAN sender")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lanbox-receiver.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory received files are written to.
    #[arg(short, long)]
    download_dir: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(dir) = cli.download_dir {
        config.storage.download_dir = dir;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lanbox-receiver v{}", env!("CARGO_PKG_VERSION"));
    if let Some(timeout) = config.idle_timeout() {
        info!("idle timeout: {timeout:?}");
    }

    let service = ReceiverService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await?;

    Ok(())
}
