use std::path::PathBuf;

use clap::Parser;

use tokio::sync::mpsc;

use swap_node::udp::UdpRadio;
use swap_node::{Node, NodeConfig};

#[derive(Parser)]
#[command(name = "swap-node", about = "SWAP wireless protocol node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/swap/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        swap_node::logging::init_json();
    } else {
        swap_node::logging::init();
    }

    let config = match NodeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    let (frames_tx, frames_rx) = mpsc::channel(1024);
    let radio = match UdpRadio::bind(config.radio.port, &config.radio.broadcast, frames_tx) {
        Ok(radio) => radio,
        Err(e) => {
            eprintln!("failed to bind radio port {}: {e}", config.radio.port);
            std::process::exit(1);
        }
    };

    let node = match Node::new(config, Box::new(radio), frames_rx) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("failed to initialize node: {e}");
            std::process::exit(1);
        }
    };
    let handle = node.handle();

    // Spawn signal handler
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
        handle.shutdown();
    });

    node.run().await;
}
