use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use mint_client::load_settings;
use tracing_subscriber::EnvFilter;

use backend_bridge::commands::BackendCommand;
use controller::events::UiEvent;
use ui::{MintGuiApp, StartupConfig};

#[derive(Parser, Debug)]
#[command(about = "Desktop front end for minting from the NFT collection")]
struct Args {
    /// Settings file; defaults to ./mint.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Wallet JSON-RPC endpoint, overriding the settings file.
    #[arg(long)]
    rpc_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = Some(rpc_url);
        settings.validate()?;
    }
    let startup = StartupConfig::from_settings(&settings);

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(1024);
    backend_bridge::runtime::launch(settings, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("My NFT Collection")
            .with_inner_size([720.0, 520.0])
            .with_min_inner_size([480.0, 360.0]),
        ..Default::default()
    };
    eframe::run_native(
        "My NFT Collection",
        options,
        Box::new(|_cc| Ok(Box::new(MintGuiApp::new(cmd_tx, ui_rx, startup)))),
    )
    .map_err(|err| anyhow::anyhow!("gui terminated: {err}"))
}
