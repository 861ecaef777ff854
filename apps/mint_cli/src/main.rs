use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mint_client::{
    load_settings, mint_progress_line, ConnectionController, ControllerEvent, NetworkCheck,
    Notice,
};
use shared::error::ErrorCode;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Slack on top of one log poll interval when waiting for the minted notice.
const MINTED_NOTICE_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(about = "Connect a wallet and mint from the NFT collection")]
struct Args {
    /// Settings file; defaults to ./mint.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Wallet JSON-RPC endpoint, overriding the settings file.
    #[arg(long)]
    rpc_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Show the authorized account, network and mint count.
    Status,
    /// Ask the wallet to authorize an account.
    Connect,
    /// Mint one token, wait for confirmation and for the minted notice.
    ///
    /// The notice arrives with the next log poll; if it does not show up in
    /// time, run `watch` to keep listening.
    Mint,
    /// Print minted-token notices until interrupted.
    Watch,
}

fn print_notices(events: &mut broadcast::Receiver<ControllerEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            ControllerEvent::Notice(notice) => println!("! {}", notice.message()),
            ControllerEvent::OperationFailed { operation, error } => {
                println!("{} failed: {}", operation.label(), error.message)
            }
            _ => {}
        }
    }
}

/// Waits for the first TokenMinted notice, printing anything else that
/// arrives meanwhile.
async fn await_minted_notice(
    events: &mut broadcast::Receiver<ControllerEvent>,
    wait: Duration,
) -> bool {
    let found = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(ControllerEvent::Notice(notice @ Notice::TokenMinted { .. })) => {
                    println!("! {}", notice.message());
                    return true;
                }
                Ok(ControllerEvent::Notice(notice)) => println!("! {}", notice.message()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    })
    .await;
    found.unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = Some(rpc_url);
        settings.validate()?;
    }

    let controller = ConnectionController::from_settings(&settings)?;
    let mut events = controller.subscribe_events();

    if let NetworkCheck::Mismatch { .. } = controller.check_network_identity().await {
        print_notices(&mut events);
    }

    match args.command {
        Command::Status => {
            controller.check_existing_connection().await;
            println!(
                "Expected network: {}",
                controller.settings().expected_chain_id
            );
        }
        Command::Connect => {
            controller.check_existing_connection().await;
            let result = controller.request_connection().await;
            print_notices(&mut events);
            let account = result?;
            info!("cli: connect finished account={account}");
            println!("Connected {account}");
        }
        Command::Mint => {
            controller.check_existing_connection().await;
            let result = controller.request_mint().await;
            print_notices(&mut events);
            let receipt = match result {
                Ok(receipt) => receipt,
                Err(err) if err.code() == ErrorCode::UserRejected => {
                    info!("cli: mint cancelled in wallet");
                    bail!("mint cancelled in wallet");
                }
                Err(err) => return Err(err.into()),
            };
            println!(
                "Mined, see transaction: {}",
                mint_client::explorer_tx_url(
                    &controller.settings().explorer_tx_base_url,
                    &receipt.tx_hash
                )
            );

            let wait = Duration::from_millis(settings.log_poll_interval_ms) + MINTED_NOTICE_GRACE;
            if !await_minted_notice(&mut events, wait).await {
                warn!("cli: minted notice not seen within {wait:?}");
                println!("The minted notice has not arrived yet; run `watch` to keep listening.");
            }
        }
        Command::Watch => {
            if controller.check_existing_connection().await.is_none() {
                bail!("no authorized account; run `connect` first");
            }
            println!("Watching for minted tokens, press Ctrl-C to stop");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(ControllerEvent::Notice(notice)) => println!("! {}", notice.message()),
                        Ok(ControllerEvent::MintCountUpdated(count)) => {
                            println!("{}", mint_progress_line(count, settings.total_supply));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("cli: watch stopped");
            return Ok(());
        }
    }

    print_notices(&mut events);
    let snapshot = controller.snapshot().await;
    match &snapshot.account {
        Some(account) => println!("Account: {account}"),
        None => println!("Account: not connected"),
    }
    println!(
        "{}",
        mint_progress_line(snapshot.mint_count, settings.total_supply)
    );
    println!("Collection: {}", settings.collection_url);

    Ok(())
}

#[cfg(test)]
mod tests {
    use shared::domain::{Address, TokenId};

    use super::*;

    #[tokio::test]
    async fn minted_notice_wait_skips_other_events() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(ControllerEvent::MintCountUpdated(3)).expect("send");
        tx.send(ControllerEvent::Notice(Notice::TokenMinted {
            owner: Address::new("0xABC"),
            token_id: TokenId(3),
            asset_url: "https://testnets.opensea.io/assets/0xf14a/3".to_string(),
        }))
        .expect("send");

        assert!(await_minted_notice(&mut rx, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn minted_notice_wait_gives_up_after_the_deadline() {
        let (tx, mut rx) = broadcast::channel::<ControllerEvent>(8);
        tx.send(ControllerEvent::Notice(Notice::WalletMissing))
            .expect("send");

        assert!(!await_minted_notice(&mut rx, Duration::from_millis(50)).await);
    }
}
