//! Runtime bridge between UI command queue and backend event intake.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use mint_client::{ConnectionController, ControllerError, Settings};
use tokio::sync::broadcast;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let controller = match ConnectionController::from_settings(&settings) {
                Ok(controller) => controller,
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: {err:#}"),
                    )));
                    tracing::error!("failed to build controller: {err:#}");
                    return;
                }
            };

            let mut events = controller.subscribe_events();
            let events_tx = ui_tx.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            let _ = events_tx.try_send(UiEvent::Controller(event));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "ui event forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            while let Ok(cmd) = cmd_rx.recv() {
                let controller = Arc::clone(&controller);
                let ui_tx = ui_tx.clone();
                tokio::spawn(async move { run_command(&controller, cmd, &ui_tx).await });
            }
            tracing::debug!("ui command queue closed; backend worker exiting");
        });
    });
}

async fn run_command(
    controller: &ConnectionController,
    cmd: BackendCommand,
    ui_tx: &Sender<UiEvent>,
) {
    // Failures already reach the UI as controller events; only Busy is silent there.
    let result = match cmd {
        BackendCommand::CheckExistingConnection => {
            controller.check_existing_connection().await;
            Ok(())
        }
        BackendCommand::CheckNetwork => {
            controller.check_network_identity().await;
            Ok(())
        }
        BackendCommand::Connect => controller.request_connection().await.map(|_| ()),
        BackendCommand::Mint => controller.request_mint().await.map(|_| ()),
    };

    match result {
        Ok(()) => {}
        Err(err @ ControllerError::Busy(_)) => {
            let _ = ui_tx.try_send(UiEvent::Info(format!("Please wait: {err}")));
        }
        Err(err) => tracing::debug!(command = cmd.name(), "backend command failed: {err}"),
    }
}
