//! Command orchestration helpers from UI actions to backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) {
    let cmd_name = cmd.name();
    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued ui->backend command"),
        Err(TrySendError::Full(_)) => {
            *status = "UI command queue is full; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status =
                "Backend command processor disconnected (possible startup/runtime failure); restart the app"
                    .to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn queued_command_leaves_status_alone() {
        let (tx, rx) = bounded(1);
        let mut status = "ready".to_string();
        dispatch_backend_command(&tx, BackendCommand::Mint, &mut status);
        assert_eq!(status, "ready");
        assert_eq!(rx.try_recv().ok(), Some(BackendCommand::Mint));
    }

    #[test]
    fn full_queue_is_reported_in_status() {
        let (tx, _rx) = bounded(1);
        let mut status = String::new();
        dispatch_backend_command(&tx, BackendCommand::CheckNetwork, &mut status);
        dispatch_backend_command(&tx, BackendCommand::Connect, &mut status);
        assert!(status.contains("queue is full"));
    }

    #[test]
    fn disconnected_backend_is_reported_in_status() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let mut status = String::new();
        dispatch_backend_command(&tx, BackendCommand::Connect, &mut status);
        assert!(status.contains("disconnected"));
    }
}
