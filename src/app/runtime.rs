use super::orchestrator::ShutdownSlot;
use super::{FieldcamApp, ShutdownReason};
use crate::error::{FieldcamError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// First caller wins; later requests find the slot empty.
pub(super) async fn request_shutdown(slot: &ShutdownSlot, reason: ShutdownReason) {
    if let Some(sender) = slot.lock().await.take() {
        let _ = sender.send(reason);
    }
}

impl FieldcamApp {
    /// Block until something asks for shutdown, then run the ordered
    /// stop sequence. Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Fieldcam system is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FieldcamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let reason = shutdown_receiver
            .await
            .map_err(|_| FieldcamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await?;

        info!("Fieldcam shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (service manager stop) - Unix only
        #[cfg(unix)]
        {
            let slot = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                if let Some(()) = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await
                {
                    info!("Received SIGTERM signal");
                    request_shutdown(&slot, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        // SIGINT (Ctrl+C)
        let slot = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                request_shutdown(&slot, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }
}
