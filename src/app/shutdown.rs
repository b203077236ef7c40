use super::FieldcamApp;
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl FieldcamApp {
    /// Stop everything in dependency order: terminal input first, the
    /// service loops next, the camera last so the active segment closes
    /// cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        if let Some(keyboard) = self.keyboard.take() {
            keyboard.stop().await;
        }

        self.cancellation_token.cancel();

        for task in self.tasks.drain(..) {
            match timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    error!("Service task failed during shutdown: {}", error);
                    exit_code = 1;
                }
                Err(_) => {
                    error!("Service task did not stop in time");
                    exit_code = 1;
                }
            }
        }

        let mut controller = self.controller.lock().await;
        if timeout(Duration::from_secs(10), controller.release())
            .await
            .is_err()
        {
            warn!("Camera release timed out");
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
