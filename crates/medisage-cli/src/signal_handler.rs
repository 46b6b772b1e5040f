//! Ctrl+C handling for streaming commands

use futures::stream::StreamExt;
use medisage_core::error::RelayResult;
use signal_hook::consts::SIGINT;
use signal_hook_tokio::{Handle, Signals};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels a session token when SIGINT arrives
pub struct SignalHandler {
    handle: Handle,
    task: JoinHandle<()>,
}

impl SignalHandler {
    /// Start listening; the first Ctrl+C cancels `token`
    pub fn start(token: CancellationToken) -> RelayResult<Self> {
        let mut signals = Signals::new([SIGINT])?;
        let handle = signals.handle();

        let task = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                if signal == SIGINT {
                    eprintln!("\nInterrupting session... (Ctrl+C)");
                    token.cancel();
                    break;
                }
            }
        });

        Ok(Self { handle, task })
    }

    /// Stop listening
    pub async fn stop(self) {
        self.handle.close();
        let _ = self.task.await;
    }
}
