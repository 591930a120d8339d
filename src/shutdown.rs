use anyhow::{Context, Result};

/// Waits for Ctrl-C, or SIGTERM on unix.
///
/// Handlers are installed in `new`, so a signal arriving before `wait` is
/// polled is not lost and does not kill the process.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        Ok(Self { terminate })
    }

    #[cfg(not(unix))]
    pub fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    pub async fn wait(&mut self) -> Result<()> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C"),
            _ = self.terminate.recv() => {
                tracing::info!("Received SIGTERM");
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn wait(&mut self) -> Result<()> {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_ends_wait() {
        let mut signal = ShutdownSignal::new().unwrap();

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let result = tokio::time::timeout(Duration::from_secs(5), signal.wait()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
