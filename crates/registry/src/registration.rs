use std::time::Duration;

use framesink_protocol::messages::RegisterSinkRequest;
use tokio_util::sync::CancellationToken;

use crate::directory::Directory;

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationStats {
    pub attempts: u32,
    pub successes: u32,
    pub unregistered: bool,
}

/// Periodic heartbeat to the directory service.
///
/// Failures are logged and retried on the next tick; they never stop
/// the sink.
pub struct RegistrationLoop<D: Directory> {
    directory: D,
    request: RegisterSinkRequest,
    interval: Duration,
}

impl<D: Directory> RegistrationLoop<D> {
    pub fn new(directory: D, request: RegisterSinkRequest, interval: Duration) -> Self {
        Self {
            directory,
            request,
            interval,
        }
    }

    /// Registers every `interval` until `cancel` fires, then unregisters
    /// once if any registration succeeded.
    pub async fn run(self, cancel: CancellationToken) -> RegistrationStats {
        let mut stats = RegistrationStats::default();
        tracing::info!(
            id = %self.request.id,
            address = %self.request.address,
            interval_secs = self.interval.as_secs(),
            "registration loop started"
        );

        loop {
            stats.attempts += 1;
            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.directory.register(&self.request) => result,
            };
            match attempt {
                Ok(()) => {
                    if stats.successes == 0 {
                        tracing::info!(id = %self.request.id, "registered with directory");
                    } else {
                        tracing::debug!(id = %self.request.id, "registration renewed");
                    }
                    stats.successes += 1;
                }
                Err(e) => {
                    tracing::warn!(id = %self.request.id, error = %e, "registration failed; will retry");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        if stats.successes > 0 {
            match self.directory.unregister(&self.request).await {
                Ok(()) => {
                    stats.unregistered = true;
                    tracing::info!(id = %self.request.id, "unregistered from directory");
                }
                Err(e) => {
                    tracing::warn!(id = %self.request.id, error = %e, "unregister failed");
                }
            }
        }
        stats
    }
}
