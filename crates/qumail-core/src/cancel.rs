//! Cancellation and time budgets for calls to external collaborators

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

/// Cooperative cancellation signal shared between a caller and an operation
///
/// Clones observe the same signal. Once cancelled, a token stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options for orchestrator operations
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Budget for each external call; the configured default when `None`
    pub timeout: Option<Duration>,
    /// Cancellation signal
    pub cancel: Option<CancelToken>,
}

impl CallOptions {
    /// Options with no overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the external call budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Run an external call under the time budget and cancellation signal
    ///
    /// Whatever the call would have produced is dropped on timeout or
    /// cancellation.
    pub(crate) async fn guard<F, T>(&self, what: &str, default_timeout: Duration, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let budget = self.timeout.unwrap_or(default_timeout);
        let timed = tokio::time::timeout(budget, call);

        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(call = what, "external call cancelled");
                    return Err(Error::Cancelled);
                }
                outcome = timed => outcome,
            },
            None => timed.await,
        };

        match outcome {
            Ok(result) => result,
            Err(_) => {
                debug!(call = what, budget_ms = budget.as_millis() as u64, "external call timed out");
                Err(Error::Timeout(format!("{} exceeded {} ms", what, budget.as_millis())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let options = CallOptions::new();
        let value = options
            .guard("lookup", Duration::from_secs(1), async { Ok::<_, Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_times_out() {
        let options = CallOptions::new().with_timeout(Duration::from_millis(50));
        let err = options
            .guard("fetch", Duration::from_secs(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_observes_cancel() {
        let token = CancelToken::new();
        let options = CallOptions::new().with_cancel(token.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = options
            .guard("fetch", Duration::from_secs(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        trigger.await.unwrap();
    }

    #[test]
    fn test_check() {
        let token = CancelToken::new();
        let options = CallOptions::new().with_cancel(token.clone());
        assert!(options.check().is_ok());
        token.cancel();
        assert!(matches!(options.check(), Err(Error::Cancelled)));
    }
}
