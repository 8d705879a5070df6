// Copyright (c) 2025 - Cowboy AI, Inc.
//! Startup action: connect to eventd at application boot
//!
//! The action is skipped when the host runs as a CLI command or when the
//! options disable eventd. Otherwise it attempts to connect, and on a
//! retryable failure logs a warning and waits a fixed interval (5 seconds)
//! before the next attempt. There is no attempt limit and no backoff
//! growth. Misconfiguration such as an invalid NKey ends the loop with the
//! error instead of retrying.
//!
//! [`StartupAction::run_until_cancelled`] lets the host abandon the loop
//! during shutdown; [`StartupAction::run`] never gives up.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::EventdClient;
use crate::errors::{EventdError, EventdResult};
use crate::options::EventdOptions;
use crate::state_machine::{AttemptOutcome, ConnectionLifecycle, LifecycleOutput, StateMachine};

/// Wait between failed connect attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// How the host application is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostMode {
    /// Long-running service; eventd is connected at boot
    #[default]
    Service,
    /// One-shot CLI command; eventd is not connected
    Cli,
}

/// Something that can make a single connection attempt
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> EventdResult<()>;
}

#[async_trait]
impl Connector for EventdClient {
    async fn connect(&self) -> EventdResult<()> {
        EventdClient::connect(self).await
    }
}

/// Why the startup action did not attempt to connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CliMode,
    Disabled,
}

/// How the startup action finished. `attempts` counts completed connect
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    Skipped(SkipReason),
    Connected { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Retry-until-connected startup action
#[derive(Debug)]
pub struct StartupAction<C> {
    connector: C,
    mode: HostMode,
    disabled: bool,
    retry_interval: Duration,
}

impl StartupAction<EventdClient> {
    /// Startup action for a client, honouring its `disabled` option
    pub fn for_client(client: EventdClient, mode: HostMode) -> Self {
        let disabled = client.is_disabled();
        Self {
            connector: client,
            mode,
            disabled,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl<C: Connector> StartupAction<C> {
    pub fn new(connector: C, options: &EventdOptions, mode: HostMode) -> Self {
        Self {
            connector,
            mode,
            disabled: options.disabled(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the wait between failed attempts
    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Connect, retrying until the first success.
    pub async fn run(&self) -> EventdResult<StartupOutcome> {
        self.drive(None).await
    }

    /// Like [`run`](Self::run), but returns [`StartupOutcome::Cancelled`] as
    /// soon as `token` is cancelled, whether mid-attempt or mid-wait.
    pub async fn run_until_cancelled(
        &self,
        token: CancellationToken,
    ) -> EventdResult<StartupOutcome> {
        self.drive(Some(&token)).await
    }

    /// Run on a dedicated task so boot does not block on the server.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<EventdResult<StartupOutcome>>
    where
        C: 'static,
    {
        tokio::spawn(async move { self.run_until_cancelled(token).await })
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        if self.mode == HostMode::Cli {
            Some(SkipReason::CliMode)
        } else if self.disabled {
            Some(SkipReason::Disabled)
        } else {
            None
        }
    }

    async fn drive(&self, cancel: Option<&CancellationToken>) -> EventdResult<StartupOutcome> {
        if let Some(reason) = self.skip_reason() {
            match reason {
                SkipReason::CliMode => debug!("Running as CLI, eventd startup skipped"),
                SkipReason::Disabled => warn!("eventd.disabled is true, eventd client disabled"),
            }
            return Ok(StartupOutcome::Skipped(reason));
        }

        let mut state = ConnectionLifecycle::default();
        let mut attempts: u32 = 0;

        loop {
            debug!(attempt = attempts + 1, "Connecting to eventd server");

            let Some(result) = cancellable(cancel, self.connector.connect()).await else {
                info!(attempts, "eventd startup cancelled during connect");
                return Ok(StartupOutcome::Cancelled { attempts });
            };
            attempts = attempts.saturating_add(1);

            let outcome = match result {
                Ok(()) => AttemptOutcome::Succeeded,
                Err(err) if err.is_retryable() => {
                    warn!(
                        attempt = attempts,
                        retry_in_secs = self.retry_interval.as_secs_f64(),
                        error = %err,
                        "Unable to connect to eventd server, retrying"
                    );
                    AttemptOutcome::Failed
                }
                Err(err) => {
                    error!(attempt = attempts, error = %err, "eventd startup aborted");
                    return Err(err);
                }
            };

            let (next, output) = state.transition(&outcome).map_err(EventdError::from)?;
            state = next;

            match output {
                LifecycleOutput::Done => {
                    info!(attempts, state = %state, "eventd startup complete");
                    return Ok(StartupOutcome::Connected { attempts });
                }
                LifecycleOutput::Retry => {
                    if cancellable(cancel, tokio::time::sleep(self.retry_interval))
                        .await
                        .is_none()
                    {
                        info!(attempts, "eventd startup cancelled while waiting to retry");
                        return Ok(StartupOutcome::Cancelled { attempts });
                    }
                }
            }
        }
    }
}

/// Await `future`, or return `None` first if `cancel` fires.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Connector that fails a fixed number of times, then succeeds
    struct FlakyConnector {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self) -> EventdResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(EventdError::Connection("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn flaky(failures: u32) -> (FlakyConnector, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            FlakyConnector {
                failures,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_cli_mode_skips_before_disabled_check() {
        let (connector, calls) = flaky(0);
        let options = EventdOptions::default().with_disabled(true);
        let action = StartupAction::new(connector, &options, HostMode::Cli);

        let outcome = action.run().await.unwrap();

        assert_eq!(outcome, StartupOutcome::Skipped(SkipReason::CliMode));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let (connector, calls) = flaky(0);
        let action = StartupAction::new(connector, &EventdOptions::default(), HostMode::Service);

        let outcome = action.run().await.unwrap();

        assert_eq!(outcome, StartupOutcome::Connected { attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let (connector, calls) = flaky(0);
        let action = StartupAction::new(connector, &EventdOptions::default(), HostMode::Service);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = action.run_until_cancelled(token).await.unwrap();

        assert_eq!(outcome, StartupOutcome::Cancelled { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_retry_interval() {
        let (connector, _) = flaky(0);
        let action = StartupAction::new(connector, &EventdOptions::default(), HostMode::Service);
        assert_eq!(action.retry_interval(), Duration::from_secs(5));
    }
}
