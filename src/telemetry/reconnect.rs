//! # Telemetry Reconnection
//!
//! Owner-side restart policy for the telemetry session. The session reports
//! `Faulted` and stops; [`supervise`] decides whether and when to start a new
//! one.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{SessionOutcome, TelemetrySession, TelemetryStore};
use crate::config::ReconnectConfig;
use crate::transport::Connector;

/// Exponential backoff between reconnection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Consecutive failed attempts allowed, `None` for unlimited
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Policy that never reconnects
    pub fn never() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts: Some(0),
        }
    }

    /// Delay before retry number `attempt` (1-based), `None` once exhausted
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use agri_rover_link::telemetry::reconnect::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy {
    ///     initial_backoff: Duration::from_millis(500),
    ///     max_backoff: Duration::from_secs(2),
    ///     max_attempts: Some(4),
    /// };
    /// assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
    /// assert_eq!(policy.delay_for(3), Some(Duration::from_secs(2)));
    /// assert_eq!(policy.delay_for(5), None);
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let exponent = (attempt - 1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max_backoff))
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        if !config.enabled {
            return Self::never();
        }
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
        }
    }
}

/// Keep a telemetry session running against `endpoint`
///
/// Starts a session, and each time it faults waits according to `policy`
/// before starting another. A session that received at least one frame
/// resets the attempt counter. Returns when `shutdown` is cancelled or the
/// policy gives up, with the last session's outcome.
pub async fn supervise(
    connector: Arc<dyn Connector>,
    endpoint: &str,
    store: Arc<TelemetryStore>,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
) -> SessionOutcome {
    let mut attempt: u32 = 0;

    loop {
        let mut handle = TelemetrySession::new(connector.clone(), store.clone())
            .start_with_token(endpoint, shutdown.child_token());
        let outcome = handle.wait().await;

        if shutdown.is_cancelled() {
            return outcome;
        }

        let error = match &outcome {
            SessionOutcome::Closed { .. } => return outcome,
            SessionOutcome::Faulted { error, .. } => error.clone(),
        };

        if outcome.frames_received() > 0 {
            attempt = 0;
        }
        attempt += 1;

        let delay = match policy.delay_for(attempt) {
            Some(delay) => delay,
            None => {
                warn!(
                    "Giving up on telemetry feed {} after {} attempts: {}",
                    endpoint,
                    attempt - 1,
                    error
                );
                return outcome;
            }
        };

        info!(
            "Telemetry feed {} faulted ({}), reconnecting in {:?} (attempt {})",
            endpoint, error, delay, attempt
        );

        tokio::select! {
            _ = shutdown.cancelled() => return outcome,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::mocks::{scripted, ScriptedConnector};

    const ENDPOINT: &str = "ws://rover.local/ws";

    fn fast_policy(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for(1000), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_never_policy() {
        assert_eq!(ReconnectPolicy::never().delay_for(1), None);
    }

    #[test]
    fn test_policy_from_config() {
        let config = ReconnectConfig {
            enabled: true,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            max_attempts: 0,
        };
        let policy = ReconnectPolicy::from(&config);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, None);

        let disabled = ReconnectConfig {
            enabled: false,
            ..config
        };
        assert_eq!(ReconnectPolicy::from(&disabled), ReconnectPolicy::never());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let connector = Arc::new(ScriptedConnector::new());
        let store = Arc::new(TelemetryStore::new(10));

        let outcome = supervise(
            connector.clone(),
            ENDPOINT,
            store,
            fast_policy(Some(2)),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            SessionOutcome::Faulted {
                error: TransportError::ConnectFailed { .. },
                ..
            }
        ));
        // Initial attempt plus two retries
        assert_eq!(connector.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_reconnects_after_peer_close() {
        let connector = Arc::new(ScriptedConnector::new());
        let store = Arc::new(TelemetryStore::new(10));

        let (first, first_feed, _) = scripted();
        let (second, second_feed, _) = scripted();
        connector.push_stream(first);
        connector.push_stream(second);

        first_feed.frame(r#"{"temperature": 1}"#);
        first_feed.peer_close();
        second_feed.frame(r#"{"temperature": 2}"#);
        second_feed.peer_close();

        let outcome = supervise(
            connector.clone(),
            ENDPOINT,
            store.clone(),
            fast_policy(Some(1)),
            CancellationToken::new(),
        )
        .await;

        // Two good sessions, then one failed connect exhausts the single retry
        assert_eq!(connector.connect_count(), 3);
        assert!(matches!(outcome, SessionOutcome::Faulted { .. }));
        let temps: Vec<_> = store.snapshot().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![Some(1.0), Some(2.0)]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_session() {
        let connector = Arc::new(ScriptedConnector::new());
        let store = Arc::new(TelemetryStore::new(10));
        let (stream, _feed, log) = scripted();
        connector.push_stream(stream);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervise(
            connector.clone(),
            ENDPOINT,
            store,
            fast_policy(None),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Closed { .. }));
        assert_eq!(log.close_count(), 1);
        assert_eq!(connector.connect_count(), 1);
    }
}
