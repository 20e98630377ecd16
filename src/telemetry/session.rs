//! # Telemetry Session
//!
//! Owns one persistent connection to the sensor feed. Every inbound frame is
//! decoded and recorded into the [`TelemetryStore`]; malformed frames are
//! logged and dropped.
//!
//! The session never reconnects on its own. A transport error or unexpected
//! close ends it in [`SessionState::Faulted`] and the outcome is reported to
//! the owner (see [`super::reconnect::supervise`]).
//!
//! Precondition: at most one session per sensor endpoint. Running duplicates
//! against the same store is a caller error.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::decode;
use super::history::{HistoryBuffer, SeriesPoint};
use super::reading::{Metric, Reading};
use crate::error::TransportError;
use crate::transport::{Connector, MessageStream};

/// Lifecycle of a telemetry session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// Connected and receiving frames
    Open,
    /// Stopped by the owner
    Closed,
    /// Transport failed or the peer went away
    Faulted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Faulted)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `stop()` was called
    Closed { frames_received: u64 },
    /// Connection failed, errored or was closed by the peer
    Faulted {
        error: TransportError,
        frames_received: u64,
    },
}

impl SessionOutcome {
    pub fn frames_received(&self) -> u64 {
        match self {
            SessionOutcome::Closed { frames_received }
            | SessionOutcome::Faulted { frames_received, .. } => *frames_received,
        }
    }
}

/// Latest reading cache plus rolling history
///
/// Written only by the telemetry session; readers never block the writer for
/// longer than a copy.
#[derive(Debug)]
pub struct TelemetryStore {
    latest: watch::Sender<Option<Reading>>,
    history: HistoryBuffer,
}

impl TelemetryStore {
    pub fn new(history_capacity: usize) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            history: HistoryBuffer::new(history_capacity),
        }
    }

    /// Append to history, then replace the cached latest reading as a whole
    pub(crate) fn record(&self, reading: Reading) {
        self.history.append(reading);
        self.latest.send_replace(Some(reading));
    }

    /// Most recent reading, `None` before the first frame
    pub fn latest(&self) -> Option<Reading> {
        *self.latest.borrow()
    }

    /// Observe changes of the latest reading
    pub fn subscribe(&self) -> watch::Receiver<Option<Reading>> {
        self.latest.subscribe()
    }

    /// Retained readings, oldest first
    pub fn snapshot(&self) -> Vec<Reading> {
        self.history.snapshot()
    }

    /// One metric over the retained readings, oldest first
    pub fn series(&self, metric: Metric) -> Vec<SeriesPoint> {
        self.history.series(metric)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }
}

/// Telemetry session, ready to start
pub struct TelemetrySession {
    connector: Arc<dyn Connector>,
    store: Arc<TelemetryStore>,
}

impl TelemetrySession {
    pub fn new(connector: Arc<dyn Connector>, store: Arc<TelemetryStore>) -> Self {
        Self { connector, store }
    }

    /// Spawn the session against `endpoint`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self, endpoint: &str) -> TelemetryHandle {
        self.start_with_token(endpoint, CancellationToken::new())
    }

    /// Spawn the session with a caller-provided stop token
    ///
    /// Passing a child of a shutdown token stops the session together with
    /// its owner.
    pub fn start_with_token(self, endpoint: &str, cancel: CancellationToken) -> TelemetryHandle {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let endpoint = endpoint.to_string();
        let task = tokio::spawn(self.run(endpoint, cancel.clone(), state_tx));

        TelemetryHandle {
            cancel,
            state: state_rx,
            task,
            outcome: None,
        }
    }

    async fn run(
        self,
        endpoint: String,
        cancel: CancellationToken,
        state: watch::Sender<SessionState>,
    ) -> SessionOutcome {
        debug!("Telemetry session connecting to {}", endpoint);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.connector.connect(&endpoint) => Some(result),
        };

        let mut stream = match connected {
            None => {
                state.send_replace(SessionState::Closed);
                return SessionOutcome::Closed { frames_received: 0 };
            }
            Some(Err(error)) => {
                warn!("Telemetry connection to {} failed: {}", endpoint, error);
                state.send_replace(SessionState::Faulted);
                return SessionOutcome::Faulted {
                    error,
                    frames_received: 0,
                };
            }
            Some(Ok(stream)) => stream,
        };

        state.send_replace(SessionState::Open);
        info!("Telemetry session open on {}", endpoint);

        let mut frames_received: u64 = 0;
        let mut dropped: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = stream.recv() => Some(result),
            };

            match next {
                None => {
                    close_quietly(stream.as_mut(), &endpoint).await;
                    state.send_replace(SessionState::Closed);
                    info!(
                        "Telemetry session on {} stopped after {} frames ({} dropped)",
                        endpoint, frames_received, dropped
                    );
                    return SessionOutcome::Closed { frames_received };
                }
                Some(Ok(Some(raw))) => {
                    frames_received += 1;
                    match decode(&raw) {
                        Ok(reading) => {
                            debug!("Reading {}: rain {}", frames_received, reading.rain_prediction);
                            self.store.record(reading);
                        }
                        Err(e) => {
                            dropped += 1;
                            warn!("Dropping telemetry frame from {}: {}", endpoint, e);
                        }
                    }
                }
                Some(Ok(None)) => {
                    warn!("Telemetry feed {} closed by peer", endpoint);
                    state.send_replace(SessionState::Faulted);
                    return SessionOutcome::Faulted {
                        error: TransportError::Closed,
                        frames_received,
                    };
                }
                Some(Err(error)) => {
                    warn!("Telemetry feed {} failed: {}", endpoint, error);
                    close_quietly(stream.as_mut(), &endpoint).await;
                    state.send_replace(SessionState::Faulted);
                    return SessionOutcome::Faulted {
                        error,
                        frames_received,
                    };
                }
            }
        }
    }
}

async fn close_quietly(stream: &mut dyn MessageStream, endpoint: &str) {
    if let Err(e) = stream.close().await {
        debug!("Error while closing {}: {}", endpoint, e);
    }
}

/// Handle to a running telemetry session
pub struct TelemetryHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionOutcome>,
    outcome: Option<SessionOutcome>,
}

impl TelemetryHandle {
    /// Stop the session and close its transport
    ///
    /// Idempotent and safe from any state, including while a receive is in
    /// flight.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the session to end
    ///
    /// Can be wrapped in a timeout and retried; the outcome is cached once
    /// available.
    pub async fn wait(&mut self) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => SessionOutcome::Faulted {
                error: TransportError::Io(format!("telemetry task ended abnormally: {}", e)),
                frames_received: 0,
            },
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}
