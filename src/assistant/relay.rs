//! # Assistant Relay Session
//!
//! One short-lived connection per prompt. The payload is sent as soon as the
//! connection opens; response chunks are appended to an accumulator in
//! arrival order and mirrored into the session's own assistant message after
//! every chunk. The end marker completes the session and freezes the trimmed
//! text.
//!
//! All transcript writes are gated by the session's [`WriteToken`]. Once a
//! newer exchange has started, late chunks from this session are discarded and
//! it resolves as [`CancelReason::Superseded`].

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transcript::{Transcript, WriteToken};
use crate::config::AssistantConfig;
use crate::error::TransportError;
use crate::transport::{Connector, MessageStream};

/// Lifecycle of a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayState::Completed | RelayState::Cancelled | RelayState::Errored
        )
    }
}

/// Why a session was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer prompt took over the transcript
    Superseded,
    /// `cancel()` was called
    Requested,
}

/// How a relay session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// End marker (or clean peer close) received; carries the final text
    Completed(String),
    Cancelled(CancelReason),
    Errored(TransportError),
}

/// Items of the partial-text stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// One chunk, exactly as received
    Chunk(String),
    EndOfStream,
    Error(TransportError),
    Cancelled(CancelReason),
}

/// Relay endpoint and wire conventions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    pub endpoint: String,
    /// Payload that marks the end of a response
    pub end_marker: String,
    /// Message text shown when the connection fails
    pub failure_notice: String,
}

impl From<&AssistantConfig> for RelayOptions {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            end_marker: config.end_marker.clone(),
            failure_notice: config.failure_notice.clone(),
        }
    }
}

/// Relay session, ready to send
pub struct RelaySession {
    connector: Arc<dyn Connector>,
    options: RelayOptions,
}

impl RelaySession {
    pub fn new(connector: Arc<dyn Connector>, options: RelayOptions) -> Self {
        Self { connector, options }
    }

    /// Open a connection, send `payload` and stream the response into the
    /// message `token` refers to
    ///
    /// Must be called from within a Tokio runtime.
    pub fn send(
        self,
        payload: String,
        transcript: Arc<Transcript>,
        token: WriteToken,
        cancel: CancellationToken,
    ) -> RelayHandle {
        let (state_tx, state_rx) = watch::channel(RelayState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let run = Run {
            session: self,
            transcript,
            token: token.clone(),
            cancel: cancel.clone(),
            state: state_tx,
            events: events_tx,
        };
        let task = tokio::spawn(run.execute(payload));

        RelayHandle {
            token,
            cancel,
            state: state_rx,
            events: events_rx,
            task,
            outcome: None,
        }
    }
}

struct Run {
    session: RelaySession,
    transcript: Arc<Transcript>,
    token: WriteToken,
    cancel: CancellationToken,
    state: watch::Sender<RelayState>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl Run {
    async fn execute(self, payload: String) -> RelayOutcome {
        let endpoint = self.session.options.endpoint.clone();
        self.state.send_replace(RelayState::Connecting);
        debug!("Relay connecting to {}", endpoint);

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.session.connector.connect(&endpoint) => Some(result),
        };

        let mut stream = match connected {
            None => return self.cancelled(),
            Some(Err(error)) => return self.errored(error),
            Some(Ok(stream)) => stream,
        };

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = stream.send_text(&payload) => Some(result),
        };

        match sent {
            None => {
                close_quietly(stream.as_mut()).await;
                return self.cancelled();
            }
            Some(Err(error)) => {
                close_quietly(stream.as_mut()).await;
                return self.errored(error);
            }
            Some(Ok(())) => {}
        }

        self.state.send_replace(RelayState::Streaming);
        debug!("Relay prompt sent ({} bytes), streaming response", payload.len());

        let mut accumulated = String::new();
        let mut chunks: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = stream.recv() => Some(result),
            };

            match next {
                None => {
                    close_quietly(stream.as_mut()).await;
                    return self.cancelled();
                }
                Some(Ok(Some(raw))) => {
                    let chunk = String::from_utf8_lossy(&raw);
                    if chunk == self.session.options.end_marker.as_str() {
                        close_quietly(stream.as_mut()).await;
                        return self.completed(&accumulated, chunks);
                    }

                    accumulated.push_str(&chunk);
                    if !self.transcript.update(&self.token, &accumulated) {
                        // A newer exchange owns the transcript now
                        close_quietly(stream.as_mut()).await;
                        return self.cancelled();
                    }
                    chunks += 1;
                    let _ = self.events.send(RelayEvent::Chunk(chunk.into_owned()));
                }
                Some(Ok(None)) => {
                    debug!("Relay peer closed without end marker");
                    return self.completed(&accumulated, chunks);
                }
                Some(Err(error)) => {
                    close_quietly(stream.as_mut()).await;
                    return self.errored(error);
                }
            }
        }
    }

    fn completed(&self, accumulated: &str, chunks: u64) -> RelayOutcome {
        let text = accumulated.trim().to_string();
        if !self.transcript.finish(&self.token, Some(&text)) {
            return self.cancelled();
        }
        self.state.send_replace(RelayState::Completed);
        let _ = self.events.send(RelayEvent::EndOfStream);
        info!("Assistant response complete ({} chunks, {} chars)", chunks, text.len());
        RelayOutcome::Completed(text)
    }

    fn cancelled(&self) -> RelayOutcome {
        // Cancellation is "stop listening": the message keeps its text
        let reason = if self.transcript.finish(&self.token, None) {
            CancelReason::Requested
        } else {
            CancelReason::Superseded
        };
        self.state.send_replace(RelayState::Cancelled);
        let _ = self.events.send(RelayEvent::Cancelled(reason));
        debug!("Relay session cancelled: {:?}", reason);
        RelayOutcome::Cancelled(reason)
    }

    fn errored(&self, error: TransportError) -> RelayOutcome {
        if !self
            .transcript
            .fail(&self.token, &self.session.options.failure_notice)
        {
            // The message belongs to a newer exchange now
            debug!("Relay error after supersession: {}", error);
            return self.cancelled();
        }
        warn!("Assistant relay failed: {}", error);
        self.state.send_replace(RelayState::Errored);
        let _ = self.events.send(RelayEvent::Error(error.clone()));
        RelayOutcome::Errored(error)
    }
}

async fn close_quietly(stream: &mut dyn MessageStream) {
    if let Err(e) = stream.close().await {
        debug!("Error while closing relay connection: {}", e);
    }
}

/// Handle to a running relay session
pub struct RelayHandle {
    token: WriteToken,
    cancel: CancellationToken,
    state: watch::Receiver<RelayState>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    task: JoinHandle<RelayOutcome>,
    outcome: Option<RelayOutcome>,
}

impl RelayHandle {
    /// Stop listening. Idempotent; the message keeps what it has.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }

    /// Write token of the assistant message this session fills
    pub fn token(&self) -> &WriteToken {
        &self.token
    }

    /// Next item of the partial-text stream, `None` once it is exhausted
    pub async fn next_event(&mut self) -> Option<RelayEvent> {
        self.events.recv().await
    }

    /// Wait for the session to end
    ///
    /// Can be wrapped in a timeout (followed by `cancel()`) and retried; the
    /// outcome is cached once available.
    pub async fn wait(&mut self) -> RelayOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => RelayOutcome::Errored(TransportError::Io(format!(
                "relay task ended abnormally: {}",
                e
            ))),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}
