//! # Assistant Module
//!
//! Chat relay to the assistant backend.
//!
//! This module handles:
//! - Injecting the latest telemetry into outgoing prompts
//! - Streaming and reassembling responses into the transcript
//! - Keeping exactly one relay session live at a time
//! - Recording prompt history

pub mod context;
pub mod relay;
pub mod transcript;

use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AssistantConfig;
use crate::error::{AgriLinkError, Result};
use crate::telemetry::TelemetryStore;
use crate::transport::Connector;

pub use context::ContextInjector;
pub use relay::{CancelReason, RelayEvent, RelayHandle, RelayOptions, RelayOutcome, RelayState};
pub use transcript::{ChatMessage, MessageId, PromptHistory, Role, Transcript};

/// Front door for sending prompts
///
/// Owns the transcript and prompt history, and guarantees that at most one
/// relay session writes to the transcript at any time.
pub struct Assistant {
    connector: Arc<dyn Connector>,
    options: RelayOptions,
    injector: ContextInjector,
    telemetry: Arc<TelemetryStore>,
    transcript: Arc<Transcript>,
    prompts: Arc<PromptHistory>,
    live: Mutex<Option<CancellationToken>>,
}

impl Assistant {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: RelayOptions,
        injector: ContextInjector,
        telemetry: Arc<TelemetryStore>,
    ) -> Self {
        Self {
            connector,
            options,
            injector,
            telemetry,
            transcript: Arc::new(Transcript::new()),
            prompts: Arc::new(PromptHistory::new()),
            live: Mutex::new(None),
        }
    }

    pub fn from_config(
        connector: Arc<dyn Connector>,
        config: &AssistantConfig,
        telemetry: Arc<TelemetryStore>,
    ) -> Self {
        Self::new(
            connector,
            RelayOptions::from(config),
            ContextInjector::new(config.persona.clone()),
            telemetry,
        )
    }

    /// Send a prompt, superseding any session still streaming
    ///
    /// The prompt is recorded before any I/O, so it stays in the history even
    /// if the relay fails. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AgriLinkError::EmptyPrompt`] if the prompt is blank.
    pub fn send(&self, prompt: &str) -> Result<RelayHandle> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AgriLinkError::EmptyPrompt);
        }

        self.prompts.record(prompt);
        let payload = self
            .injector
            .build_payload(prompt, self.telemetry.latest().as_ref());

        // Bumping the generation and swapping the live session happen under one
        // lock, so concurrent sends cannot cancel the newest session
        let cancel = CancellationToken::new();
        let token = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            let token = self.transcript.begin_exchange(prompt);
            if let Some(previous) = live.replace(cancel.clone()) {
                if !previous.is_cancelled() {
                    debug!("Superseding previous relay session");
                }
                previous.cancel();
            }
            token
        };

        info!("Sending prompt ({} chars) to {}", prompt.len(), self.options.endpoint);
        let session = relay::RelaySession::new(self.connector.clone(), self.options.clone());
        Ok(session.send(payload, self.transcript.clone(), token, cancel))
    }

    /// Cancel the live session, if any. Idempotent.
    pub fn cancel(&self) {
        if let Some(live) = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            live.cancel();
        }
    }

    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    pub fn prompts(&self) -> &Arc<PromptHistory> {
        &self.prompts
    }

    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        &self.telemetry
    }
}
