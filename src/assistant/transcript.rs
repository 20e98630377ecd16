//! # Conversation Transcript
//!
//! Append-only list of chat messages plus the prompt history.
//!
//! Each exchange owns exactly one assistant message. Writes to it go through a
//! [`WriteToken`] carrying the transcript generation at the time the exchange
//! began; opening a newer exchange bumps the generation, so a superseded relay
//! session can no longer touch anything.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Stable identifier of a message within one transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(u64);

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    /// No further writes will be accepted
    pub finalized: bool,
}

/// Write authority over one assistant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteToken {
    message: MessageId,
    generation: u64,
}

impl WriteToken {
    pub fn message_id(&self) -> MessageId {
        self.message
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<ChatMessage>,
    generation: u64,
    next_id: u64,
}

impl Inner {
    fn push(&mut self, role: Role, text: String, finalized: bool) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            role,
            text,
            finalized,
        });
        id
    }

    /// The message a token may write, if the token is still current
    fn writable(&mut self, token: &WriteToken) -> Option<&mut ChatMessage> {
        if token.generation != self.generation {
            return None;
        }
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.id == token.message)
            .filter(|m| !m.finalized)
    }
}

/// Conversation transcript shared between the relay sessions and readers
#[derive(Debug)]
pub struct Transcript {
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl Transcript {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            revision,
        }
    }

    /// Start a new exchange
    ///
    /// Freezes whatever assistant message was live, appends the user message
    /// and an empty assistant message, and invalidates every earlier token.
    pub fn begin_exchange(&self, prompt: &str) -> WriteToken {
        let token = {
            let mut inner = self.lock();
            for message in inner.messages.iter_mut().filter(|m| !m.finalized) {
                message.finalized = true;
            }
            inner.generation += 1;
            inner.push(Role::User, prompt.to_string(), true);
            let message = inner.push(Role::Assistant, String::new(), false);
            WriteToken {
                message,
                generation: inner.generation,
            }
        };
        self.bump();
        token
    }

    /// Replace the live message text; `false` if the token lost authority
    pub fn update(&self, token: &WriteToken, text: &str) -> bool {
        let applied = match self.lock().writable(token) {
            Some(message) => {
                message.text.clear();
                message.text.push_str(text);
                true
            }
            None => false,
        };
        if applied {
            self.bump();
        }
        applied
    }

    /// Freeze the message, optionally setting its final text
    pub fn finish(&self, token: &WriteToken, final_text: Option<&str>) -> bool {
        let applied = match self.lock().writable(token) {
            Some(message) => {
                if let Some(text) = final_text {
                    message.text = text.to_string();
                }
                message.finalized = true;
                true
            }
            None => false,
        };
        if applied {
            self.bump();
        }
        applied
    }

    /// Overwrite the message with a failure notice and freeze it
    pub fn fail(&self, token: &WriteToken, notice: &str) -> bool {
        self.finish(token, Some(notice))
    }

    /// Whether `token` still holds write authority
    pub fn is_current(&self, token: &WriteToken) -> bool {
        self.lock().generation == token.generation
    }

    pub fn message(&self, id: MessageId) -> Option<ChatMessage> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    /// Copy of all messages in order
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Revision counter, bumped on every accepted change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Prompts sent so far, most recent first
///
/// Records are never changed or removed.
#[derive(Debug, Default)]
pub struct PromptHistory {
    prompts: Mutex<VecDeque<String>>,
}

impl PromptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, prompt: &str) {
        self.lock().push_front(prompt.to_string());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_exchange_appends_pair() {
        let transcript = Transcript::new();
        let token = transcript.begin_exchange("how dry is the field?");

        let messages = transcript.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "how dry is the field?");
        assert!(messages[0].finalized);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text, "");
        assert!(!messages[1].finalized);
        assert_eq!(messages[1].id, token.message_id());
    }

    #[test]
    fn test_update_replaces_text() {
        let transcript = Transcript::new();
        let token = transcript.begin_exchange("hi");
        assert!(transcript.update(&token, "Hel"));
        assert!(transcript.update(&token, "Hello"));
        assert_eq!(transcript.message(token.message_id()).unwrap().text, "Hello");
    }

    #[test]
    fn test_finish_freezes_message() {
        let transcript = Transcript::new();
        let token = transcript.begin_exchange("hi");
        transcript.update(&token, " Hello ");
        assert!(transcript.finish(&token, Some("Hello")));
        assert!(!transcript.update(&token, "more"));

        let message = transcript.message(token.message_id()).unwrap();
        assert_eq!(message.text, "Hello");
        assert!(message.finalized);
    }

    #[test]
    fn test_fail_overwrites_partial_text() {
        let transcript = Transcript::new();
        let token = transcript.begin_exchange("hi");
        transcript.update(&token, "partial ans");
        assert!(transcript.fail(&token, "Connection error."));
        assert_eq!(
            transcript.message(token.message_id()).unwrap().text,
            "Connection error."
        );
    }

    #[test]
    fn test_newer_exchange_revokes_older_token() {
        let transcript = Transcript::new();
        let first = transcript.begin_exchange("one");
        transcript.update(&first, "partial");

        let second = transcript.begin_exchange("two");
        assert!(!transcript.is_current(&first));
        assert!(transcript.is_current(&second));

        // Stale writes are rejected and nothing moves
        assert!(!transcript.update(&first, "stale"));
        assert!(!transcript.fail(&first, "error"));

        let old = transcript.message(first.message_id()).unwrap();
        assert_eq!(old.text, "partial");
        assert!(old.finalized);

        assert!(transcript.update(&second, "fresh"));
        assert_eq!(transcript.message(second.message_id()).unwrap().text, "fresh");
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn test_revision_bumps_on_accepted_changes_only() {
        let transcript = Transcript::new();
        let revision = transcript.subscribe();
        let first = transcript.begin_exchange("one");
        let after_begin = *revision.borrow();
        transcript.begin_exchange("two");
        let after_second = *revision.borrow();
        assert!(after_second > after_begin);

        transcript.update(&first, "stale");
        assert_eq!(*revision.borrow(), after_second);
    }

    #[test]
    fn test_prompt_history_most_recent_first() {
        let history = PromptHistory::new();
        assert!(history.is_empty());
        history.record("first");
        history.record("second");
        history.record("third");
        assert_eq!(history.snapshot(), vec!["third", "second", "first"]);
        assert_eq!(history.len(), 3);
    }
}
