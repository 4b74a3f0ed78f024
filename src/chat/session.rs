//! The active conversation and its turn loop
//!
//! A [`ChatSession`] is owned by the host (the CLI, or any other front end)
//! and passed to every operation. It tracks:
//!
//! ```text
//!         submit()
//!   Idle ──────────▶ Streaming ── stream ends ──▶ Idle
//!                        │                         ▲
//!                        └─ stop seen ─▶ Cancelled ┘
//! ```
//!
//! Every turn appends a user message and an assistant message (partial or
//! empty if the generation was stopped or failed) and saves the transcript.

use std::path::PathBuf;
use std::time::Instant;

use futures_util::stream::{Stream, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::identity::SessionEmoji;
use super::message::{Message, Role};
use super::store::{ChatStore, StoreError};
use super::transcript;
use crate::config::ChatProfile;
use crate::metrics::{
    CHAT_TURNS, FRAGMENTS_TOTAL, GENERATION_DURATION, STREAM_ERRORS, TOKENS_GENERATED,
};
use crate::ollama::{
    GenerateRequest, GenerateStats, OllamaClient, StopFlag, StreamChunk, StreamError,
};

/// Where a session is in its turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Cancelled,
}

/// Result of one prompt/response turn
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Assistant text as appended to the session
    pub response: String,
    /// Whether a stop request cut the generation short
    pub cancelled: bool,
    /// Non-fatal problems reported by the stream
    pub diagnostics: Vec<StreamError>,
    /// Final-frame counters, when the generation ran to completion
    pub stats: Option<GenerateStats>,
    /// Transcript file written at the end of the turn
    pub saved_to: Option<PathBuf>,
}

/// Error type for chat turns
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The conversation currently on screen
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<Message>,
    backing_file: Option<String>,
    emoji: SessionEmoji,
    state: SessionState,
    stop: StopFlag,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    /// Start an empty session with a fresh emoji
    pub fn new() -> Self {
        Self::with_emoji(SessionEmoji::random())
    }

    pub fn with_emoji(emoji: SessionEmoji) -> Self {
        Self {
            messages: Vec::new(),
            backing_file: None,
            emoji,
            state: SessionState::Idle,
            stop: StopFlag::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Transcript file name, once the session has been saved or loaded
    pub fn backing_file(&self) -> Option<&str> {
        self.backing_file.as_deref()
    }

    pub fn emoji(&self) -> SessionEmoji {
        self.emoji
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle for stopping the generation in progress
    ///
    /// Clone it into whatever watches for user interrupts.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Add a message to the conversation
    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        self.messages.push(Message::new(role, text));
    }

    /// Forget the conversation and pick a new emoji
    ///
    /// The transcript on disk is left alone.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.backing_file = None;
        self.emoji = SessionEmoji::random();
        self.state = SessionState::Idle;
        debug!(emoji = %self.emoji, "session cleared");
    }

    /// Name the transcript after the first message, once
    pub(crate) fn ensure_backing_file(&mut self) -> Option<String> {
        if self.backing_file.is_none() {
            let first = self.messages.first()?;
            self.backing_file = Some(transcript::file_name(self.emoji, &first.text));
        }
        self.backing_file.clone()
    }

    pub(crate) fn restore(&mut self, messages: Vec<Message>, file_name: String) {
        self.messages = messages;
        self.backing_file = Some(file_name);
        self.state = SessionState::Idle;
    }

    /// Build the request for a prompt under the given profile
    pub fn request_for(&self, profile: &ChatProfile, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: profile.model.clone(),
            prompt: prompt.to_string(),
            system: profile.system.clone(),
            num_ctx: profile.num_ctx,
        }
    }

    /// Run one full turn against the model server
    ///
    /// Appends the prompt, streams the reply (calling `on_fragment` for each
    /// piece as it arrives), appends the reply and saves the transcript.
    /// Stream problems end up in [`TurnOutcome::diagnostics`]; only storage
    /// failures are returned as errors.
    pub async fn submit<F>(
        &mut self,
        client: &OllamaClient,
        store: &ChatStore,
        profile: &ChatProfile,
        prompt: &str,
        on_fragment: F,
    ) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(&str),
    {
        if prompt.trim().is_empty() {
            return Err(TurnError::EmptyPrompt);
        }

        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!("chat_turn", trace_id = %trace_id, model = %profile.model);

        async move {
            self.begin_turn(prompt);
            let request = self.request_for(profile, prompt);
            let stream = client.generate_stream(&request, &self.stop).await;
            self.finish_turn(stream, store, on_fragment).await
        }
        .instrument(span)
        .await
    }

    /// Record the user's prompt and enter `Streaming`
    ///
    /// A stop requested while no generation was running is discarded.
    pub fn begin_turn(&mut self, prompt: &str) {
        if self.stop.take() {
            debug!("discarding stop request made while idle");
        }
        self.append(Role::User, prompt);
        self.state = SessionState::Streaming;
        info!(emoji = %self.emoji, messages = self.messages.len(), "turn started");
    }

    /// Drain a response stream into an assistant message and save
    ///
    /// Used by [`ChatSession::submit`]; exposed so hosts with their own
    /// transport can drive the same state machine.
    pub async fn finish_turn<S, F>(
        &mut self,
        stream: S,
        store: &ChatStore,
        mut on_fragment: F,
    ) -> Result<TurnOutcome, TurnError>
    where
        S: Stream<Item = Result<StreamChunk, StreamError>>,
        F: FnMut(&str),
    {
        futures_util::pin_mut!(stream);
        let started = Instant::now();
        let mut outcome = TurnOutcome::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamChunk::Token(token)) => {
                    FRAGMENTS_TOTAL.inc();
                    on_fragment(&token);
                    outcome.response.push_str(&token);
                }
                Ok(StreamChunk::Done(stats)) => {
                    TOKENS_GENERATED.inc_by(stats.eval_count as f64);
                    outcome.stats = Some(stats);
                }
                Ok(StreamChunk::Stopped) => {
                    self.state = SessionState::Cancelled;
                    outcome.cancelled = true;
                    info!(chars = outcome.response.len(), "generation stopped by user");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stream problem");
                    STREAM_ERRORS.with_label_values(&[e.kind()]).inc();
                    outcome.diagnostics.push(e);
                }
            }
        }
        GENERATION_DURATION.observe(started.elapsed().as_secs_f64());

        self.append(Role::Assistant, outcome.response.clone());
        let saved = store.persist(self);
        self.state = SessionState::Idle;
        outcome.saved_to = saved?;

        let label = if outcome.cancelled { "cancelled" } else { "completed" };
        CHAT_TURNS.with_label_values(&[label]).inc();
        info!(
            outcome = label,
            chars = outcome.response.len(),
            diagnostics = outcome.diagnostics.len(),
            "turn finished"
        );
        Ok(outcome)
    }
}
