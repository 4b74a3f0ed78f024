//! neurochat - terminal chat client for a local Ollama server
//!
//! Streams generations from Ollama's `/api/generate` endpoint and keeps each
//! conversation as a markdown transcript on disk.
//!
//! # Modules
//!
//! - `ollama` - streaming client and newline-delimited JSON decoding
//! - `chat` - sessions, transcripts and the transcript directory
//! - `config` - model and API profiles from `config.json`
//! - `metrics` - Prometheus counters for chat turns
//! - `tracing` - logging and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use neurochat::{ChatSession, ChatStore, Config, OllamaClient};
//!
//! let profile = Config::default().profile(None, None)?;
//! let client = OllamaClient::new(&profile.base_url);
//! let store = ChatStore::open("chat_history")?;
//! let mut session = ChatSession::new();
//!
//! let outcome = session
//!     .submit(&client, &store, &profile, "Explain entropy", |f| print!("{f}"))
//!     .await?;
//! ```

pub mod chat;
pub mod config;
pub mod metrics;
pub mod ollama;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use chat::{ChatSession, ChatStore, Message, Role, SessionEmoji, TurnOutcome};
pub use config::{ChatProfile, Config};
pub use ollama::{OllamaClient, StopFlag};
