//! Chat sessions and their markdown transcripts
//!
//! - `message` - role-tagged messages
//! - `identity` - the random emoji naming a session
//! - `transcript` - markdown rendering, parsing and file naming
//! - `store` - the directory of saved transcripts
//! - `session` - the active conversation and its turn loop

pub mod identity;
pub mod message;
pub mod session;
pub mod store;
pub mod transcript;

pub use identity::{SessionEmoji, UnknownEmoji};
pub use message::{Message, Role};
pub use session::{ChatSession, SessionState, TurnError, TurnOutcome};
pub use store::{ChatStore, SavedChat, StoreError, DEFAULT_HISTORY_DIR};
