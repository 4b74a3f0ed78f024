//! Random emoji identifying a chat session

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;

/// Emoji a session tag is drawn from
pub const SESSION_EMOJIS: [&str; 11] = [
    "😀", "🎉", "🤖", "🌟", "🧠", "📚", "💬", "🚀", "📝", "🎨", "✨",
];

/// The emoji tag of a session.
///
/// Chosen once when a session starts and shown next to the conversation;
/// it also prefixes the transcript file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionEmoji(&'static str);

impl SessionEmoji {
    /// Pick uniformly from [`SESSION_EMOJIS`]
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    pub fn random_with<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        // The slice is a non-empty constant, so `choose` always returns Some.
        Self(SESSION_EMOJIS.choose(rng).copied().unwrap_or(SESSION_EMOJIS[0]))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// A string that is not one of [`SESSION_EMOJIS`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a session emoji")]
pub struct UnknownEmoji(pub String);

impl FromStr for SessionEmoji {
    type Err = UnknownEmoji;

    /// Look up a known emoji, e.g. one parsed back from a file name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SESSION_EMOJIS
            .iter()
            .find(|e| **e == s)
            .map(|e| Self(*e))
            .ok_or_else(|| UnknownEmoji(s.to_string()))
    }
}

impl fmt::Display for SessionEmoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
