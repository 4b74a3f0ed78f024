//! Markdown transcript format for saved chats
//!
//! A transcript looks like:
//!
//! ```text
//! # Chat Session 🚀
//!
//! **User:** Explain entropy
//!
//! **Assistant:** Entropy is...
//!
//! ```
//!
//! Role labels at the start of a line separate records. A message whose own
//! text contains a line starting with `**User:**` or `**Assistant:**` will
//! be split at that line when read back; leading and trailing whitespace of
//! each message is not preserved either.

use super::identity::SessionEmoji;
use super::message::{Message, Role};

const USER_LABEL: &str = "**User:**";
const ASSISTANT_LABEL: &str = "**Assistant:**";

/// Longest file-name prefix taken from the first message, in characters
pub const TITLE_MAX_CHARS: usize = 30;

/// File extension of saved transcripts
pub const TRANSCRIPT_EXTENSION: &str = "md";

/// Derive the transcript file name for a session
///
/// Keeps alphanumerics, spaces, `_` and `-` from `first_message`, drops
/// trailing whitespace, truncates to [`TITLE_MAX_CHARS`] characters and
/// turns spaces into underscores.
pub fn file_name(emoji: SessionEmoji, first_message: &str) -> String {
    let sanitized: String = first_message
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let title: String = sanitized
        .trim_end()
        .chars()
        .take(TITLE_MAX_CHARS)
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}_{}.{}", emoji, title, TRANSCRIPT_EXTENSION)
}

fn label(role: Role) -> &'static str {
    match role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    }
}

/// Render a session as a markdown transcript
pub fn render(emoji: SessionEmoji, messages: &[Message]) -> String {
    let mut out = format!("# Chat Session {}\n\n", emoji);
    for message in messages {
        out.push_str(label(message.role));
        out.push(' ');
        out.push_str(&message.text);
        out.push_str("\n\n");
    }
    out
}

/// Parse a markdown transcript back into messages
///
/// Anything before the first role label (the header) is ignored.
pub fn parse(contents: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut current: Option<(Role, String)> = None;

    for line in contents.split_inclusive('\n') {
        let started = [Role::User, Role::Assistant]
            .into_iter()
            .find_map(|role| line.strip_prefix(label(role)).map(|rest| (role, rest)));

        match started {
            Some((role, rest)) => {
                flush(&mut current, &mut messages);
                current = Some((role, rest.trim_start().to_string()));
            }
            None => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(line);
                }
            }
        }
    }
    flush(&mut current, &mut messages);

    messages
}

fn flush(current: &mut Option<(Role, String)>, messages: &mut Vec<Message>) {
    if let Some((role, text)) = current.take() {
        if !text.is_empty() {
            messages.push(Message::new(role, text.trim()));
        }
    }
}

/// Split a transcript file name into its emoji and title parts
pub fn split_file_name(file_name: &str) -> (Option<SessionEmoji>, String) {
    let stem = file_name
        .strip_suffix(&format!(".{}", TRANSCRIPT_EXTENSION))
        .unwrap_or(file_name);
    match stem.split_once('_') {
        Some((prefix, title)) => match prefix.parse::<SessionEmoji>() {
            Ok(emoji) => (Some(emoji), title.replace('_', " ")),
            Err(_) => (None, stem.to_string()),
        },
        None => (None, stem.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rocket() -> SessionEmoji {
        "🚀".parse::<SessionEmoji>().unwrap()
    }

    #[test]
    fn test_file_name_sanitizes_and_truncates() {
        assert_eq!(
            file_name(rocket(), "Explain entropy, please!"),
            "🚀_Explain_entropy_please.md"
        );
        assert_eq!(
            file_name(rocket(), "What is the meaning of life and everything else?"),
            "🚀_What_is_the_meaning_of_life_an.md"
        );
        assert_eq!(file_name(rocket(), "a/b\\c..d"), "🚀_abcd.md");
        assert_eq!(file_name(rocket(), "keep_this-one  "), "🚀_keep_this-one.md");
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let a = file_name(rocket(), "Same prompt");
        let b = file_name(rocket(), "Same prompt");
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_layout() {
        let messages = vec![
            Message::user("Explain entropy"),
            Message::assistant("Entropy is..."),
        ];
        assert_eq!(
            render(rocket(), &messages),
            "# Chat Session 🚀\n\n**User:** Explain entropy\n\n**Assistant:** Entropy is...\n\n"
        );
    }

    #[test]
    fn test_parse_multiline_messages() {
        let messages = vec![
            Message::user("line one\nline two"),
            Message::assistant("```rust\nfn main() {}\n```\n\nDone."),
            Message::user("thanks"),
        ];
        assert_eq!(parse(&render(rocket(), &messages)), messages);
    }

    #[test]
    fn test_parse_keeps_empty_assistant_reply() {
        let messages = vec![Message::user("hello"), Message::assistant("")];
        assert_eq!(parse(&render(rocket(), &messages)), messages);
    }

    #[test]
    fn test_parse_ignores_header_and_trims() {
        let contents = "# Chat Session 😀\nstray\n\n**User:**   hi  \n\n**Assistant:**there\n";
        assert_eq!(
            parse(contents),
            vec![Message::user("hi"), Message::assistant("there")]
        );
    }

    #[test]
    fn test_label_inside_message_splits_record() {
        let messages = vec![Message::assistant("quote:\n**User:** injected")];
        let parsed = parse(&render(rocket(), &messages));
        assert_eq!(
            parsed,
            vec![Message::assistant("quote:"), Message::user("injected")]
        );
    }

    #[test]
    fn test_split_file_name() {
        let (emoji, title) = split_file_name("🚀_Explain_entropy.md");
        assert_eq!(emoji, Some(rocket()));
        assert_eq!(title, "Explain entropy");

        let (emoji, title) = split_file_name("notes.md");
        assert_eq!(emoji, None);
        assert_eq!(title, "notes");
    }
}
