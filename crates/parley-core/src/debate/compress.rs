//! Sliding-window context compression.
//!
//! Prior turns are folded into a short transcript before a new debate turn
//! starts. Pure over its inputs; the same history always compresses to the
//! same text.

use crate::storage::{MessageRole, MessageType, StoredMessage};

/// Per-message cap, counted in characters. Longer contents are cut and
/// marked with an ellipsis.
pub const MESSAGE_CHAR_LIMIT: usize = 500;

/// Default number of user/assistant exchange pairs to keep.
pub const DEFAULT_EXCHANGE_LIMIT: usize = 5;

/// Compress prior-turn history into a prompt-ready transcript.
///
/// Internal debate transcript messages (expert answers, critic reviews,
/// moderator records) are excluded; only the user-visible exchange
/// survives. `exchange_limit` bounds the window to the most recent
/// `exchange_limit * 2` surviving messages. Returns an empty string for
/// empty history.
pub fn compress(messages: &[StoredMessage], exchange_limit: usize) -> String {
    let surviving: Vec<&StoredMessage> = messages
        .iter()
        .filter(|m| is_user_visible(m))
        .collect();

    let window_start = surviving.len().saturating_sub(exchange_limit * 2);
    surviving[window_start..]
        .iter()
        .map(|m| {
            let speaker = match m.role {
                MessageRole::User => "User",
                _ => "Assistant",
            };
            format!("{}: {}", speaker, truncate(&m.content))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_user_visible(message: &StoredMessage) -> bool {
    let role_ok = matches!(message.role, MessageRole::User | MessageRole::Assistant);
    let type_ok = matches!(
        message.message_type,
        None | Some(MessageType::UserQuery) | Some(MessageType::FinalAnswer)
    );
    role_ok && type_ok
}

fn truncate(content: &str) -> String {
    if content.chars().count() <= MESSAGE_CHAR_LIMIT {
        content.to_string()
    } else {
        let mut cut: String = content.chars().take(MESSAGE_CHAR_LIMIT).collect();
        cut.push_str("...");
        cut
    }
}
