//! Canonical conversation identity for two-party chat threads.
//!
//! Participant order is normalized (lexicographically smaller id first) so
//! both sides of a conversation derive the same key.

/// Separator between the two participant ids in a conversation key.
/// User ids must never contain this character; see [`valid_user_id`].
pub const SEPARATOR: char = '_';

/// Derive the canonical key for a two-party conversation.
/// `conversation_key(a, b) == conversation_key(b, a)` for all a, b.
pub fn conversation_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}{SEPARATOR}{b}")
    } else {
        format!("{b}{SEPARATOR}{a}")
    }
}

/// Recover the other participant of a conversation given one of them.
///
/// Splits the key on the separator and returns the half that is not
/// `participant_id`. Returns `None` if the key is malformed or
/// `participant_id` is not part of the conversation.
pub fn counterpart<'a>(conversation_id: &'a str, participant_id: &str) -> Option<&'a str> {
    let (first, second) = conversation_id.split_once(SEPARATOR)?;
    if first == participant_id {
        Some(second)
    } else if second == participant_id {
        Some(first)
    } else {
        None
    }
}

/// A user id is valid for relay purposes if it is non-empty and cannot
/// collide with the conversation key encoding.
pub fn valid_user_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(SEPARATOR)
}
