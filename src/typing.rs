//! Typing tracker: ephemeral per-conversation sets of users currently
//! composing. Purely an interaction convenience with last-write-wins
//! semantics per (conversation, user); never persisted and never expired on
//! a timer — the disconnect cleanup path is the sole guard against wedged
//! indicators.

use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
pub struct TypingTracker {
    typing: DashMap<String, HashSet<String>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or remove a user from a conversation's typing set. Returns true
    /// if the set actually changed.
    pub fn set_typing(&self, conversation_id: &str, user_id: &str, is_typing: bool) -> bool {
        if is_typing {
            self.typing
                .entry(conversation_id.to_string())
                .or_default()
                .insert(user_id.to_string())
        } else {
            match self.typing.get_mut(conversation_id) {
                Some(mut typists) => typists.remove(user_id),
                None => false,
            }
        }
    }

    /// Users currently composing in a conversation.
    pub fn typists(&self, conversation_id: &str) -> Vec<String> {
        self.typing
            .get(conversation_id)
            .map(|typists| typists.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove the user from every typing set they are in, returning the
    /// conversations they were cleared from so the caller can broadcast one
    /// "stopped typing" per conversation. Called on disconnect so a crash or
    /// tab-close cannot leave the indicator stuck.
    pub fn clear_user(&self, user_id: &str) -> Vec<String> {
        let mut cleared = Vec::new();
        for mut entry in self.typing.iter_mut() {
            if entry.value_mut().remove(user_id) {
                cleared.push(entry.key().clone());
            }
        }
        cleared
    }
}
