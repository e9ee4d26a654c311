use crate::types::{ConversationMessage, Role};
use chrono::Utc;
use std::collections::VecDeque;

/// Bounded conversation history — oldest messages are evicted once the
/// configured cap is reached (§3 invariant 5). Not persisted across process
/// restarts.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    cap: usize,
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            messages: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.cap {
            self.messages.pop_front();
        }
    }

    /// Appends a user-turn message. `results` carries the turn's Execution
    /// Results, if any were produced (§4.7 step 9) — empty for a turn that
    /// ran no capability calls.
    pub fn push_user(
        &mut self,
        content: impl Into<String>,
        results: Vec<crate::types::ExecutionResult>,
    ) {
        self.push(ConversationMessage {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            results,
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ConversationMessage {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            results: Vec::new(),
        });
    }

    pub fn messages(&self) -> &VecDeque<ConversationMessage> {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_cap() {
        let mut history = ConversationHistory::new(2);
        history.push_user("one", Vec::new());
        history.push_user("two", Vec::new());
        history.push_user("three", Vec::new());
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content, "two");
        assert_eq!(history.messages()[1].content, "three");
    }

    #[test]
    fn starts_empty() {
        let history = ConversationHistory::new(5);
        assert!(history.is_empty());
    }
}
