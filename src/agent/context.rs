//! Conversation history with summary-based compaction.

use crate::llm::{Message, Role};

const SUMMARY_ACK: &str = "Understood. I have the context from our earlier conversation.";

/// Ordered conversation history handed to the LLM.
///
/// When a summary is set, [`messages`](Self::messages) yields a synthetic
/// user/assistant pair carrying the summary ahead of the raw messages.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: Vec<Message>,
    summary: Option<String>,
    max_messages: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ConversationContext {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            summary: None,
            max_messages: max_messages.max(1),
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_tool_result(&mut self, tool_call_id: &str, content: impl Into<String>) {
        self.messages.push(Message::tool_result(tool_call_id, content));
    }

    /// The sequence sent to the backend, summary pair first.
    pub fn messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 2);
        if let Some(summary) = &self.summary {
            out.push(Message::user(format!(
                "[Conversation summary]\n{}",
                summary
            )));
            out.push(Message::assistant(SUMMARY_ACK));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Messages excluding the synthetic summary pair.
    pub fn raw_messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// True once the raw history reaches 80% of the configured maximum.
    pub fn needs_compaction(&self) -> bool {
        self.messages.len() * 5 >= self.max_messages * 4
    }

    /// Replace older history with `summary`, keeping the `keep_recent` newest messages.
    ///
    /// The cut moves back past tool results so the kept history never
    /// opens with a result whose tool call was dropped.
    pub fn compact(&mut self, summary: impl Into<String>, keep_recent: usize) {
        let mut drop = self.messages.len().saturating_sub(keep_recent);
        while drop > 0 && drop < self.messages.len() && self.messages[drop].role == Role::Tool {
            drop -= 1;
        }
        self.messages.drain(..drop);
        self.summary = Some(summary.into());
    }

    /// Cap raw history at the configured maximum; oldest messages go first,
    /// along with any tool results left without their call.
    pub fn trim(&mut self) {
        let mut drop = self.messages.len().saturating_sub(self.max_messages);
        if drop == 0 {
            return;
        }
        while drop < self.messages.len() && self.messages[drop].role == Role::Tool {
            drop += 1;
        }
        self.messages.drain(..drop);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.summary = None;
    }

    /// Copy of the visible history in a fresh context, used for side runs
    /// that must not touch the original.
    pub fn detached_copy(&self, extra_capacity: usize) -> Self {
        let messages: Vec<Message> = self
            .messages()
            .into_iter()
            .filter(|m| m.role != Role::Tool || m.tool_call_id.is_some())
            .collect();
        Self {
            max_messages: messages.len() + extra_capacity,
            messages,
            summary: None,
        }
    }
}
