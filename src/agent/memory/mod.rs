use std::collections::VecDeque;

use crate::message::{ChatMessage, Role};

/// Windowed conversation history.
///
/// The system instruction is held apart from the window and is never dropped;
/// when the window overflows the oldest messages go first.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    system: Option<ChatMessage>,
    messages: VecDeque<ChatMessage>,
    window_size: usize,
}

impl ConversationMemory {
    pub fn new(window_size: usize) -> Self {
        Self {
            system: None,
            messages: VecDeque::new(),
            window_size,
        }
    }

    pub fn with_system(window_size: usize, prompt: &str) -> Self {
        let mut memory = Self::new(window_size);
        memory.set_system(prompt);
        memory
    }

    pub fn set_system(&mut self, prompt: &str) {
        self.system = if prompt.is_empty() {
            None
        } else {
            Some(ChatMessage::system(prompt))
        };
    }

    pub fn push(&mut self, message: ChatMessage) {
        if message.is_system() {
            self.system = Some(message);
            return;
        }
        self.messages.push_back(message);
        self.truncate();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.push(message);
        }
    }

    fn truncate(&mut self) {
        while self.messages.len() > self.window_size {
            self.messages.pop_front();
        }
        // a retained window never opens on an observation whose request was dropped
        while matches!(self.messages.front(), Some(m) if m.role == Role::Tool) {
            self.messages.pop_front();
        }
    }

    /// Full history: system instruction first, then the retained window.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system
            .iter()
            .cloned()
            .chain(self.messages.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clears the window, keeping the system instruction.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
