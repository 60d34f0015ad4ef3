use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::filters::ExtractedFilters;

/// Conversation history is capped at this many entries (user + assistant).
pub const MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-session conversation state, cached under `chat:session:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub turns: Vec<ChatTurn>,
    pub current_filters: ExtractedFilters,
    pub turn_count: u64,
    pub session_start: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            current_filters: ExtractedFilters::default(),
            turn_count: 0,
            session_start: Utc::now(),
        }
    }

    pub fn push_turn(&mut self, role: ChatRole, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        self.turn_count += 1;
        self.truncate();
    }

    /// Keep only the newest MAX_TURNS entries. Accumulated filters are kept
    /// even when the turns that produced them fall off.
    fn truncate(&mut self) {
        if self.turns.len() > MAX_TURNS {
            let drop = self.turns.len() - MAX_TURNS;
            self.turns.drain(..drop);
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
