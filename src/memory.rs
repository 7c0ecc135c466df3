// src/memory.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            created_at: Utc::now(),
        }
    }
}

// The agent's conversation history, persisted in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMemory {
    pub turns: Vec<Turn>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    20
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(default_capacity())
    }
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self { turns: Vec::new(), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content.into()));
        if self.turns.len() > self.capacity {
            // drop oldest
            let excess = self.turns.len() - self.capacity;
            self.turns.drain(0..excess);
        }
    }

    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// What the agent already said, newest last.
    pub fn own_comments(&self, limit: usize) -> Vec<&str> {
        let mut said: Vec<&str> = self.turns.iter().rev()
            .filter(|t| t.role == Role::Assistant)
            .take(limit)
            .map(|t| t.content.as_str())
            .collect();
        said.reverse();
        said
    }
}
