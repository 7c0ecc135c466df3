// src/profile.rs
// Simulated personas: fixed identity per agent, drawn once at creation.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::memory::ConversationMemory;

pub const NAMES: [&str; 10] = [
    "Ana", "Carlos", "João", "Mariana", "Lucas", "Fernanda", "Rafael", "Bianca", "Paulo", "Isabela",
];
pub const STYLES: [&str; 5] = ["emoji", "formal", "casual", "slang", "detailed"];
pub const TONES: [&str; 5] = ["optimistic", "pessimistic", "neutral", "sarcastic", "analytical"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub style: String,
    pub tone: String,
}

impl AgentProfile {
    pub fn new(name: &str, style: &str, tone: &str) -> Self {
        Self {
            name: name.to_string(),
            style: style.to_string(),
            tone: tone.to_string(),
        }
    }

    pub fn generate_random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        // The arrays are non-empty, `choose` only fails on empty slices.
        let name = NAMES.choose(rng).copied().unwrap_or("Agent");
        let style = STYLES.choose(rng).copied().unwrap_or("casual");
        let tone = TONES.choose(rng).copied().unwrap_or("neutral");
        Self::new(name, style, tone)
    }
}

impl std::fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.style, self.tone)
    }
}

/// A running agent: immutable profile plus the mutable generation state
/// that gets snapshotted on shutdown.
#[derive(Clone, Debug)]
pub struct SimAgent {
    pub id: u32,
    pub profile: AgentProfile,
    // Index into the generator's model list
    pub current_model: usize,
    pub memory: ConversationMemory,
}

impl SimAgent {
    pub fn new(id: u32, profile: AgentProfile) -> Self {
        Self {
            id,
            profile,
            current_model: 0,
            memory: ConversationMemory::default(),
        }
    }

    pub fn spawn_random<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<SimAgent> {
        (0..count)
            .map(|i| SimAgent::new(i as u32 + 1, AgentProfile::generate_random(rng)))
            .collect()
    }
}
