// src/snapshot.rs
// Agent-state snapshots: written when the producer is cancelled,
// read back on resume so the same personas keep talking.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::memory::ConversationMemory;
use crate::profile::{AgentProfile, SimAgent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub profile: AgentProfile,
    pub current_model: usize,
    #[serde(default)]
    pub memory: ConversationMemory,
}

impl From<&SimAgent> for AgentSnapshot {
    fn from(agent: &SimAgent) -> Self {
        Self {
            profile: agent.profile.clone(),
            current_model: agent.current_model,
            memory: agent.memory.clone(),
        }
    }
}

pub fn save_state(path: &Path, agents: &[SimAgent]) -> Result<()> {
    let state: Vec<AgentSnapshot> = agents.iter().map(AgentSnapshot::from).collect();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(&state)?)?;
    info!(path = %path.display(), agents = state.len(), "💾 simulation state saved");
    Ok(())
}

/// Missing or unreadable snapshots resume nobody.
pub fn load_state(path: &Path) -> Vec<SimAgent> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_slice::<Vec<AgentSnapshot>>(&bytes) {
        Ok(state) => state
            .into_iter()
            .enumerate()
            .map(|(i, snap)| SimAgent {
                id: i as u32 + 1,
                profile: snap.profile,
                current_model: snap.current_model,
                memory: snap.memory,
            })
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unreadable, starting fresh");
            Vec::new()
        }
    }
}
