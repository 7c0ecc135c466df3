// src/topic.rs
// The topic control file: written by the "start simulation" action,
// read by the producer to learn what to simulate.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PulseError, Result};

pub const MIN_AGENTS: u8 = 1;
pub const MAX_AGENTS: u8 = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TopicConfig {
    #[serde(alias = "topico")]
    pub topic: String,
    #[serde(alias = "num_users")]
    pub agent_count: u8,
}

impl TopicConfig {
    /// Validates raw user input from the control surface.
    pub fn from_input(topic: &str, agent_count: &str) -> Result<Self> {
        if topic.trim().is_empty() {
            return Err(PulseError::InvalidTopic);
        }
        Ok(Self {
            topic: topic.to_string(),
            agent_count: parse_agent_count(agent_count)?,
        })
    }

    pub fn is_blank(&self) -> bool {
        self.topic.trim().is_empty()
    }
}

pub fn parse_agent_count(raw: &str) -> Result<u8> {
    let trimmed = raw.trim();
    // Number inputs sometimes arrive as "3.0".
    let parsed = trimmed
        .parse::<u8>()
        .ok()
        .or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u8::MAX as f64)
                .map(|v| v as u8)
        })
        .ok_or_else(|| PulseError::InvalidAgentCount(raw.to_string()))?;

    if (MIN_AGENTS..=MAX_AGENTS).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(PulseError::InvalidAgentCount(raw.to_string()))
    }
}

/// Fail-soft read: absent, malformed or out-of-range control files mean
/// "no topic yet".
pub fn read_topic(path: &Path) -> Option<TopicConfig> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<TopicConfig>(&bytes) {
        Ok(cfg) if (MIN_AGENTS..=MAX_AGENTS).contains(&cfg.agent_count) => Some(cfg),
        Ok(cfg) => {
            warn!(
                path = %path.display(),
                agents = cfg.agent_count,
                "topic file ignored: agent count must be {}..={}",
                MIN_AGENTS,
                MAX_AGENTS
            );
            None
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "topic file not readable yet");
            None
        }
    }
}

pub fn write_topic(path: &Path, cfg: &TopicConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(cfg)?)?;
    info!(topic = %cfg.topic, agents = cfg.agent_count, "topic file saved");
    Ok(())
}

/// Removes the control file. Already gone is fine.
pub fn remove_topic(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "topic file removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
