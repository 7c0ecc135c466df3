// src/brain.rs
// COMMENT GENERATION BRIDGE
// Connects the agents to a chat-completion backend (OpenAI-compatible, e.g. Groq).
// Falls back to a scripted offline brain when no API key is configured.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PulseError, Result};
use crate::memory::Role;
use crate::profile::SimAgent;

#[async_trait]
pub trait CommentGenerator: Send + Sync {
    /// Produces one short comment about `topic` in the agent's voice,
    /// using the model at `agent.current_model`.
    async fn generate(&self, agent: &SimAgent, topic: &str) -> Result<String>;

    /// Number of interchangeable backing models to rotate through on failure.
    fn model_count(&self) -> usize {
        1
    }

    fn model_name(&self, _index: usize) -> String {
        "default".to_string()
    }
}

// =========================================================================
// 1. RETRY POLICY
// Bounded attempts, model switch + exponential backoff between attempts.
// =========================================================================
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based: the wait after the first failure is attempt 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let millis = self.base_delay.as_millis() as f64 * exp;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Runs the generator under `policy`. Each failure moves the agent to the
/// next model before backing off. Returns the last error once attempts run out.
pub async fn generate_with_retry(
    brain: &dyn CommentGenerator,
    agent: &mut SimAgent,
    topic: &str,
    policy: &RetryPolicy,
) -> Result<String> {
    let attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        match brain.generate(agent, topic).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                last = e.to_string();
                let models = brain.model_count().max(1);
                agent.current_model = (agent.current_model + 1) % models;
                warn!(
                    agent = %agent.profile.name,
                    attempt,
                    error = %e,
                    next_model = %brain.model_name(agent.current_model),
                    "generation failed, switching model"
                );
                if attempt < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(PulseError::Generation { attempts, last })
}

// =========================================================================
// 2. CHAT BRAIN (OpenAI-compatible HTTP endpoint)
// =========================================================================
pub const DEFAULT_MODELS: [&str; 6] = [
    "openai/gpt-oss-120b",
    "openai/gpt-oss-20b",
    "qwen/qwen3-32b",
    "llama-3.1-8b-instant",
    "llama-3.3-70b-versatile",
    "meta-llama/llama-4-scout-17b-16e-instruct",
];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize, Deserialize, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct ChatBrain {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    models: Vec<String>,
}

impl ChatBrain {
    pub fn new(base_url: &str, api_key: &str, models: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let models = if models.is_empty() {
            DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
        } else {
            models
        };
        info!(base_url, models = models.len(), "🧠 BRAIN: chat backend configured");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            models,
        })
    }

    fn build_messages(agent: &SimAgent, topic: &str) -> Vec<ChatMessage> {
        let p = &agent.profile;
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: format!(
                "You are {}, a social media user with a '{}' writing style and a '{}' tone. \
                 Stay in character and keep every answer to one or two sentences.",
                p.name, p.style, p.tone
            ),
        }];
        for turn in agent.memory.recent(6) {
            messages.push(ChatMessage {
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: turn.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: comment_request(topic),
        });
        messages
    }
}

/// The user turn recorded in memory for every comment.
pub fn comment_request(topic: &str) -> String {
    format!("Give a short opinion about the following topic: {}", topic)
}

#[async_trait]
impl CommentGenerator for ChatBrain {
    async fn generate(&self, agent: &SimAgent, topic: &str) -> Result<String> {
        let model = &self.models[agent.current_model % self.models.len()];
        let request = ChatRequest {
            model,
            messages: Self::build_messages(agent, topic),
            temperature: 0.8,
            max_tokens: 200,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(PulseError::Generation {
                attempts: 1,
                last: format!("empty completion from {}", model),
            });
        }
        Ok(text)
    }

    fn model_count(&self) -> usize {
        self.models.len()
    }

    fn model_name(&self, index: usize) -> String {
        self.models[index % self.models.len()].clone()
    }
}

// =========================================================================
// 3. SCRIPTED BRAIN (offline, no network)
// =========================================================================
pub struct ScriptedBrain;

impl ScriptedBrain {
    fn styled(style: &str, text: String) -> String {
        match style {
            "emoji" => format!("{} 🚀🔥", text),
            "formal" => format!("In my view, {}", lowercase_first(&text)),
            "slang" => format!("{} lol", text),
            _ => text,
        }
    }

    fn lines_for(tone: &str) -> &'static [&'static str] {
        match tone {
            "optimistic" => &[
                "I really love where {} is going, great times ahead!",
                "Honestly {} makes me happy, amazing progress.",
                "{} is excellent news, I am excited to see more.",
            ],
            "pessimistic" => &[
                "I doubt {} will end well, it looks bad to me.",
                "Another day, another disappointment with {}.",
                "{} feels like a terrible idea and nobody is listening.",
            ],
            "sarcastic" => &[
                "Oh sure, {} will definitely fix everything. Great.",
                "Wow, {} again. What a surprise.",
                "Because what we needed was more {}, obviously.",
            ],
            "analytical" => &[
                "Looking at {}, the data shows mixed results so far.",
                "{} has clear benefits, but the costs are still unclear.",
                "The main question about {} is whether it scales.",
            ],
            _ => &[
                "{} is interesting, I need to read more about it.",
                "Not sure what to think about {} yet.",
                "{} keeps showing up in my feed lately.",
            ],
        }
    }
}

#[async_trait]
impl CommentGenerator for ScriptedBrain {
    async fn generate(&self, agent: &SimAgent, topic: &str) -> Result<String> {
        let said = agent.memory.own_comments(2);
        let candidates: Vec<String> = Self::lines_for(&agent.profile.tone)
            .iter()
            .map(|t| Self::styled(&agent.profile.style, t.replace("{}", topic)))
            .collect();

        // Skip what was said in the last two rounds when there is anything else left.
        let fresh: Vec<&String> = candidates.iter().filter(|c| !said.contains(&c.as_str())).collect();
        let pool: Vec<&String> = if fresh.is_empty() { candidates.iter().collect() } else { fresh };

        Ok(pool
            .choose(&mut rand::thread_rng())
            .map(|s| s.to_string())
            .unwrap_or_else(|| topic.to_string()))
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
