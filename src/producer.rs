// src/producer.rs
// PRODUCER LOOP
// Waits for a topic, then runs one async task per agent that keeps
// generating, scoring and appending comments until cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::brain::{comment_request, generate_with_retry, CommentGenerator, RetryPolicy};
use crate::datafile::DataFile;
use crate::error::Result;
use crate::memory::Role;
use crate::profile::SimAgent;
use crate::record::CommentRecord;
use crate::sentiment::SentimentScorer;
use crate::snapshot::{load_state, save_state};
use crate::topic::{read_topic, TopicConfig};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProducerState {
    WaitingForTopic,
    Running { topic: String, agents: usize },
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct ProducerSettings {
    pub topic_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub topic_poll: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub resume: bool,
    pub reset_on_start: bool,
    pub retry: RetryPolicy,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            topic_path: PathBuf::from("topic.json"),
            snapshot_path: PathBuf::from("simulation_state.json"),
            topic_poll: Duration::from_secs(1),
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
            resume: false,
            reset_on_start: false,
            retry: RetryPolicy::default(),
        }
    }
}

// Everything an agent task needs, shared read-only.
struct AgentContext {
    data: DataFile,
    brain: Arc<dyn CommentGenerator>,
    scorer: Arc<dyn SentimentScorer>,
    retry: RetryPolicy,
    min_delay: Duration,
    max_delay: Duration,
}

enum SessionEnd {
    Cancelled,
    // Topic file removed: back to waiting
    Stopped,
    TopicChanged(TopicConfig),
}

pub struct Producer {
    settings: ProducerSettings,
    data: DataFile,
    brain: Arc<dyn CommentGenerator>,
    scorer: Arc<dyn SentimentScorer>,
    state: watch::Sender<ProducerState>,
}

impl Producer {
    pub fn new(
        settings: ProducerSettings,
        data: DataFile,
        brain: Arc<dyn CommentGenerator>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Self {
        let (state, _) = watch::channel(ProducerState::WaitingForTopic);
        Self { settings, data, brain, scorer, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ProducerState) {
        debug!(state = ?next, "producer state");
        self.state.send_replace(next);
    }

    /// Polls the topic file until a non-blank topic different from `last_seen`
    /// shows up. `None` when cancelled first.
    pub async fn wait_for_topic(
        &self,
        last_seen: Option<&str>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<TopicConfig> {
        let mut ticker = tokio::time::interval(self.settings.topic_poll);
        loop {
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(cfg) = self.new_topic(last_seen) {
                        return Some(cfg);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    fn new_topic(&self, last_seen: Option<&str>) -> Option<TopicConfig> {
        let cfg = read_topic(&self.settings.topic_path)?;
        if cfg.is_blank() || last_seen == Some(cfg.topic.as_str()) {
            return None;
        }
        Some(cfg)
    }

    /// Full lifecycle: wait, run, and start over whenever the topic changes
    /// or the topic file is removed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        'waiting: loop {
            info!(topic_file = %self.settings.topic_path.display(), "🛰️ PRODUCER: waiting for a topic");
            self.set_state(ProducerState::WaitingForTopic);

            let mut pending = self.wait_for_topic(None, &mut shutdown).await;
            while let Some(cfg) = pending.take() {
                match self.run_session(&cfg, &mut shutdown).await? {
                    SessionEnd::Cancelled => break 'waiting,
                    SessionEnd::Stopped => {
                        info!(topic = %cfg.topic, "🛰️ PRODUCER: simulation stopped");
                        continue 'waiting;
                    }
                    SessionEnd::TopicChanged(next) => {
                        info!(from = %cfg.topic, to = %next.topic, "🛰️ PRODUCER: topic changed, restarting agents");
                        pending = Some(next);
                    }
                }
            }
            // wait_for_topic only yields None on shutdown
            break;
        }

        self.set_state(ProducerState::Cancelled);
        info!("🛰️ PRODUCER: stopped");
        Ok(())
    }

    fn build_agents(&self, count: usize) -> Vec<SimAgent> {
        let mut rng = rand::thread_rng();
        let mut agents = if self.settings.resume {
            load_state(&self.settings.snapshot_path)
        } else {
            Vec::new()
        };

        if agents.is_empty() {
            return SimAgent::spawn_random(count, &mut rng);
        }

        info!(restored = agents.len(), "♻️ resuming agents from snapshot");
        agents.truncate(count);
        while agents.len() < count {
            let id = agents.len() as u32 + 1;
            let mut extra = SimAgent::spawn_random(1, &mut rng);
            if let Some(mut a) = extra.pop() {
                a.id = id;
                agents.push(a);
            }
        }
        agents
    }

    async fn run_session(
        &self,
        cfg: &TopicConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        // 1. Fresh data file per topic session
        if self.settings.reset_on_start {
            self.data.reset().await?;
        }

        // 2. Agents
        let agents: Vec<Arc<Mutex<SimAgent>>> = self
            .build_agents(cfg.agent_count as usize)
            .into_iter()
            .map(|a| {
                info!(id = a.id, agent = %a.profile, "👤 agent ready");
                Arc::new(Mutex::new(a))
            })
            .collect();

        let ctx = Arc::new(AgentContext {
            data: self.data.clone(),
            brain: Arc::clone(&self.brain),
            scorer: Arc::clone(&self.scorer),
            retry: self.settings.retry.clone(),
            min_delay: self.settings.min_delay,
            max_delay: self.settings.max_delay,
        });

        // 3. One task per agent
        let handles: Vec<JoinHandle<()>> = agents
            .iter()
            .map(|agent| tokio::spawn(agent_loop(Arc::clone(agent), cfg.topic.clone(), Arc::clone(&ctx))))
            .collect();

        self.set_state(ProducerState::Running {
            topic: cfg.topic.clone(),
            agents: agents.len(),
        });
        info!(topic = %cfg.topic, agents = agents.len(), "🛰️ PRODUCER: simulation running");

        // 4. Run until cancelled, stopped, or the topic file names a new topic
        let mut ticker = tokio::time::interval(self.settings.topic_poll);
        let end = loop {
            if *shutdown.borrow() {
                break SessionEnd::Cancelled;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.settings.topic_path.exists() {
                        break SessionEnd::Stopped;
                    }
                    if let Some(next) = self.new_topic(Some(cfg.topic.as_str())) {
                        break SessionEnd::TopicChanged(next);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break SessionEnd::Cancelled;
                    }
                }
            }
        };

        // 5. Stop the agents and snapshot them
        for h in &handles {
            h.abort();
        }
        for h in handles {
            let _ = h.await;
        }

        let mut snapshot = Vec::with_capacity(agents.len());
        for agent in &agents {
            snapshot.push(agent.lock().await.clone());
        }
        if let Err(e) = save_state(&self.settings.snapshot_path, &snapshot) {
            error!(error = %e, "failed to save simulation state");
        }

        Ok(end)
    }
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    if lo == hi {
        return lo;
    }
    rand::thread_rng().gen_range(lo..=hi)
}

async fn agent_loop(agent: Arc<Mutex<SimAgent>>, topic: String, ctx: Arc<AgentContext>) {
    loop {
        tokio::time::sleep(random_delay(ctx.min_delay, ctx.max_delay)).await;

        // 1. Generate (retries + model switching inside)
        let mut guard = agent.lock().await;
        let text = match generate_with_retry(ctx.brain.as_ref(), &mut guard, &topic, &ctx.retry).await {
            Ok(text) => text,
            Err(e) => {
                warn!(agent = %guard.profile.name, error = %e, "skipping this cycle");
                continue;
            }
        };

        // 2. Remember the exchange
        guard.memory.push(Role::User, comment_request(&topic));
        guard.memory.push(Role::Assistant, text.clone());

        // 3. Score + build the record
        let score = ctx.scorer.score(&text);
        let p = &guard.profile;
        let record = CommentRecord::new(&p.name, &p.style, &p.tone, &text, score, &topic);
        drop(guard);

        // 4. Append
        match ctx.data.append(record).await {
            Ok(saved) => info!(
                agent = %saved.agent_name,
                round = saved.round,
                sentiment = saved.sentiment.unwrap_or_default(),
                "💬 comment saved"
            ),
            Err(e) => error!(error = %e, "failed to append comment, dropping it"),
        }
    }
}
