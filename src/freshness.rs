// src/freshness.rs
// Freshness tokens: cheap "did the data file change" signals.
// Poll-based (file metadata) or event-based (watcher-bumped counter).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessToken(pub u64);

pub trait TokenSource: Send + Sync {
    fn current(&self) -> FreshnessToken;
    fn name(&self) -> &'static str;
}

// =========================================================================
// 1. POLL-BASED: file modification time, length and inode
// =========================================================================
pub struct MtimeToken {
    path: PathBuf,
}

impl MtimeToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

// Coarse mtimes (1-2 s on some filesystems) can hide a write, so the length
// and inode are folded in too. Appends always grow the file and the rename
// swaps the inode. Only equality is meaningful; 0 means "no file".
fn metadata_token(meta: &std::fs::Metadata) -> FreshnessToken {
    let nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = DefaultHasher::new();
    nanos.hash(&mut hasher);
    meta.len().hash(&mut hasher);
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.ino().hash(&mut hasher);
    }
    FreshnessToken(hasher.finish().max(1))
}

impl TokenSource for MtimeToken {
    fn current(&self) -> FreshnessToken {
        match std::fs::metadata(&self.path) {
            Ok(meta) => metadata_token(&meta),
            Err(_) => FreshnessToken(0),
        }
    }

    fn name(&self) -> &'static str {
        "mtime"
    }
}

// =========================================================================
// 2. EVENT-BASED: filesystem watcher bumps a counter
// =========================================================================
pub struct WatchToken {
    counter: Arc<AtomicU64>,
    // Dropping the watcher stops the notifications.
    _watcher: RecommendedWatcher,
}

impl WatchToken {
    /// Watches the directory holding `path` and counts events naming the file.
    pub fn spawn(path: &Path) -> Result<Self> {
        let counter = Arc::new(AtomicU64::new(0));
        let file_name = path.file_name().map(|n| n.to_os_string());
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let signal = Arc::clone(&counter);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                let names_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant && names_file {
                    let seen = signal.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(events = seen, "⚡ data file changed");
                }
            }
            Err(e) => warn!(error = %e, "watcher error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "👀 watching data directory");

        Ok(Self {
            counter,
            _watcher: watcher,
        })
    }
}

impl TokenSource for WatchToken {
    fn current(&self) -> FreshnessToken {
        FreshnessToken(self.counter.load(Ordering::Relaxed))
    }

    fn name(&self) -> &'static str {
        "watch"
    }
}

// =========================================================================
// 3. GATE: decides whether a tick needs a recompute
// =========================================================================
#[derive(Debug)]
pub struct RefreshGate {
    last: Option<FreshnessToken>,
    always: bool,
}

impl RefreshGate {
    /// `always = true` is the simple variant: recompute on every tick.
    pub fn new(always: bool) -> Self {
        Self { last: None, always }
    }

    pub fn should_refresh(&mut self, token: FreshnessToken) -> bool {
        let changed = self.last != Some(token);
        self.last = Some(token);
        self.always || changed
    }
}
