// src/dashboard.rs
// CONSUMER PIPELINE
// Re-reads the data file, applies the filter controls and recomputes every widget.
// `recompute` is pure; `Consumer` owns the token gate, the selections and the
// last published view.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::datafile::DataFile;
use crate::freshness::{FreshnessToken, RefreshGate, TokenSource};
use crate::nlp::{AnnotationPanels, Annotator};
use crate::record::{Cell, CommentRecord};
use crate::wordcloud::{self, WordCloud, DEFAULT_MAX_WORDS};

// =========================================================================
// 1. LAYOUT & FILTER DESCRIPTORS
// =========================================================================
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Line,
    Bar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilterKey {
    pub panel: Panel,
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterDescriptor {
    pub key: FilterKey,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct DashboardLayout {
    pub line_x: String,
    pub line_y: String,
    pub line_filters: Vec<String>,
    pub bar_filters: Vec<String>,
    pub max_words: usize,
}

impl Default for DashboardLayout {
    fn default() -> Self {
        Self {
            line_x: "round".to_string(),
            line_y: "sentiment".to_string(),
            line_filters: vec!["agent_name".to_string(), "style".to_string(), "tone".to_string()],
            bar_filters: vec!["topic".to_string()],
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

impl DashboardLayout {
    pub fn descriptors(&self) -> Vec<FilterDescriptor> {
        let line = self.line_filters.iter().enumerate().map(|(index, column)| FilterDescriptor {
            key: FilterKey { panel: Panel::Line, index },
            column: column.clone(),
        });
        let bar = self.bar_filters.iter().enumerate().map(|(index, column)| FilterDescriptor {
            key: FilterKey { panel: Panel::Bar, index },
            column: column.clone(),
        });
        line.chain(bar).collect()
    }

    pub fn descriptor(&self, key: FilterKey) -> Option<FilterDescriptor> {
        self.descriptors().into_iter().find(|d| d.key == key)
    }

    fn active_filters<'a>(&'a self, panel: Panel, selection: &'a FilterSelection) -> Vec<(&'a str, &'a str)> {
        let columns = match panel {
            Panel::Line => &self.line_filters,
            Panel::Bar => &self.bar_filters,
        };
        columns
            .iter()
            .enumerate()
            .filter_map(|(index, column)| {
                selection
                    .get(FilterKey { panel, index })
                    .map(|value| (column.as_str(), value))
            })
            .collect()
    }
}

/// Current value of every filter control. Absent (or blank) means "no restriction".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSelection {
    values: BTreeMap<FilterKey, String>,
}

impl FilterSelection {
    pub fn set(&mut self, key: FilterKey, value: Option<String>) {
        match value {
            Some(v) if !v.is_empty() => {
                self.values.insert(key, v);
            }
            _ => {
                self.values.remove(&key);
            }
        }
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.values.get(&key).map(|v| v.as_str())
    }
}

// =========================================================================
// 2. VIEW TYPES
// =========================================================================
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinePoint {
    pub x: Cell,
    pub y: Cell,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineChart {
    pub x_column: String,
    pub y_column: String,
    pub points: Vec<LinePoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BarPoint {
    pub agent_name: String,
    pub average_sentiment: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastComment {
    pub agent_name: String,
    pub text: String,
    pub round: Option<u64>,
}

pub const NO_NAME: &str = "N/A";
pub const NO_COMMENT: &str = "No data to display.";

impl LastComment {
    fn placeholder() -> Self {
        Self {
            agent_name: NO_NAME.to_string(),
            text: NO_COMMENT.to_string(),
            round: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterOptions {
    pub key: FilterKey,
    pub column: String,
    pub options: Vec<String>,
    pub selected: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardView {
    pub record_count: usize,
    pub line: LineChart,
    pub bar: Vec<BarPoint>,
    pub last_comment: LastComment,
    pub word_cloud: WordCloud,
    pub annotations: AnnotationPanels,
    pub filters: Vec<FilterOptions>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublishedView {
    pub token: FreshnessToken,
    pub refreshed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub view: DashboardView,
}

// =========================================================================
// 3. PURE RECOMPUTATION
// =========================================================================

/// AND across `(column, value)` pairs on string-cast values.
/// A record without the column fails an active filter on it.
pub fn apply_filters<'a>(records: &'a [CommentRecord], filters: &[(&str, &str)]) -> Vec<&'a CommentRecord> {
    records
        .iter()
        .filter(|r| {
            filters
                .iter()
                .all(|(column, value)| r.column(column).map_or(false, |c| c.as_key() == *value))
        })
        .collect()
}

/// Sorted distinct string-cast values of `column`.
pub fn filter_options(records: &[CommentRecord], column: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.column(column))
        .map(|c| c.as_key())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// (x, y) pairs in file order; records missing either column are skipped.
pub fn line_series(records: &[&CommentRecord], x: &str, y: &str) -> Vec<LinePoint> {
    records
        .iter()
        .filter_map(|r| Some(LinePoint { x: r.column(x)?, y: r.column(y)? }))
        .collect()
}

/// Mean sentiment per agent, highest first.
pub fn bar_series(records: &[&CommentRecord]) -> Vec<BarPoint> {
    let mut groups: HashMap<&str, (f64, usize)> = HashMap::new();
    for r in records {
        if let Some(score) = r.sentiment {
            let entry = groups.entry(r.agent_name.as_str()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    let mut bars: Vec<BarPoint> = groups
        .into_iter()
        .map(|(name, (sum, n))| BarPoint {
            agent_name: name.to_string(),
            average_sentiment: sum / n as f64,
        })
        .collect();
    bars.sort_by(|a, b| {
        b.average_sentiment
            .partial_cmp(&a.average_sentiment)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.agent_name.cmp(&b.agent_name))
    });
    bars
}

/// Highest round wins; ties go to the later record in file order.
pub fn last_comment(records: &[CommentRecord]) -> Option<&CommentRecord> {
    records
        .iter()
        .enumerate()
        .max_by_key(|(i, r)| (r.round, *i))
        .map(|(_, r)| r)
}

pub fn recompute(
    records: &[CommentRecord],
    layout: &DashboardLayout,
    selection: &FilterSelection,
    annotator: &dyn Annotator,
) -> DashboardView {
    // 1. Filtered subsets, one per chart panel
    let line_rows = apply_filters(records, &layout.active_filters(Panel::Line, selection));
    let bar_rows = apply_filters(records, &layout.active_filters(Panel::Bar, selection));

    // 2. Chart inputs
    let line = LineChart {
        x_column: layout.line_x.clone(),
        y_column: layout.line_y.clone(),
        points: line_series(&line_rows, &layout.line_x, &layout.line_y),
    };
    let bar = bar_series(&bar_rows);

    // 3. Last comment card + NLP panels (unfiltered)
    let (last_comment, annotations) = match last_comment(records) {
        Some(r) => (
            LastComment {
                agent_name: r.agent_name.clone(),
                text: r.text.clone(),
                round: Some(r.round),
            },
            AnnotationPanels::render(&annotator.annotate(&r.text)),
        ),
        None => (LastComment::placeholder(), AnnotationPanels::empty()),
    };

    // 4. Word cloud (unfiltered)
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    let word_cloud = wordcloud::build(&texts, layout.max_words);

    // 5. Option lists from the unfiltered set
    let filters = layout
        .descriptors()
        .into_iter()
        .map(|d| FilterOptions {
            options: filter_options(records, &d.column),
            selected: selection.get(d.key).map(|s| s.to_string()),
            key: d.key,
            column: d.column,
        })
        .collect();

    DashboardView {
        record_count: records.len(),
        line,
        bar,
        last_comment,
        word_cloud,
        annotations,
        filters,
    }
}

// =========================================================================
// 4. CONSUMER STATE
// Shared by the refresh timer and the HTTP handlers.
// =========================================================================
pub struct Consumer {
    data: DataFile,
    layout: DashboardLayout,
    source: Box<dyn TokenSource>,
    annotator: Box<dyn Annotator>,
    gate: Mutex<RefreshGate>,
    selection: DashMap<FilterKey, String>,
    // Held across read -> recompute -> publish so an older selection
    // snapshot can never be published after a newer one.
    refresh_lock: Mutex<()>,
    published: RwLock<Option<PublishedView>>,
}

impl Consumer {
    pub fn new(
        data: DataFile,
        layout: DashboardLayout,
        source: Box<dyn TokenSource>,
        annotator: Box<dyn Annotator>,
        always_refresh: bool,
    ) -> Self {
        Self {
            data,
            layout,
            source,
            annotator,
            gate: Mutex::new(RefreshGate::new(always_refresh)),
            selection: DashMap::new(),
            refresh_lock: Mutex::new(()),
            published: RwLock::new(None),
        }
    }

    pub fn data(&self) -> &DataFile {
        &self.data
    }

    pub fn token(&self) -> FreshnessToken {
        self.source.current()
    }

    pub fn selection(&self) -> FilterSelection {
        let mut sel = FilterSelection::default();
        for entry in self.selection.iter() {
            sel.set(*entry.key(), Some(entry.value().clone()));
        }
        sel
    }

    /// Timer tick. Returns whether a new view was published.
    pub fn tick(&self) -> bool {
        let token = self.source.current();
        let go = match self.gate.lock() {
            Ok(mut gate) => gate.should_refresh(token),
            Err(_) => true,
        };
        if go {
            self.refresh_with(token);
        }
        go
    }

    /// Unconditional recompute (used after filter changes).
    pub fn refresh(&self) {
        self.refresh_with(self.source.current());
    }

    fn refresh_with(&self, token: FreshnessToken) {
        let _guard = self.refresh_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let records = self.data.read_all();
        let view = recompute(&records, &self.layout, &self.selection(), self.annotator.as_ref());
        debug!(token = token.0, records = view.record_count, "dashboard recomputed");

        let published = PublishedView {
            token,
            refreshed_at: Utc::now(),
            view,
        };
        if let Ok(mut slot) = self.published.write() {
            *slot = Some(published);
        }
    }

    /// Updates one filter control and republishes. Unknown controls are rejected.
    pub fn set_filter(&self, key: FilterKey, value: Option<String>) -> Option<FilterDescriptor> {
        let descriptor = self.layout.descriptor(key)?;
        match value.filter(|v| !v.is_empty()) {
            Some(v) => {
                self.selection.insert(key, v);
            }
            None => {
                self.selection.remove(&key);
            }
        }
        self.refresh();
        Some(descriptor)
    }

    /// Filter controls with their options. Before the first recompute the
    /// option lists are empty.
    pub fn filters(&self) -> Vec<FilterOptions> {
        if let Some(published) = self.view() {
            return published.view.filters;
        }
        let selection = self.selection();
        self.layout
            .descriptors()
            .into_iter()
            .map(|d| FilterOptions {
                selected: selection.get(d.key).map(|s| s.to_string()),
                options: Vec::new(),
                key: d.key,
                column: d.column,
            })
            .collect()
    }

    pub fn view(&self) -> Option<PublishedView> {
        self.published.read().ok().and_then(|v| v.clone())
    }

    /// Refresh loop; ends when `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            file = %self.data.path().display(),
            source = self.source.name(),
            period_ms = period.as_millis() as u64,
            "📊 DASHBOARD: refresh loop started"
        );
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let me = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || me.tick()).await {
                        warn!(error = %e, "dashboard refresh panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("📊 DASHBOARD: refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::MtimeToken;
    use crate::nlp::RuleAnnotator;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn rec(name: &str, style: &str, round: u64, score: f64, text: &str) -> CommentRecord {
        let mut r = CommentRecord::new(name, style, "neutral", text, score, "space");
        r.round = round;
        r
    }

    fn sample() -> Vec<CommentRecord> {
        vec![
            rec("Ana", "x", 1, 0.5, "Rockets are great."),
            rec("Ana", "x", 2, -0.5, "Rockets are loud."),
            rec("Bob", "y", 1, 0.2, "The launch was late. Still fun."),
        ]
    }

    #[test]
    fn filters_are_anded() {
        let records = sample();
        let only_x = apply_filters(&records, &[("style", "x")]);
        assert_eq!(only_x.len(), 2);
        assert!(only_x.iter().all(|r| r.agent_name == "Ana"));

        let x_and_1 = apply_filters(&records, &[("style", "x"), ("round", "1")]);
        assert_eq!(x_and_1.len(), 1);
        assert_eq!(x_and_1[0].text, "Rockets are great.");

        assert_eq!(apply_filters(&records, &[]).len(), 3);
        assert!(apply_filters(&records, &[("missing", "1")]).is_empty());
    }

    #[test]
    fn bar_series_sorted_by_average() {
        let records = sample();
        let rows: Vec<&CommentRecord> = records.iter().collect();
        let bars = bar_series(&rows);
        assert_eq!(
            bars,
            vec![
                BarPoint { agent_name: "Bob".to_string(), average_sentiment: 0.2 },
                BarPoint { agent_name: "Ana".to_string(), average_sentiment: 0.0 },
            ]
        );
    }

    #[test]
    fn bar_series_empty_without_sentiment() {
        let mut records = sample();
        for r in records.iter_mut() {
            r.sentiment = None;
        }
        let rows: Vec<&CommentRecord> = records.iter().collect();
        assert!(bar_series(&rows).is_empty());
        assert!(bar_series(&[]).is_empty());
    }

    #[test]
    fn line_series_keeps_file_order() {
        let records = sample();
        let rows: Vec<&CommentRecord> = records.iter().collect();
        let points = line_series(&rows, "round", "sentiment");
        let xs: Vec<String> = points.iter().map(|p| p.x.as_key()).collect();
        assert_eq!(xs, vec!["1", "2", "1"]);
    }

    #[test]
    fn options_come_from_unfiltered_set() {
        let records = sample();
        let layout = DashboardLayout {
            line_filters: vec!["style".to_string()],
            bar_filters: vec!["agent_name".to_string()],
            ..DashboardLayout::default()
        };
        let mut sel = FilterSelection::default();
        sel.set(FilterKey { panel: Panel::Line, index: 0 }, Some("y".to_string()));

        let view = recompute(&records, &layout, &sel, &RuleAnnotator);
        assert_eq!(view.filters[0].options, vec!["x", "y"]);
        assert_eq!(view.filters[0].selected.as_deref(), Some("y"));
        assert_eq!(view.filters[1].options, vec!["Ana", "Bob"]);
        // Line panel is filtered, bar panel is not.
        assert_eq!(view.line.points.len(), 1);
        assert_eq!(view.bar.len(), 2);
    }

    #[test]
    fn last_comment_ignores_filters() {
        let mut records = sample();
        records[2].round = 3;
        let layout = DashboardLayout {
            line_filters: vec!["agent_name".to_string()],
            ..DashboardLayout::default()
        };
        let mut sel = FilterSelection::default();
        sel.set(FilterKey { panel: Panel::Line, index: 0 }, Some("Ana".to_string()));

        let view = recompute(&records, &layout, &sel, &RuleAnnotator);
        assert_eq!(view.last_comment.agent_name, "Bob");
        assert_eq!(view.last_comment.text, "The launch was late. Still fun.");
        assert_eq!(view.annotations.sentences, "• The launch was late.\n• Still fun.");
    }

    #[test]
    fn recompute_is_idempotent() {
        let records = sample();
        let layout = DashboardLayout::default();
        let mut sel = FilterSelection::default();
        sel.set(FilterKey { panel: Panel::Bar, index: 0 }, Some("space".to_string()));
        let a = recompute(&records, &layout, &sel, &RuleAnnotator);
        let b = recompute(&records, &layout, &sel, &RuleAnnotator);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_record_set_uses_placeholders() {
        let view = recompute(&[], &DashboardLayout::default(), &FilterSelection::default(), &RuleAnnotator);
        assert_eq!(view.last_comment.agent_name, NO_NAME);
        assert_eq!(view.last_comment.text, NO_COMMENT);
        assert!(view.word_cloud.placeholder);
        assert!(view.bar.is_empty());
        assert!(view.line.points.is_empty());
        assert_eq!(view.annotations, AnnotationPanels::empty());
    }

    struct CountingSource(AtomicU64);

    impl TokenSource for CountingSource {
        fn current(&self) -> FreshnessToken {
            FreshnessToken(self.0.load(Ordering::SeqCst))
        }
        fn name(&self) -> &'static str {
            "test"
        }
    }

    #[test]
    fn consumer_skips_unchanged_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataFile::new(dir.path().join("data.json"));
        let consumer = Consumer::new(
            data,
            DashboardLayout::default(),
            Box::new(CountingSource(AtomicU64::new(0))),
            Box::new(RuleAnnotator),
            false,
        );

        assert!(consumer.view().is_none());
        assert!(consumer.tick());
        assert!(!consumer.tick());
        // Nothing on disk yet: the placeholder record is shown.
        let view = consumer.view().unwrap();
        assert_eq!(view.view.last_comment.agent_name, "Pulse");
    }

    // Parks the first annotate call until released.
    struct GatedAnnotator {
        entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Annotator for GatedAnnotator {
        fn annotate(&self, text: &str) -> crate::nlp::Annotations {
            let first = self.entered.lock().unwrap().take();
            if let Some(entered) = first {
                entered.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            RuleAnnotator.annotate(text)
        }
    }

    #[test]
    fn slow_tick_cannot_overwrite_a_newer_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, serde_json::to_vec(&sample()).unwrap()).unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let consumer = Arc::new(Consumer::new(
            DataFile::new(&path),
            DashboardLayout::default(),
            Box::new(CountingSource(AtomicU64::new(1))),
            Box::new(GatedAnnotator {
                entered: Mutex::new(Some(entered_tx)),
                release: Mutex::new(release_rx),
            }),
            false,
        ));

        // 1. Tick snapshots the empty selection and parks inside recompute
        let ticking = {
            let c = Arc::clone(&consumer);
            std::thread::spawn(move || c.tick())
        };
        entered_rx.recv().unwrap();

        // 2. A filter change arrives while the tick is still computing
        let key = FilterKey { panel: Panel::Line, index: 0 };
        let filtering = {
            let c = Arc::clone(&consumer);
            std::thread::spawn(move || c.set_filter(key, Some("Ana".to_string())))
        };
        std::thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert!(ticking.join().unwrap());
        assert!(filtering.join().unwrap().is_some());

        let view = consumer.view().unwrap().view;
        assert_eq!(view.line.points.len(), 2);
        assert_eq!(view.filters[0].selected.as_deref(), Some("Ana"));
        // Token unchanged: the next tick keeps the filtered view.
        assert!(!consumer.tick());
        assert_eq!(consumer.view().unwrap().view.filters[0].selected.as_deref(), Some("Ana"));
    }

    #[test]
    fn filters_have_one_shape_before_and_after_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, serde_json::to_vec(&sample()).unwrap()).unwrap();
        let consumer = Consumer::new(
            DataFile::new(&path),
            DashboardLayout::default(),
            Box::new(CountingSource(AtomicU64::new(1))),
            Box::new(RuleAnnotator),
            false,
        );

        let before = consumer.filters();
        assert_eq!(before.len(), 4);
        assert_eq!(before[0].column, "agent_name");
        assert!(before.iter().all(|f| f.options.is_empty() && f.selected.is_none()));

        consumer.tick();
        let after = consumer.filters();
        assert_eq!(after.len(), 4);
        assert_eq!(after[0].options, vec!["Ana", "Bob"]);
    }

    #[tokio::test]
    async fn consumer_picks_up_appends_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let data = DataFile::new(&path);
        let consumer = Consumer::new(
            data.clone(),
            DashboardLayout::default(),
            Box::new(MtimeToken::new(&path)),
            Box::new(RuleAnnotator),
            false,
        );
        consumer.tick();

        data.append(rec("Ana", "casual", 0, 0.4, "hello space")).await.unwrap();
        data.append(rec("Bob", "formal", 0, -0.2, "bye space")).await.unwrap();
        assert!(consumer.tick());
        let view = consumer.view().unwrap().view;
        assert_eq!(view.record_count, 2);
        assert_eq!(view.last_comment.agent_name, "Bob");

        let key = FilterKey { panel: Panel::Line, index: 0 };
        assert!(consumer.set_filter(key, Some("Ana".to_string())).is_some());
        let view = consumer.view().unwrap().view;
        assert_eq!(view.line.points.len(), 1);
        assert_eq!(view.filters[0].selected.as_deref(), Some("Ana"));

        consumer.set_filter(key, None);
        assert_eq!(consumer.view().unwrap().view.line.points.len(), 2);

        let unknown = FilterKey { panel: Panel::Bar, index: 9 };
        assert!(consumer.set_filter(unknown, Some("x".to_string())).is_none());
    }
}
