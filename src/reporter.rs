// src/reporter.rs
// CSV export of the comment file + per-agent summary

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::record::CommentRecord;
use crate::sentiment::SentimentLabel;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentSummary {
    pub agent_name: String,
    pub comments: usize,
    pub average_sentiment: Option<f64>,
    pub label: Option<SentimentLabel>,
}

pub struct Reporter;

impl Reporter {
    pub fn write_csv<W: Write>(writer: W, records: &[CommentRecord]) -> Result<()> {
        let mut wtr = Writer::from_writer(writer);

        wtr.write_record([
            "round",
            "agent_name",
            "style",
            "tone",
            "topic",
            "sentiment",
            "label",
            "text",
        ])?;

        for r in records {
            let sentiment = r.sentiment.map(|s| format!("{:.4}", s)).unwrap_or_default();
            let label = r
                .sentiment
                .map(|s| SentimentLabel::from_score(s).as_str())
                .unwrap_or("");
            wtr.write_record([
                r.round.to_string().as_str(),
                r.agent_name.as_str(),
                r.style.as_deref().unwrap_or(""),
                r.tone.as_deref().unwrap_or(""),
                r.topic.as_deref().unwrap_or(""),
                sentiment.as_str(),
                label,
                r.text.as_str(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(records: &[CommentRecord]) -> Result<String> {
        let mut buf = Vec::new();
        Self::write_csv(&mut buf, records)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn export_csv(path: &Path, records: &[CommentRecord]) -> Result<()> {
        let file = std::fs::File::create(path)?;
        Self::write_csv(file, records)?;
        info!(path = %path.display(), rows = records.len(), "✅ CSV exported");
        Ok(())
    }

    /// One row per agent, sorted by name.
    pub fn summarize(records: &[CommentRecord]) -> Vec<AgentSummary> {
        let mut groups: BTreeMap<&str, (usize, f64, usize)> = BTreeMap::new();
        for r in records {
            let entry = groups.entry(r.agent_name.as_str()).or_insert((0, 0.0, 0));
            entry.0 += 1;
            if let Some(s) = r.sentiment {
                entry.1 += s;
                entry.2 += 1;
            }
        }

        groups
            .into_iter()
            .map(|(name, (comments, sum, scored))| {
                let average = (scored > 0).then(|| sum / scored as f64);
                AgentSummary {
                    agent_name: name.to_string(),
                    comments,
                    average_sentiment: average,
                    label: average.map(SentimentLabel::from_score),
                }
            })
            .collect()
    }

    pub fn print_summary(records: &[CommentRecord]) {
        info!(records = records.len(), "📈 SUMMARY");
        for s in Self::summarize(records) {
            info!(
                agent = %s.agent_name,
                comments = s.comments,
                average = s.average_sentiment.unwrap_or_default(),
                label = s.label.map(|l| l.as_str()).unwrap_or("n/a"),
                "  agent"
            );
        }
    }
}
