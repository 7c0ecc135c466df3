// src/record.rs
// The shared data-file schema: one simulated comment per record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommentRecord {
    #[serde(alias = "nome", alias = "name")]
    pub agent_name: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(alias = "texto", default)]
    pub text: String,

    // Canonical shape on disk is a bare float in [-1, 1].
    // Older files carry labels or {"score": f}; see `sentiment_from_value`.
    #[serde(alias = "rating", default, deserialize_with = "de_sentiment")]
    pub sentiment: Option<f64>,

    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub round: u64,
}

/// A single column value, cast the way the filters and charts see it.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Cell {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// String form used for filter equality and option lists.
    pub fn as_key(&self) -> String {
        match self {
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => format_float(*v),
            Cell::Text(s) => s.clone(),
        }
    }
}

// 1.0 renders as "1.0", not "1", so options read like the numbers on disk.
fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

impl CommentRecord {
    pub fn new(
        agent_name: &str,
        style: &str,
        tone: &str,
        text: &str,
        sentiment: f64,
        topic: &str,
    ) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            style: Some(style.to_string()),
            tone: Some(tone.to_string()),
            text: text.to_string(),
            sentiment: Some(clamp_score(sentiment)),
            topic: Some(topic.to_string()),
            round: 0,
        }
    }

    /// Stand-in shown while there is nothing (readable) on disk yet.
    pub fn placeholder() -> Self {
        Self {
            agent_name: "Pulse".to_string(),
            style: None,
            tone: None,
            text: "no comments yet".to_string(),
            sentiment: Some(0.0),
            topic: None,
            round: 0,
        }
    }

    /// Looks up a column by name. `None` means the column is not applicable
    /// to this record (missing optional field or unknown column).
    pub fn column(&self, name: &str) -> Option<Cell> {
        match name {
            "agent_name" | "nome" | "name" => Some(Cell::Text(self.agent_name.clone())),
            "style" => self.style.clone().map(Cell::Text),
            "tone" => self.tone.clone().map(Cell::Text),
            "text" | "texto" => Some(Cell::Text(self.text.clone())),
            "sentiment" | "rating" => self.sentiment.map(Cell::Float),
            "topic" => self.topic.clone().map(Cell::Text),
            "round" => Some(Cell::Int(self.round)),
            _ => None,
        }
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

/// Adapts every sentiment shape the data files have used to a float.
/// Labels map like the reporter buckets: positive 1, neutral 0, negative -1.
pub fn sentiment_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_score),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Some(1.0),
            "neutral" | "neu" => Some(0.0),
            "negative" | "neg" => Some(-1.0),
            other => other.parse::<f64>().ok().map(clamp_score),
        },
        Value::Object(map) => map.get("score").and_then(sentiment_from_value),
        _ => None,
    }
}

fn de_sentiment<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(sentiment_from_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_sentiment_shapes() {
        let raw = r#"[
            {"agent_name":"Ana","text":"a","sentiment":0.25,"round":1},
            {"agent_name":"Bob","text":"b","sentiment":"Negative","round":2},
            {"agent_name":"Caio","text":"c","sentiment":{"score":3.0},"round":3},
            {"agent_name":"Duda","text":"d","sentiment":"whatever","round":4},
            {"agent_name":"Eva","text":"e","round":5}
        ]"#;
        let records: Vec<CommentRecord> = serde_json::from_str(raw).unwrap();
        let scores: Vec<Option<f64>> = records.iter().map(|r| r.sentiment).collect();
        assert_eq!(scores, vec![Some(0.25), Some(-1.0), Some(1.0), None, None]);
    }

    #[test]
    fn accepts_legacy_column_names() {
        let raw = r#"{"nome":"Ana","texto":"oi","rating":0.5,"style":"casual","tone":"neutral","topic":"x","round":2}"#;
        let rec: CommentRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.agent_name, "Ana");
        assert_eq!(rec.text, "oi");
        assert_eq!(rec.sentiment, Some(0.5));

        // Written back in the canonical shape.
        let out = serde_json::to_value(&rec).unwrap();
        assert_eq!(out["agent_name"], "Ana");
        assert_eq!(out["sentiment"], 0.5);
    }

    #[test]
    fn column_keys_are_string_cast() {
        let mut rec = CommentRecord::new("Ana", "formal", "neutral", "hi", 1.0, "t");
        rec.round = 7;
        assert_eq!(rec.column("round").unwrap().as_key(), "7");
        assert_eq!(rec.column("sentiment").unwrap().as_key(), "1.0");
        assert_eq!(rec.column("nome").unwrap().as_key(), "Ana");
        assert!(rec.column("missing").is_none());

        rec.tone = None;
        assert!(rec.column("tone").is_none());
    }

    #[test]
    fn new_clamps_score() {
        let rec = CommentRecord::new("Ana", "s", "t", "x", 4.2, "topic");
        assert_eq!(rec.sentiment, Some(1.0));
    }
}
