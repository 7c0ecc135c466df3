// src/nlp.rs
// NLP annotations shown under the last comment:
// tokens, POS tags, noun chunks and sentence segmentation.

use serde::Serialize;

pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str) -> Annotations;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Annotations {
    pub tokens: Vec<String>,
    pub pos_tags: Vec<(String, String)>,
    pub noun_chunks: Vec<String>,
    pub sentences: Vec<String>,
}

/// Display strings, one per panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationPanels {
    pub tokens: String,
    pub pos_tags: String,
    pub noun_chunks: String,
    pub sentences: String,
}

pub const NO_TOKENS: &str = "No tokens found.";
pub const NO_POS_TAGS: &str = "No POS tags found.";
pub const NO_NOUN_CHUNKS: &str = "No noun chunks found.";
pub const NO_SENTENCES: &str = "No sentences found.";
pub const NO_DATA: &str = "No data.";

impl AnnotationPanels {
    pub fn render(a: &Annotations) -> Self {
        Self {
            tokens: or_placeholder(a.tokens.join(" "), NO_TOKENS),
            pos_tags: or_placeholder(
                a.pos_tags
                    .iter()
                    .map(|(tok, tag)| format!("{}|{}", tok, tag))
                    .collect::<Vec<_>>()
                    .join(" | "),
                NO_POS_TAGS,
            ),
            noun_chunks: or_placeholder(a.noun_chunks.join(" | "), NO_NOUN_CHUNKS),
            sentences: or_placeholder(
                a.sentences
                    .iter()
                    .map(|s| format!("• {}", s))
                    .collect::<Vec<_>>()
                    .join("\n"),
                NO_SENTENCES,
            ),
        }
    }

    pub fn empty() -> Self {
        Self {
            tokens: NO_DATA.to_string(),
            pos_tags: NO_DATA.to_string(),
            noun_chunks: NO_DATA.to_string(),
            sentences: NO_DATA.to_string(),
        }
    }
}

fn or_placeholder(s: String, placeholder: &str) -> String {
    if s.trim().is_empty() {
        placeholder.to_string()
    } else {
        s
    }
}

// =========================================================================
// RULE-BASED ANNOTATOR
// =========================================================================
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleAnnotator;

const DET: &[&str] = &["the", "a", "an", "this", "that", "these", "those", "my", "your", "our", "their", "his", "her", "its", "every", "some", "any"];
const PRON: &[&str] = &["i", "you", "he", "she", "it", "we", "they", "me", "him", "them", "us", "everyone", "nobody", "everything", "what"];
const ADP: &[&str] = &["in", "on", "at", "of", "for", "with", "about", "to", "from", "by", "into", "over", "like"];
const CCONJ: &[&str] = &["and", "or", "but", "nor", "yet"];
const AUX: &[&str] = &["is", "are", "was", "were", "be", "been", "am", "will", "would", "can", "could", "should", "do", "does", "did", "has", "have", "had", "may", "might", "must"];
const ADV: &[&str] = &["very", "really", "so", "not", "never", "too", "also", "just", "still", "honestly", "obviously", "definitely", "again", "lately", "yet", "far", "well", "more"];
const ADJ: &[&str] = &["good", "great", "bad", "new", "big", "small", "clear", "main", "short", "interesting", "amazing", "terrible", "excellent", "perfect", "happy", "sure", "mixed", "awful", "excited"];
const VERB: &[&str] = &["love", "loves", "likes", "hate", "think", "know", "see", "need", "want", "read", "make", "fix", "shows", "keeps", "feels", "looks", "scales", "makes", "get", "say"];

impl RuleAnnotator {
    fn tokenize(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            if c.is_alphanumeric() || c == '\'' || c == '-' {
                current.push(c);
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                if !c.is_whitespace() {
                    tokens.push(c.to_string());
                }
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    fn tag(token: &str, sentence_start: bool) -> &'static str {
        let lower = token.to_lowercase();
        let w = lower.as_str();
        if !token.chars().any(|c| c.is_alphanumeric()) {
            return "PUNCT";
        }
        if token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
            return "NUM";
        }
        if DET.contains(&w) {
            "DET"
        } else if PRON.contains(&w) {
            "PRON"
        } else if ADP.contains(&w) {
            "ADP"
        } else if CCONJ.contains(&w) {
            "CCONJ"
        } else if AUX.contains(&w) {
            "AUX"
        } else if ADV.contains(&w) || (w.ends_with("ly") && w.len() > 4) {
            "ADV"
        } else if ADJ.contains(&w)
            || ["ous", "ful", "ive", "able", "less", "ic"].iter().any(|s| w.ends_with(s) && w.len() > 4)
        {
            "ADJ"
        } else if VERB.contains(&w) || ((w.ends_with("ing") || w.ends_with("ed")) && w.len() > 4) {
            "VERB"
        } else if !sentence_start && token.chars().next().map_or(false, |c| c.is_uppercase()) {
            "PROPN"
        } else {
            "NOUN"
        }
    }

    fn sentences(text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                // Keep runs like "?!" or "..." together.
                while let Some(&next) = chars.peek() {
                    if matches!(next, '.' | '!' | '?') {
                        current.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek().map_or(true, |n| n.is_whitespace()) {
                    let s = current.trim().to_string();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    current.clear();
                }
            }
        }
        let rest = current.trim();
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
        out
    }

    fn noun_chunks(pos: &[(String, String)]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut has_noun = false;

        fn flush(current: &mut Vec<&str>, has_noun: &mut bool, chunks: &mut Vec<String>) {
            if *has_noun {
                chunks.push(current.join(" "));
            }
            current.clear();
            *has_noun = false;
        }

        for (token, tag) in pos {
            match tag.as_str() {
                "NOUN" | "PROPN" => {
                    current.push(token);
                    has_noun = true;
                }
                "DET" | "ADJ" | "NUM" => {
                    // A modifier after a noun starts a new chunk.
                    if has_noun {
                        flush(&mut current, &mut has_noun, &mut chunks);
                    }
                    current.push(token);
                }
                _ => flush(&mut current, &mut has_noun, &mut chunks),
            }
        }
        flush(&mut current, &mut has_noun, &mut chunks);
        chunks
    }
}

impl Annotator for RuleAnnotator {
    fn annotate(&self, text: &str) -> Annotations {
        let sentences = Self::sentences(text);
        let mut tokens = Vec::new();
        let mut pos_tags = Vec::new();

        for sentence in &sentences {
            let mut start = true;
            for token in Self::tokenize(sentence) {
                let tag = Self::tag(&token, start);
                if tag != "PUNCT" {
                    start = false;
                }
                pos_tags.push((token.clone(), tag.to_string()));
                tokens.push(token);
            }
        }

        let noun_chunks = Self::noun_chunks(&pos_tags);
        Annotations { tokens, pos_tags, noun_chunks, sentences }
    }
}
