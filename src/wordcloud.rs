// src/wordcloud.rs
// Word-frequency data for the word cloud widget.
// The image itself is drawn by the frontend; we ship ranked words + weights.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

pub const DEFAULT_MAX_WORDS: usize = 200;
pub const PLACEHOLDER_CORPUS: &str = "empty";

const STOPWORDS: &[&str] = &[
    // en
    "a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "being", "but", "by", "can", "could", "did", "do", "does", "for",
    "from", "had", "has", "have", "he", "her", "here", "him", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "not", "of", "on",
    "or", "our", "out", "over", "she", "so", "some", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "too", "up", "us", "very", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would",
    "you", "your",
    // pt
    "de", "da", "do", "das", "dos", "em", "um", "uma", "para", "com", "não", "que", "se",
    "na", "no", "os", "as", "por", "mais", "mas", "ao", "eu", "ele", "ela", "isso", "esse",
    "essa", "muito", "já", "ou", "meu", "minha", "é",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WordWeight {
    pub word: String,
    pub count: usize,
    // count / top count, in (0, 1]
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WordCloud {
    pub words: Vec<WordWeight>,
    pub placeholder: bool,
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

fn count_words(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for word in strip_punctuation(text).split_whitespace() {
        let word = word.to_lowercase();
        if word.chars().count() < 2 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

pub fn build<S: AsRef<str> + Sync>(texts: &[S], max_words: usize) -> WordCloud {
    let counts = texts
        .par_iter()
        .map(|t| count_words(t.as_ref()))
        .reduce(HashMap::new, |mut acc, part| {
            for (w, c) in part {
                *acc.entry(w).or_insert(0) += c;
            }
            acc
        });

    let (counts, placeholder) = if counts.is_empty() {
        (count_words(PLACEHOLDER_CORPUS), true)
    } else {
        (counts, false)
    };

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_words.max(1));

    let top = ranked.first().map(|(_, c)| *c).unwrap_or(1) as f64;
    WordCloud {
        words: ranked
            .into_iter()
            .map(|(word, count)| WordWeight { word, count, weight: count as f64 / top })
            .collect(),
        placeholder,
    }
}
