// src/sentiment.rs
// Lexicon-based sentiment scoring (compound score in [-1, 1]).

use serde::Serialize;

use crate::record::clamp_score;

pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.05 {
            SentimentLabel::Positive
        } else if score <= -0.05 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

// Valences on the usual -4..4 scale.
const LEXICON: &[(&str, f64)] = &[
    ("love", 3.2), ("loved", 2.9), ("great", 3.1), ("amazing", 2.8), ("perfect", 2.7),
    ("excellent", 3.2), ("good", 1.9), ("happy", 2.7), ("excited", 1.4), ("awesome", 3.1),
    ("benefits", 1.5), ("progress", 1.3), ("best", 3.2), ("nice", 1.8), ("win", 2.8),
    ("interesting", 1.7), ("fun", 2.3), ("like", 1.5), ("hope", 1.9), ("definitely", 1.7),
    ("bad", -2.5), ("terrible", -2.1), ("hate", -2.7), ("awful", -2.0), ("dislike", -1.6),
    ("disappointment", -2.3), ("doubt", -1.5), ("worst", -3.1), ("sad", -2.1), ("fail", -2.5),
    ("problem", -1.7), ("boring", -1.3), ("useless", -1.8), ("angry", -2.3), ("wrong", -2.1),
    ("unclear", -0.7), ("costs", -0.5), ("scary", -2.2),
    // pt-BR personas comment in Portuguese
    ("amo", 3.2), ("bom", 1.9), ("ótimo", 3.0), ("incrível", 2.8), ("excelente", 3.2),
    ("ruim", -2.5), ("péssimo", -3.0), ("odeio", -2.7), ("triste", -2.1), ("horrível", -2.5),
];

const NEGATORS: &[&str] = &["not", "no", "never", "nobody", "isn't", "don't", "doesn't", "não", "nunca"];
const BOOSTERS: &[&str] = &["very", "really", "so", "extremely", "honestly", "muito"];

const NEGATION_FACTOR: f64 = -0.74;
const BOOST: f64 = 0.293;
const ALPHA: f64 = 15.0;

#[derive(Clone, Copy, Debug, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    fn valence(word: &str) -> Option<f64> {
        LEXICON.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
    }

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect()
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let words = Self::words(text);
        let mut sum = 0.0;

        for (i, word) in words.iter().enumerate() {
            let Some(mut v) = Self::valence(word) else { continue };

            // Look back up to three words for boosters and negations.
            for back in 1..=3 {
                if i < back {
                    break;
                }
                let prev = words[i - back].as_str();
                if back == 1 && BOOSTERS.contains(&prev) {
                    v += BOOST * v.signum();
                }
                if NEGATORS.contains(&prev) {
                    v *= NEGATION_FACTOR;
                    break;
                }
            }
            sum += v;
        }

        let bangs = text.matches('!').count().min(4) as f64;
        if sum != 0.0 {
            sum += bangs * 0.292 * sum.signum();
        }

        if sum == 0.0 {
            0.0
        } else {
            clamp_score(sum / (sum * sum + ALPHA).sqrt())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_negative_and_neutral() {
        let s = LexiconScorer;
        assert!(s.score("I love this, it is great!") > 0.5);
        assert!(s.score("This is terrible and I hate it") < -0.5);
        assert_eq!(s.score("The meeting is on Tuesday"), 0.0);
    }

    #[test]
    fn negation_flips_sign() {
        let s = LexiconScorer;
        assert!(s.score("this is good") > 0.0);
        assert!(s.score("this is not good") < 0.0);
    }

    #[test]
    fn scores_stay_in_range() {
        let s = LexiconScorer;
        let gushing = "love love love amazing perfect excellent best awesome!!!!";
        let v = s.score(gushing);
        assert!(v > 0.9 && v <= 1.0);
    }

    #[test]
    fn labels_use_compound_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.3), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.2), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::Negative.as_str(), "negative");
    }
}
