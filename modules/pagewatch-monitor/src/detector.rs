//! Change detection: decides whether fresh content differs enough from the
//! stored snapshot to be worth a rating call.
//!
//! Similarity is the cosine of lowercase word-frequency vectors, which is
//! symmetric and independent of paragraph order. Detection is a pure function
//! of its inputs.

use std::collections::{BTreeMap, HashSet};

use pagewatch_common::file_config::MonitorConfig;
use pagewatch_common::{content_hash, ContentSnapshot, ExtractedItem, RawContent};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Significance {
    FirstObservation,
    /// Previous or current content is empty; treated as maximally different.
    EmptyContent,
    BelowThreshold { similarity: f64 },
    /// Text is similar but previously unseen items appeared.
    NewItems { count: usize, similarity: f64 },
    Unchanged { similarity: f64 },
}

impl Significance {
    pub fn is_significant(&self) -> bool {
        !matches!(self, Significance::Unchanged { .. })
    }

    pub fn similarity(&self) -> Option<f64> {
        match self {
            Significance::FirstObservation => None,
            Significance::EmptyContent => Some(0.0),
            Significance::BelowThreshold { similarity }
            | Significance::NewItems { similarity, .. }
            | Significance::Unchanged { similarity } => Some(*similarity),
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Significance::FirstObservation => "first-observation",
            Significance::EmptyContent => "empty-content",
            Significance::BelowThreshold { .. } => "changed",
            Significance::NewItems { .. } => "new-items",
            Significance::Unchanged { .. } => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub significance: Significance,
    pub normalized: String,
    pub content_hash: String,
    /// `- removed` / `+ added` lines, capped.
    pub diff_summary: String,
    pub new_items: Vec<ExtractedItem>,
}

impl Detection {
    pub fn is_significant(&self) -> bool {
        self.significance.is_significant()
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    threshold: f64,
    trigger_on_new_items: bool,
    diff_lines: usize,
}

impl ChangeDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            trigger_on_new_items: true,
            diff_lines: 20,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            trigger_on_new_items: config.trigger_on_new_items,
            diff_lines: config.diff_lines,
        }
    }

    pub fn with_new_item_trigger(mut self, enabled: bool) -> Self {
        self.trigger_on_new_items = enabled;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn detect(&self, previous: Option<&ContentSnapshot>, current: &RawContent) -> Detection {
        let normalized = normalize(&current.text);
        let hash = content_hash(&normalized);

        let Some(previous) = previous else {
            return Detection {
                significance: Significance::FirstObservation,
                diff_summary: String::new(),
                new_items: current.items.clone(),
                normalized,
                content_hash: hash,
            };
        };

        let diff_summary = diff_summary(&previous.text, &normalized, self.diff_lines);
        let new_items = unseen_items(&previous.items, &current.items);

        let significance = if previous.text.trim().is_empty() || normalized.is_empty() {
            Significance::EmptyContent
        } else {
            let similarity = if previous.content_hash == hash {
                1.0
            } else {
                similarity(&previous.text, &normalized)
            };

            if similarity < self.threshold {
                Significance::BelowThreshold { similarity }
            } else if self.trigger_on_new_items && !previous.items.is_empty() && !new_items.is_empty() {
                Significance::NewItems {
                    count: new_items.len(),
                    similarity,
                }
            } else {
                Significance::Unchanged { similarity }
            }
        };

        Detection {
            significance,
            normalized,
            content_hash: hash,
            diff_summary,
            new_items,
        }
    }
}

/// Collapse whitespace within lines, drop blank lines.
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn term_frequencies(text: &str) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Cosine similarity of word-frequency vectors, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let fa = term_frequencies(a);
    let fb = term_frequencies(b);

    let vocab: std::collections::BTreeSet<&String> = fa.keys().chain(fb.keys()).collect();
    let va: Vec<f64> = vocab.iter().map(|t| fa.get(*t).copied().unwrap_or(0.0)).collect();
    let vb: Vec<f64> = vocab.iter().map(|t| fb.get(*t).copied().unwrap_or(0.0)).collect();

    cosine_similarity(&va, &vb).clamp(0.0, 1.0)
}

/// Cosine similarity between two f64 vectors. Returns 0.0 for zero-norm inputs.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Removed lines first, then added lines, at most `max_lines` in total.
pub fn diff_summary(old: &str, new: &str, max_lines: usize) -> String {
    let old_lines: HashSet<&str> = old.lines().collect();
    let new_lines: HashSet<&str> = new.lines().collect();

    let removed = old
        .lines()
        .filter(|l| !new_lines.contains(l))
        .map(|l| format!("- {l}"));
    let added = new
        .lines()
        .filter(|l| !old_lines.contains(l))
        .map(|l| format!("+ {l}"));

    removed.chain(added).take(max_lines).collect::<Vec<_>>().join("\n")
}

fn unseen_items(previous: &[ExtractedItem], current: &[ExtractedItem]) -> Vec<ExtractedItem> {
    let known: HashSet<String> = previous.iter().map(ExtractedItem::match_key).collect();
    current
        .iter()
        .filter(|item| !known.contains(&item.match_key()))
        .cloned()
        .collect()
}
