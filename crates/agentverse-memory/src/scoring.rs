//! Similarity, decay and LLM-score helpers shared by the manipulators.

use agentverse_state::MemoryRecord;
use chrono::{DateTime, Utc};
use regex::Regex;

/// Importance decay per hour of memory age.
pub const DEFAULT_DECAY_RATE: f64 = 0.99;

/// Immediacy decays faster: urgent items stop being urgent quickly.
pub const FAST_DECAY_RATE: f64 = 0.90;

/// Score assumed when the LLM answers with something we cannot parse.
pub const FALLBACK_SCORE: f64 = 0.5;

/// Cosine similarity of two vectors, accumulated in f64.
///
/// Returns 0.0 on length mismatch, empty input or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (fx, fy) = (*x as f64, *y as f64);
        dot += fx * fy;
        na += fx * fx;
        nb += fy * fy;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

/// Exponential recency decay: `rate ^ age_hours`.
///
/// Timestamps in the future count as age zero.
pub fn recency_decay(timestamp: DateTime<Utc>, now: DateTime<Utc>, rate: f64) -> f64 {
    let age_ms = (now - timestamp).num_milliseconds().max(0) as f64;
    rate.powf(age_ms / 3_600_000.0)
}

/// Parse a "1 to 10" LLM rating into [0, 1].
///
/// A line holding only a number wins. Otherwise the scale itself
/// ("1 to 10", "1-10", "out of 10", "/10") is ignored and the first remaining
/// number is taken. The rating is divided by ten and clamped. Returns `None`
/// when the response holds no rating.
pub fn parse_score(response: &str) -> Option<f64> {
    let number = Regex::new(r"-?\d+(?:\.\d+)?").ok()?;
    let lone = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*\.?\s*$").ok()?;
    let scale = Regex::new(r"(?i)\b\d+\s*(?:to|through|-)\s*10\b|(?:\bout\s+of|/)\s*10\b").ok()?;

    let raw = match response.lines().find_map(|line| lone.captures(line)) {
        Some(caps) => caps.get(1)?.as_str().to_string(),
        None => {
            let stripped = scale.replace_all(response, " ");
            number.find(&stripped)?.as_str().to_string()
        }
    };
    let raw: f64 = raw.parse().ok()?;
    Some((raw / 10.0).clamp(0.0, 1.0))
}

/// Select the `k` highest-scoring records.
///
/// Sorted by score descending, ties broken by newer timestamp first.
pub fn top_k(mut scored: Vec<(f64, MemoryRecord)>, k: usize) -> Vec<(f64, MemoryRecord)> {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
    });
    scored.truncate(k);
    scored
}
