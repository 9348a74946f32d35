//! Text normalization shared by blocking and scoring.

use ahash::AHashSet;
use strsim::jaro_winkler;

/// Normalize text: lowercase, punctuation to spaces, collapse whitespace
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split already-normalized text into tokens
pub fn tokens(norm: &str) -> impl Iterator<Item = &str> {
    norm.split_whitespace()
}

/// Distinct tokens of already-normalized text
pub fn token_set(norm: &str) -> AHashSet<&str> {
    tokens(norm).collect()
}

/// Tokenize and sort tokens alphabetically
fn tokenize_and_sort(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

/// Extract character n-grams from already-normalized text
pub fn char_ngrams(norm: &str, n: usize) -> AHashSet<String> {
    let chars: Vec<char> = norm.chars().collect();

    if n == 0 || chars.len() < n {
        return AHashSet::new();
    }

    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// First `n` characters of already-normalized text, or `None` if it is empty
pub fn prefix(norm: &str, n: usize) -> Option<String> {
    if norm.is_empty() || n == 0 {
        return None;
    }
    Some(norm.chars().take(n).collect())
}

/// Token sort similarity on already-normalized strings, in [0, 1]
pub fn token_sort_similarity(norm1: &str, norm2: &str) -> f64 {
    if norm1.is_empty() || norm2.is_empty() {
        return 0.0;
    }

    let sorted1 = tokenize_and_sort(norm1).join(" ");
    let sorted2 = tokenize_and_sort(norm2).join(" ");

    jaro_winkler(&sorted1, &sorted2)
}

/// Token sort ratio on raw strings, scaled to 0.0-100.0
pub fn token_sort_ratio(s1: &str, s2: &str) -> f64 {
    token_sort_similarity(&normalize(s1), &normalize(s2)) * 100.0
}

/// Parse the first number appearing in `s` (e.g. "24.2 MP" -> 24.2)
pub fn leading_number(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let mut begin = start;
    // Keep a sign or leading dot directly attached to the digits
    if let Some(prev) = s[..start].chars().next_back() {
        if prev == '-' || prev == '.' {
            begin = start - 1;
        }
    }
    let rest = &s[begin..];
    let end = rest
        .char_indices()
        .skip(1)
        .find(|&(_, c)| !(c.is_ascii_digit() || c == '.'))
        .map_or(rest.len(), |(i, _)| i);
    rest[..end].trim_end_matches('.').parse().ok()
}
