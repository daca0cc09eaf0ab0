//! Token-sort similarity on a 0–100 scale.
//!
//! Both strings are split on whitespace, their tokens sorted and re-joined,
//! and compared with the normalized Indel similarity
//! `2 * lcs(a, b) / (|a| + |b|) * 100`.

use std::collections::HashMap;

/// Tokens sorted and joined by single spaces.
pub fn sort_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

pub fn token_sort_ratio(left: &str, right: &str) -> f64 {
    SortedPattern::new(left).ratio(&sort_tokens(right))
}

/// A query string prepared once and scored against many sorted candidates.
#[derive(Debug, Clone)]
pub struct SortedPattern {
    chars: Vec<char>,
    masks: Option<HashMap<char, u64>>,
}

impl SortedPattern {
    pub fn new(text: &str) -> Self {
        Self::from_sorted(&sort_tokens(text))
    }

    pub fn from_sorted(sorted: &str) -> Self {
        let chars: Vec<char> = sorted.chars().collect();
        let masks = (chars.len() <= 64).then(|| {
            let mut masks: HashMap<char, u64> = HashMap::new();
            for (position, ch) in chars.iter().enumerate() {
                *masks.entry(*ch).or_default() |= 1 << position;
            }
            masks
        });
        Self { chars, masks }
    }

    /// Best score reachable against a candidate of `len` chars.
    pub fn ratio_upper_bound(&self, len: usize) -> f64 {
        let total = self.chars.len() + len;
        if total == 0 {
            return 0.0;
        }
        200.0 * self.chars.len().min(len) as f64 / total as f64
    }

    /// Similarity against an already token-sorted candidate.
    pub fn ratio(&self, sorted_candidate: &str) -> f64 {
        let candidate: Vec<char> = sorted_candidate.chars().collect();
        if self.chars.is_empty() || candidate.is_empty() {
            return 0.0;
        }

        let common = match &self.masks {
            Some(masks) => lcs_bit_parallel(masks, self.chars.len(), &candidate),
            None => lcs_table(&self.chars, &candidate),
        };
        200.0 * common as f64 / (self.chars.len() + candidate.len()) as f64
    }
}

/// Hyyrö's bit-vector LCS for patterns of at most 64 chars.
fn lcs_bit_parallel(masks: &HashMap<char, u64>, pattern_len: usize, text: &[char]) -> usize {
    let mut state = u64::MAX;
    for ch in text {
        let matches = masks.get(ch).copied().unwrap_or(0);
        let carry = state & matches;
        state = state.wrapping_add(carry) | (state - carry);
    }

    let window = if pattern_len >= 64 {
        u64::MAX
    } else {
        (1_u64 << pattern_len) - 1
    };
    (!state & window).count_ones() as usize
}

fn lcs_table(left: &[char], right: &[char]) -> usize {
    let mut previous = vec![0_usize; right.len() + 1];
    let mut current = vec![0_usize; right.len() + 1];
    for l in left {
        for (j, r) in right.iter().enumerate() {
            current[j + 1] = if l == r {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
