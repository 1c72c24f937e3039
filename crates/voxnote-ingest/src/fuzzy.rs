//! Fuzzy category-name matching.
//!
//! Names are compared after normalization (lowercase, punctuation folded to
//! spaces, only alphanumeric tokens kept). Three sub-tiers are tried in
//! order and the first tier that hits any candidate wins:
//!
//! 1. exact equality of the normalized names;
//! 2. token containment: every token of the name with fewer tokens appears
//!    in the other name's token set;
//! 3. Levenshtein distance of the normalized strings within
//!    [`FUZZY_MAX_EDIT_DISTANCE`] and below [`FUZZY_MAX_EDIT_RATIO`] of the
//!    longer string's length.

use std::collections::HashSet;

use voxnote_core::defaults::{FUZZY_MAX_EDIT_DISTANCE, FUZZY_MAX_EDIT_RATIO};

/// Which sub-tier produced a fuzzy match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyTier {
    Exact,
    Containment,
    EditDistance,
}

impl FuzzyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Containment => "containment",
            Self::EditDistance => "edit_distance",
        }
    }
}

/// A fuzzy hit: index into the candidate slice plus the tier that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatch {
    pub index: usize,
    pub tier: FuzzyTier,
}

/// Alphanumeric tokens of `name`, lowercased.
pub fn tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized form: tokens joined by single spaces.
pub fn normalize_name(name: &str) -> String {
    tokens(name).join(" ")
}

/// Whether the name with fewer tokens is fully contained in the other.
///
/// Symmetric in its arguments. Tokens are compared whole, so "work" is not
/// contained in "workout".
pub fn token_containment(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let longer: HashSet<&str> = longer.iter().map(String::as_str).collect();
    shorter.iter().all(|t| longer.contains(t.as_str()))
}

/// Edit distance between two normalized names when it is within tolerance.
pub fn close_edit_distance(a: &str, b: &str) -> Option<usize> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let distance = strsim::levenshtein(a, b);
    let longer = a.chars().count().max(b.chars().count());
    let within_ratio = (distance as f64) < FUZZY_MAX_EDIT_RATIO * longer as f64;
    (distance <= FUZZY_MAX_EDIT_DISTANCE && within_ratio).then_some(distance)
}

/// Find the best candidate for `name` among `candidates`.
///
/// Candidates are expected in priority order (largest category first). For
/// the exact and containment tiers the first hit wins; for the edit-distance
/// tier the smallest distance wins, ties going to the earlier candidate.
pub fn find_match<S: AsRef<str>>(name: &str, candidates: &[S]) -> Option<FuzzyMatch> {
    let query_tokens = tokens(name);
    if query_tokens.is_empty() {
        return None;
    }
    let query = query_tokens.join(" ");
    let prepared: Vec<Vec<String>> = candidates.iter().map(|c| tokens(c.as_ref())).collect();

    if let Some(index) = prepared.iter().position(|t| t.join(" ") == query) {
        return Some(FuzzyMatch {
            index,
            tier: FuzzyTier::Exact,
        });
    }

    if let Some(index) = prepared
        .iter()
        .position(|t| token_containment(&query_tokens, t))
    {
        return Some(FuzzyMatch {
            index,
            tier: FuzzyTier::Containment,
        });
    }

    prepared
        .iter()
        .enumerate()
        .filter_map(|(i, t)| close_edit_distance(&query, &t.join(" ")).map(|d| (i, d)))
        .min_by_key(|&(i, d)| (d, i))
        .map(|(index, _)| FuzzyMatch {
            index,
            tier: FuzzyTier::EditDistance,
        })
}
