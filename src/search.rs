//! Relevance ranking for the command palette.
//!
//! Every candidate is scored by a handful of cheap single-pass heuristics
//! over its name, its path segments and its full path. There is no index;
//! the candidate set is the flattened menu, which is small by construction.

use serde::Deserialize;
use std::cmp::Ordering;

use crate::tree::FlatNode;

const MATCH_SCORE: f64 = 1.0;
const BOUNDARY_BONUS: f64 = 2.0;
const COMPLETION_BONUS: f64 = 10.0;
const CONTAINS_BONUS: f64 = 15.0;

const SEQUENCE_MATCH: f64 = 5.0;
const SEQUENCE_MIN_MATCH: f64 = 1.0;
const SEQUENCE_GAP_STEP: f64 = 0.1;
const SEQUENCE_GAP_CAP: f64 = 3.0;
const SEQUENCE_COMPLETION_BONUS: f64 = 5.0;

const LENGTH_PENALTY: f64 = 0.01;

/// Scores are compared after rounding to this resolution; scores that
/// round to the same step are tied
const SCORE_EPSILON: f64 = 0.001;

const BOUNDARY_CHARS: &[char] = &['/', ' ', '-', '_'];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub exact_bonus: f64,
    pub prefix_bonus: f64,
    pub name_weight: f64,
    pub segment_weight: f64,
    /// The full path is scored at half of this weight
    pub path_weight: f64,
    pub min_score: f64,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            exact_bonus: 100.0,
            prefix_bonus: 50.0,
            name_weight: 10.0,
            segment_weight: 5.0,
            path_weight: 10.0,
            min_score: 10.0,
            max_results: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub node: FlatNode,
    pub score: f64,
    /// Path segments that contain every query character in order
    pub matched_segments: Vec<String>,
}

/// Rank `nodes` against `query`.
///
/// Matching is case-insensitive. The ordering only depends on the input
/// slice, so repeated calls with identical input give identical output.
pub fn search(nodes: &[FlatNode], query: &str, options: &SearchOptions) -> Vec<SearchResult> {
    if query.trim().is_empty() || nodes.is_empty() {
        return Vec::new();
    }

    let query: Vec<char> = query.to_lowercase().chars().collect();
    let mut results: Vec<SearchResult> = nodes
        .iter()
        .filter_map(|node| {
            let (score, matched_segments) = score_node(node, &query, options);
            (score >= options.min_score).then(|| SearchResult {
                node: node.clone(),
                score,
                matched_segments,
            })
        })
        .collect();

    results.sort_by(compare_results);
    results.truncate(options.max_results);

    log::debug!(
        "search: {} of {} candidates kept for {:?}",
        results.len(),
        nodes.len(),
        query.iter().collect::<String>()
    );
    results
}

fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    // Rounded buckets keep the comparison transitive, which a plain
    // |a - b| < epsilon test would not
    let qa = (a.score / SCORE_EPSILON).round() as i64;
    let qb = (b.score / SCORE_EPSILON).round() as i64;
    qb.cmp(&qa)
        .then_with(|| {
            a.node
                .full_path
                .chars()
                .count()
                .cmp(&b.node.full_path.chars().count())
        })
        .then_with(|| a.node.full_path.cmp(&b.node.full_path))
}

/// Total score of one candidate plus the segments that fully matched
fn score_node(node: &FlatNode, query: &[char], options: &SearchOptions) -> (f64, Vec<String>) {
    let name: Vec<char> = node.name().to_lowercase().chars().collect();
    let path: Vec<char> = node.full_path.to_lowercase().chars().collect();

    let mut score = 0.0;
    if name == query {
        score += options.exact_bonus;
    }
    if name.starts_with(query) {
        score += options.prefix_bonus;
    }

    score += options.name_weight * substring_scan(&name, query).score;

    let mut best_segment: f64 = 0.0;
    let mut matched_segments = Vec::new();
    for segment in &node.segments {
        let lowered: Vec<char> = segment.to_lowercase().chars().collect();
        let scan = substring_scan(&lowered, query);
        best_segment = best_segment.max(scan.score);
        if scan.complete {
            matched_segments.push(segment.clone());
        }
    }
    score += options.segment_weight * best_segment;

    score += options.path_weight * 0.5 * substring_scan(&path, query).score;
    score += sequence_score(&path, query);

    let overhang = path.len().saturating_sub(query.len()) as f64;
    score -= overhang * LENGTH_PENALTY;

    (score.max(0.0), matched_segments)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scan {
    score: f64,
    complete: bool,
}

/// Greedy single pass: each query character is matched at its first
/// occurrence after the previous match.
fn substring_scan(candidate: &[char], query: &[char]) -> Scan {
    if query.is_empty() || candidate.is_empty() {
        return Scan {
            score: 0.0,
            complete: query.is_empty(),
        };
    }

    let mut cursor = 0;
    let mut raw = 0.0;
    let mut streak = 0.0;
    let mut previous_matched = false;

    for (i, &c) in candidate.iter().enumerate() {
        if cursor == query.len() {
            break;
        }
        if c == query[cursor] {
            raw += MATCH_SCORE;
            if previous_matched {
                streak += 1.0;
                raw += streak;
            } else {
                streak = 0.0;
            }
            if i == 0 || BOUNDARY_CHARS.contains(&candidate[i - 1]) {
                raw += BOUNDARY_BONUS;
            }
            cursor += 1;
            previous_matched = true;
        } else {
            previous_matched = false;
        }
    }

    let complete = cursor == query.len();
    if complete {
        raw += COMPLETION_BONUS;
        if contains(candidate, query) {
            raw += CONTAINS_BONUS;
        }
    }

    Scan {
        score: raw / candidate.len().max(query.len()) as f64,
        complete,
    }
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// In-order match over the full path where long gaps cost points
fn sequence_score(path: &[char], query: &[char]) -> f64 {
    let mut cursor = 0;
    let mut gap = 0.0_f64;
    let mut score = 0.0;

    for &c in path {
        if cursor == query.len() {
            break;
        }
        if c == query[cursor] {
            score += (SEQUENCE_MATCH - gap).max(SEQUENCE_MIN_MATCH);
            gap = 0.0;
            cursor += 1;
        } else {
            gap = (gap + SEQUENCE_GAP_STEP).min(SEQUENCE_GAP_CAP);
        }
    }

    if cursor == query.len() {
        score += SEQUENCE_COMPLETION_BONUS;
    }
    score
}
