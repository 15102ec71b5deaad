use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::ann::RandomProjectionIndex;
use crate::config::Number;
use crate::vector_entry::{Chunk, IndexEntry};
use crate::vector_ops::compute_cosine_similarity_simd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Brute-force scan of every entry.
    Exact,
    /// Random-projection candidates, rescored exactly.
    Ann,
    /// ANN first, exact scan when it finds fewer than `k` candidates.
    Hybrid,
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(SearchMethod::Exact),
            "ann" => Ok(SearchMethod::Ann),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => Err(format!("Unknown search method: {other}")),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Exact => "exact",
            SearchMethod::Ann => "ann",
            SearchMethod::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchTimings {
    pub search_duration: Duration,
    pub sort_duration: Duration,
    pub total_duration: Duration,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub position: usize,
    pub score: Number,
    pub chunk: Chunk,
}

/// Scores `entries` against a normalised query and keeps the best `k`.
pub fn search(
    entries: &[IndexEntry],
    ann_index: Option<&RandomProjectionIndex>,
    method: SearchMethod,
    query_vector: &[Number],
    k: usize,
) -> (Vec<ScoredChunk>, SearchTimings) {
    let start = Instant::now();

    let all_similarities = match (method, ann_index) {
        (SearchMethod::Exact, _) | (_, None) => exact_search(entries, query_vector),
        (SearchMethod::Ann, Some(index)) => ann_search(entries, index, query_vector),
        (SearchMethod::Hybrid, Some(index)) => hybrid_search(entries, index, query_vector, k),
    };
    let search_duration = start.elapsed();

    let sort_start = Instant::now();
    let results = sort_and_limit_results(all_similarities, k);
    let sort_duration = sort_start.elapsed();

    let timings = SearchTimings {
        search_duration,
        sort_duration,
        total_duration: start.elapsed(),
    };
    tracing::debug!(
        method = %method,
        results = results.len(),
        total_us = timings.total_duration.as_micros() as u64,
        "search completed"
    );

    (results, timings)
}

fn exact_search(entries: &[IndexEntry], query_vector: &[Number]) -> Vec<ScoredChunk> {
    entries
        .par_iter()
        .filter_map(|entry| compute_similarity(query_vector, entry))
        .collect()
}

fn ann_search(
    entries: &[IndexEntry],
    index: &RandomProjectionIndex,
    query_vector: &[Number],
) -> Vec<ScoredChunk> {
    index
        .candidates(query_vector)
        .into_iter()
        .filter_map(|position| entries.get(position))
        .filter_map(|entry| compute_similarity(query_vector, entry))
        .collect()
}

fn hybrid_search(
    entries: &[IndexEntry],
    index: &RandomProjectionIndex,
    query_vector: &[Number],
    k: usize,
) -> Vec<ScoredChunk> {
    let results = ann_search(entries, index, query_vector);
    if results.len() < k {
        tracing::debug!(found = results.len(), k, "ann found too few candidates, falling back to exact");
        return exact_search(entries, query_vector);
    }
    results
}

fn compute_similarity(query_vector: &[Number], entry: &IndexEntry) -> Option<ScoredChunk> {
    compute_cosine_similarity_simd(query_vector, &entry.vector).map(|score| ScoredChunk {
        position: entry.position,
        score,
        chunk: entry.chunk.clone(),
    })
}

/// Descending by score; ties keep insertion order.
fn sort_and_limit_results(mut results: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
    results.truncate(limit);
    results
}
