use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::{Number, SearchMethod};
use crate::embedding::EmbeddingProvider;
use crate::error::{MatchError, Result};
use crate::index::{IndexedQuestion, SimilarityIndex};
use crate::record::QuestionRecord;
use crate::vector_ops::{cosine_similarity, normalize_vector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub record: QuestionRecord,
    /// 0-based position in the ranking.
    pub rank: usize,
    /// Cosine similarity; comparable within one index only.
    pub score: Number,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SearchTimings {
    pub embed_duration: Duration,
    pub search_duration: Duration,
    pub sort_duration: Duration,
    pub total_duration: Duration,
}

/// Top-`k` questions for `query`, most similar first. An absent index or
/// `k == 0` yields an empty result without calling the provider.
pub fn search<E>(index: Option<&SimilarityIndex>, embedder: &E, query: &str, k: usize) -> Result<Vec<RetrievalResult>>
where
    E: EmbeddingProvider + ?Sized,
{
    search_timed(index, embedder, query, k).map(|(results, _)| results)
}

pub fn search_timed<E>(
    index: Option<&SimilarityIndex>,
    embedder: &E,
    query: &str,
    k: usize,
) -> Result<(Vec<RetrievalResult>, SearchTimings)>
where
    E: EmbeddingProvider + ?Sized,
{
    let start = Instant::now();
    let mut timings = SearchTimings::default();

    let index = match index {
        Some(index) if k > 0 && !index.is_empty() => index,
        _ => return Ok((Vec::new(), timings)),
    };

    if embedder.model_id() != index.model_id() {
        return Err(MatchError::EmbeddingMismatch {
            index: index.model_id().to_string(),
            query: embedder.model_id().to_string(),
        });
    }

    let embed_start = Instant::now();
    let mut query_vector = embedder.embed(query)?;
    timings.embed_duration = embed_start.elapsed();
    if query_vector.len() != index.dimensions() {
        return Err(MatchError::DimensionMismatch {
            expected: index.dimensions(),
            actual: query_vector.len(),
        });
    }
    normalize_vector(&mut query_vector);

    let search_start = Instant::now();
    let scored = match index.search_method() {
        SearchMethod::Exact => exact_search(index, &query_vector),
        SearchMethod::Ann => ann_search(index, &query_vector),
        SearchMethod::Hybrid => hybrid_search(index, &query_vector, k),
    };
    timings.search_duration = search_start.elapsed();

    let sort_start = Instant::now();
    let results = sort_and_limit(index, scored, k);
    timings.sort_duration = sort_start.elapsed();
    timings.total_duration = start.elapsed();

    log::debug!(
        "{} search over {} questions returned {} results in {:?}",
        index.search_method(),
        index.len(),
        results.len(),
        timings.total_duration
    );
    Ok((results, timings))
}

/// `(position, score)` for every indexed question, in position order.
fn exact_search(index: &SimilarityIndex, query: &[Number]) -> Vec<(usize, Number)> {
    index
        .entries()
        .par_iter()
        .enumerate()
        .map(|(position, entry)| (position, score(query, entry)))
        .collect()
}

fn ann_search(index: &SimilarityIndex, query: &[Number]) -> Vec<(usize, Number)> {
    let Some(ann) = index.ann() else {
        return exact_search(index, query);
    };
    let entries = index.entries();
    ann.candidates(query)
        .into_iter()
        .map(|position| (position, score(query, &entries[position])))
        .collect()
}

fn hybrid_search(index: &SimilarityIndex, query: &[Number], k: usize) -> Vec<(usize, Number)> {
    let results = ann_search(index, query);
    if results.len() < k.min(index.len()) {
        log::debug!(
            "ANN returned {} candidates for k={}, falling back to exact search",
            results.len(),
            k
        );
        return exact_search(index, query);
    }
    results
}

fn score(query: &[Number], entry: &IndexedQuestion) -> Number {
    let similarity = cosine_similarity(query, &entry.vector).unwrap_or(-1.0);
    log::trace!("similarity for question {}: {}", entry.record.id, similarity);
    similarity
}

/// Stable sort keeps insertion order among equal scores.
fn sort_and_limit(index: &SimilarityIndex, mut scored: Vec<(usize, Number)>, limit: usize) -> Vec<RetrievalResult> {
    scored.sort_by_key(|&(position, _)| position);
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(rank, (position, score))| RetrievalResult {
            record: index.entries()[position].record.clone(),
            rank,
            score,
        })
        .collect()
}
