//! Relevance retrieval: map SOP chunks to the regulatory clauses that
//! plausibly govern them.

use anyhow::Result;
use std::collections::HashSet;

use crate::index::VectorIndex;
use crate::models::RetrievedClause;

/// Query the index once per SOP chunk, keep matches strictly below the
/// distance threshold, and merge into one list sorted by ascending
/// distance with exact-duplicate clause texts collapsed (first, i.e.
/// closest, occurrence wins).
///
/// A clause retrieved by several chunks is attributed to the chunk that
/// retrieved it most closely.
pub async fn find_relevant_clauses(
    chunks: &[String],
    index: &VectorIndex,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<RetrievedClause>> {
    let mut merged: Vec<RetrievedClause> = Vec::new();

    for chunk in chunks {
        let matches = index.query(chunk, top_k).await?;
        for m in matches {
            if m.score < threshold {
                merged.push(RetrievedClause {
                    clause: m.clause,
                    source: m.source,
                    relevance_score: m.score,
                    sop_chunk: chunk.clone(),
                });
            }
        }
    }

    merged.sort_by(|a, b| {
        a.relevance_score
            .partial_cmp(&b.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen: HashSet<String> = HashSet::new();
    merged.retain(|c| seen.insert(c.clause.clone()));

    Ok(merged)
}
