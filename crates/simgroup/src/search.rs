//! Ranked similarity search against a stored group.
//!
//! Query documents are signed with the MinHash parameters recorded on the
//! group, then every stored record of the group is scored by cosine
//! similarity of the raw signature components.

use crate::ingest::Document;
use crate::minhash::{MinHasher, SimilarityError};
use serde::Serialize;
use serde_json::Value;
use simgroup_core::{CoreError, GroupId, NewVector, SignatureStore, VectorId, VectorRecord};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a search request.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("no query documents")]
    EmptyBatch,

    #[error("group {0} has no stored signatures")]
    EmptyGroup(GroupId),

    #[error("storage error: {0}")]
    Store(#[from] CoreError),
}

/// Cosine similarity of two signatures read as `f64` vectors.
///
/// Fails on differing lengths and when either vector has zero magnitude.
pub fn cosine_similarity(a: &[u64], b: &[u64]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::Undefined("zero magnitude"));
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// A stored record scored against a query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedMatch {
    pub vector_id: VectorId,
    pub similarity: f64,
    /// Stored payload (JSON text of the matched document).
    pub payload: String,
    /// File the matched document came from.
    pub origin: String,
}

/// Score every candidate against `query`, best first.
///
/// Equal scores are ordered by ascending record id. Candidates whose
/// similarity is undefined are skipped.
#[must_use]
pub fn rank<'a, I>(query: &[u64], candidates: I) -> Vec<RankedMatch>
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    let mut ranked: Vec<RankedMatch> = candidates
        .into_iter()
        .filter_map(|record| match cosine_similarity(query, &record.signature) {
            Ok(similarity) => Some(RankedMatch {
                vector_id: record.id,
                similarity,
                payload: record.payload.clone(),
                origin: record.origin.clone(),
            }),
            Err(e) => {
                warn!(vector_id = record.id, error = %e, "skipping candidate");
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.vector_id.cmp(&b.vector_id))
    });
    ranked
}

/// Matches for one query document.
#[derive(Clone, Debug, Serialize)]
pub struct QueryResult {
    /// File the query came from.
    pub origin: String,
    /// The query document.
    pub query: Value,
    /// Best matches first; empty when the query is too short to sign.
    pub matches: Vec<RankedMatch>,
}

/// Searches stored groups for documents similar to a query batch.
///
/// Each group is read with the hasher it was built with, so queries and
/// additions are always signed compatibly with the stored records.
pub struct SimilaritySearch {
    store: Arc<dyn SignatureStore>,
}

impl SimilaritySearch {
    /// Create a searcher over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>) -> Self {
        Self { store }
    }

    /// Hasher matching the signatures stored in `group_id`, if the group exists.
    fn group_hasher(&self, group_id: GroupId) -> Result<Option<MinHasher>, SearchError> {
        let group = self.store.get_group(group_id)?;
        Ok(group.map(|g| MinHasher::from_params(&g.params)))
    }

    /// Return up to `top_k` matches from group `group_id` for each query,
    /// in query order.
    pub fn search(
        &self,
        group_id: GroupId,
        queries: &[Document],
        top_k: usize,
    ) -> Result<Vec<QueryResult>, SearchError> {
        if queries.is_empty() {
            return Err(SearchError::EmptyBatch);
        }

        let Some(hasher) = self.group_hasher(group_id)? else {
            return Err(SearchError::EmptyGroup(group_id));
        };
        let records = self.store.list_by_group(group_id)?;
        if records.is_empty() {
            return Err(SearchError::EmptyGroup(group_id));
        }
        debug!(
            group_id,
            records = records.len(),
            queries = queries.len(),
            params = %hasher.params(),
            "searching group"
        );

        let results = queries
            .iter()
            .map(|doc| {
                let signature = hasher.signature_from_document(&doc.data);
                let matches = if signature.is_valid() {
                    let mut ranked = rank(&signature.values, &records);
                    ranked.truncate(top_k);
                    ranked
                } else {
                    debug!(origin = %doc.origin, "query too short to shingle");
                    Vec::new()
                };
                QueryResult {
                    origin: doc.origin.clone(),
                    query: doc.data.clone(),
                    matches,
                }
            })
            .collect();

        Ok(results)
    }

    /// Sign `documents` and append them to an existing group.
    ///
    /// Documents too short to sign are skipped. Returns the new record ids.
    pub fn add_documents(
        &self,
        group_id: GroupId,
        documents: &[Document],
    ) -> Result<Vec<VectorId>, SearchError> {
        let hasher = self
            .group_hasher(group_id)?
            .ok_or(CoreError::GroupNotFound(group_id))?;

        let mut ids = Vec::with_capacity(documents.len());
        for doc in documents {
            let signature = hasher.signature_from_document(&doc.data);
            if !signature.is_valid() {
                debug!(origin = %doc.origin, "skipping document too short to shingle");
                continue;
            }
            let payload = serde_json::to_string(&doc.data)
                .map_err(|e| SearchError::Store(CoreError::from(e)))?;
            let vector = NewVector::new(signature.values, payload).with_origin(doc.origin.as_str());
            ids.push(self.store.put(group_id, &vector)?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOP_K;
    use serde_json::json;
    use simgroup_core::{MemoryStore, NewGroup};

    fn record(id: VectorId, signature: Vec<u64>) -> VectorRecord {
        VectorRecord {
            id,
            group_id: 1,
            signature,
            payload: format!("payload-{id}"),
            origin: String::new(),
        }
    }

    #[test]
    fn test_cosine_identical() {
        let sim = cosine_similarity(&[1, 2, 3], &[1, 2, 3]).unwrap();
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine_similarity(&[1, 0], &[0, 1]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_errors() {
        assert_eq!(
            cosine_similarity(&[0, 0], &[1, 2]),
            Err(SimilarityError::Undefined("zero magnitude"))
        );
        assert!(matches!(
            cosine_similarity(&[1], &[1, 2]),
            Err(SimilarityError::LengthMismatch { left: 1, right: 2 })
        ));
    }

    #[test]
    fn test_rank_orders_and_breaks_ties_by_id() {
        let records = vec![
            record(7, vec![1, 0]),
            record(3, vec![1, 1]),
            record(5, vec![2, 0]),
            record(4, vec![0, 0]),
            record(9, vec![1, 2, 3]),
        ];

        let ranked = rank(&[1, 0], &records);
        let ids: Vec<VectorId> = ranked.iter().map(|m| m.vector_id).collect();

        // 5 and 7 tie at 1.0; 4 (zero magnitude) and 9 (length) are skipped.
        assert_eq!(ids, vec![5, 7, 3]);
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    fn store_signed_with(hasher: &MinHasher, texts: &[&str]) -> (Arc<MemoryStore>, GroupId) {
        let store = Arc::new(MemoryStore::new());
        let vectors = texts
            .iter()
            .map(|t| {
                let doc = json!({ "a": t });
                NewVector::new(hasher.signature_from_document(&doc).values, doc.to_string())
                    .with_origin("stored.json")
            })
            .collect();
        let group = store
            .commit_group(
                NewGroup {
                    name: "g".into(),
                    division: "d".into(),
                    grouped_data: json!([]),
                    files: vec![],
                    params: hasher.params(),
                },
                vectors,
            )
            .unwrap();
        (store, group.id)
    }

    fn store_with_group(texts: &[&str]) -> (Arc<MemoryStore>, GroupId) {
        store_signed_with(&MinHasher::default(), texts)
    }

    #[test]
    fn test_search_returns_top_k() {
        let (store, group_id) =
            store_with_group(&["hello world", "goodbye world", "hello there", "zzz"]);
        let search = SimilaritySearch::new(store);

        let queries = vec![Document::new("q.json", json!({"a": "hello world"}))];
        let results = search.search(group_id, &queries, DEFAULT_TOP_K).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches.len(), 3);
        assert_eq!(results[0].matches[0].payload, r#"{"a":"hello world"}"#);
        assert_eq!(results[0].matches[0].origin, "stored.json");
        assert!((results[0].matches[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_search_uses_group_seed() {
        let hasher = MinHasher::with_seed(128, 7);
        let (store, group_id) =
            store_signed_with(&hasher, &["hello world", "totally different text"]);
        let search = SimilaritySearch::new(store);

        let queries = vec![Document::new("q.json", json!({"a": "hello world"}))];
        let results = search.search(group_id, &queries, 2).unwrap();

        let best = &results[0].matches[0];
        assert_eq!(best.payload, r#"{"a":"hello world"}"#);
        assert!((best.similarity - 1.0).abs() < 1e-9);
        assert!(results[0].matches[1].similarity < best.similarity);
    }

    #[test]
    fn test_search_uses_group_permutation_count() {
        let hasher = MinHasher::new(64);
        let (store, group_id) = store_signed_with(&hasher, &["hello world", "goodbye world"]);
        let search = SimilaritySearch::new(store.clone());

        let queries = vec![Document::new("q.json", json!({"a": "hello world"}))];
        let results = search.search(group_id, &queries, 3).unwrap();
        assert_eq!(results[0].matches.len(), 2);
        assert!((results[0].matches[0].similarity - 1.0).abs() < 1e-9);

        let added = search
            .add_documents(group_id, &[Document::new("more.json", json!({"a": "new one"}))])
            .unwrap();
        let records = store.list_by_group(group_id).unwrap();
        let appended = records.iter().find(|r| r.id == added[0]).unwrap();
        assert_eq!(appended.signature.len(), 64);
        assert_eq!(appended.origin, "more.json");
    }

    #[test]
    fn test_search_short_query_has_no_matches() {
        let (store, group_id) = store_with_group(&["hello world"]);
        let search = SimilaritySearch::new(store);

        let queries = vec![
            Document::new("q.json", json!("x")),
            Document::new("q.json", json!("hello")),
        ];
        let results = search.search(group_id, &queries, 3).unwrap();

        assert!(results[0].matches.is_empty());
        assert_eq!(results[1].matches.len(), 1);
    }

    #[test]
    fn test_add_documents_then_search() {
        let (store, group_id) = store_with_group(&["hello world"]);
        let search = SimilaritySearch::new(store.clone());

        let added = search
            .add_documents(
                group_id,
                &[
                    Document::new("more.json", json!({"a": "goodbye moon"})),
                    Document::new("more.json", json!("x")),
                ],
            )
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(store.list_by_group(group_id).unwrap().len(), 2);

        let queries = vec![Document::new("q.json", json!({"a": "goodbye moon"}))];
        let results = search.search(group_id, &queries, 1).unwrap();
        assert_eq!(results[0].matches[0].vector_id, added[0]);

        assert!(matches!(
            search.add_documents(group_id + 1, &queries),
            Err(SearchError::Store(CoreError::GroupNotFound(_)))
        ));
    }

    #[test]
    fn test_search_errors() {
        let (store, group_id) = store_with_group(&["hello world"]);
        let search = SimilaritySearch::new(store);

        assert!(matches!(
            search.search(group_id, &[], 3),
            Err(SearchError::EmptyBatch)
        ));

        let queries = vec![Document::new("q.json", json!("hello"))];
        assert!(matches!(
            search.search(group_id + 100, &queries, 3),
            Err(SearchError::EmptyGroup(_))
        ));
    }
}
