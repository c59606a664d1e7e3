//! Grouping documents by LSH candidate sets.
//!
//! Two strategies are available:
//!
//! - [`GroupingMode::SinglePass`] (default): walk documents in submission
//!   order; each unvisited document claims every not-yet-visited document
//!   its LSH query returns. Groups are not transitively closed, and the
//!   result depends on submission order: if A~B and B~C but not A~C, then
//!   submitting A first yields {A, B}, {C} while submitting B first yields
//!   {A, B, C}.
//! - [`GroupingMode::Transitive`]: merge every LSH candidate pair with a
//!   union-find, so groups are the connected components of the candidate
//!   graph and do not depend on order.

use crate::config::GroupingConfig;
use crate::ingest::Document;
use crate::lsh::{DocId, LshError, LshIndex};
use crate::minhash::{MinHashSignature, MinHasher};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use simgroup_core::NewVector;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while clustering a batch.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("no documents to cluster")]
    EmptyBatch,

    #[error("no document in the batch is long enough to shingle")]
    NothingToCluster,

    #[error("LSH error: {0}")]
    Lsh(#[from] LshError),

    #[error("failed to serialize document payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// How LSH candidates are turned into groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Order-dependent single pass without transitive merging.
    #[default]
    SinglePass,
    /// Connected components of the candidate graph.
    Transitive,
}

/// Union-Find (Disjoint Set Union) data structure.
///
/// Supports near-constant time operations via path compression and union-by-rank.
pub struct UnionFind {
    /// Parent pointers. parent[i] = j means i's parent is j.
    parent: Vec<usize>,
    /// Rank (approximate tree depth) for union-by-rank.
    rank: Vec<usize>,
}

impl UnionFind {
    /// Create a new Union-Find structure with n elements.
    ///
    /// Initially, each element is in its own singleton set.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Find the root (representative) of the set containing x.
    ///
    /// Uses path compression: all nodes on the path to root
    /// are updated to point directly to the root.
    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    /// Union the sets containing x and y.
    ///
    /// Returns true if x and y were in different sets (and are now merged).
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let rx = self.find(x);
        let ry = self.find(y);

        if rx == ry {
            return false;
        }

        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }

        true
    }

    /// Check if x and y are in the same set.
    pub fn connected(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }

    /// All sets, members ascending, ordered by their smallest member.
    #[must_use]
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: Vec<Option<usize>> = vec![None; self.parent.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            match by_root[root] {
                Some(slot) => groups[slot].push(i),
                None => {
                    by_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Check if the structure is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Result of clustering one batch.
#[derive(Clone, Debug)]
pub struct Clustering {
    /// One signature per input document, in input order.
    pub signatures: Vec<MinHashSignature>,
    /// Disjoint groups of document positions, each sorted ascending and
    /// ordered by first member. Together they cover every position once.
    pub groups: Vec<Vec<DocId>>,
}

impl Clustering {
    /// Number of groups.
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Render the groups as the JSON payload stored on a group record:
    /// `[{"group": 1, "documents": [...]}, ...]`, numbered from 1.
    #[must_use]
    pub fn grouped_payload(&self, documents: &[Document]) -> Value {
        let groups = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, members)| {
                let docs: Vec<&Value> = members
                    .iter()
                    .filter_map(|&id| documents.get(id).map(|d| &d.data))
                    .collect();
                json!({ "group": i + 1, "documents": docs })
            })
            .collect();
        Value::Array(groups)
    }

    /// Vector records for every document with a valid signature, in input
    /// order. The payload is the JSON text of the document body; the
    /// document's origin travels alongside it.
    pub fn vectors(&self, documents: &[Document]) -> Result<Vec<NewVector>, ClusterError> {
        self.signatures
            .iter()
            .zip(documents)
            .filter(|(sig, _)| sig.is_valid())
            .map(|(sig, doc)| {
                Ok(
                    NewVector::new(sig.values.clone(), serde_json::to_string(&doc.data)?)
                        .with_origin(doc.origin.as_str()),
                )
            })
            .collect()
    }
}

/// Groups a batch of documents by estimated Jaccard similarity.
///
/// A clusterer is cheap to build; every job creates its own.
#[derive(Clone, Debug)]
pub struct Clusterer {
    hasher: MinHasher,
    threshold: f64,
    mode: GroupingMode,
}

impl Clusterer {
    /// Build a clusterer from grouping parameters.
    #[must_use]
    pub fn new(config: &GroupingConfig) -> Self {
        Self {
            hasher: MinHasher::from_params(&config.signature_params()),
            threshold: config.threshold,
            mode: config.mode,
        }
    }

    /// The signature generator used for every document.
    #[must_use]
    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// Cluster `documents` into disjoint groups.
    ///
    /// Documents too short to produce a single shingle are never indexed
    /// and come out as singleton groups.
    pub fn cluster(&self, documents: &[Document]) -> Result<Clustering, ClusterError> {
        if documents.is_empty() {
            return Err(ClusterError::EmptyBatch);
        }

        let signatures: Vec<MinHashSignature> = documents
            .iter()
            .map(|doc| self.hasher.signature_from_document(&doc.data))
            .collect();

        let mut index = LshIndex::with_threshold(self.hasher.num_permutations(), self.threshold);
        let mut indexed = 0usize;
        for (id, (sig, doc)) in signatures.iter().zip(documents).enumerate() {
            if sig.is_valid() {
                index.insert(id, sig)?;
                indexed += 1;
            } else {
                warn!(doc = id, origin = %doc.origin, "document too short to shingle, kept as singleton");
            }
        }
        if indexed == 0 {
            return Err(ClusterError::NothingToCluster);
        }

        let groups = match self.mode {
            GroupingMode::SinglePass => single_pass(&index, &signatures)?,
            GroupingMode::Transitive => transitive(&index, signatures.len()),
        };
        debug!(
            documents = documents.len(),
            groups = groups.len(),
            bands = index.num_bands(),
            rows = index.rows_per_band(),
            "clustered batch"
        );

        Ok(Clustering { signatures, groups })
    }
}

fn single_pass(
    index: &LshIndex,
    signatures: &[MinHashSignature],
) -> Result<Vec<Vec<DocId>>, ClusterError> {
    let mut visited = vec![false; signatures.len()];
    let mut groups = Vec::new();

    for (id, sig) in signatures.iter().enumerate() {
        if visited[id] {
            continue;
        }
        let mut members = BTreeSet::from([id]);
        if sig.is_valid() {
            // Ids claimed by an earlier group stay there.
            members.extend(index.query(sig)?.into_iter().filter(|&other| !visited[other]));
        }
        for &member in &members {
            visited[member] = true;
        }
        groups.push(members.into_iter().collect());
    }

    Ok(groups)
}

fn transitive(index: &LshIndex, num_documents: usize) -> Vec<Vec<DocId>> {
    let mut uf = UnionFind::new(num_documents);
    for (a, b) in index.candidates() {
        uf.union(a, b);
    }
    uf.groups()
}
