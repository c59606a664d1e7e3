//! Record types shared between the store and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a persisted group.
pub type GroupId = i64;

/// Identifier of a persisted vector record.
pub type VectorId = i64;

/// Name and size of an uploaded input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Origin name (usually the file name).
    pub name: String,
    /// Size of the raw upload in bytes.
    pub size: u64,
}

impl FileInfo {
    /// Create file metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// MinHash parameters a group's signatures were computed with.
///
/// Signatures are only comparable when all three match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureParams {
    pub num_permutations: usize,
    pub seed: u64,
    pub ngram_size: usize,
}

impl fmt::Display for SignatureParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} permutations, seed {}, {}-grams",
            self.num_permutations, self.seed, self.ngram_size
        )
    }
}

/// A group about to be committed.
#[derive(Debug, Clone)]
pub struct NewGroup {
    /// Display name chosen by the submitter.
    pub name: String,
    /// Division the group is scoped to.
    pub division: String,
    /// JSON rendering of the clustering result.
    pub grouped_data: serde_json::Value,
    /// Files the group was built from.
    pub files: Vec<FileInfo>,
    /// Parameters every signature in the group was computed with.
    pub params: SignatureParams,
}

/// A vector record about to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVector {
    /// MinHash signature components.
    pub signature: Vec<u64>,
    /// Opaque payload returned by searches (JSON text of the source document).
    pub payload: String,
    /// File the source document came from; empty when unknown.
    pub origin: String,
}

impl NewVector {
    /// Create a new vector record with no origin.
    #[must_use]
    pub fn new(signature: Vec<u64>, payload: impl Into<String>) -> Self {
        Self {
            signature,
            payload: payload.into(),
            origin: String::new(),
        }
    }

    /// Set the file the source document came from.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// A persisted group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    pub division: String,
    pub created_at: DateTime<Utc>,
    pub grouped_data: serde_json::Value,
    pub files: Vec<FileInfo>,
    pub params: SignatureParams,
}

/// A persisted (signature, payload) pair owned by one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub group_id: GroupId,
    pub signature: Vec<u64>,
    pub payload: String,
    pub origin: String,
}
