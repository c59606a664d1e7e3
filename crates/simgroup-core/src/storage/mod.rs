//! Signature persistence.
//!
//! A store owns groups and the vector records committed into them:
//! - SQLite (`SqliteStore`, on disk or in memory)
//! - Process memory (`MemoryStore`, used by tests and one-shot runs)
//!
//! Group commits are atomic: the group row, its file rows and every vector
//! record land together or not at all. Deleting a group cascades to
//! everything it owns.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{CoreError, Result};
use crate::types::{GroupId, GroupRecord, NewGroup, NewVector, VectorId, VectorRecord};

/// Trait for signature stores.
///
/// Methods are blocking; async callers should run them on a blocking pool.
pub trait SignatureStore: Send + Sync {
    /// Atomically create a group together with all of its vector records.
    fn commit_group(&self, group: NewGroup, vectors: Vec<NewVector>) -> Result<GroupRecord>;

    /// Rename a group and replace its clustering payload.
    fn update_group(
        &self,
        group_id: GroupId,
        name: &str,
        grouped_data: &serde_json::Value,
    ) -> Result<GroupRecord>;

    /// Append one vector record to an existing group.
    fn put(&self, group_id: GroupId, vector: &NewVector) -> Result<VectorId>;

    /// List a group's vector records in insertion order.
    fn list_by_group(&self, group_id: GroupId) -> Result<Vec<VectorRecord>>;

    /// Fetch a group by id.
    fn get_group(&self, group_id: GroupId) -> Result<Option<GroupRecord>>;

    /// List groups, optionally restricted to one division, oldest first.
    fn list_groups(&self, division: Option<&str>) -> Result<Vec<GroupRecord>>;

    /// Delete a group and everything it owns.
    ///
    /// Returns false if the group did not exist.
    fn delete_group(&self, group_id: GroupId) -> Result<bool>;
}

/// Check that every signature in a batch has the same non-zero length.
///
/// Returns that length, or `None` for an empty batch.
pub(crate) fn common_dimension(vectors: &[NewVector]) -> Result<Option<usize>> {
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let dim = first.signature.len();
    if dim == 0 {
        return Err(CoreError::InvalidFormat("empty signature".into()));
    }
    if let Some(bad) = vectors.iter().find(|v| v.signature.len() != dim) {
        return Err(CoreError::InvalidFormat(format!(
            "signature length {} does not match {}",
            bad.signature.len(),
            dim
        )));
    }
    Ok(Some(dim))
}
