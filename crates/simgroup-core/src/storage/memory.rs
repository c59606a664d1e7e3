//! In-memory storage backend.

use super::{common_dimension, SignatureStore};
use crate::error::{CoreError, Result};
use crate::types::{GroupId, GroupRecord, NewGroup, NewVector, VectorId, VectorRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    next_group_id: GroupId,
    next_vector_id: VectorId,
    groups: BTreeMap<GroupId, GroupRecord>,
    vectors: BTreeMap<GroupId, Vec<VectorRecord>>,
}

/// Signature store kept in process memory.
///
/// All validation happens before anything is inserted, so a failed commit
/// never leaves a partial group behind.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CoreError::Storage("state lock poisoned".into()))
    }
}

impl SignatureStore for MemoryStore {
    fn commit_group(&self, group: NewGroup, vectors: Vec<NewVector>) -> Result<GroupRecord> {
        common_dimension(&vectors)?;

        let mut state = self.lock()?;
        state.next_group_id += 1;
        let group_id = state.next_group_id;

        let mut records = Vec::with_capacity(vectors.len());
        for vector in vectors {
            state.next_vector_id += 1;
            records.push(VectorRecord {
                id: state.next_vector_id,
                group_id,
                signature: vector.signature,
                payload: vector.payload,
                origin: vector.origin,
            });
        }

        let record = GroupRecord {
            id: group_id,
            name: group.name,
            division: group.division,
            created_at: Utc::now(),
            grouped_data: group.grouped_data,
            files: group.files,
            params: group.params,
        };
        state.groups.insert(group_id, record.clone());
        state.vectors.insert(group_id, records);

        Ok(record)
    }

    fn update_group(
        &self,
        group_id: GroupId,
        name: &str,
        grouped_data: &serde_json::Value,
    ) -> Result<GroupRecord> {
        let mut state = self.lock()?;
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or(CoreError::GroupNotFound(group_id))?;
        group.name = name.to_string();
        group.grouped_data = grouped_data.clone();
        Ok(group.clone())
    }

    fn put(&self, group_id: GroupId, vector: &NewVector) -> Result<VectorId> {
        let mut state = self.lock()?;
        if !state.groups.contains_key(&group_id) {
            return Err(CoreError::GroupNotFound(group_id));
        }

        let expected = state
            .vectors
            .get(&group_id)
            .and_then(|records| records.first())
            .map(|r| r.signature.len());
        let signature = &vector.signature;
        match expected {
            _ if signature.is_empty() => {
                return Err(CoreError::InvalidFormat("empty signature".into()));
            }
            Some(dim) if dim != signature.len() => {
                return Err(CoreError::InvalidFormat(format!(
                    "signature length {} does not match group dimension {dim}",
                    signature.len()
                )));
            }
            _ => {}
        }

        state.next_vector_id += 1;
        let vector_id = state.next_vector_id;
        state.vectors.entry(group_id).or_default().push(VectorRecord {
            id: vector_id,
            group_id,
            signature: signature.clone(),
            payload: vector.payload.clone(),
            origin: vector.origin.clone(),
        });
        Ok(vector_id)
    }

    fn list_by_group(&self, group_id: GroupId) -> Result<Vec<VectorRecord>> {
        let state = self.lock()?;
        Ok(state.vectors.get(&group_id).cloned().unwrap_or_default())
    }

    fn get_group(&self, group_id: GroupId) -> Result<Option<GroupRecord>> {
        let state = self.lock()?;
        Ok(state.groups.get(&group_id).cloned())
    }

    fn list_groups(&self, division: Option<&str>) -> Result<Vec<GroupRecord>> {
        let state = self.lock()?;
        Ok(state
            .groups
            .values()
            .filter(|g| division.map_or(true, |d| g.division == d))
            .cloned()
            .collect())
    }

    fn delete_group(&self, group_id: GroupId) -> Result<bool> {
        let mut state = self.lock()?;
        state.vectors.remove(&group_id);
        Ok(state.groups.remove(&group_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileInfo, SignatureParams};
    use serde_json::json;

    fn new_group() -> NewGroup {
        NewGroup {
            name: "orders".into(),
            division: "sales".into(),
            grouped_data: json!([]),
            files: vec![FileInfo::new("a.json", 3)],
            params: SignatureParams {
                num_permutations: 3,
                seed: 42,
                ngram_size: 2,
            },
        }
    }

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryStore::new();
        let group = store
            .commit_group(new_group(), vec![NewVector::new(vec![9, 8, 7], "p")])
            .unwrap();

        let listed = store.list_by_group(group.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].signature, vec![9, 8, 7]);
        let loaded = store.get_group(group.id).unwrap().unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.params.num_permutations, 3);
    }

    #[test]
    fn test_memory_rejects_mixed_dimensions() {
        let store = MemoryStore::new();
        let result = store.commit_group(
            new_group(),
            vec![NewVector::new(vec![1, 2], "a"), NewVector::new(vec![1], "b")],
        );

        assert!(result.is_err());
        assert!(store.list_groups(None).unwrap().is_empty());
    }

    #[test]
    fn test_memory_put_and_delete() {
        let store = MemoryStore::new();
        let group = store.commit_group(new_group(), vec![]).unwrap();

        store.put(group.id, &NewVector::new(vec![1, 2], "a")).unwrap();
        assert!(store.put(group.id, &NewVector::new(vec![1], "b")).is_err());
        assert!(matches!(
            store.put(group.id + 1, &NewVector::new(vec![1, 2], "c")),
            Err(CoreError::GroupNotFound(_))
        ));

        assert!(store.delete_group(group.id).unwrap());
        assert!(store.list_by_group(group.id).unwrap().is_empty());
    }
}
