//! # simgroup-core
//!
//! Core infrastructure for simgroup.
//!
//! Provides shared abstractions for:
//! - Signature persistence (SQLite, in-memory)
//! - Hashing (seeded xxh3)
//! - Record types (groups, vector records, file metadata)

pub mod error;
pub mod hashing;
pub mod storage;
pub mod types;

pub use error::{CoreError, Result};
pub use storage::{MemoryStore, SignatureStore, SqliteStore};
pub use types::{
    FileInfo, GroupId, GroupRecord, NewGroup, NewVector, SignatureParams, VectorId,
    VectorRecord,
};
