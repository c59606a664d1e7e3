//! # simgroup
//!
//! Near-duplicate grouping and similarity search for JSON documents.
//!
//! Documents of any shape are flattened to their scalar values, shingled
//! into character n-grams and summarised by MinHash signatures. LSH banding
//! finds documents whose estimated Jaccard similarity is likely above a
//! threshold, and those candidates are grouped. Groups and their signatures
//! are persisted so later queries can be ranked against them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use simgroup::{Clusterer, Document, GroupingConfig};
//! use serde_json::json;
//!
//! let docs = vec![
//!     Document::new("a.json", json!({"title": "hello world"})),
//!     Document::new("a.json", json!({"title": "hello world!"})),
//!     Document::new("a.json", json!({"title": "something else"})),
//! ];
//!
//! let clusterer = Clusterer::new(&GroupingConfig::default());
//! let clustering = clusterer.cluster(&docs).unwrap();
//! println!("{} groups", clustering.num_groups());
//! ```
//!
//! ## Pipeline
//!
//! ```text
//!  JSON file ──▶ ingest ──▶ flatten ──▶ shingle ──▶ minhash ──▶ lsh ──▶ cluster
//!                                                                         │
//!                        search ◀── SignatureStore ◀── jobs (commit) ◀────┘
//! ```
//!
//! ## Modules
//!
//! - [`flatten`]: Scalar extraction from nested JSON
//! - [`shingle`]: Character n-gram tokenization
//! - [`minhash`]: MinHash signature generation
//! - [`lsh`]: LSH banding index
//! - [`cluster`]: Grouping strategies
//! - [`search`]: Cosine-ranked similarity search against stored groups
//! - [`ingest`]: Reading uploaded JSON files
//! - [`jobs`]: Background job runner with pollable status
//! - [`config`]: Runtime configuration

pub mod cluster;
pub mod config;
pub mod flatten;
pub mod ingest;
pub mod jobs;
pub mod lsh;
pub mod minhash;
pub mod search;
pub mod shingle;

pub use cluster::{ClusterError, Clusterer, Clustering, GroupingMode, UnionFind};
pub use config::{ConfigError, GroupingConfig, JobConfig, SearchConfig};
pub use ingest::{documents_from_json, read_json_file, read_json_files, Document, IngestError};
pub use jobs::{
    ClusterRequest, JobError, JobId, JobOutput, JobRunner, JobSnapshot, JobState, PipelineError,
};
pub use lsh::{DocId, LshError, LshIndex};
pub use minhash::{MinHashSignature, MinHasher, SimilarityError};
pub use search::{cosine_similarity, rank, QueryResult, RankedMatch, SearchError, SimilaritySearch};
pub use simgroup_core::{
    CoreError, FileInfo, GroupId, GroupRecord, MemoryStore, SignatureParams, SignatureStore,
    SqliteStore, VectorRecord,
};
