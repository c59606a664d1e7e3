//! Turning uploaded JSON files into documents.
//!
//! A file whose top level is an array contributes one document per element;
//! any other top-level value is a single document. Every document remembers
//! the file it came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simgroup_core::FileInfo;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading input files.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The bytes are not valid JSON.
    #[error("failed to parse {origin} as JSON: {source}")]
    Malformed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One JSON value together with the name of the file it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Name of the uploaded file.
    pub origin: String,
    /// The document body.
    pub data: Value,
}

impl Document {
    /// Create a document.
    #[must_use]
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Documents parsed from one file, plus the file's upload record.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub documents: Vec<Document>,
    pub file: FileInfo,
}

/// Parse the contents of one uploaded file.
///
/// `origin` is the file name recorded on each document and in the returned
/// [`FileInfo`]; the size is the raw byte length.
pub fn documents_from_json(origin: &str, bytes: &[u8]) -> Result<Ingested, IngestError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| IngestError::Malformed {
        origin: origin.to_string(),
        source,
    })?;

    let documents: Vec<Document> = match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| Document::new(origin, item))
            .collect(),
        other => vec![Document::new(origin, other)],
    };
    debug!(origin, documents = documents.len(), "parsed input file");

    Ok(Ingested {
        documents,
        file: FileInfo::new(origin, bytes.len() as u64),
    })
}

/// Read and parse a JSON file from disk.
///
/// The origin is the file name without its directory.
pub fn read_json_file(path: impl AsRef<Path>) -> Result<Ingested, IngestError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    documents_from_json(&origin, &bytes)
}

/// Read several files and concatenate their documents in argument order.
pub fn read_json_files<P: AsRef<Path>>(
    paths: &[P],
) -> Result<(Vec<Document>, Vec<FileInfo>), IngestError> {
    let mut documents = Vec::new();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let ingested = read_json_file(path)?;
        documents.extend(ingested.documents);
        files.push(ingested.file);
    }
    Ok((documents, files))
}
