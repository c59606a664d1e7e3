//! Locality-Sensitive Hashing (LSH) for efficient candidate lookup.
//!
//! LSH groups similar documents into buckets based on their MinHash signatures,
//! so finding a document's neighbours touches only the buckets it falls into
//! instead of every other document.

use crate::minhash::MinHashSignature;
use simgroup_core::hashing::hash_u64_slice;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Document ID type. Ids are positions within a submitted batch.
pub type DocId = usize;

/// Default Jaccard threshold the banding is tuned for.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Weight of false positives in the banding cost function.
const FALSE_POSITIVE_WEIGHT: f64 = 0.5;
/// Weight of false negatives in the banding cost function.
const FALSE_NEGATIVE_WEIGHT: f64 = 0.5;
/// Sample points used when integrating the S-curve.
const INTEGRATION_STEPS: usize = 1000;

/// Errors raised by the LSH index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LshError {
    #[error("signature has {actual} components, index expects {expected}")]
    SignatureLength { expected: usize, actual: usize },
}

/// LSH index for finding candidate similar documents.
///
/// The index divides each MinHash signature into bands of rows.
/// Documents that share at least one band hash are considered candidates.
pub struct LshIndex {
    /// Number of bands (groups of rows).
    num_bands: usize,
    /// Rows per band.
    rows_per_band: usize,
    /// Buckets for each band: band_id -> hash -> doc_ids.
    buckets: Vec<HashMap<u64, Vec<DocId>>>,
}

impl LshIndex {
    /// Create a new LSH index with the specified band configuration.
    ///
    /// # Arguments
    /// * `num_bands` - Number of bands to divide the signature into
    /// * `rows_per_band` - Number of rows (hash values) per band
    #[must_use]
    pub fn new(num_bands: usize, rows_per_band: usize) -> Self {
        Self {
            num_bands,
            rows_per_band,
            buckets: (0..num_bands).map(|_| HashMap::new()).collect(),
        }
    }

    /// Create LSH index with target similarity threshold.
    ///
    /// For a pair with Jaccard similarity s, b bands and r rows per band:
    /// P(candidates) = 1 - (1 - s^r)^b
    ///
    /// This method picks the b and r that minimise the weighted area of
    /// false positives (below the threshold) plus false negatives (above it).
    #[must_use]
    pub fn with_threshold(num_permutations: usize, threshold: f64) -> Self {
        let (num_bands, rows_per_band) = Self::optimize_params(num_permutations, threshold);
        Self::new(num_bands, rows_per_band)
    }

    /// Find optimal band/row parameters for the given threshold.
    ///
    /// Only exact factorisations `b * r = n` are considered, so every
    /// signature component lands in exactly one band.
    pub(crate) fn optimize_params(n: usize, t: f64) -> (usize, usize) {
        let mut best = (1, n);
        let mut best_cost = f64::MAX;

        for b in (1..=n).filter(|b| n % b == 0) {
            let r = n / b;
            let fp = false_positive_area(t, b, r);
            let fn_ = false_negative_area(t, b, r);
            let cost = FALSE_POSITIVE_WEIGHT * fp + FALSE_NEGATIVE_WEIGHT * fn_;
            if cost < best_cost {
                best = (b, r);
                best_cost = cost;
            }
        }

        best
    }

    /// Get the number of bands.
    #[must_use]
    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Get the number of rows per band.
    #[must_use]
    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    /// Signature length this index accepts.
    #[must_use]
    pub fn signature_len(&self) -> usize {
        self.num_bands * self.rows_per_band
    }

    fn check_len(&self, signature: &MinHashSignature) -> Result<(), LshError> {
        if signature.len() != self.signature_len() {
            return Err(LshError::SignatureLength {
                expected: self.signature_len(),
                actual: signature.len(),
            });
        }
        Ok(())
    }

    /// Band hashes of a signature, one per band.
    fn band_hashes<'a>(&'a self, signature: &'a MinHashSignature) -> impl Iterator<Item = u64> + 'a {
        signature
            .values
            .chunks_exact(self.rows_per_band.max(1))
            .take(self.num_bands)
            .map(hash_u64_slice)
    }

    /// Add a document signature to the index.
    ///
    /// The signature is divided into bands, and each band is hashed
    /// to place the document into buckets.
    pub fn insert(&mut self, doc_id: DocId, signature: &MinHashSignature) -> Result<(), LshError> {
        self.check_len(signature)?;

        let hashes: Vec<u64> = self.band_hashes(signature).collect();
        for (band, band_hash) in hashes.into_iter().enumerate() {
            self.buckets[band].entry(band_hash).or_default().push(doc_id);
        }
        Ok(())
    }

    /// Find every indexed document sharing at least one band bucket with
    /// `signature`.
    ///
    /// A signature that was itself inserted finds its own id.
    pub fn query(&self, signature: &MinHashSignature) -> Result<BTreeSet<DocId>, LshError> {
        self.check_len(signature)?;

        let mut found = BTreeSet::new();
        for (band, band_hash) in self.band_hashes(signature).enumerate() {
            if let Some(bucket) = self.buckets[band].get(&band_hash) {
                found.extend(bucket.iter().copied());
            }
        }
        Ok(found)
    }

    /// Get all candidate pairs from the index.
    ///
    /// Returns an iterator over unique (doc_id1, doc_id2) pairs where
    /// doc_id1 < doc_id2 and the documents share at least one bucket.
    pub fn candidates(&self) -> impl Iterator<Item = (DocId, DocId)> + '_ {
        let mut seen = HashSet::new();

        self.buckets
            .iter()
            .flat_map(|band_buckets| {
                band_buckets
                    .values()
                    .filter(|bucket| bucket.len() > 1)
                    .flat_map(|bucket| {
                        bucket.iter().enumerate().flat_map(move |(i, &id1)| {
                            bucket[i + 1..]
                                .iter()
                                .map(move |&id2| (id1.min(id2), id1.max(id2)))
                        })
                    })
            })
            .filter(move |pair| seen.insert(*pair))
    }

    /// Get the number of buckets with multiple documents.
    #[must_use]
    pub fn num_collision_buckets(&self) -> usize {
        self.buckets
            .iter()
            .flat_map(|band| band.values())
            .filter(|bucket| bucket.len() > 1)
            .count()
    }

    /// Get the total number of documents in the index.
    #[must_use]
    pub fn num_documents(&self) -> usize {
        // Every document is in exactly one bucket of the first band.
        self.buckets
            .first()
            .map_or(0, |band| band.values().map(Vec::len).sum())
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        for band in &mut self.buckets {
            band.clear();
        }
    }
}

/// Probability that a pair with similarity `s` becomes a candidate.
fn collision_probability(s: f64, b: usize, r: usize) -> f64 {
    1.0 - (1.0 - s.powi(r as i32)).powi(b as i32)
}

/// Midpoint-rule integral of `f` over `[lo, hi]`.
fn integrate(lo: f64, hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    if hi <= lo {
        return 0.0;
    }
    let step = (hi - lo) / INTEGRATION_STEPS as f64;
    (0..INTEGRATION_STEPS)
        .map(|i| f(lo + (i as f64 + 0.5) * step))
        .sum::<f64>()
        * step
}

fn false_positive_area(t: f64, b: usize, r: usize) -> f64 {
    integrate(0.0, t, |s| collision_probability(s, b, r))
}

fn false_negative_area(t: f64, b: usize, r: usize) -> f64 {
    integrate(t, 1.0, |s| 1.0 - collision_probability(s, b, r))
}
