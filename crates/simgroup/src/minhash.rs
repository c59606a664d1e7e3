//! MinHash signature generation for document similarity.
//!
//! MinHash is a locality-sensitive hashing technique that approximates
//! the Jaccard similarity between sets.

use crate::shingle::{shingle_set, DEFAULT_NGRAM_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use simgroup_core::hashing::hash_with_seed;
use simgroup_core::SignatureParams;
use thiserror::Error;

/// Default number of permutations for MinHash signatures.
pub const DEFAULT_NUM_PERMUTATIONS: usize = 128;

/// Default seed for drawing permutation seeds.
pub const DEFAULT_SEED: u64 = 42;

/// Component value of a signature built from an empty shingle set.
pub const EMPTY_SENTINEL: u64 = u64::MAX;

/// Errors raised when two signatures cannot be compared.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimilarityError {
    /// Signatures come from hashers with different permutation counts.
    #[error("signature lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Similarity is not defined for this pair (zero magnitude, empty input).
    #[error("similarity undefined: {0}")]
    Undefined(&'static str),
}

/// MinHash signature - a compact representation of a document's shingle set.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MinHashSignature {
    /// The minimum hash values for each permutation.
    pub values: Vec<u64>,
}

impl MinHashSignature {
    /// Create a new signature with the given values.
    #[must_use]
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// Signature standing in for an empty shingle set.
    #[must_use]
    pub fn empty(num_permutations: usize) -> Self {
        Self::new(vec![EMPTY_SENTINEL; num_permutations])
    }

    /// Get the number of permutations in this signature.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the signature has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether this signature was built from at least one shingle.
    ///
    /// Sentinel signatures (too-short documents) must not be indexed or
    /// ranked: they would collide with each other in every band.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.values.iter().any(|&v| v != EMPTY_SENTINEL)
    }
}

/// MinHash signature generator.
///
/// Uses multiple hash functions (simulated via seeds) to generate
/// compact signatures that preserve Jaccard similarity.
#[derive(Clone, Debug)]
pub struct MinHasher {
    /// Number of hash permutations.
    num_permutations: usize,
    /// Seed the permutation seeds were drawn from.
    seed: u64,
    /// Seeds for each hash permutation.
    seeds: Vec<u64>,
    /// N-gram size for shingling.
    ngram_size: usize,
}

impl MinHasher {
    /// Create a new MinHasher with the specified number of permutations.
    ///
    /// Uses a fixed seed for reproducibility.
    #[must_use]
    pub fn new(num_permutations: usize) -> Self {
        Self::with_seed(num_permutations, DEFAULT_SEED)
    }

    /// Create a new MinHasher with a specific random seed.
    ///
    /// Hashers built with the same seed and permutation count produce
    /// comparable signatures, across processes and runs.
    #[must_use]
    pub fn with_seed(num_permutations: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..num_permutations).map(|_| rng.gen()).collect();

        Self {
            num_permutations,
            seed,
            seeds,
            ngram_size: DEFAULT_NGRAM_SIZE,
        }
    }

    /// Rebuild the hasher a stored group was signed with.
    #[must_use]
    pub fn from_params(params: &SignatureParams) -> Self {
        Self::with_seed(params.num_permutations, params.seed).with_ngram_size(params.ngram_size)
    }

    /// Parameters to record alongside signatures from this hasher.
    #[must_use]
    pub fn params(&self) -> SignatureParams {
        SignatureParams {
            num_permutations: self.num_permutations,
            seed: self.seed,
            ngram_size: self.ngram_size,
        }
    }

    /// Set the n-gram size for shingling.
    #[must_use]
    pub fn with_ngram_size(mut self, ngram_size: usize) -> Self {
        self.ngram_size = ngram_size;
        self
    }

    /// Get the number of permutations.
    #[must_use]
    pub fn num_permutations(&self) -> usize {
        self.num_permutations
    }

    /// Get the n-gram size.
    #[must_use]
    pub fn ngram_size(&self) -> usize {
        self.ngram_size
    }

    /// Generate a MinHash signature from a collection of shingles.
    ///
    /// Each shingle's UTF-8 bytes are hashed with each seed and the minimum
    /// per permutation is kept, so the result does not depend on iteration
    /// order or on repeated shingles. No shingles yields the sentinel
    /// signature.
    #[must_use]
    pub fn signature<I, S>(&self, shingles: I) -> MinHashSignature
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut min_hashes = vec![EMPTY_SENTINEL; self.num_permutations];

        for shingle in shingles {
            let bytes = shingle.as_ref().as_bytes();
            for (slot, &seed) in min_hashes.iter_mut().zip(&self.seeds) {
                *slot = (*slot).min(hash_with_seed(bytes, seed));
            }
        }

        MinHashSignature::new(min_hashes)
    }

    /// Generate a MinHash signature directly from a JSON document.
    ///
    /// This convenience method flattens and shingles the document and
    /// computes the signature of the resulting shingle set.
    #[must_use]
    pub fn signature_from_document(&self, document: &Value) -> MinHashSignature {
        self.signature(shingle_set(document, self.ngram_size))
    }

    /// Estimate Jaccard similarity from two MinHash signatures.
    ///
    /// The similarity is approximated by the fraction of hash values
    /// that match between the two signatures.
    pub fn similarity(
        sig1: &MinHashSignature,
        sig2: &MinHashSignature,
    ) -> Result<f64, SimilarityError> {
        if sig1.len() != sig2.len() {
            return Err(SimilarityError::LengthMismatch {
                left: sig1.len(),
                right: sig2.len(),
            });
        }
        if sig1.is_empty() {
            return Err(SimilarityError::Undefined("empty signatures"));
        }

        let matches = sig1
            .values
            .iter()
            .zip(sig2.values.iter())
            .filter(|(a, b)| a == b)
            .count();

        Ok(matches as f64 / sig1.len() as f64)
    }
}

impl Default for MinHasher {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_PERMUTATIONS)
    }
}
