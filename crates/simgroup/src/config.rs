//! Runtime configuration for grouping, search and the job runner.
//!
//! Every struct has sensible defaults, builder-style setters and a
//! `from_env()` constructor. Call [`GroupingConfig::validate`] (or the
//! `validate` of the enclosing config) before handing a config to a
//! long-lived component.

use crate::cluster::GroupingMode;
use crate::lsh::DEFAULT_THRESHOLD;
use crate::minhash::{DEFAULT_NUM_PERMUTATIONS, DEFAULT_SEED};
use crate::shingle::DEFAULT_NGRAM_SIZE;
use serde::{Deserialize, Serialize};
use simgroup_core::SignatureParams;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default number of matches returned per search query.
pub const DEFAULT_TOP_K: usize = 3;

/// Errors for configuration values that cannot work.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be in (0, 1], got {0}")]
    Threshold(f64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(var: &str) -> Option<bool> {
    std::env::var(var)
        .ok()
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Parameters of the signature and grouping pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Jaccard similarity the LSH banding is tuned for.
    pub threshold: f64,
    /// Signature length.
    pub num_permutations: usize,
    /// Shingle length in characters.
    pub ngram_size: usize,
    /// Seed for the permutation hash functions.
    pub seed: u64,
    /// How LSH candidates are turned into groups.
    pub mode: GroupingMode,
}

impl GroupingConfig {
    /// Set the similarity threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the number of permutations.
    #[must_use]
    pub fn with_num_permutations(mut self, num_permutations: usize) -> Self {
        self.num_permutations = num_permutations;
        self
    }

    /// Set the shingle length.
    #[must_use]
    pub fn with_ngram_size(mut self, ngram_size: usize) -> Self {
        self.ngram_size = ngram_size;
        self
    }

    /// Set the permutation seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the grouping mode.
    #[must_use]
    pub fn with_mode(mut self, mode: GroupingMode) -> Self {
        self.mode = mode;
        self
    }

    /// The MinHash parameters signatures are computed with.
    #[must_use]
    pub fn signature_params(&self) -> SignatureParams {
        SignatureParams {
            num_permutations: self.num_permutations,
            seed: self.seed,
            ngram_size: self.ngram_size,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `SIMGROUP_THRESHOLD`: LSH similarity threshold
    /// - `SIMGROUP_NUM_PERM`: signature length
    /// - `SIMGROUP_NGRAM`: shingle length
    /// - `SIMGROUP_SEED`: permutation seed
    /// - `SIMGROUP_TRANSITIVE`: `1`/`true` merges candidates transitively
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match env_flag("SIMGROUP_TRANSITIVE") {
            Some(true) => GroupingMode::Transitive,
            Some(false) => GroupingMode::SinglePass,
            None => defaults.mode,
        };

        Self {
            threshold: env_or("SIMGROUP_THRESHOLD", defaults.threshold),
            num_permutations: env_or("SIMGROUP_NUM_PERM", defaults.num_permutations),
            ngram_size: env_or("SIMGROUP_NGRAM", defaults.ngram_size),
            seed: env_or("SIMGROUP_SEED", defaults.seed),
            mode,
        }
    }

    /// Check that the values describe a usable pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if self.num_permutations == 0 {
            return Err(ConfigError::Zero("num_permutations"));
        }
        if self.ngram_size == 0 {
            return Err(ConfigError::Zero("ngram_size"));
        }
        Ok(())
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            num_permutations: DEFAULT_NUM_PERMUTATIONS,
            ngram_size: DEFAULT_NGRAM_SIZE,
            seed: DEFAULT_SEED,
            mode: GroupingMode::SinglePass,
        }
    }
}

/// Settings for similarity search.
///
/// Queries are signed with the parameters stored on the searched group,
/// so only the result size is configurable here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Matches returned per query.
    pub top_k: usize,
}

impl SearchConfig {
    /// Set the number of matches per query.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `SIMGROUP_TOP_K`: matches returned per query
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            top_k: env_or("SIMGROUP_TOP_K", DEFAULT_TOP_K),
        }
    }

    /// Check that `top_k` is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Zero("top_k"));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Settings for the background job runner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Number of worker tasks pulling from the queue.
    pub workers: usize,
    /// Jobs that can wait in the queue before `submit` applies backpressure.
    pub queue_capacity: usize,
    /// How long finished jobs stay pollable.
    pub retention: Duration,
    /// How often the reaper sweeps expired jobs.
    pub reap_interval: Duration,
    /// Pipeline parameters used by every job.
    pub grouping: GroupingConfig,
}

impl JobConfig {
    /// Set the number of workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set how long terminal job records are kept.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the reaper sweep interval.
    #[must_use]
    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Set the grouping parameters.
    #[must_use]
    pub fn with_grouping(mut self, grouping: GroupingConfig) -> Self {
        self.grouping = grouping;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables, on top of those read by
    /// [`GroupingConfig::from_env`]:
    /// - `SIMGROUP_WORKERS`: worker task count
    /// - `SIMGROUP_RESULT_EXPIRES`: retention in seconds
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retention_secs = env_or("SIMGROUP_RESULT_EXPIRES", defaults.retention.as_secs());

        Self {
            workers: env_or("SIMGROUP_WORKERS", defaults.workers),
            retention: Duration::from_secs(retention_secs),
            grouping: GroupingConfig::from_env(),
            ..defaults
        }
    }

    /// Check every field, including the nested grouping config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Zero("reap_interval"));
        }
        self.grouping.validate()
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            retention: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(60),
            grouping: GroupingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_defaults() {
        let config = GroupingConfig::default();
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.num_permutations, 128);
        assert_eq!(config.ngram_size, 2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.mode, GroupingMode::SinglePass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grouping_validate() {
        let base = GroupingConfig::default();
        assert_eq!(
            base.clone().with_threshold(0.0).validate(),
            Err(ConfigError::Threshold(0.0))
        );
        assert!(base.clone().with_threshold(1.5).validate().is_err());
        assert!(base.clone().with_threshold(f64::NAN).validate().is_err());
        assert_eq!(
            base.clone().with_num_permutations(0).validate(),
            Err(ConfigError::Zero("num_permutations"))
        );
        assert!(base.with_ngram_size(0).validate().is_err());
    }

    #[test]
    fn test_job_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
        assert!(config.with_workers(0).validate().is_err());
    }

    #[test]
    fn test_search_validate() {
        assert!(SearchConfig::default().validate().is_ok());
        assert_eq!(
            SearchConfig::default().with_top_k(0).validate(),
            Err(ConfigError::Zero("top_k"))
        );
    }

    #[test]
    fn test_search_from_env() {
        std::env::set_var("SIMGROUP_TOP_K", "7");
        assert_eq!(SearchConfig::from_env().top_k, 7);
        std::env::set_var("SIMGROUP_TOP_K", "not a number");
        assert_eq!(SearchConfig::from_env().top_k, DEFAULT_TOP_K);
        std::env::remove_var("SIMGROUP_TOP_K");
        assert_eq!(SearchConfig::from_env(), SearchConfig::default());
    }

    #[test]
    fn test_signature_params() {
        let params = GroupingConfig::default().with_seed(9).signature_params();
        assert_eq!(params.num_permutations, 128);
        assert_eq!(params.seed, 9);
        assert_eq!(params.ngram_size, 2);
    }

    #[test]
    fn test_config_serde() {
        let config = JobConfig::default().with_workers(4);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: JobConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
