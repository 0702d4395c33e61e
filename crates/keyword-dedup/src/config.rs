use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Matching thresholds for the clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Meaningful tokens the shorter phrase needs before subsumption applies.
    pub min_shared_tokens: usize,
    /// Terms up to this many characters use `short_max_distance`.
    pub short_term_len: usize,
    pub short_max_distance: usize,
    pub long_max_distance: usize,
    /// Shorter terms never match by edit distance.
    pub min_fuzzy_len: usize,
    /// Upper bound on `distance / longer length`.
    pub max_distance_ratio: f64,
    /// Edit-distance matches must start with the same character.
    pub require_same_initial: bool,
    pub fuzzy: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_shared_tokens: 2,
            short_term_len: 6,
            short_max_distance: 1,
            long_max_distance: 2,
            min_fuzzy_len: 6,
            max_distance_ratio: 0.17,
            require_same_initial: true,
            fuzzy: true,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigurationError::EngineConfig {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        self.min_shared_tokens = self.min_shared_tokens.max(1);
        self.max_distance_ratio = self.max_distance_ratio.clamp(0.0, 1.0);
        self
    }

    /// Edit-distance ceiling for a pair whose longer term has `len` characters.
    pub fn max_distance_for(&self, len: usize) -> usize {
        let tier = if len <= self.short_term_len {
            self.short_max_distance
        } else {
            self.long_max_distance
        };
        let ratio_cap = (len as f64 * self.max_distance_ratio + 1e-9).floor() as usize;
        tier.min(ratio_cap)
    }
}

/// Where the engine's optional tables live.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub synonyms: Option<PathBuf>,
    pub morph_exceptions: Option<PathBuf>,
    pub engine_config: Option<PathBuf>,
}

/// A configured table or config file could not be used.
///
/// Raised before any clustering starts; the engine never falls back to an
/// empty table when one was requested.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin}:{line}: {reason}")]
    Malformed {
        origin: String,
        line: usize,
        reason: String,
    },
    #[error("synonym cycle through {0:?}")]
    SynonymCycle(String),
    #[error("invalid engine config {}: {source}", path.display())]
    EngineConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to load morphology exceptions: {0}")]
    Morphology(String),
}
