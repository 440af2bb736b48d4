//! Run configuration, the Rust-shaped version of `learn_detector.cfg`.
//!
//! A flat TOML file read once at startup:
//!
//! ```toml
//! dataset_dir = "/data/repeatability/arboretum"
//! frames = [0, 1, 2, 3]
//! offset_radius = 3
//!
//! [anneal]
//! iterations = 100000
//! threshold = 30
//! match_radius = 5
//! seed = 1
//! ```
//!
//! Every field has a default, so a minimal file only names the dataset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anneal::AnnealParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything a run needs, parsed once before the loop starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Root of the repeatability dataset (contains `frames/` and `warps/`).
    pub dataset_dir: PathBuf,
    /// Frame numbers to train on.
    pub frames: Vec<u32>,
    /// Radius of the disc the candidate offset pairs are drawn from.
    pub offset_radius: i32,
    /// Search parameters.
    pub anneal: AnnealParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            dataset_dir: PathBuf::from("."),
            frames: vec![0, 1, 2],
            offset_radius: 3,
            anneal: AnnealParams::default(),
        }
    }
}

impl RunConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<RunConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
