//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::grain::DEFAULT_REFERENCE_DPI;

/// Default bound on in-flight asynchronous renders.
const DEFAULT_MAX_PENDING_JOBS: usize = 8;

/// Construction-time settings for a [`FilmGrainEngine`](crate::FilmGrainEngine).
///
/// `Default` honours these environment variables:
/// - `FILMGRAIN_REFERENCE_DPI`: print resolution for the pixel to film area
///   conversion.
/// - `FILMGRAIN_STOCKS`: extra stock JSON file loaded after the built-ins.
/// - `FILMGRAIN_SEED`: seed for renders that do not carry their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default: 300.
    pub reference_dpi: f32,
    pub stock_path: Option<PathBuf>,
    /// Default: true.
    pub load_builtin_stocks: bool,
    pub default_seed: Option<u64>,
    /// Submitting past this many unfinished async renders blocks on the
    /// oldest. Default: 8.
    pub max_pending_jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_dpi: std::env::var("FILMGRAIN_REFERENCE_DPI")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REFERENCE_DPI),
            stock_path: std::env::var_os("FILMGRAIN_STOCKS").map(PathBuf::from),
            load_builtin_stocks: true,
            default_seed: std::env::var("FILMGRAIN_SEED")
                .ok()
                .and_then(|s| s.parse().ok()),
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
        }
    }
}

impl EngineConfig {
    /// Defaults without consulting the environment.
    pub fn isolated() -> Self {
        Self {
            reference_dpi: DEFAULT_REFERENCE_DPI,
            stock_path: None,
            load_builtin_stocks: true,
            default_seed: None,
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
        }
    }
}
