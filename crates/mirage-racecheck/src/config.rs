//! Detector configuration

use serde::{Deserialize, Serialize};

/// Environment variable that disables uniform-write suppression
pub const UNIFORM_WRITES_ENV: &str = "OCLGRIND_UNIFORM_WRITES";

/// Switches controlling the race-detection rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Suppress conflicts on writes that store the byte already in memory
    ///
    /// Enabled by default; setting [`UNIFORM_WRITES_ENV`] to any non-empty
    /// value turns the suppression off so redundant writes report too.
    pub allow_uniform_writes: bool,

    /// Keep atomics forbidden across group-scope synchronization
    ///
    /// By default every synchronization re-permits atomics, which misses
    /// some inter-group atomic/non-atomic races. With this set, only a
    /// device-scope synchronization re-permits them.
    pub strict_atomic_sync: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            allow_uniform_writes: true,
            strict_atomic_sync: false,
        }
    }
}

impl DetectorConfig {
    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        let uniform_writes_disabled = std::env::var(UNIFORM_WRITES_ENV)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        Self {
            allow_uniform_writes: !uniform_writes_disabled,
            ..Self::default()
        }
    }
}
