//! Loading policy configuration
//!
//! Tile loads can be tuned through presets or a custom configuration. The
//! defaults reproduce the classic behaviour: a failed load is not retried
//! and a late completion is applied to whatever tile it was issued for.

use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_RETRY_DELAY_MS;

/// What to do with a load that completes after its tile was demoted to the
/// previous generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Last write wins: the completion updates the tile wherever it lives
    Apply,
    /// Completions for demoted tiles are dropped
    DiscardSuperseded,
}

impl Default for StalePolicy {
    fn default() -> Self {
        if cfg!(feature = "discard-stale-loads") {
            Self::DiscardSuperseded
        } else {
            Self::Apply
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Zero disables retries entirely
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub exponential_backoff: bool,
    pub stale_completions: StalePolicy,
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        LoadingProfile::Default.resolve()
    }
}

impl TileLoadingConfig {
    pub fn retries_enabled(&self) -> bool {
        self.max_retries > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadingProfile {
    /// One attempt per tile, late completions applied
    Default,
    /// Flaky networks: a few retries with exponential backoff
    Resilient,
    /// One attempt per tile, completions for superseded tiles dropped
    Strict,
    Custom(TileLoadingConfig),
}

impl LoadingProfile {
    pub fn resolve(&self) -> TileLoadingConfig {
        match self {
            Self::Default => TileLoadingConfig {
                max_retries: 0,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                exponential_backoff: false,
                stale_completions: StalePolicy::default(),
            },
            Self::Resilient => TileLoadingConfig {
                max_retries: 3,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                exponential_backoff: true,
                stale_completions: StalePolicy::default(),
            },
            Self::Strict => TileLoadingConfig {
                max_retries: 0,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                exponential_backoff: false,
                stale_completions: StalePolicy::DiscardSuperseded,
            },
            Self::Custom(config) => config.clone(),
        }
    }
}
