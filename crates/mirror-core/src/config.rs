//! Configuration structures for the remote mirror.
//!
//! - [`PipelineConfig`] - debounce window, shutdown drain policy, channel sizing
//! - [`PathConfig`] - normalization and reserved-area rules
//! - [`MirrorConfig`] - roots used by the local collaborators
//! - [`Config`] - root configuration combining all settings
//!
//! Every section implements [`Default`] and deserializes with
//! `#[serde(default)]`, so a configuration file only needs the keys it
//! overrides.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::path::{DefaultNormalizer, PathNormalizer};
use crate::reserved::{DEFAULT_RESERVED_PREFIXES, PrefixReserved};

/// Longest debounce window accepted by [`Config::validate`].
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// What happens to queued mutations when the pipeline shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DrainPolicy {
    /// Execute every queued mutation before stopping.
    #[default]
    Drain,
    /// Drop queued mutations; only the in-flight one completes.
    Discard,
}

/// Configuration for the change pipeline.
///
/// # Examples
///
/// ```
/// use mirror_core::{DrainPolicy, PipelineConfig};
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.debounce_ms, 1000);
/// assert_eq!(config.drain_policy, DrainPolicy::Drain);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay applied to rename and delete events before they are queued.
    ///
    /// Gives a rename or delete the local side just caused time to settle
    /// before its echo from the remote side is reflected back.
    pub debounce_ms: u64,

    /// Behavior for queued mutations at shutdown.
    pub drain_policy: DrainPolicy,

    /// Capacity of the channel between the event source and the dispatcher.
    pub event_channel_capacity: usize,
}

impl PipelineConfig {
    /// Returns the debounce window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            drain_policy: DrainPolicy::Drain,
            event_channel_capacity: 256,
        }
    }
}

/// Path normalization and reserved-area rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Lower-case every path during normalization.
    pub fold_case: bool,

    /// Prefixes whose contents are never mirrored.
    pub reserved_prefixes: Vec<String>,
}

impl PathConfig {
    /// Builds the normalizer described by this section.
    #[inline]
    #[must_use]
    pub const fn normalizer(&self) -> DefaultNormalizer {
        DefaultNormalizer::new(self.fold_case)
    }

    /// Builds the reserved-path filter described by this section.
    #[must_use]
    pub fn reserved_filter(&self) -> PrefixReserved {
        PrefixReserved::from_raw(&self.normalizer(), &self.reserved_prefixes)
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            fold_case: false,
            reserved_prefixes: DEFAULT_RESERVED_PREFIXES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }
}

/// Roots used when mirroring a local directory that stands in for the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Directory whose changes are observed.
    pub remote_root: Utf8PathBuf,

    /// Directory where placeholders are materialized.
    pub local_root: Utf8PathBuf,
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use mirror_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"pipeline": {"debounce_ms": 250}}"#).unwrap();
/// assert_eq!(config.pipeline.debounce_ms, 250);
/// assert!(!config.paths.reserved_prefixes.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change pipeline configuration.
    pub pipeline: PipelineConfig,

    /// Path rules.
    pub paths: PathConfig,

    /// Mirror roots.
    pub mirror: MirrorConfig,
}

impl Config {
    /// Loads a configuration file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON, or any error from
    /// [`validate`](Self::validate).
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option values that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.event_channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "pipeline.event_channel_capacity",
                "must be greater than zero",
            ));
        }

        if self.pipeline.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::invalid_option(
                "pipeline.debounce_ms",
                format!("must not exceed {MAX_DEBOUNCE_MS}"),
            ));
        }

        let normalizer = self.paths.normalizer();
        for raw in &self.paths.reserved_prefixes {
            if normalizer.normalize(raw).is_root() {
                return Err(ConfigError::invalid_option(
                    "paths.reserved_prefixes",
                    format!("'{raw}' normalizes to the sync root"),
                ));
            }
        }

        Ok(())
    }

    /// Checks that both mirror roots exist and are directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDirectory`] for the first missing root.
    pub fn require_roots(&self) -> Result<(), ConfigError> {
        for root in [&self.mirror.remote_root, &self.mirror.local_root] {
            if root.as_str().is_empty() || !root.is_dir() {
                return Err(ConfigError::MissingDirectory(root.clone()));
            }
        }
        Ok(())
    }
}
