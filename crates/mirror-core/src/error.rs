//! Error types for the mirror-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration loading and
//! validation failures.

use camino::Utf8PathBuf;

/// Errors that can occur while loading or validating configuration.
///
/// # Error Recovery Strategy
///
/// - **Invalid option** / **Parse**: Recoverable - fix the file or flag and rerun
/// - **Missing directory** / **Read**: Fatal - the environment is not as configured
///
/// # Examples
///
/// ```
/// use mirror_core::ConfigError;
///
/// let error = ConfigError::invalid_option("pipeline.event_channel_capacity", "must be positive");
/// assert!(error.to_string().contains("event_channel_capacity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The dotted name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// A required directory does not exist.
    #[error("missing required directory: {0}")]
    MissingDirectory(Utf8PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if correcting the configuration itself resolves the error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidOption { .. } | Self::Parse(_))
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::MissingDirectory(path) | Self::Read { path, .. } => Some(path),
            Self::InvalidOption { .. } | Self::Parse(_) => None,
        }
    }
}
