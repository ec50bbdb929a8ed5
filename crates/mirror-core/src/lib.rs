//! Core types, configuration, and path rules for the remote mirror.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`RelativePath`], the canonical lock and correlation key
//! - [`PathNormalizer`] and the default normalization rules
//! - [`ReservedFilter`] implementations for system areas that are never mirrored
//! - Configuration structures ([`Config`] and its sections)
//! - Type aliases for `FxHashMap`/`FxHashSet` (faster than std)

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod path;
pub mod reserved;

pub use config::{Config, DrainPolicy, MirrorConfig, PathConfig, PipelineConfig};
pub use error::ConfigError;
pub use hash::{FxBuildHasher, FxHashMap, FxHashSet, fx_hash_map, fx_hash_set};
pub use path::{DefaultNormalizer, PathNormalizer, RelativePath};
pub use reserved::{AnyReserved, NoReserved, PrefixReserved, ReservedFilter};
