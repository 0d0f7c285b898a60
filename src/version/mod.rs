//! Version comparison for container image tags
//!
//! - [`semver`]: strict parsing and coercion of tags into semantic versions
//! - [`candidates`]: upgrade candidate selection with include/exclude filters

pub mod candidates;
pub mod semver;

pub use candidates::{TagFilters, select_candidates};
