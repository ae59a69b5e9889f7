//! Helpers for classifying, matching and normalising asset paths.
//!
//! Responsibilities are split into focused submodules so URL detection, glob matching,
//! loader prefix extraction and the final URL normalisation can be tested independently.

mod filters;
mod glob;
mod loaders;
mod normalize;

pub use filters::{BOOTSTRAP_ENTRY_PREFIX, is_absolute_url, is_bootstrap_asset};
pub use glob::{GlobPattern, is_glob};
pub use loaders::{LoaderTable, extract_loaders};
pub use normalize::{PathMode, PathNormalizer, Rewrite, RewriteFn, join_base_path};
