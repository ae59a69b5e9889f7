//! Error types shared by the resolution engine and the cache tools.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type OfflineResult<T> = Result<T, OfflineError>;

/// Fatal errors raised while configuring or running an offline build pass.
///
/// Non-fatal problems never surface here; they are collected as warnings on the
/// [`crate::BuildReport`] instead.
#[derive(Debug, Error)]
pub enum OfflineError {
  /// `responseStrategy` was not one of the supported values.
  #[error("unknown response strategy: {0:?}, expected \"cache-first\" or \"network-first\"")]
  UnknownResponseStrategy(String),

  /// `updateStrategy` was not one of the supported values.
  #[error("unknown update strategy: {0:?}, expected \"changed\" or \"all\"")]
  UnknownUpdateStrategy(String),

  /// A reserved cache key was declared in more than one place.
  #[error("{keyword} may only be used once across all cache sections (found again in `{section}`)")]
  DuplicateReservedKey {
    /// Keyword as written in configuration.
    keyword: &'static str,
    /// Section holding the second declaration.
    section: &'static str,
  },

  /// A glob or regex pattern could not be compiled.
  #[error("invalid pattern {pattern:?}: {reason}")]
  InvalidPattern {
    /// Pattern as written in configuration.
    pattern: String,
    /// Reason reported by the compiler.
    reason: String,
  },

  /// The `caches` option was neither `"all"` nor a section mapping.
  #[error("invalid caches option: {0}")]
  InvalidCaches(String),

  /// A cache map rule did not have the expected shape.
  #[error("invalid cache map rule #{index}: {reason}")]
  InvalidCacheMapRule {
    /// Zero based position of the rule.
    index: usize,
    /// Description of the problem.
    reason: String,
  },

  /// Both cache tools were disabled.
  #[error("no cache tool is configured, enable `serviceWorker` or `appCache`")]
  NoCacheTools,

  /// A tool would be served from outside the configured base path.
  #[error("{tool} location {location:?} is outside of the base path {base_path:?}")]
  OutsideBasePath {
    /// Tool name.
    tool: &'static str,
    /// Computed tool location.
    location: String,
    /// Configured base path.
    base_path: String,
  },

  /// A cache tool failed to produce its artifacts.
  #[error("{tool} failed: {reason}")]
  ToolFailed {
    /// Tool name.
    tool: &'static str,
    /// Description of the failure.
    reason: String,
  },

  /// Configuration file could not be read.
  #[error("failed to read {}: {source}", path.display())]
  ConfigRead {
    /// Offending path.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },

  /// Configuration file could not be parsed.
  #[error("failed to parse {}: {reason}", path.display())]
  ConfigParse {
    /// Offending path.
    path: PathBuf,
    /// Parser message.
    reason: String,
  },

  /// Serialising a tool config failed.
  #[error("failed to serialise tool config: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Non-fatal problems collected during a build pass.
///
/// Every warning is also emitted through `tracing` at the point it is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<String>);

impl Warnings {
  /// Record a warning.
  pub fn push(&mut self, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!("{message}");
    self.0.push(message);
  }

  /// Append warnings collected elsewhere without logging them again.
  pub fn append(&mut self, other: Warnings) {
    self.0.extend(other.0);
  }

  /// Returns `true` when nothing was recorded.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Number of recorded warnings.
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Iterate over recorded warnings in order.
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  /// Consume the collection.
  pub fn into_vec(self) -> Vec<String> {
    self.0
  }
}
