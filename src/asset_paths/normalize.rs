use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::filters::{is_absolute_url, is_bootstrap_asset};

/// Host supplied transform applied to every asset before it is normalised.
pub type RewriteFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Rule applied to an asset name before it is turned into a served URL.
#[derive(Clone, Default)]
pub enum Rewrite {
  /// Reduce `index.html` / `index.htm` to the directory that serves it.
  #[default]
  IndexHtml,
  /// Direct substitution table; names without an entry are left untouched.
  Table(BTreeMap<String, String>),
  /// Transform implemented by the host.
  Custom(RewriteFn),
}

impl fmt::Debug for Rewrite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::IndexHtml => f.write_str("IndexHtml"),
      Self::Table(table) => f.debug_tuple("Table").field(table).finish(),
      Self::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

impl Rewrite {
  /// Apply the rule to a raw asset name.
  pub fn apply(&self, path: &str) -> String {
    match self {
      Self::IndexHtml => rewrite_index_html(path),
      Self::Table(table) => table.get(path).cloned().unwrap_or_else(|| path.to_string()),
      Self::Custom(transform) => transform(path),
    }
  }
}

fn rewrite_index_html(path: &str) -> String {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  let pattern = PATTERN
    .get_or_init(|| Regex::new(r"^(.*/)?index\.html?$").expect("invalid index regex"));

  match pattern.captures(path) {
    Some(caps) => caps
      .get(1)
      .map_or_else(|| "./".to_string(), |dir| dir.as_str().to_string()),
    None => path.to_string(),
  }
}

/// How assets are addressed by the generated manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
  /// URLs are resolved relative to the location of the manifest.
  Relative,
  /// URLs are rooted at the configured base path.
  Absolute,
}

/// Converts raw asset identifiers into the URLs a cache consumer fetches.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
  rewrite: Rewrite,
  mode: PathMode,
  base_path: String,
}

impl PathNormalizer {
  /// Create a normaliser for the given rewrite rule, mode and base path.
  pub fn new(rewrite: Rewrite, mode: PathMode, base_path: impl Into<String>) -> Self {
    Self {
      rewrite,
      mode,
      base_path: base_path.into(),
    }
  }

  /// Addressing mode in effect.
  pub fn mode(&self) -> PathMode {
    self.mode
  }

  /// Base path absolute URLs are joined onto.
  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  /// Normalise a single asset, returning `None` when the asset is dropped.
  pub fn normalize(&self, path: &str) -> Option<String> {
    if is_bootstrap_asset(path) {
      return None;
    }

    let rewritten = self.rewrite.apply(path);
    if rewritten.is_empty() {
      return None;
    }

    if is_absolute_url(&rewritten) {
      return Some(rewritten);
    }

    let normalized = match self.mode {
      PathMode::Relative => match rewritten.strip_prefix("./") {
        Some("") => rewritten,
        Some(rest) => rest.to_string(),
        None => rewritten,
      },
      PathMode::Absolute if rewritten.starts_with('/') => rewritten,
      PathMode::Absolute => join_base_path(&self.base_path, &rewritten),
    };

    (!normalized.is_empty()).then_some(normalized)
  }

  /// Normalise a list of assets, preserving order and dropping empty results.
  pub fn normalize_all<I, S>(&self, paths: I) -> Vec<String>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    paths
      .into_iter()
      .filter_map(|path| self.normalize(path.as_ref()))
      .collect()
  }
}

/// Join a path onto a base path, keeping exactly one slash between them.
pub fn join_base_path(base_path: &str, path: &str) -> String {
  let relative = path.strip_prefix("./").unwrap_or(path);
  format!("{}/{}", base_path.trim_end_matches('/'), relative)
}
