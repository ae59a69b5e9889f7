//! Content hashing and bundle version resolution.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use sha1::{Digest, Sha1};

use crate::asset_paths::PathNormalizer;
use crate::models::BuildAsset;

/// Token replaced by the bundle hash in version templates.
pub const HASH_TOKEN: &str = "{hash}";

/// Content hash → normalised asset path, in insertion order.
///
/// Insertion order feeds the bundle hash, so callers insert in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashesMap {
  entries: Vec<(String, String)>,
}

impl HashesMap {
  /// Record a hash. An existing hash keeps its position and takes the new path.
  pub fn insert(&mut self, hash: String, path: String) {
    match self.entries.iter_mut().find(|(existing, _)| *existing == hash) {
      Some(entry) => entry.1 = path,
      None => self.entries.push((hash, path)),
    }
  }

  /// Path recorded for a hash.
  pub fn get(&self, hash: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(existing, _)| existing == hash)
      .map(|(_, path)| path.as_str())
  }

  /// Iterate over `(hash, path)` pairs in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .entries
      .iter()
      .map(|(hash, path)| (hash.as_str(), path.as_str()))
  }

  /// Number of distinct hashes.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns `true` when nothing was hashed.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Serialize for HashesMap {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (hash, path) in &self.entries {
      map.serialize_entry(hash, path)?;
    }
    map.end()
  }
}

/// Hex encoded SHA-1 digest of raw asset contents.
pub fn hash_content(contents: &[u8]) -> String {
  hex::encode(Sha1::digest(contents))
}

/// Hash every discovered asset whose normalised path survived partitioning.
pub fn compute_hashes_map(
  assets: &[BuildAsset],
  final_assets: &[String],
  normalizer: &PathNormalizer,
) -> HashesMap {
  let kept: HashSet<&str> = final_assets.iter().map(String::as_str).collect();
  let mut hashes = HashesMap::default();

  for asset in assets {
    let Some(path) = normalizer.normalize(&asset.name) else {
      continue;
    };
    if kept.contains(path.as_str()) {
      hashes.insert(hash_content(&asset.contents), path);
    }
  }

  hashes
}

/// Digest of every asset hash concatenated in insertion order.
pub fn compute_bundle_hash(hashes: &HashesMap) -> String {
  let mut hasher = Sha1::new();
  for (hash, _) in hashes.iter() {
    hasher.update(hash.as_bytes());
  }
  hex::encode(hasher.finalize())
}

/// Values passed to a host supplied version function.
#[derive(Debug, Clone, Copy)]
pub struct VersionContext<'a> {
  /// Digest of all asset hashes.
  pub bundle_hash: &'a str,
  /// Compilation hash reported by the host, when it has one.
  pub build_hash: Option<&'a str>,
  /// Final asset list of the build.
  pub assets: &'a [String],
}

/// Host supplied version function.
pub type VersionFn = Arc<dyn Fn(&VersionContext<'_>) -> String + Send + Sync>;

/// How the bundle version is chosen.
#[derive(Clone, Default)]
pub enum VersionOption {
  /// Local timestamp of the build; changes on every build.
  #[default]
  Timestamp,
  /// Literal version, with `{hash}` replaced by the bundle hash.
  Template(String),
  /// Version computed by the host.
  Custom(VersionFn),
}

impl fmt::Debug for VersionOption {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Timestamp => f.write_str("Timestamp"),
      Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
      Self::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

/// Resolve the version token for a build.
pub fn resolve_version(option: &VersionOption, context: &VersionContext<'_>) -> String {
  match option {
    VersionOption::Timestamp => chrono::Local::now()
      .format("%-m/%-d/%Y, %-I:%M:%S %p")
      .to_string(),
    VersionOption::Template(template) => template.replace(HASH_TOKEN, context.bundle_hash),
    VersionOption::Custom(resolve) => resolve(context),
  }
}
