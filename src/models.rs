//! Data structures describing cache sections and the assets they are built from.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::asset_paths::{GlobPattern, is_glob};
use crate::error::{OfflineError, OfflineResult};

/// Keyword collecting every discovered asset no other key claimed.
pub const REST_KEYWORD: &str = ":rest:";
/// Keyword collecting every external no other key claimed.
pub const EXTERNALS_KEYWORD: &str = ":externals:";

/// Named cache tier, processed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
  /// Always fetched and refreshed on every update.
  Main,
  /// Fetched after `main`; only safe for build-unique file names.
  Additional,
  /// Cached lazily on first request.
  Optional,
}

impl Section {
  /// Sections in the order the partitioner visits them.
  pub const ALL: [Section; 3] = [Section::Main, Section::Additional, Section::Optional];

  /// Name used in configuration and generated manifests.
  pub fn name(self) -> &'static str {
    match self {
      Self::Main => "main",
      Self::Additional => "additional",
      Self::Optional => "optional",
    }
  }
}

impl fmt::Display for Section {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A single entry of a section declaration.
#[derive(Debug, Clone)]
pub enum CacheKey {
  /// Exact asset name or external URL.
  Literal(String),
  /// Glob drained from the discovered asset pool.
  Pattern(GlobPattern),
  /// Regular expression drained from the discovered asset pool.
  Regex(Regex),
  /// Receiver for every unclaimed discovered asset.
  Rest,
  /// Receiver for every unclaimed external.
  Externals,
  /// Value of an unsupported type, skipped during partitioning.
  Ignored,
}

impl CacheKey {
  /// Convert a configuration value into a cache key.
  ///
  /// Strings become keywords, globs or literals; `{"pattern": ..}` and `{"regex": ..}`
  /// objects become pattern keys. Anything else is kept as [`CacheKey::Ignored`].
  pub fn from_value(value: &Value) -> OfflineResult<Self> {
    match value {
      Value::String(key) => Self::from_str_key(key),
      Value::Object(map) => {
        if let Some(Value::String(glob)) = map.get("pattern") {
          return Ok(Self::Pattern(GlobPattern::new(glob)?));
        }
        if let Some(Value::String(source)) = map.get("regex") {
          let regex = Regex::new(source).map_err(|err| OfflineError::InvalidPattern {
            pattern: source.clone(),
            reason: err.to_string(),
          })?;
          return Ok(Self::Regex(regex));
        }
        Ok(Self::Ignored)
      }
      _ => Ok(Self::Ignored),
    }
  }

  fn from_str_key(key: &str) -> OfflineResult<Self> {
    Ok(match key {
      REST_KEYWORD => Self::Rest,
      EXTERNALS_KEYWORD => Self::Externals,
      _ if is_glob(key) => Self::Pattern(GlobPattern::new(key)?),
      _ => Self::Literal(key.to_string()),
    })
  }
}

impl From<&str> for CacheKey {
  /// Infallible shorthand used by hosts building specs in code; invalid globs fall back to
  /// literal keys.
  fn from(key: &str) -> Self {
    Self::from_str_key(key).unwrap_or_else(|_| Self::Literal(key.to_string()))
  }
}

/// Keys declared for each section.
#[derive(Debug, Clone, Default)]
pub struct SectionKeys {
  /// Keys for the `main` section.
  pub main: Vec<CacheKey>,
  /// Keys for the `additional` section.
  pub additional: Vec<CacheKey>,
  /// Keys for the `optional` section.
  pub optional: Vec<CacheKey>,
}

impl SectionKeys {
  /// Keys declared for one section.
  pub fn get(&self, section: Section) -> &[CacheKey] {
    match section {
      Section::Main => &self.main,
      Section::Additional => &self.additional,
      Section::Optional => &self.optional,
    }
  }
}

/// Which assets to cache and in which section.
#[derive(Debug, Clone, Default)]
pub enum CacheSpec {
  /// Every asset and external goes to `main`.
  #[default]
  All,
  /// Explicit per-section declarations.
  Sections(SectionKeys),
}

impl CacheSpec {
  /// Parse the `caches` option: `"all"` or an object with `main`, `additional` and
  /// `optional` key lists.
  pub fn from_value(value: &Value) -> OfflineResult<Self> {
    match value {
      Value::Null => Ok(Self::All),
      Value::String(mode) if mode == "all" => Ok(Self::All),
      Value::String(mode) => Err(OfflineError::InvalidCaches(format!(
        "unknown mode {mode:?}, expected \"all\""
      ))),
      Value::Object(map) => {
        if let Some(unknown) = map
          .keys()
          .find(|key| !Section::ALL.iter().any(|section| section.name() == key.as_str()))
        {
          return Err(OfflineError::InvalidCaches(format!(
            "unknown section {unknown:?}"
          )));
        }

        let parse = |section: Section| -> OfflineResult<Vec<CacheKey>> {
          match map.get(section.name()) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(keys)) => keys.iter().map(CacheKey::from_value).collect(),
            Some(_) => Err(OfflineError::InvalidCaches(format!(
              "`{}` must be a list of keys",
              section.name()
            ))),
          }
        };

        Ok(Self::Sections(SectionKeys {
          main: parse(Section::Main)?,
          additional: parse(Section::Additional)?,
          optional: parse(Section::Optional)?,
        }))
      }
      _ => Err(OfflineError::InvalidCaches(
        "expected \"all\" or a section object".into(),
      )),
    }
  }
}

/// Resolved assets per cache section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSections {
  /// Assets in the `main` section.
  pub main: Vec<String>,
  /// Assets in the `additional` section.
  pub additional: Vec<String>,
  /// Assets in the `optional` section.
  pub optional: Vec<String>,
}

impl CacheSections {
  /// Assets resolved for one section.
  pub fn get(&self, section: Section) -> &[String] {
    match section {
      Section::Main => &self.main,
      Section::Additional => &self.additional,
      Section::Optional => &self.optional,
    }
  }

  /// Mutable access to one section.
  pub fn get_mut(&mut self, section: Section) -> &mut Vec<String> {
    match section {
      Section::Main => &mut self.main,
      Section::Additional => &mut self.additional,
      Section::Optional => &mut self.optional,
    }
  }

  /// Drop repeated paths, keeping the first occurrence in section order.
  pub fn dedup(&mut self) {
    let mut seen = HashSet::new();
    for section in Section::ALL {
      self.get_mut(section).retain(|path| seen.insert(path.clone()));
    }
  }

  /// Concatenation of `main`, `additional` and `optional`.
  pub fn flatten(&self) -> Vec<String> {
    Section::ALL
      .iter()
      .flat_map(|section| self.get(*section).iter().cloned())
      .collect()
  }
}

/// Asset emitted by the host build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAsset {
  /// Asset name relative to the build output directory, using forward slashes.
  pub name: String,
  /// Raw asset contents.
  pub contents: Vec<u8>,
}

impl BuildAsset {
  /// Create an asset from its name and contents.
  pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      contents: contents.into(),
    }
  }
}

/// File written by a cache tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedFile {
  /// Path relative to the build output directory.
  pub path: String,
  /// File contents.
  pub contents: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_reserved_keywords_globs_and_literals() {
    let keys: Vec<CacheKey> = [json!(":rest:"), json!(":externals:"), json!("*.css"), json!("app.js")]
      .iter()
      .map(|value| CacheKey::from_value(value).unwrap())
      .collect();

    assert!(matches!(keys[0], CacheKey::Rest));
    assert!(matches!(keys[1], CacheKey::Externals));
    assert!(matches!(&keys[2], CacheKey::Pattern(pattern) if pattern.as_str() == "*.css"));
    assert!(matches!(&keys[3], CacheKey::Literal(path) if path == "app.js"));
  }

  #[test]
  fn parses_pattern_objects_and_ignores_other_types() {
    assert!(matches!(
      CacheKey::from_value(&json!({"pattern": "img/**"})).unwrap(),
      CacheKey::Pattern(_)
    ));
    assert!(matches!(
      CacheKey::from_value(&json!({"regex": "^chunk-\\d+\\.js$"})).unwrap(),
      CacheKey::Regex(_)
    ));
    assert!(matches!(CacheKey::from_value(&json!(42)).unwrap(), CacheKey::Ignored));
    assert!(matches!(CacheKey::from_value(&json!({"other": 1})).unwrap(), CacheKey::Ignored));
  }

  #[test]
  fn parses_cache_spec_modes() {
    assert!(matches!(CacheSpec::from_value(&json!("all")).unwrap(), CacheSpec::All));
    assert!(matches!(CacheSpec::from_value(&Value::Null).unwrap(), CacheSpec::All));

    let spec = CacheSpec::from_value(&json!({"main": ["a.js"], "optional": [":rest:"]})).unwrap();
    let CacheSpec::Sections(keys) = spec else {
      panic!("expected section keys");
    };
    assert_eq!(keys.main.len(), 1);
    assert!(keys.additional.is_empty());
    assert!(matches!(keys.optional[0], CacheKey::Rest));
  }

  #[test]
  fn rejects_unknown_modes_and_sections() {
    assert!(matches!(
      CacheSpec::from_value(&json!("some")),
      Err(OfflineError::InvalidCaches(_))
    ));
    assert!(matches!(
      CacheSpec::from_value(&json!({"extra": []})),
      Err(OfflineError::InvalidCaches(_))
    ));
    assert!(matches!(
      CacheSpec::from_value(&json!({"main": "a.js"})),
      Err(OfflineError::InvalidCaches(_))
    ));
  }

  #[test]
  fn dedup_keeps_the_first_section_an_entry_landed_in() {
    let mut sections = CacheSections {
      main: vec!["a".into(), "b".into(), "a".into()],
      additional: vec!["b".into(), "c".into()],
      optional: vec!["c".into(), "d".into()],
    };
    sections.dedup();
    assert_eq!(sections.main, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(sections.additional, vec!["c".to_string()]);
    assert_eq!(sections.optional, vec!["d".to_string()]);
  }

  #[test]
  fn flattens_sections_in_order() {
    let sections = CacheSections {
      main: vec!["a".into()],
      additional: vec!["b".into()],
      optional: vec!["c".into()],
    };
    assert_eq!(sections.flatten(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
  }
}
