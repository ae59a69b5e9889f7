//! Configuration loading and resolution into runtime options.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::asset_paths::{GlobPattern, LoaderTable, Rewrite, RewriteFn, extract_loaders};
use crate::cache_maps::{SerializedCacheMap, serialize_cache_maps};
use crate::error::{OfflineError, OfflineResult, Warnings};
use crate::models::CacheSpec;
use crate::tools::{AppCacheConfig, ServiceWorkerConfig};
use crate::versioning::{HASH_TOKEN, VersionFn, VersionOption};

/// Configuration files looked up by [`OfflineConfig::discover`], in order.
pub const CONFIG_FILE_NAMES: [&str; 3] = [
  "offline.config.json",
  "offline.config.yaml",
  "offline.config.yml",
];

/// Exclude patterns used when none are configured.
pub const DEFAULT_EXCLUDES: [&str; 2] = ["**/.*", "**/*.map"];

/// How the runtime answers requests for cached assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseStrategy {
  /// Serve from cache, fall back to the network.
  #[default]
  CacheFirst,
  /// Try the network, fall back to the cache.
  NetworkFirst,
}

impl ResponseStrategy {
  /// Name used in configuration and generated manifests.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CacheFirst => "cache-first",
      Self::NetworkFirst => "network-first",
    }
  }

  fn parse(value: &str) -> OfflineResult<Self> {
    match value {
      "cache-first" => Ok(Self::CacheFirst),
      "network-first" => Ok(Self::NetworkFirst),
      other => Err(OfflineError::UnknownResponseStrategy(other.to_string())),
    }
  }
}

/// Which assets the runtime re-downloads when the version changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
  /// Only assets whose content hash changed.
  #[default]
  Changed,
  /// Every asset.
  All,
}

impl UpdateStrategy {
  /// Name used in configuration and generated manifests.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Changed => "changed",
      Self::All => "all",
    }
  }
}

/// A cache tool is either toggled with a boolean or configured with an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolSetting<T> {
  /// `true` enables the tool with its defaults, `false` disables it.
  Enabled(bool),
  /// Tool specific settings; implies the tool is enabled.
  Config(T),
}

impl<T> Default for ToolSetting<T> {
  fn default() -> Self {
    Self::Enabled(true)
  }
}

impl<T: Default> ToolSetting<T> {
  fn into_option(self) -> Option<T> {
    match self {
      Self::Enabled(true) => Some(T::default()),
      Self::Enabled(false) => None,
      Self::Config(config) => Some(config),
    }
  }
}

/// Raw configuration as written in `offline.config.json` or `offline.config.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfflineConfig {
  /// `"all"` or `{ main, additional, optional }`.
  pub caches: Value,
  /// Assets cached but not produced by the build, optionally `loader:`-prefixed.
  pub externals: Vec<String>,
  /// Globs removing discovered assets before partitioning.
  pub excludes: Vec<String>,
  /// Substitution table replacing the default `index.html` rewrite.
  pub rewrites: Option<BTreeMap<String, String>>,
  /// Version template; `{hash}` is replaced by the bundle hash.
  pub version: Option<String>,
  /// `cache-first` or `network-first`.
  pub response_strategy: String,
  /// `changed`, `all`, or the deprecated `hash`.
  pub update_strategy: String,
  /// URL prefix every asset is served under; disables relative paths.
  pub public_path: Option<String>,
  /// Address assets relative to each manifest.
  pub relative_paths: Option<bool>,
  /// Acknowledge that `additional` / `optional` assets have build-unique names.
  pub safe_to_use_optional_caches: bool,
  /// Runtime request routing rules.
  pub cache_maps: Vec<Value>,
  /// Service worker settings.
  pub service_worker: ToolSetting<ServiceWorkerConfig>,
  /// AppCache settings.
  pub app_cache: ToolSetting<AppCacheConfig>,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      caches: Value::String("all".into()),
      externals: Vec::new(),
      excludes: DEFAULT_EXCLUDES.iter().map(|value| value.to_string()).collect(),
      rewrites: None,
      version: None,
      response_strategy: ResponseStrategy::default().as_str().into(),
      update_strategy: UpdateStrategy::default().as_str().into(),
      public_path: None,
      relative_paths: None,
      safe_to_use_optional_caches: false,
      cache_maps: Vec::new(),
      service_worker: ToolSetting::default(),
      app_cache: ToolSetting::default(),
    }
  }
}

impl OfflineConfig {
  /// Load the first configuration file found in `dir`, or defaults when there is none.
  ///
  /// Unlike a missing file, an unreadable or malformed file is reported as an error.
  pub fn discover(dir: &Path) -> OfflineResult<Self> {
    match CONFIG_FILE_NAMES
      .iter()
      .map(|name| dir.join(name))
      .find(|candidate| candidate.is_file())
    {
      Some(path) => Self::from_path(&path),
      None => {
        debug!(dir = %dir.display(), "no offline config found, using defaults");
        Ok(Self::default())
      }
    }
  }

  /// Read configuration from a JSON or YAML file, chosen by extension.
  pub fn from_path(path: &Path) -> OfflineResult<Self> {
    let content = fs::read_to_string(path).map_err(|source| OfflineError::ConfigRead {
      path: path.to_path_buf(),
      source,
    })?;

    let parse_error = |reason: String| OfflineError::ConfigParse {
      path: path.to_path_buf(),
      reason,
    };

    match path.extension().and_then(|ext| ext.to_str()) {
      Some("yaml") | Some("yml") => {
        serde_yaml::from_str(&content).map_err(|err| parse_error(err.to_string()))
      }
      _ => serde_json::from_str(&content).map_err(|err| parse_error(err.to_string())),
    }
  }

  /// Validate the configuration and convert it into runtime options.
  pub fn resolve(self) -> OfflineResult<Options> {
    let mut warnings = Warnings::default();

    let response_strategy = ResponseStrategy::parse(&self.response_strategy)?;

    let mut version = self.version.map(VersionOption::Template);
    let update_strategy = match self.update_strategy.as_str() {
      "changed" => UpdateStrategy::Changed,
      "all" => UpdateStrategy::All,
      "hash" => {
        warnings.push(
          "update strategy `hash` is deprecated, use `all` with a `{hash}` token in `version`",
        );
        version.get_or_insert_with(|| VersionOption::Template(HASH_TOKEN.to_string()));
        UpdateStrategy::All
      }
      other => return Err(OfflineError::UnknownUpdateStrategy(other.to_string())),
    };

    let relative_paths = match (&self.public_path, self.relative_paths) {
      (Some(_), Some(true)) => {
        warnings.push(
          "`publicPath` is set together with `relativePaths: true`; relative paths are disabled",
        );
        false
      }
      (Some(_), _) => false,
      (None, explicit) => explicit.unwrap_or(true),
    };

    let caches = CacheSpec::from_value(&self.caches)?;
    let (externals, loaders) = extract_loaders(&self.externals);
    let excludes = self
      .excludes
      .iter()
      .map(|pattern| GlobPattern::new(pattern))
      .collect::<OfflineResult<Vec<_>>>()?;
    let cache_maps = serialize_cache_maps(&self.cache_maps)?;

    Ok(Options {
      caches,
      externals,
      loaders,
      excludes,
      rewrite: self.rewrites.map(Rewrite::Table).unwrap_or_default(),
      version: version.unwrap_or_default(),
      response_strategy,
      update_strategy,
      public_path: self.public_path,
      relative_paths,
      safe_to_use_optional_caches: self.safe_to_use_optional_caches,
      cache_maps,
      service_worker: self.service_worker.into_option(),
      app_cache: self.app_cache.into_option(),
      warnings,
    })
  }
}

/// Validated options driving one [`crate::OfflineBuilder`].
#[derive(Debug, Clone)]
pub struct Options {
  /// Section declarations.
  pub caches: CacheSpec,
  /// Externals with loader prefixes removed.
  pub externals: Vec<String>,
  /// Externals grouped by loader prefix.
  pub loaders: LoaderTable,
  /// Compiled exclude globs.
  pub excludes: Vec<GlobPattern>,
  /// Rewrite applied before normalisation.
  pub rewrite: Rewrite,
  /// Version resolution.
  pub version: VersionOption,
  /// Runtime response strategy.
  pub response_strategy: ResponseStrategy,
  /// Runtime update strategy.
  pub update_strategy: UpdateStrategy,
  /// Public URL prefix, when assets are served from an absolute location.
  pub public_path: Option<String>,
  /// Whether URLs are relative to each manifest.
  pub relative_paths: bool,
  /// Silences the optional sections warning.
  pub safe_to_use_optional_caches: bool,
  /// Serialised routing rules.
  pub cache_maps: Vec<SerializedCacheMap>,
  /// Service worker settings, `None` when disabled.
  pub service_worker: Option<ServiceWorkerConfig>,
  /// AppCache settings, `None` when disabled.
  pub app_cache: Option<AppCacheConfig>,
  /// Problems found while resolving the configuration.
  pub warnings: Warnings,
}

impl Default for Options {
  fn default() -> Self {
    OfflineConfig::default()
      .resolve()
      .expect("default configuration is valid")
  }
}

impl Options {
  /// Replace the rewrite rule with a host transform.
  pub fn with_rewrite(mut self, rewrite: RewriteFn) -> Self {
    self.rewrite = Rewrite::Custom(rewrite);
    self
  }

  /// Replace the version option with a host function.
  pub fn with_version(mut self, version: VersionFn) -> Self {
    self.version = VersionOption::Custom(version);
    self
  }

  /// Load, validate and resolve the configuration for a project directory.
  pub fn load(dir: &Path, explicit: Option<PathBuf>) -> OfflineResult<Self> {
    let config = match explicit {
      Some(path) => OfflineConfig::from_path(&path)?,
      None => OfflineConfig::discover(dir)?,
    };
    config.resolve()
  }
}
