use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CacheTool, ResolvedManifest, ToolContext};
use crate::asset_paths::LoaderTable;
use crate::cache_maps::SerializedCacheMap;
use crate::config::UpdateStrategy;
use crate::error::{OfflineError, OfflineResult};
use crate::models::{CacheSections, EmittedFile};
use crate::versioning::HashesMap;

const TOOL_NAME: &str = "service-worker";

/// Global the generated prelude assigns the manifest to.
pub const MANIFEST_GLOBAL: &str = "__offline_manifest";

/// Settings of the service worker tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceWorkerConfig {
  /// Output file relative to the build output directory.
  pub output: String,
  /// Script appended after the manifest prelude, typically the runtime implementation.
  pub entry: Option<PathBuf>,
  /// URL served for navigations that miss the cache.
  #[serde(rename = "navigateFallbackURL")]
  pub navigate_fallback_url: Option<String>,
  /// Emit compact JSON.
  pub minify: bool,
  /// Suffix of the runtime cache name.
  pub cache_name: String,
}

impl Default for ServiceWorkerConfig {
  fn default() -> Self {
    Self {
      output: "sw.js".into(),
      entry: None,
      navigate_fallback_url: None,
      minify: false,
      cache_name: String::new(),
    }
  }
}

/// Emits a script declaring the resolved manifest for a service worker runtime.
#[derive(Debug, Clone)]
pub struct ServiceWorkerTool {
  config: ServiceWorkerConfig,
  context: ToolContext,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceWorkerManifest<'a> {
  assets: CacheSections,
  externals: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  hashes_map: Option<HashesMap>,
  strategy: &'static str,
  response_strategy: &'static str,
  version: &'a str,
  name: String,
  relative_paths: bool,
  #[serde(rename = "navigateFallbackURL", skip_serializing_if = "Option::is_none")]
  navigate_fallback_url: Option<String>,
  loaders: &'a LoaderTable,
  cache_maps: &'a [SerializedCacheMap],
}

impl ServiceWorkerTool {
  /// Create the tool, validating its output location.
  pub fn new(
    config: ServiceWorkerConfig,
    public_path: Option<&str>,
    relative: bool,
  ) -> OfflineResult<Self> {
    let context = ToolContext::new(TOOL_NAME, &config.output, public_path, relative)?;
    Ok(Self { config, context })
  }

  fn render_prelude(&self, manifest: &ResolvedManifest) -> OfflineResult<String> {
    let config = self.get_config(manifest)?;
    let json = if self.config.minify {
      serde_json::to_string(&config)?
    } else {
      serde_json::to_string_pretty(&config)?
    };
    Ok(format!("var {MANIFEST_GLOBAL} = {json};\n"))
  }
}

impl CacheTool for ServiceWorkerTool {
  fn name(&self) -> &'static str {
    TOOL_NAME
  }

  fn context(&self) -> &ToolContext {
    &self.context
  }

  fn get_config(&self, manifest: &ResolvedManifest) -> OfflineResult<Value> {
    let context = &self.context;
    let sections = &manifest.sections;

    let hashes_map = (manifest.update_strategy == UpdateStrategy::Changed).then(|| {
      let mut rewritten = HashesMap::default();
      for (hash, path) in manifest.hashes.iter() {
        rewritten.insert(hash.to_string(), context.rewrite_path(path));
      }
      rewritten
    });

    let document = ServiceWorkerManifest {
      assets: CacheSections {
        main: context.rewrite_all(&sections.main),
        additional: context.rewrite_all(&sections.additional),
        optional: context.rewrite_all(&sections.optional),
      },
      externals: context.rewrite_all(&manifest.externals),
      hashes_map,
      strategy: manifest.update_strategy.as_str(),
      response_strategy: manifest.response_strategy.as_str(),
      version: &manifest.version,
      name: format!("offline-manifest:{}", self.config.cache_name),
      relative_paths: manifest.relative_paths,
      navigate_fallback_url: self
        .config
        .navigate_fallback_url
        .as_deref()
        .map(|url| context.rewrite_path(url)),
      loaders: &manifest.loaders,
      cache_maps: &manifest.cache_maps,
    };

    Ok(serde_json::to_value(document)?)
  }

  fn apply(&self, manifest: &ResolvedManifest) -> OfflineResult<Vec<EmittedFile>> {
    let mut contents = self.render_prelude(manifest)?;

    if let Some(entry) = &self.config.entry {
      let script = fs::read_to_string(entry).map_err(|err| OfflineError::ToolFailed {
        tool: TOOL_NAME,
        reason: format!("failed to read entry {}: {err}", entry.display()),
      })?;
      contents.push('\n');
      contents.push_str(&script);
    }

    debug!(output = %self.context.output, "rendered service worker");
    Ok(vec![EmittedFile {
      path: self.context.output.clone(),
      contents,
    }])
  }
}
