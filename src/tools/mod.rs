//! Cache consumers fed with the resolved sections, hashes and version.
//!
//! The set of tools is closed: a service worker prelude and a legacy AppCache manifest.
//! Both implement [`CacheTool`] and are iterated in that declared order.

mod app_cache;
mod service_worker;

use serde_json::Value;

use crate::asset_paths::{LoaderTable, is_absolute_url, join_base_path};
use crate::cache_maps::SerializedCacheMap;
use crate::config::{Options, ResponseStrategy, UpdateStrategy};
use crate::error::{OfflineError, OfflineResult};
use crate::models::{CacheSections, EmittedFile};
use crate::versioning::HashesMap;

pub use app_cache::{AppCacheConfig, AppCacheTool};
pub use service_worker::{ServiceWorkerConfig, ServiceWorkerTool};

/// Read-only values every tool receives once resolution is complete.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
  /// Normalised assets per section.
  pub sections: CacheSections,
  /// Externals placed into a section.
  pub externals: Vec<String>,
  /// Content hash → asset path.
  pub hashes: HashesMap,
  /// Bundle version.
  pub version: String,
  /// Externals grouped by loader prefix.
  pub loaders: LoaderTable,
  /// Serialised routing rules.
  pub cache_maps: Vec<SerializedCacheMap>,
  /// Runtime response strategy.
  pub response_strategy: ResponseStrategy,
  /// Runtime update strategy.
  pub update_strategy: UpdateStrategy,
  /// Whether URLs are relative to each manifest.
  pub relative_paths: bool,
}

/// Where a tool's output lives and how asset URLs are addressed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
  /// Output file, relative to the build output directory.
  pub output: String,
  /// Public URL prefix, when configured.
  pub public_path: Option<String>,
  /// Prefix applied to asset URLs: the public path, or the way back to the output root.
  pub base_path: String,
  /// URL the output is served from.
  pub location: String,
  relative: bool,
}

impl ToolContext {
  /// Compute the context of a tool writing `output`.
  ///
  /// Fails when the output climbs above the output root, which would serve it from outside
  /// of the base path.
  pub fn new(
    tool: &'static str,
    output: &str,
    public_path: Option<&str>,
    relative: bool,
  ) -> OfflineResult<Self> {
    let base_path = public_path.unwrap_or("/");
    let output = resolve_dot_segments(output).ok_or_else(|| OfflineError::OutsideBasePath {
      tool,
      location: output.to_string(),
      base_path: base_path.to_string(),
    })?;

    if relative {
      let depth = output.matches('/').count();
      return Ok(Self {
        location: output.clone(),
        output,
        public_path: public_path.map(str::to_string),
        base_path: "../".repeat(depth),
        relative,
      });
    }

    Ok(Self {
      location: join_base_path(base_path, &output),
      output,
      public_path: public_path.map(str::to_string),
      base_path: base_path.to_string(),
      relative,
    })
  }

  /// Address an already normalised asset from this tool's location.
  pub fn rewrite_path(&self, path: &str) -> String {
    if !self.relative || is_absolute_url(path) || path.starts_with('/') {
      return path.to_string();
    }

    let relative = path.strip_prefix("./").unwrap_or(path);
    let rewritten = format!("{}{}", self.base_path, relative);
    if rewritten.is_empty() {
      "./".to_string()
    } else {
      rewritten
    }
  }

  /// Rewrite every path of a list.
  pub fn rewrite_all(&self, paths: &[String]) -> Vec<String> {
    paths.iter().map(|path| self.rewrite_path(path)).collect()
  }

  /// URL of the output root as seen from this tool.
  pub fn root_url(&self) -> String {
    if self.relative {
      self.rewrite_path("./")
    } else {
      self.base_path.clone()
    }
  }
}

/// Collapse `.` and `..` segments of a relative output path.
///
/// Returns `None` when the path climbs above its root.
fn resolve_dot_segments(path: &str) -> Option<String> {
  let mut segments: Vec<&str> = Vec::new();
  for segment in path.trim_start_matches('/').split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop()?;
      }
      other => segments.push(other),
    }
  }
  (!segments.is_empty()).then(|| segments.join("/"))
}

/// Capability shared by every cache consumer.
pub trait CacheTool: Send + Sync {
  /// Tool name used in logs and errors.
  fn name(&self) -> &'static str;

  /// Output location of the tool.
  fn context(&self) -> &ToolContext;

  /// Serialisable description of what the tool will emit.
  fn get_config(&self, manifest: &ResolvedManifest) -> OfflineResult<Value>;

  /// Produce the tool's artifacts.
  fn apply(&self, manifest: &ResolvedManifest) -> OfflineResult<Vec<EmittedFile>>;
}

/// The closed set of supported tools.
#[derive(Debug, Clone)]
pub enum Tool {
  /// Service worker manifest prelude.
  ServiceWorker(ServiceWorkerTool),
  /// Legacy AppCache manifest.
  AppCache(AppCacheTool),
}

impl Tool {
  /// Instantiate the enabled tools in declaration order.
  pub fn from_options(options: &Options) -> OfflineResult<Vec<Tool>> {
    let public_path = options.public_path.as_deref();
    let mut tools = Vec::new();

    if let Some(config) = &options.service_worker {
      tools.push(Tool::ServiceWorker(ServiceWorkerTool::new(
        config.clone(),
        public_path,
        options.relative_paths,
      )?));
    }
    if let Some(config) = &options.app_cache {
      tools.push(Tool::AppCache(AppCacheTool::new(
        config.clone(),
        public_path,
        options.relative_paths,
      )?));
    }

    if tools.is_empty() {
      return Err(OfflineError::NoCacheTools);
    }
    Ok(tools)
  }

  fn inner(&self) -> &dyn CacheTool {
    match self {
      Self::ServiceWorker(tool) => tool,
      Self::AppCache(tool) => tool,
    }
  }

  /// Files this tool writes, relative to the build output directory.
  pub fn outputs(&self) -> Vec<String> {
    match self {
      Self::ServiceWorker(tool) => vec![tool.context().output.clone()],
      Self::AppCache(tool) => tool.outputs(),
    }
  }
}

impl CacheTool for Tool {
  fn name(&self) -> &'static str {
    self.inner().name()
  }

  fn context(&self) -> &ToolContext {
    self.inner().context()
  }

  fn get_config(&self, manifest: &ResolvedManifest) -> OfflineResult<Value> {
    self.inner().get_config(manifest)
  }

  fn apply(&self, manifest: &ResolvedManifest) -> OfflineResult<Vec<EmittedFile>> {
    self.inner().apply(manifest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_context_walks_back_to_the_output_root() {
    let context = ToolContext::new("appcache", "appcache/manifest.appcache", None, true).unwrap();
    assert_eq!(context.base_path, "../");
    assert_eq!(context.rewrite_path("app.js"), "../app.js");
    assert_eq!(context.rewrite_path("./"), "../");
    assert_eq!(context.rewrite_path("https://cdn.example.com/a.js"), "https://cdn.example.com/a.js");

    let root = ToolContext::new("sw", "sw.js", None, true).unwrap();
    assert_eq!(root.base_path, "");
    assert_eq!(root.rewrite_path("app.js"), "app.js");
    assert_eq!(root.root_url(), "./");
  }

  #[test]
  fn absolute_context_is_located_under_the_public_path() {
    let context = ToolContext::new("sw", "./sw.js", Some("/static/"), false).unwrap();
    assert_eq!(context.output, "sw.js");
    assert_eq!(context.location, "/static/sw.js");
    assert_eq!(context.rewrite_path("/static/app.js"), "/static/app.js");
    assert_eq!(context.root_url(), "/static/");
  }

  #[test]
  fn outputs_escaping_the_base_path_are_rejected() {
    let err = ToolContext::new("sw", "../sw.js", Some("/static/"), false).unwrap_err();
    assert!(matches!(err, OfflineError::OutsideBasePath { tool: "sw", .. }));

    let err = ToolContext::new("appcache", "a/../../m.appcache", None, true).unwrap_err();
    assert!(matches!(err, OfflineError::OutsideBasePath { .. }));
  }

  #[test]
  fn collapses_inner_dot_segments() {
    assert_eq!(resolve_dot_segments("a/./b/../sw.js").as_deref(), Some("a/sw.js"));
    assert_eq!(resolve_dot_segments("/sw.js").as_deref(), Some("sw.js"));
    assert_eq!(resolve_dot_segments(".."), None);
    assert_eq!(resolve_dot_segments(""), None);
  }

  #[test]
  fn no_tools_is_a_configuration_error() {
    let mut options = Options::default();
    options.service_worker = None;
    options.app_cache = None;
    assert!(matches!(Tool::from_options(&options), Err(OfflineError::NoCacheTools)));
  }

  #[test]
  fn tools_are_created_in_declared_order() {
    let tools = Tool::from_options(&Options::default()).unwrap();
    let names: Vec<&str> = tools.iter().map(|tool| tool.name()).collect();
    assert_eq!(names, vec!["service-worker", "appcache"]);
  }
}
