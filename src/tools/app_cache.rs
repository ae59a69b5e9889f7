use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CacheTool, ResolvedManifest, ToolContext};
use crate::asset_paths::is_absolute_url;
use crate::error::OfflineResult;
use crate::models::EmittedFile;

const TOOL_NAME: &str = "appcache";

/// Settings of the AppCache tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppCacheConfig {
  /// Directory holding the manifest and its loader page.
  pub directory: String,
  /// File stem of the manifest and its loader page.
  pub name: String,
  /// Keep absolute cross-origin URLs in the `CACHE:` section.
  pub include_cross_origin: bool,
  /// Page served when a navigation misses the cache.
  #[serde(rename = "fallbackURL")]
  pub fallback_url: Option<String>,
}

impl Default for AppCacheConfig {
  fn default() -> Self {
    Self {
      directory: "appcache/".into(),
      name: "manifest".into(),
      include_cross_origin: false,
      fallback_url: None,
    }
  }
}

/// Emits a legacy `CACHE MANIFEST` and the page that installs it.
#[derive(Debug, Clone)]
pub struct AppCacheTool {
  config: AppCacheConfig,
  context: ToolContext,
  page_output: String,
}

#[derive(Serialize)]
struct AppCacheDocument {
  version: String,
  cache: Vec<String>,
  network: Vec<&'static str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  fallback: Option<(String, String)>,
}

impl AppCacheTool {
  /// Create the tool, validating its output location.
  pub fn new(
    config: AppCacheConfig,
    public_path: Option<&str>,
    relative: bool,
  ) -> OfflineResult<Self> {
    let directory = config.directory.trim_end_matches('/');
    let manifest_file = if directory.is_empty() {
      format!("{}.appcache", config.name)
    } else {
      format!("{directory}/{}.appcache", config.name)
    };

    let context = ToolContext::new(TOOL_NAME, &manifest_file, public_path, relative)?;
    // Sibling of the resolved manifest.
    let stem = context.output.strip_suffix(".appcache").unwrap_or(context.output.as_str());
    let page_output = format!("{stem}.html");
    Ok(Self {
      config,
      context,
      page_output,
    })
  }

  /// Manifest file followed by its loader page.
  pub fn outputs(&self) -> Vec<String> {
    vec![self.context.output.clone(), self.page_output.clone()]
  }

  fn document(&self, manifest: &ResolvedManifest) -> AppCacheDocument {
    let sections = &manifest.sections;
    let cache = sections
      .main
      .iter()
      .chain(sections.additional.iter())
      .filter(|path| self.config.include_cross_origin || !is_absolute_url(path))
      .map(|path| self.context.rewrite_path(path))
      .collect();

    let fallback = self
      .config
      .fallback_url
      .as_deref()
      .map(|url| (self.context.root_url(), self.context.rewrite_path(url)));

    AppCacheDocument {
      version: manifest.version.clone(),
      cache,
      network: vec!["*"],
      fallback,
    }
  }

  fn render_manifest(document: &AppCacheDocument) -> String {
    let mut text = format!("CACHE MANIFEST\n#ver:{}\n\nCACHE:\n", document.version);
    for path in &document.cache {
      text.push_str(path);
      text.push('\n');
    }

    text.push_str("\nNETWORK:\n");
    for entry in &document.network {
      text.push_str(entry);
      text.push('\n');
    }

    if let Some((namespace, page)) = &document.fallback {
      text.push_str(&format!("\nFALLBACK:\n{namespace} {page}\n"));
    }
    text
  }

  fn render_page(&self) -> String {
    let manifest_name = self
      .context
      .output
      .rsplit('/')
      .next()
      .unwrap_or(self.context.output.as_str());
    format!("<!doctype html>\n<html manifest=\"{manifest_name}\"></html>\n")
  }
}

impl CacheTool for AppCacheTool {
  fn name(&self) -> &'static str {
    TOOL_NAME
  }

  fn context(&self) -> &ToolContext {
    &self.context
  }

  fn get_config(&self, manifest: &ResolvedManifest) -> OfflineResult<Value> {
    Ok(serde_json::to_value(self.document(manifest))?)
  }

  fn apply(&self, manifest: &ResolvedManifest) -> OfflineResult<Vec<EmittedFile>> {
    let document = self.document(manifest);
    debug!(output = %self.context.output, entries = document.cache.len(), "rendered appcache");

    Ok(vec![
      EmittedFile {
        path: self.context.output.clone(),
        contents: Self::render_manifest(&document),
      },
      EmittedFile {
        path: self.page_output.clone(),
        contents: self.render_page(),
      },
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asset_paths::LoaderTable;
  use crate::config::{ResponseStrategy, UpdateStrategy};
  use crate::models::CacheSections;
  use crate::versioning::HashesMap;

  fn manifest() -> ResolvedManifest {
    ResolvedManifest {
      sections: CacheSections {
        main: vec!["./".into(), "app.js".into()],
        additional: vec!["https://cdn.example.com/lib.js".into(), "img/logo.png".into()],
        optional: vec!["lazy.js".into()],
      },
      externals: vec!["https://cdn.example.com/lib.js".into()],
      hashes: HashesMap::default(),
      version: "build-abc".into(),
      loaders: LoaderTable::new(),
      cache_maps: Vec::new(),
      response_strategy: ResponseStrategy::CacheFirst,
      update_strategy: UpdateStrategy::Changed,
      relative_paths: true,
    }
  }

  #[test]
  fn renders_manifest_relative_to_its_directory() {
    let tool = AppCacheTool::new(AppCacheConfig::default(), None, true).unwrap();
    let files = tool.apply(&manifest()).unwrap();

    assert_eq!(files[0].path, "appcache/manifest.appcache");
    assert_eq!(
      files[0].contents,
      "CACHE MANIFEST\n#ver:build-abc\n\nCACHE:\n../\n../app.js\n../img/logo.png\n\nNETWORK:\n*\n"
    );
    assert_eq!(files[1].path, "appcache/manifest.html");
    assert!(files[1].contents.contains("manifest=\"manifest.appcache\""));
  }

  #[test]
  fn includes_cross_origin_and_fallback_when_configured() {
    let config = AppCacheConfig {
      directory: String::new(),
      include_cross_origin: true,
      fallback_url: Some("offline.html".into()),
      ..AppCacheConfig::default()
    };
    let tool = AppCacheTool::new(config, Some("/static/"), false).unwrap();
    let mut absolute = manifest();
    absolute.sections.main = vec!["/static/".into(), "/static/app.js".into()];
    absolute.sections.additional = vec!["https://cdn.example.com/lib.js".into()];

    let files = tool.apply(&absolute).unwrap();
    assert_eq!(files[0].path, "manifest.appcache");
    assert!(files[0].contents.contains("CACHE:\n/static/\n/static/app.js\nhttps://cdn.example.com/lib.js\n"));
    assert!(files[0].contents.ends_with("FALLBACK:\n/static/ offline.html\n"));
  }

  #[test]
  fn page_shares_the_normalised_manifest_directory() {
    for directory in ["/offline/", "./offline/", "offline/./"] {
      let config = AppCacheConfig {
        directory: directory.into(),
        ..AppCacheConfig::default()
      };
      let tool = AppCacheTool::new(config, None, false).unwrap();
      assert_eq!(tool.outputs(), vec![
        "offline/manifest.appcache".to_string(),
        "offline/manifest.html".to_string()
      ]);

      let files = tool.apply(&manifest()).unwrap();
      assert_eq!(files[1].path, "offline/manifest.html");
    }
  }

  #[test]
  fn directory_climbing_out_of_the_output_is_rejected() {
    let config = AppCacheConfig {
      directory: "../outside/".into(),
      ..AppCacheConfig::default()
    };
    assert!(matches!(
      AppCacheTool::new(config, None, true),
      Err(crate::error::OfflineError::OutsideBasePath { tool: "appcache", .. })
    ));
  }

  #[test]
  fn config_lists_cache_entries_and_version() {
    let tool = AppCacheTool::new(AppCacheConfig::default(), None, true).unwrap();
    let config = tool.get_config(&manifest()).unwrap();
    assert_eq!(config["version"], "build-abc");
    assert_eq!(config["cache"].as_array().map(Vec::len), Some(3));
    assert_eq!(config["network"], serde_json::json!(["*"]));
  }
}
