//! Offline build orchestrator: partitions assets, versions the bundle and runs the tools.

use std::fs;
use std::path::{Component, Path};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::asset_paths::{PathMode, PathNormalizer};
use crate::config::Options;
use crate::error::{OfflineResult, Warnings};
use crate::models::{BuildAsset, CacheSections, EmittedFile};
use crate::partition::Partitioner;
use crate::tools::{CacheTool, ResolvedManifest, Tool};
use crate::versioning::{
  HashesMap, VersionContext, compute_bundle_hash, compute_hashes_map, resolve_version,
};

/// Assets produced by one host build.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
  /// Emitted assets in discovery order.
  pub assets: Vec<BuildAsset>,
  /// Compilation hash reported by the host, when it has one.
  pub build_hash: Option<String>,
}

/// Everything resolved and emitted by one build pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
  /// Normalised assets per section.
  pub sections: CacheSections,
  /// `main ++ additional ++ optional`.
  pub assets: Vec<String>,
  /// Externals placed into a section.
  pub externals: Vec<String>,
  /// Content hash → asset path.
  pub hashes: HashesMap,
  /// Digest of every asset hash.
  pub bundle_hash: String,
  /// Bundle version.
  pub version: String,
  /// Files written by the tools.
  pub files: Vec<EmittedFile>,
  /// Non-fatal problems of the pass, configuration warnings included.
  pub warnings: Vec<String>,
}

/// High-level helper running the offline manifest stage of a build.
#[derive(Debug, Clone)]
pub struct OfflineBuilder {
  options: Options,
  normalizer: PathNormalizer,
  tools: Vec<Tool>,
}

impl OfflineBuilder {
  /// Validate the options and instantiate the configured tools.
  pub fn new(options: Options) -> OfflineResult<Self> {
    let tools = Tool::from_options(&options)?;
    let (mode, base_path) = if options.relative_paths {
      (PathMode::Relative, String::new())
    } else {
      (
        PathMode::Absolute,
        options.public_path.clone().unwrap_or_else(|| "/".into()),
      )
    };
    let normalizer = PathNormalizer::new(options.rewrite.clone(), mode, base_path);

    Ok(Self {
      options,
      normalizer,
      tools,
    })
  }

  /// Options the builder was created with.
  pub fn options(&self) -> &Options {
    &self.options
  }

  /// Tools in the order they run.
  pub fn tools(&self) -> &[Tool] {
    &self.tools
  }

  /// Resolve sections, hashes and version for one build and run every tool.
  ///
  /// Tools run in parallel; the stage fails as a whole when any of them fails.
  pub fn build(&self, build: &BuildContext) -> Result<BuildReport> {
    let (manifest, bundle_hash, warnings) = self
      .resolve(build)
      .context("failed to resolve offline cache sections")?;

    let results: Vec<(&'static str, OfflineResult<Vec<EmittedFile>>)> = self
      .tools
      .par_iter()
      .map(|tool| (tool.name(), tool.apply(&manifest)))
      .collect();

    let mut files = Vec::new();
    for (name, result) in results {
      let emitted = result.with_context(|| format!("offline tool `{name}` failed"))?;
      debug!(tool = name, files = emitted.len(), "tool finished");
      files.extend(emitted);
    }

    let mut all_warnings = self.options.warnings.clone();
    all_warnings.append(warnings);

    let assets = manifest.sections.flatten();
    info!(
      version = %manifest.version,
      assets = assets.len(),
      files = files.len(),
      "offline manifest stage finished"
    );

    Ok(BuildReport {
      sections: manifest.sections,
      assets,
      externals: manifest.externals,
      hashes: manifest.hashes,
      bundle_hash,
      version: manifest.version,
      files,
      warnings: all_warnings.into_vec(),
    })
  }

  fn resolve(&self, build: &BuildContext) -> OfflineResult<(ResolvedManifest, String, Warnings)> {
    let tool_outputs: Vec<String> = self.tools.iter().flat_map(Tool::outputs).collect();
    let discovered: Vec<&str> = build
      .assets
      .iter()
      .map(|asset| asset.name.as_str())
      .filter(|name| !tool_outputs.iter().any(|output| output.as_str() == *name))
      .collect();

    let options = &self.options;
    let partition = Partitioner::new(
      &self.normalizer,
      &options.excludes,
      &options.caches,
      &options.externals,
    )
    .safe_to_use_optional_caches(options.safe_to_use_optional_caches)
    .partition(&discovered)?;

    let hashes = compute_hashes_map(&build.assets, &partition.assets, &self.normalizer);
    let bundle_hash = compute_bundle_hash(&hashes);
    let version = resolve_version(&options.version, &VersionContext {
      bundle_hash: &bundle_hash,
      build_hash: build.build_hash.as_deref(),
      assets: &partition.assets,
    });
    debug!(%version, hashes = hashes.len(), "resolved bundle version");

    let manifest = ResolvedManifest {
      sections: partition.sections,
      externals: partition.externals,
      hashes,
      version,
      loaders: options.loaders.clone(),
      cache_maps: options.cache_maps.clone(),
      response_strategy: options.response_strategy,
      update_strategy: options.update_strategy,
      relative_paths: options.relative_paths,
    };

    Ok((manifest, bundle_hash, partition.warnings))
  }
}

/// Write emitted files below the build output directory.
pub fn write_emitted_files(output_dir: &Path, files: &[EmittedFile]) -> Result<()> {
  for file in files {
    let escapes = Path::new(&file.path)
      .components()
      .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes || file.path.starts_with('/') {
      return Err(anyhow!("refusing to write {} outside of the output directory", file.path));
    }
    let destination = output_dir.join(&file.path);
    if let Some(parent) = destination.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&destination, &file.contents)
      .with_context(|| format!("failed to write {}", destination.display()))?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::OfflineConfig;
  use crate::error::OfflineError;
  use crate::versioning::hash_content;
  use serde_json::json;
  use tempfile::tempdir;

  fn options(value: serde_json::Value) -> Options {
    serde_json::from_value::<OfflineConfig>(value)
      .expect("config should deserialise")
      .resolve()
      .expect("config should resolve")
  }

  fn build(names: &[(&str, &str)]) -> BuildContext {
    BuildContext {
      assets: names
        .iter()
        .map(|(name, contents)| BuildAsset::new(*name, *contents))
        .collect(),
      build_hash: Some("c0ffee".into()),
    }
  }

  #[test]
  fn resolves_sections_versions_and_emits_every_tool() {
    let builder = OfflineBuilder::new(options(json!({
      "caches": {"main": ["app.js", "*.css"], "additional": [":rest:"]},
      "version": "build-{hash}",
      "safeToUseOptionalCaches": true
    })))
    .unwrap();

    let report = builder
      .build(&build(&[
        ("app.js", "console.log(1)"),
        ("a.css", "a {}"),
        ("b.css", "b {}"),
        ("c.js", "c()"),
        ("c.js.map", "{}"),
      ]))
      .unwrap();

    assert_eq!(report.sections.main, vec!["app.js", "a.css", "b.css"]);
    assert_eq!(report.sections.additional, vec!["c.js"]);
    assert!(report.sections.optional.is_empty());
    assert_eq!(report.hashes.len(), 4);
    assert_eq!(report.hashes.get(&hash_content(b"c()")), Some("c.js"));
    assert_eq!(report.version, format!("build-{}", report.bundle_hash));
    assert!(report.warnings.is_empty());

    let paths: Vec<&str> = report.files.iter().map(|file| file.path.as_str()).collect();
    assert_eq!(paths, vec!["sw.js", "appcache/manifest.appcache", "appcache/manifest.html"]);
  }

  #[test]
  fn version_is_stable_across_identical_builds() {
    let builder = OfflineBuilder::new(options(json!({"version": "{hash}"}))).unwrap();
    let assets = [("index.html", "<html>"), ("app.js", "run()")];

    let first = builder.build(&build(&assets)).unwrap();
    let second = builder.build(&build(&assets)).unwrap();
    assert_eq!(first.version, second.version);
    assert_eq!(first.sections.main, vec!["./", "app.js"]);
  }

  #[test]
  fn previous_tool_outputs_are_not_cached() {
    let builder = OfflineBuilder::new(options(json!({"appCache": false}))).unwrap();
    let report = builder
      .build(&build(&[("app.js", "run()"), ("sw.js", "var old = 1;")]))
      .unwrap();
    assert_eq!(report.sections.main, vec!["app.js"]);
  }

  #[test]
  fn previous_appcache_pages_are_not_cached() {
    for directory in ["./offline/", "/offline/"] {
      let builder = OfflineBuilder::new(options(json!({
        "serviceWorker": false,
        "appCache": {"directory": directory}
      })))
      .unwrap();
      let report = builder
        .build(&build(&[
          ("app.js", "run()"),
          ("offline/manifest.appcache", "CACHE MANIFEST"),
          ("offline/manifest.html", "<html>"),
        ]))
        .unwrap();

      assert_eq!(report.sections.main, vec!["app.js"]);
      let paths: Vec<&str> = report.files.iter().map(|file| file.path.as_str()).collect();
      assert_eq!(paths, vec!["offline/manifest.appcache", "offline/manifest.html"]);
    }
  }

  #[test]
  fn public_path_produces_absolute_urls() {
    let builder = OfflineBuilder::new(options(json!({
      "publicPath": "/static/",
      "externals": ["https://cdn.example.com/lib.js"]
    })))
    .unwrap();

    let report = builder.build(&build(&[("app.js", "run()")])).unwrap();
    assert_eq!(report.sections.main, vec!["/static/app.js", "https://cdn.example.com/lib.js"]);
    assert_eq!(report.externals, vec!["https://cdn.example.com/lib.js"]);
  }

  #[test]
  fn configuration_and_partition_warnings_are_reported_together() {
    let builder = OfflineBuilder::new(options(json!({
      "updateStrategy": "hash",
      "caches": {"main": ["missing.js", ":rest:"]}
    })))
    .unwrap();

    let report = builder.build(&build(&[("app.js", "run()")])).unwrap();
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[0].contains("deprecated"));
    assert!(report.warnings[1].contains("missing.js"));
  }

  #[test]
  fn duplicated_receivers_fail_the_stage() {
    let builder = OfflineBuilder::new(options(json!({
      "caches": {"main": [":rest:"], "optional": [":rest:"]}
    })))
    .unwrap();

    let err = builder.build(&build(&[("app.js", "run()")])).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<OfflineError>(),
      Some(OfflineError::DuplicateReservedKey { .. })
    ));
  }

  #[test]
  fn a_failing_tool_fails_the_whole_stage() {
    let builder = OfflineBuilder::new(options(json!({
      "serviceWorker": {"entry": "/definitely/missing/runtime.js"}
    })))
    .unwrap();

    let err = builder.build(&build(&[("app.js", "run()")])).unwrap_err();
    assert!(err.to_string().contains("service-worker"));
    assert!(matches!(
      err.downcast_ref::<OfflineError>(),
      Some(OfflineError::ToolFailed { .. })
    ));
  }

  #[test]
  fn disabling_every_tool_is_rejected() {
    let options = options(json!({"serviceWorker": false, "appCache": false}));
    assert!(matches!(OfflineBuilder::new(options), Err(OfflineError::NoCacheTools)));
  }

  #[test]
  fn writes_emitted_files_into_nested_directories() -> Result<()> {
    let temp = tempdir()?;
    let files = vec![EmittedFile {
      path: "appcache/manifest.appcache".into(),
      contents: "CACHE MANIFEST\n".into(),
    }];

    write_emitted_files(temp.path(), &files)?;
    let written = fs::read_to_string(temp.path().join("appcache/manifest.appcache"))?;
    assert_eq!(written, "CACHE MANIFEST\n");

    let escaping = vec![EmittedFile {
      path: "../escape.txt".into(),
      contents: String::new(),
    }];
    assert!(write_emitted_files(temp.path(), &escaping).is_err());

    let rooted = vec![EmittedFile {
      path: "/offline/manifest.html".into(),
      contents: String::new(),
    }];
    assert!(write_emitted_files(temp.path(), &rooted).is_err());
    Ok(())
  }
}
