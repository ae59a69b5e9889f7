//! Assignment of discovered assets and externals to cache sections.
//!
//! Sections are resolved in the fixed order `main`, `additional`, `optional` against two
//! shared pools (discovered assets and externals). Every key drains what it claims from the
//! pools, so an asset can never be assigned twice and later sections only see what earlier
//! ones left behind. The `:rest:` and `:externals:` receivers collect the leftovers once
//! all declared keys have been processed.

use std::collections::HashSet;

use tracing::debug;

use crate::asset_paths::{GlobPattern, PathNormalizer};
use crate::error::{OfflineError, OfflineResult, Warnings};
use crate::models::{
  CacheKey, CacheSections, CacheSpec, EXTERNALS_KEYWORD, REST_KEYWORD, Section, SectionKeys,
};

/// Outcome of a partitioning pass.
#[derive(Debug, Clone, Default)]
pub struct Partition {
  /// Normalised assets per section.
  pub sections: CacheSections,
  /// `main ++ additional ++ optional`.
  pub assets: Vec<String>,
  /// Normalised externals that were placed into a section, in section order.
  pub externals: Vec<String>,
  /// Non-fatal problems found while resolving keys.
  pub warnings: Warnings,
}

/// Configuration-time inputs of the partitioner.
#[derive(Debug, Clone)]
pub struct Partitioner<'a> {
  normalizer: &'a PathNormalizer,
  excludes: &'a [GlobPattern],
  spec: &'a CacheSpec,
  externals: &'a [String],
  safe_to_use_optional_caches: bool,
}

impl<'a> Partitioner<'a> {
  /// Create a partitioner for a cache specification and its externals.
  pub fn new(
    normalizer: &'a PathNormalizer,
    excludes: &'a [GlobPattern],
    spec: &'a CacheSpec,
    externals: &'a [String],
  ) -> Self {
    Self {
      normalizer,
      excludes,
      spec,
      externals,
      safe_to_use_optional_caches: false,
    }
  }

  /// Silence the warning about `additional` / `optional` sections.
  pub fn safe_to_use_optional_caches(mut self, safe: bool) -> Self {
    self.safe_to_use_optional_caches = safe;
    self
  }

  /// Partition the assets discovered by one build.
  pub fn partition<S: AsRef<str>>(&self, discovered: &[S]) -> OfflineResult<Partition> {
    let assets: Vec<String> = discovered
      .iter()
      .filter_map(|asset| {
        let asset: &str = asset.as_ref();
        (!self.is_excluded(asset)).then(|| asset.to_string())
      })
      .collect();
    debug!(
      discovered = discovered.len(),
      kept = assets.len(),
      "filtered discovered assets"
    );

    let keys = match self.spec {
      CacheSpec::All => return Ok(self.partition_all(&assets)),
      CacheSpec::Sections(keys) => keys,
    };

    let mut resolution = Resolution::new(assets, self.externals.to_vec());
    for section in Section::ALL {
      resolution.resolve_section(section, keys, self.normalizer)?;
    }

    let Resolution {
      mut sections,
      mut assets,
      mut externals,
      rest_receiver,
      externals_receiver,
      mut claimed_externals,
      mut warnings,
    } = resolution;

    if let Some(section) = rest_receiver {
      let rest = self.normalizer.normalize_all(assets.drain_all());
      sections.get_mut(section).extend(rest);
    }

    if let Some(section) = externals_receiver {
      let rest = self.normalizer.normalize_all(externals.drain_all());
      claimed_externals.extend(rest.iter().cloned());
      sections.get_mut(section).extend(rest);
    }

    sections.dedup();

    if !self.safe_to_use_optional_caches
      && (!sections.additional.is_empty() || !sections.optional.is_empty())
    {
      warnings.push(
        "cache sections `additional` and `optional` are only safe when every asset in them \
         has a build-unique name (a hash or version in it) and stays available at its URL; \
         set `safeToUseOptionalCaches` to `true` to acknowledge this",
      );
    }

    let final_assets = sections.flatten();
    let final_externals = final_assets
      .iter()
      .filter(|asset| claimed_externals.contains(asset.as_str()))
      .cloned()
      .collect();

    Ok(Partition {
      sections,
      assets: final_assets,
      externals: final_externals,
      warnings,
    })
  }

  fn partition_all(&self, assets: &[String]) -> Partition {
    let mut externals = self.normalizer.normalize_all(self.externals);
    let mut sections = CacheSections {
      main: self.normalizer.normalize_all(assets),
      ..CacheSections::default()
    };
    sections.main.extend(externals.iter().cloned());
    sections.dedup();

    let mut seen = HashSet::new();
    externals.retain(|external| seen.insert(external.clone()));

    Partition {
      assets: sections.flatten(),
      sections,
      externals,
      warnings: Warnings::default(),
    }
  }

  fn is_excluded(&self, asset: &str) -> bool {
    self.excludes.iter().any(|pattern| pattern.is_match(asset))
  }
}

/// Mutable state threaded through the section pass.
struct Resolution {
  sections: CacheSections,
  assets: Pool,
  externals: Pool,
  rest_receiver: Option<Section>,
  externals_receiver: Option<Section>,
  claimed_externals: HashSet<String>,
  warnings: Warnings,
}

impl Resolution {
  fn new(assets: Vec<String>, externals: Vec<String>) -> Self {
    Self {
      sections: CacheSections::default(),
      assets: Pool(assets),
      externals: Pool(externals),
      rest_receiver: None,
      externals_receiver: None,
      claimed_externals: HashSet::new(),
      warnings: Warnings::default(),
    }
  }

  fn resolve_section(
    &mut self,
    section: Section,
    keys: &SectionKeys,
    normalizer: &PathNormalizer,
  ) -> OfflineResult<()> {
    for key in keys.get(section) {
      match key {
        CacheKey::Rest => claim_receiver(&mut self.rest_receiver, section, REST_KEYWORD)?,
        CacheKey::Externals => {
          claim_receiver(&mut self.externals_receiver, section, EXTERNALS_KEYWORD)?
        }
        CacheKey::Pattern(pattern) => {
          let matched = self.assets.drain_matching(|asset| pattern.is_match(asset));
          self.push_matches(section, pattern.as_str(), matched, normalizer);
        }
        CacheKey::Regex(regex) => {
          let matched = self.assets.drain_matching(|asset| regex.is_match(asset));
          self.push_matches(section, regex.as_str(), matched, normalizer);
        }
        CacheKey::Literal(path) => {
          if let Some(asset) = self.assets.take(path) {
            self.sections.get_mut(section).extend(normalizer.normalize(&asset));
          } else if let Some(external) = self.externals.take(path) {
            if let Some(normalized) = normalizer.normalize(&external) {
              self.claimed_externals.insert(normalized.clone());
              self.sections.get_mut(section).push(normalized);
            }
          } else {
            self.warnings.push(format!(
              "cache asset {path:?} in `{section}` is not found in the build output; if it \
               is not produced by the build, declare it in `externals` to cache it"
            ));
          }
        }
        CacheKey::Ignored => {}
      }
    }

    Ok(())
  }

  fn push_matches(
    &mut self,
    section: Section,
    pattern: &str,
    matched: Vec<String>,
    normalizer: &PathNormalizer,
  ) {
    if matched.is_empty() {
      self.warnings.push(format!(
        "cache pattern {pattern:?} in `{section}` did not match any assets"
      ));
      return;
    }

    self
      .sections
      .get_mut(section)
      .extend(normalizer.normalize_all(matched));
  }
}

fn claim_receiver(
  receiver: &mut Option<Section>,
  section: Section,
  keyword: &'static str,
) -> OfflineResult<()> {
  if receiver.is_some() {
    return Err(OfflineError::DuplicateReservedKey {
      keyword,
      section: section.name(),
    });
  }
  *receiver = Some(section);
  Ok(())
}

/// Ordered pool of unclaimed paths.
struct Pool(Vec<String>);

impl Pool {
  fn take(&mut self, path: &str) -> Option<String> {
    let index = self.0.iter().position(|candidate| candidate == path)?;
    Some(self.0.remove(index))
  }

  fn drain_matching(&mut self, mut predicate: impl FnMut(&str) -> bool) -> Vec<String> {
    let (matched, remaining) = std::mem::take(&mut self.0)
      .into_iter()
      .partition(|candidate| predicate(candidate));
    self.0 = remaining;
    matched
  }

  fn drain_all(&mut self) -> Vec<String> {
    std::mem::take(&mut self.0)
  }
}
