use regex::Regex;

/// Prefix used by assets emitted for the injected runtime bootstrap entry.
pub const BOOTSTRAP_ENTRY_PREFIX: &str = "__offline_";

fn absolute_url_pattern() -> &'static Regex {
  use std::sync::OnceLock;

  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*://[^/]").expect("invalid absolute URL regex")
  })
}

/// Determine whether an asset identifier is already a fully qualified URL.
///
/// Absolute URLs carry both a scheme and a host and are served as-is by every cache tool,
/// independent of the configured base path or relative mode.
pub fn is_absolute_url(value: &str) -> bool {
  absolute_url_pattern().is_match(value)
}

/// Determine whether an asset was produced by the injected bootstrap entry.
///
/// Those assets only exist to install the offline runtime and are never cached themselves.
pub fn is_bootstrap_asset(value: &str) -> bool {
  value
    .trim_start_matches("./")
    .trim_start_matches('/')
    .starts_with(BOOTSTRAP_ENTRY_PREFIX)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_http_urls() {
    assert!(is_absolute_url("https://example.com/app.js"));
    assert!(is_absolute_url("HTTP://example.com"));
  }

  #[test]
  fn detects_other_schemes_with_hosts() {
    assert!(is_absolute_url("ftp://files.example.com/pkg.zip"));
  }

  #[test]
  fn rejects_paths_and_hostless_schemes() {
    assert!(!is_absolute_url("/static/app.js"));
    assert!(!is_absolute_url("app.js"));
    assert!(!is_absolute_url("file:///tmp/app.js"));
    assert!(!is_absolute_url("data:image/png;base64,abc"));
  }

  #[test]
  fn recognises_bootstrap_assets() {
    assert!(is_bootstrap_asset("__offline_runtime.js"));
    assert!(is_bootstrap_asset("./__offline_sw.js"));
    assert!(!is_bootstrap_asset("app/__offline_runtime.js"));
    assert!(!is_bootstrap_asset("main.js"));
  }
}
