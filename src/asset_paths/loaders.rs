use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Paths grouped by the loader prefix they were declared with.
pub type LoaderTable = BTreeMap<String, Vec<String>>;

fn loader_prefix_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"^([\w-]+):(.*)$").expect("invalid loader prefix regex"))
}

/// Split `"loader:path"` declarations into plain paths and a per-loader table.
///
/// A prefix immediately followed by `//` is a URL scheme and is left alone, so
/// `https://cdn.example.com/app.js` is kept verbatim while `cdn:app.js` becomes `app.js`
/// registered under `cdn`.
pub fn extract_loaders<I, S>(paths: I) -> (Vec<String>, LoaderTable)
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut cleaned = Vec::new();
  let mut loaders = LoaderTable::new();

  for path in paths {
    let path = path.as_ref();
    let split = loader_prefix_pattern()
      .captures(path)
      .and_then(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
      .filter(|(_, rest)| !rest.starts_with("//"));

    match split {
      Some((loader, rest)) => {
        loaders
          .entry(loader.to_string())
          .or_default()
          .push(rest.to_string());
        cleaned.push(rest.to_string());
      }
      None => cleaned.push(path.to_string()),
    }
  }

  (cleaned, loaders)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_prefix_and_records_loader() {
    let (paths, loaders) = extract_loaders(["cdn:foo.js"]);
    assert_eq!(paths, vec!["foo.js".to_string()]);
    assert_eq!(loaders.get("cdn"), Some(&vec!["foo.js".to_string()]));
  }

  #[test]
  fn leaves_url_schemes_untouched() {
    let (paths, loaders) = extract_loaders(["https://cdn.example.com/app.js", "plain.css"]);
    assert_eq!(paths, vec![
      "https://cdn.example.com/app.js".to_string(),
      "plain.css".to_string()
    ]);
    assert!(loaders.is_empty());
  }

  #[test]
  fn keeps_input_order_within_each_loader() {
    let (paths, loaders) = extract_loaders([
      "img:a.png",
      "font:x.woff2",
      "img:b.png",
      "remote:https://cdn.example.com/c.png",
    ]);

    assert_eq!(paths, vec![
      "a.png".to_string(),
      "x.woff2".to_string(),
      "b.png".to_string(),
      "https://cdn.example.com/c.png".to_string(),
    ]);
    assert_eq!(loaders["img"], vec!["a.png".to_string(), "b.png".to_string()]);
    assert_eq!(loaders["font"], vec!["x.woff2".to_string()]);
    assert_eq!(loaders["remote"], vec!["https://cdn.example.com/c.png".to_string()]);
  }
}
