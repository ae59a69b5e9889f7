use regex::Regex;

use crate::error::{OfflineError, OfflineResult};

/// Compiled glob pattern matched against whole asset paths.
#[derive(Debug, Clone)]
pub struct GlobPattern {
  source: String,
  regex: Regex,
}

impl GlobPattern {
  /// Compile a minimatch-style glob.
  ///
  /// Supports `*`, `**`, `?`, character classes (`[abc]`, `[!abc]`), brace alternation
  /// (`{js,css}`) and the `@(..)`, `?(..)`, `+(..)` and `*(..)` extglob groups. Negated
  /// extglobs (`!(..)`) cannot be expressed without look-around and are rejected.
  pub fn new(pattern: &str) -> OfflineResult<Self> {
    let invalid = |reason: String| OfflineError::InvalidPattern {
      pattern: pattern.to_string(),
      reason,
    };

    let chars: Vec<char> = pattern.chars().collect();
    let body = translate(&chars).map_err(invalid)?;
    let regex = Regex::new(&format!("^{body}$")).map_err(|err| invalid(err.to_string()))?;

    Ok(Self {
      source: pattern.to_string(),
      regex,
    })
  }

  /// Returns `true` when the full path matches the pattern.
  pub fn is_match(&self, path: &str) -> bool {
    self.regex.is_match(path)
  }

  /// Pattern as written in configuration.
  pub fn as_str(&self) -> &str {
    &self.source
  }
}

/// Determine whether a cache key should be treated as a glob instead of a literal path.
pub fn is_glob(value: &str) -> bool {
  let mut chars = value.chars().peekable();
  while let Some(ch) = chars.next() {
    match ch {
      '\\' => {
        chars.next();
      }
      '*' | '?' | '[' | '{' => return true,
      '@' | '!' | '+' if chars.peek() == Some(&'(') => return true,
      _ => {}
    }
  }
  false
}

fn translate(chars: &[char]) -> Result<String, String> {
  let mut regex = String::new();
  let mut index = 0;

  while index < chars.len() {
    let ch = chars[index];
    let next = chars.get(index + 1).copied();

    match ch {
      '\\' => {
        let escaped = next.ok_or_else(|| "trailing escape character".to_string())?;
        push_literal(&mut regex, escaped);
        index += 2;
      }
      '*' | '?' | '+' | '@' | '!' if next == Some('(') => {
        let close = find_closing(chars, index + 1, '(', ')')
          .ok_or_else(|| format!("unclosed extglob group at offset {index}"))?;
        let alternatives = split_top_level(&chars[index + 2..close], '|')
          .into_iter()
          .map(translate)
          .collect::<Result<Vec<_>, _>>()?;
        let group = format!("(?:{})", alternatives.join("|"));
        match ch {
          '*' => regex.push_str(&format!("{group}*")),
          '?' => regex.push_str(&format!("{group}?")),
          '+' => regex.push_str(&format!("{group}+")),
          '@' => regex.push_str(&group),
          _ => return Err("negated extglob groups are not supported".into()),
        }
        index = close + 1;
      }
      '*' if next == Some('*') => {
        if chars.get(index + 2) == Some(&'/') {
          regex.push_str("(?:[^/]*/)*");
          index += 3;
        } else {
          regex.push_str(".*");
          index += 2;
        }
      }
      '*' => {
        regex.push_str("[^/]*");
        index += 1;
      }
      '?' => {
        regex.push_str("[^/]");
        index += 1;
      }
      '[' => match find_class_end(chars, index) {
        Some(close) => {
          regex.push_str(&translate_class(&chars[index + 1..close]));
          index = close + 1;
        }
        None => {
          push_literal(&mut regex, ch);
          index += 1;
        }
      },
      '{' => match find_closing(chars, index, '{', '}') {
        Some(close) => {
          let inner = &chars[index + 1..close];
          let alternatives = split_top_level(inner, ',');
          if alternatives.len() < 2 {
            push_literal(&mut regex, ch);
            index += 1;
            continue;
          }
          let translated = alternatives
            .into_iter()
            .map(translate)
            .collect::<Result<Vec<_>, _>>()?;
          regex.push_str(&format!("(?:{})", translated.join("|")));
          index = close + 1;
        }
        None => {
          push_literal(&mut regex, ch);
          index += 1;
        }
      },
      _ => {
        push_literal(&mut regex, ch);
        index += 1;
      }
    }
  }

  Ok(regex)
}

fn push_literal(regex: &mut String, ch: char) {
  regex.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
}

fn translate_class(inner: &[char]) -> String {
  let mut class = String::from("[");
  let mut rest = inner;
  if let Some(&first) = rest.first() {
    if first == '!' || first == '^' {
      class.push('^');
      rest = &rest[1..];
    }
  }
  for &ch in rest {
    if matches!(ch, '\\' | '[' | ']' | '&' | '~') {
      class.push('\\');
    }
    class.push(ch);
  }
  class.push(']');
  class
}

fn find_class_end(chars: &[char], open: usize) -> Option<usize> {
  let mut index = open + 1;
  if matches!(chars.get(index), Some('!') | Some('^')) {
    index += 1;
  }
  // A leading `]` is part of the class.
  if chars.get(index) == Some(&']') {
    index += 1;
  }
  while index < chars.len() {
    if chars[index] == ']' {
      return Some(index);
    }
    index += 1;
  }
  None
}

fn find_closing(chars: &[char], open: usize, opening: char, closing: char) -> Option<usize> {
  let mut depth = 0usize;
  let mut index = open;
  while index < chars.len() {
    match chars[index] {
      '\\' => index += 1,
      ch if ch == opening => depth += 1,
      ch if ch == closing => {
        depth -= 1;
        if depth == 0 {
          return Some(index);
        }
      }
      _ => {}
    }
    index += 1;
  }
  None
}

fn split_top_level(chars: &[char], separator: char) -> Vec<&[char]> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;
  let mut index = 0;
  while index < chars.len() {
    match chars[index] {
      '\\' => index += 1,
      '(' | '{' | '[' => depth += 1,
      ')' | '}' | ']' => depth = depth.saturating_sub(1),
      ch if ch == separator && depth == 0 => {
        parts.push(&chars[start..index]);
        start = index + 1;
      }
      _ => {}
    }
    index += 1;
  }
  parts.push(&chars[start.min(chars.len())..]);
  parts
}

#[cfg(test)]
mod tests {
  use super::*;

  fn glob(pattern: &str) -> GlobPattern {
    GlobPattern::new(pattern).expect("pattern should compile")
  }

  #[test]
  fn single_star_stays_within_a_segment() {
    let pattern = glob("*.css");
    assert!(pattern.is_match("a.css"));
    assert!(!pattern.is_match("styles/a.css"));
    assert!(!pattern.is_match("a.css.map"));
  }

  #[test]
  fn globstar_matches_zero_or_more_segments() {
    let pattern = glob("**/*.map");
    assert!(pattern.is_match("app.js.map"));
    assert!(pattern.is_match("js/vendor/app.js.map"));
    assert!(!pattern.is_match("app.js"));

    let dotfiles = glob("**/.*");
    assert!(dotfiles.is_match(".htaccess"));
    assert!(dotfiles.is_match("nested/.DS_Store"));
    assert!(!dotfiles.is_match("nested/file.txt"));
  }

  #[test]
  fn supports_classes_braces_and_question_marks() {
    assert!(glob("img/*.{png,jpg}").is_match("img/logo.jpg"));
    assert!(!glob("img/*.{png,jpg}").is_match("img/logo.gif"));
    assert!(glob("chunk-[0-9].js").is_match("chunk-7.js"));
    assert!(!glob("chunk-[!0-9].js").is_match("chunk-7.js"));
    assert!(glob("a?.js").is_match("ab.js"));
    assert!(!glob("a?.js").is_match("a/.js"));
  }

  #[test]
  fn supports_extglob_groups() {
    let pattern = glob("@(main|vendor).js");
    assert!(pattern.is_match("main.js"));
    assert!(pattern.is_match("vendor.js"));
    assert!(!pattern.is_match("other.js"));

    assert!(glob("app+(.min).js").is_match("app.min.min.js"));
    assert!(glob("app?(.min).js").is_match("app.js"));
  }

  #[test]
  fn escapes_regex_metacharacters_in_literals() {
    let pattern = glob("*.(min).js");
    assert!(!pattern.is_match("aXminXjs"));
    assert!(glob("file+name.*").is_match("file+name.txt"));
  }

  #[test]
  fn rejects_negated_extglobs() {
    let err = GlobPattern::new("!(vendor).js").unwrap_err();
    assert!(matches!(err, OfflineError::InvalidPattern { .. }));
  }

  #[test]
  fn classifies_globs_and_literals() {
    assert!(is_glob("*.css"));
    assert!(is_glob("img/**"));
    assert!(is_glob("file.{js,css}"));
    assert!(is_glob("@(a|b).js"));
    assert!(!is_glob("app.js"));
    assert!(!is_glob("https://cdn.example.com/lib.js"));
    assert!(!is_glob("weird\\*.js"));
  }
}
