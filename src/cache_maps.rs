//! Validation and serialisation of runtime request routing rules.
//!
//! Rules are written in configuration as
//! `{ "match": <regex | {"function": src}>, "to": <string | {"function": src} | null>,
//! "requestTypes": [..] }` and are handed to the service worker as source snippets. Their
//! order is preserved because the runtime picks the first matching rule.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OfflineError, OfflineResult};

/// Kind of request a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
  /// Top level navigations.
  Navigate,
  /// Sub-resource requests to the same origin.
  SameOrigin,
  /// Sub-resource requests to other origins.
  CrossOrigin,
}

impl RequestType {
  fn parse(value: &str) -> Option<Self> {
    match value {
      "navigate" => Some(Self::Navigate),
      "same-origin" => Some(Self::SameOrigin),
      "cross-origin" => Some(Self::CrossOrigin),
      _ => None,
    }
  }
}

/// Rule ready to be embedded into runtime code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedCacheMap {
  /// Regex literal or function source.
  #[serde(rename = "match")]
  pub match_source: String,
  /// Function source or JSON literal.
  pub to: String,
  /// Request kinds the rule is limited to; `None` applies it to every request.
  pub request_types: Option<Vec<RequestType>>,
}

/// Validate and serialise rules, preserving their order.
pub fn serialize_cache_maps(rules: &[Value]) -> OfflineResult<Vec<SerializedCacheMap>> {
  rules
    .iter()
    .enumerate()
    .map(|(index, rule)| serialize_rule(index, rule))
    .collect()
}

fn serialize_rule(index: usize, rule: &Value) -> OfflineResult<SerializedCacheMap> {
  let invalid = |reason: &str| OfflineError::InvalidCacheMapRule {
    index,
    reason: reason.to_string(),
  };

  let rule = rule
    .as_object()
    .ok_or_else(|| invalid("rule must be an object"))?;

  let match_source = match rule.get("match") {
    Some(Value::String(source)) => {
      Regex::new(source).map_err(|err| invalid(&format!("`match` is not a valid regex: {err}")))?;
      regex_literal(source)
    }
    Some(Value::Object(map)) => {
      function_source(map).ok_or_else(|| invalid("`match` must be a regex or a function"))?
    }
    _ => return Err(invalid("`match` must be a regex or a function")),
  };

  let to = match rule.get("to") {
    None | Some(Value::Null) => "null".to_string(),
    Some(value @ Value::String(_)) => value.to_string(),
    Some(Value::Object(map)) => {
      function_source(map).ok_or_else(|| invalid("`to` must be a string, a function or null"))?
    }
    Some(_) => return Err(invalid("`to` must be a string, a function or null")),
  };

  let request_types = match rule.get("requestTypes") {
    None | Some(Value::Null) => None,
    Some(Value::Array(values)) => Some(
      values
        .iter()
        .map(|value| value.as_str().and_then(RequestType::parse))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
          invalid("`requestTypes` may only contain navigate, same-origin and cross-origin")
        })?,
    ),
    Some(_) => return Err(invalid("`requestTypes` must be an array")),
  };

  Ok(SerializedCacheMap {
    match_source,
    to,
    request_types,
  })
}

fn function_source(map: &Map<String, Value>) -> Option<String> {
  match map.get("function") {
    Some(Value::String(source)) if !source.trim().is_empty() => Some(source.trim().to_string()),
    _ => None,
  }
}

fn regex_literal(source: &str) -> String {
  let mut literal = String::from("/");
  let mut chars = source.chars();
  while let Some(ch) = chars.next() {
    match ch {
      '\\' => {
        literal.push(ch);
        if let Some(next) = chars.next() {
          literal.push(next);
        }
      }
      '/' => literal.push_str("\\/"),
      _ => literal.push(ch),
    }
  }
  literal.push('/');
  literal
}
