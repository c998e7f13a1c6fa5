//! Request classification: which retrieval strategy serves a request.

use serde::Deserialize;

use crate::http::{InterceptedRequest, RequestMode};

/// Strategy label assigned to every intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Pages: network first, cache as offline fallback
  Html,
  /// Frequently regenerated data: stale-while-revalidate
  DynamicData,
  /// Everything else (images, css, js): cache first
  Static,
}

/// Path predicates that mark a request as dynamic data.
///
/// A path is dynamic when it ends in one of `suffixes`, or when it both
/// contains `segment` and ends in `segment_suffix`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DynamicDataRule {
  pub suffixes: Vec<String>,
  pub segment: String,
  pub segment_suffix: String,
}

impl Default for DynamicDataRule {
  fn default() -> Self {
    Self {
      suffixes: vec![".csv".to_string(), ".ics".to_string()],
      segment: "/data/".to_string(),
      segment_suffix: ".json".to_string(),
    }
  }
}

impl DynamicDataRule {
  pub fn matches(&self, path: &str) -> bool {
    if self.suffixes.iter().any(|s| path.ends_with(s.as_str())) {
      return true;
    }

    path.contains(self.segment.as_str()) && path.ends_with(self.segment_suffix.as_str())
  }
}

/// Pick the strategy for a request. Pure and total.
pub fn classify(request: &InterceptedRequest, rule: &DynamicDataRule) -> Strategy {
  if request.mode == RequestMode::Navigate || request.accept().contains("text/html") {
    return Strategy::Html;
  }

  if rule.matches(request.url.path()) {
    return Strategy::DynamicData;
  }

  Strategy::Static
}
