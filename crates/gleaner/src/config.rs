// ABOUTME: Scrape job configuration loaded from JSON: a target URL plus the rule set to apply.
// ABOUTME: Rules are validated while loading so a bad config fails before any network access.

//! Job configuration.
//!
//! ```json
//! {
//!   "url": "https://example.com",
//!   "rules": {
//!     "title": { "kind": "text", "selector": "h1" },
//!     "items": {
//!       "kind": "list",
//!       "selector": ".item-list li",
//!       "childRules": { "name": { "kind": "text", "selector": ".item-name" } }
//!     }
//!   }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{RuleError, ScrapeError};
use crate::rules::{RuleSet, RuleSetDef};

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    url: Option<String>,
    rules: RuleSetDef,
}

/// A validated scrape job.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Target URL. Optional so one rule file can be reused across URLs.
    pub url: Option<String>,
    pub rules: RuleSet,
}

impl ScrapeConfig {
    /// Reads and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|e| ScrapeError::io(&location, "Load", e))?;
        raw.parse::<ScrapeConfig>()
            .map_err(|e| ScrapeError::config(location, "Load", e))
    }
}

impl FromStr for ScrapeConfig {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawConfig = serde_json::from_str(s)?;
        let rules = RuleSet::try_from(raw.rules)?;
        let url = raw
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        Ok(Self { url, rules })
    }
}
