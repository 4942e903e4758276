// ABOUTME: Main library entry point for Gleaner, a rule-driven HTML data extractor.
// ABOUTME: Re-exports the public API: rules, the extraction engine, scopes, results, the fetching Client and config.

//! Gleaner - declarative, rule-driven extraction of structured data from HTML.
//!
//! A [`RuleSet`] maps field names to rules. Text and attribute rules read the
//! first matching node; list rules recurse into every matching node with a
//! nested rule set. [`evaluate`] walks the rules against any [`Scope`] and
//! always returns one value per rule: missing content becomes an empty
//! string or an empty list.
//!
//! # Example
//!
//! ```
//! use gleaner::{extract_html, Rule, RuleSet};
//!
//! let rules = RuleSet::new()
//!     .with("title", Rule::text("h1"))
//!     .with("items", Rule::list("li", RuleSet::new().with("name", Rule::text(".name"))));
//!
//! let result = extract_html(
//!     r#"<h1>Widget</h1><ul><li><span class="name">A</span></li></ul>"#,
//!     &rules,
//! );
//! assert_eq!(result.text("title"), Some("Widget"));
//! assert_eq!(result.list("items").unwrap()[0].text("name"), Some("A"));
//! ```

pub mod client;
pub mod compiled;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod resource;
pub mod result;
pub mod rules;
pub mod scope;

pub use crate::client::Client;
pub use crate::config::ScrapeConfig;
pub use crate::engine::{evaluate, extract_html};
pub use crate::error::{ErrorCode, RuleError, ScrapeError};
pub use crate::options::{ClientBuilder, Options};
pub use crate::result::{ExtractedValue, ExtractionResult};
pub use crate::rules::{Rule, RuleDef, RuleKind, RuleSet, RuleSetDef};
pub use crate::scope::{HtmlScope, Scope};
