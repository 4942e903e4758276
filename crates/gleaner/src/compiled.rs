// ABOUTME: Process-wide cache of compiled CSS selectors shared by rule validation and document scopes.
// ABOUTME: Compiles each selector string once; invalid selectors are cached as misses.

//! Selector caching for repeated DOM queries.
//!
//! A rule set is usually evaluated many times (once per `List` item, once per
//! fetched page), so every selector it names is compiled once and reused.
//! Validation goes through [`get_or_compile`] too, so a validated rule set
//! leaves all of its selectors in the cache.

use std::collections::HashMap;
use std::sync::RwLock;

use dom_query::Matcher;
use once_cell::sync::Lazy;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Matcher>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` if the selector does not parse. Safe to call from
/// multiple threads: hits take the shared lock, misses the exclusive one.
pub fn get_or_compile(css: &str) -> Option<Matcher> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Matcher::new(css).ok();
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    // Another thread may have inserted while we compiled.
    if let Some(cached) = cache.get(css) {
        return cached.clone();
    }
    cache.insert(css.to_string(), compiled.clone());
    compiled
}
