// ABOUTME: The extraction engine: recursively evaluates a RuleSet against a Scope into an ExtractionResult.
// ABOUTME: Total over document content; missing nodes and attributes become empty strings or empty lists.

//! Rule evaluation.
//!
//! [`evaluate`] visits each rule once. Text and attribute rules read the
//! first match; list rules recurse into a sub-scope per match and keep the
//! items in document order. Nothing here fails: a rule set that reached this
//! point has already been validated, and document irregularities are
//! absorbed into empty values.

use dom_query::Document;
use tracing::{debug, trace};

use crate::result::{ExtractedValue, ExtractionResult};
use crate::rules::{Rule, RuleSet};
use crate::scope::{HtmlScope, Scope};

/// Evaluates every rule of `rules` against `scope`.
///
/// The result has exactly one entry per rule, in rule order.
pub fn evaluate<S: Scope>(scope: &S, rules: &RuleSet) -> ExtractionResult {
    let mut result = ExtractionResult::with_capacity(rules.len());
    for (field, rule) in rules.iter() {
        let value = evaluate_rule(scope, rule);
        trace!(field, kind = %rule.kind(), empty = value.is_empty(), "evaluated rule");
        result.push(field, value);
    }
    result
}

fn evaluate_rule<S: Scope>(scope: &S, rule: &Rule) -> ExtractedValue {
    match rule {
        Rule::Text { selector } => {
            let text = scope
                .select_first(selector)
                .map(|node| scope.text(&node))
                .unwrap_or_default();
            ExtractedValue::Text(text)
        }
        Rule::Attribute {
            selector,
            attribute,
        } => {
            let value = scope
                .select_first(selector)
                .and_then(|node| scope.attr(&node, attribute))
                .unwrap_or_default();
            ExtractedValue::Text(value)
        }
        Rule::List { selector, rules } => {
            let items = scope
                .select(selector)
                .iter()
                .map(|node| evaluate(&scope.subscope(node), rules))
                .collect();
            ExtractedValue::List(items)
        }
    }
}

/// Parses `html` and evaluates `rules` against the whole document.
///
/// An empty string is a valid (empty) document.
pub fn extract_html(html: &str, rules: &RuleSet) -> ExtractionResult {
    let doc = Document::from(html);
    let result = evaluate(&HtmlScope::new(&doc), rules);
    debug!(
        bytes = html.len(),
        fields = result.len(),
        filled = result.filled_count(),
        "extracted document"
    );
    result
}
