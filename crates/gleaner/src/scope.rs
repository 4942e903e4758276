// ABOUTME: Document scope adapter: the Scope capability trait and its dom_query-backed HtmlScope.
// ABOUTME: Supports selecting descendants, reading trimmed text and attributes, and narrowing to a node's subtree.

//! Queryable views over a parsed document.
//!
//! The engine only ever talks to a [`Scope`]. [`HtmlScope`] is the real
//! implementation; anything else that can answer the four queries (a test
//! double, another parser) can be plugged in instead.

use dom_query::{Document, Matcher, Selection};
use tracing::warn;

use crate::compiled::get_or_compile;

/// A read-only, queryable view over a document or one of its subtrees.
pub trait Scope: Sized {
    /// A handle to one matched node.
    type Node;

    /// All descendants of the scope root matching `selector`, in document order.
    ///
    /// A selector that does not compile matches nothing.
    fn select(&self, selector: &str) -> Vec<Self::Node>;

    /// The first match of `selector`, if any.
    fn select_first(&self, selector: &str) -> Option<Self::Node> {
        self.select(selector).into_iter().next()
    }

    /// The node's text content with surrounding whitespace trimmed.
    fn text(&self, node: &Self::Node) -> String;

    /// The value of attribute `name` on the node.
    fn attr(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// A new scope rooted at `node`. Queries on it only see the node's descendants.
    fn subscope(&self, node: &Self::Node) -> Self;
}

enum Root<'a> {
    Document(&'a Document),
    Node(Selection<'a>),
}

/// A [`Scope`] over a `dom_query` document.
pub struct HtmlScope<'a> {
    root: Root<'a>,
}

impl<'a> HtmlScope<'a> {
    /// A scope covering the whole document.
    pub fn new(doc: &'a Document) -> Self {
        Self {
            root: Root::Document(doc),
        }
    }

    /// A scope covering the descendants of the nodes in `selection`.
    pub fn from_selection(selection: Selection<'a>) -> Self {
        Self {
            root: Root::Node(selection),
        }
    }
}

fn compiled(selector: &str) -> Option<Matcher> {
    let matcher = get_or_compile(selector);
    if matcher.is_none() {
        warn!(selector, "selector does not compile, treating as no match");
    }
    matcher
}

impl<'a> Scope for HtmlScope<'a> {
    type Node = Selection<'a>;

    fn select(&self, selector: &str) -> Vec<Selection<'a>> {
        let Some(matcher) = compiled(selector) else {
            return Vec::new();
        };
        let matches = match self.root {
            Root::Document(doc) => doc.select_matcher(&matcher),
            Root::Node(ref sel) => sel.select_matcher(&matcher),
        };
        matches.iter().collect()
    }

    // Stops at the first match instead of collecting them all.
    fn select_first(&self, selector: &str) -> Option<Selection<'a>> {
        let matcher = compiled(selector)?;
        let first = match self.root {
            Root::Document(doc) => doc.select_single_matcher(&matcher),
            Root::Node(ref sel) => sel.select_single_matcher(&matcher),
        };
        first.exists().then_some(first)
    }

    fn text(&self, node: &Selection<'a>) -> String {
        node.text().trim().to_string()
    }

    fn attr(&self, node: &Selection<'a>, name: &str) -> Option<String> {
        node.attr(name).map(|v| v.to_string())
    }

    fn subscope(&self, node: &Selection<'a>) -> Self {
        HtmlScope::from_selection(node.clone())
    }
}
