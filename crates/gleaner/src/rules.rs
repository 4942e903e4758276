// ABOUTME: Rule language data model: the typed Rule/RuleSet used by the engine and the JSON definitions they are built from.
// ABOUTME: Validation turns a RuleSetDef into a RuleSet, failing fast with RuleError on structural mistakes.

//! Extraction rules.
//!
//! Rules arrive in two shapes:
//!
//! - [`RuleSetDef`] / [`RuleDef`]: the loosely typed JSON form,
//!   `{ field: { kind, selector, attributeName?, childRules? } }`. The key
//!   names of the older config format (`type`, `attribute`, `itemRules`) are
//!   accepted as aliases.
//! - [`RuleSet`] / [`Rule`]: the validated form the engine runs. Each rule
//!   kind carries exactly the fields it needs, so a list rule without child
//!   rules cannot exist past validation.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::compiled::get_or_compile;
use crate::error::RuleError;

/// One extraction rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Trimmed text of the first node matching `selector`.
    Text { selector: String },
    /// Value of `attribute` on the first node matching `selector`.
    ///
    /// A selector that matches nothing and a matched node without the
    /// attribute both yield an empty string.
    Attribute { selector: String, attribute: String },
    /// One nested result per node matching `selector`, each produced by
    /// evaluating `rules` inside that node's subtree.
    List { selector: String, rules: RuleSet },
}

impl Rule {
    pub fn text(selector: impl Into<String>) -> Self {
        Rule::Text {
            selector: selector.into(),
        }
    }

    pub fn attribute(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Rule::Attribute {
            selector: selector.into(),
            attribute: attribute.into(),
        }
    }

    pub fn list(selector: impl Into<String>, rules: RuleSet) -> Self {
        Rule::List {
            selector: selector.into(),
            rules,
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Rule::Text { selector }
            | Rule::Attribute { selector, .. }
            | Rule::List { selector, .. } => selector,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Text { .. } => RuleKind::Text,
            Rule::Attribute { .. } => RuleKind::Attribute,
            Rule::List { .. } => RuleKind::List,
        }
    }
}

/// The closed set of rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Text,
    Attribute,
    List,
}

impl RuleKind {
    /// Parses a kind name as written in rule definitions.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(RuleKind::Text),
            "attribute" | "attr" => Some(RuleKind::Attribute),
            "list" => Some(RuleKind::List),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleKind::Text => "text",
            RuleKind::Attribute => "attribute",
            RuleKind::List => "list",
        };
        write!(f, "{}", s)
    }
}

/// An ordered mapping from field name to rule. Field names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    fields: Vec<(String, Rule)>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, replacing (in place) any rule already bound to `field`.
    pub fn insert(&mut self, field: impl Into<String>, rule: Rule) -> Option<Rule> {
        let field = field.into();
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == field) {
            return Some(std::mem::replace(&mut slot.1, rule));
        }
        self.fields.push((field, rule));
        None
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.insert(field, rule);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Rule> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, rule)| rule)
    }

    /// Iterates rules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Nesting depth: 1 for a flat rule set, +1 per level of list rules.
    pub fn depth(&self) -> usize {
        1 + self
            .fields
            .iter()
            .filter_map(|(_, rule)| match rule {
                Rule::List { rules, .. } => Some(rules.depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Every selector in this rule set and its nested rule sets.
    pub fn selectors(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a str>) {
        for (_, rule) in &self.fields {
            out.push(rule.selector());
            if let Rule::List { rules, .. } = rule {
                rules.collect_selectors(out);
            }
        }
    }

    /// Parses and validates a JSON rule set definition.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let def: RuleSetDef = serde_json::from_str(json)?;
        RuleSet::try_from(def)
    }
}

impl TryFrom<RuleSetDef> for RuleSet {
    type Error = RuleError;

    fn try_from(def: RuleSetDef) -> Result<Self, Self::Error> {
        Self::try_from(&def)
    }
}

impl TryFrom<&RuleSetDef> for RuleSet {
    type Error = RuleError;

    /// Validates every rule; each selector is compiled, and cached, along the way.
    fn try_from(def: &RuleSetDef) -> Result<Self, Self::Error> {
        compile_rule_set(def, "")
    }
}

/// A single rule as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDef {
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub selector: String,
    #[serde(default, rename = "attributeName", alias = "attribute")]
    pub attribute_name: Option<String>,
    #[serde(default, rename = "childRules", alias = "itemRules")]
    pub child_rules: Option<RuleSetDef>,
}

/// A rule set as written in configuration, in document order.
///
/// Duplicate keys are kept here and rejected during validation.
#[derive(Debug, Clone, Default)]
pub struct RuleSetDef {
    pub fields: Vec<(String, RuleDef)>,
}

impl<'de> Deserialize<'de> for RuleSetDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RuleSetDefVisitor;

        impl<'de> Visitor<'de> for RuleSetDefVisitor {
            type Value = RuleSetDef;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to rule definitions")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, rule)) = map.next_entry::<String, RuleDef>()? {
                    fields.push((name, rule));
                }
                Ok(RuleSetDef { fields })
            }
        }

        deserializer.deserialize_map(RuleSetDefVisitor)
    }
}

fn field_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn compile_rule_set(def: &RuleSetDef, parent: &str) -> Result<RuleSet, RuleError> {
    let mut rules = RuleSet::new();
    for (name, rule_def) in &def.fields {
        let path = field_path(parent, name);
        if rules.get(name).is_some() {
            return Err(RuleError::DuplicateField { field: path });
        }
        let rule = compile_rule(rule_def, &path)?;
        rules.fields.push((name.clone(), rule));
    }
    Ok(rules)
}

fn compile_rule(def: &RuleDef, path: &str) -> Result<Rule, RuleError> {
    let kind_name = def.kind.as_deref().ok_or_else(|| RuleError::MissingKind {
        field: path.to_string(),
    })?;
    let kind = RuleKind::parse(kind_name).ok_or_else(|| RuleError::UnknownKind {
        field: path.to_string(),
        kind: kind_name.to_string(),
    })?;

    let selector = def.selector.trim();
    if selector.is_empty() {
        return Err(RuleError::EmptySelector {
            field: path.to_string(),
        });
    }
    if get_or_compile(selector).is_none() {
        return Err(RuleError::InvalidSelector {
            field: path.to_string(),
            selector: selector.to_string(),
        });
    }

    match kind {
        RuleKind::Text => Ok(Rule::text(selector)),
        RuleKind::Attribute => {
            let attribute = def
                .attribute_name
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| RuleError::MissingAttributeName {
                    field: path.to_string(),
                })?;
            Ok(Rule::attribute(selector, attribute))
        }
        RuleKind::List => {
            let child_def = def
                .child_rules
                .as_ref()
                .ok_or_else(|| RuleError::MissingChildRules {
                    field: path.to_string(),
                })?;
            let child_rules = compile_rule_set(child_def, path)?;
            Ok(Rule::list(selector, child_rules))
        }
    }
}
