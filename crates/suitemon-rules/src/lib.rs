//! Declarative detection rules and their evaluation pipeline.
//!
//! Rules are TOML documents discovered from a catalog directory by the
//! [`loader::RuleCatalog`]. Each rule names an upstream source, a set of
//! conditions over dotted paths of the event tree, optional exceptions that
//! veto a match, and an optional tenant scope. The [`evaluator`] returns the
//! first rule in catalog order that matches an event.

pub mod accessor;
pub mod evaluator;
pub mod interpolate;
pub mod loader;
pub mod operator;


use serde::Deserialize;
use suitemon_common::types::{Severity, SourceType};

/// A single detection rule as authored in the catalog.
///
/// The `id` is not part of the document; the loader derives it from the
/// document's catalog-relative path.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub enabled: bool,
    pub source: SourceType,
    pub conditions: ConditionSet,
    /// Any matching exception skips the rule for that event.
    #[serde(default)]
    pub exceptions: Vec<Condition>,
    /// When non-empty, the rule is active only for these tenants.
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// External-framework tags (e.g. ATT&CK technique ids). Informational only.
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionSet {
    #[serde(rename = "match")]
    pub mode: MatchMode,
    pub rules: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    All,
    Any,
}

/// One `{field, operator, value}` triple against a dotted path of an event.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Exists,
    Equals,
    NotEquals,
    Contains,
}
