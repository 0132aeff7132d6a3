use crate::{accessor, interpolate, operator, Condition, MatchMode, Rule};
use serde_json::Value;
use suitemon_common::types::SourceType;

/// Returns the first rule in catalog order that applies to the event.
///
/// A rule applies when it is enabled, targets the event's source, is in
/// tenant scope, satisfies its match mode over all conditions, and no
/// exception condition holds. Evaluation stops at the first match: an event
/// produces at most one alert per run.
///
/// A rule scoped to specific tenants is skipped when the caller supplies no
/// tenant id.
pub fn evaluate<'a>(
    event: &Value,
    source: SourceType,
    rules: &'a [Rule],
    tenant_id: Option<&str>,
) -> Option<&'a Rule> {
    rules.iter().find(|rule| {
        rule.enabled
            && rule.source == source
            && in_tenant_scope(rule, tenant_id)
            && matches_conditions(event, rule)
            && !matches_exception(event, rule)
    })
}

fn in_tenant_scope(rule: &Rule, tenant_id: Option<&str>) -> bool {
    if rule.tenant_ids.is_empty() {
        return true;
    }
    match tenant_id {
        Some(id) => rule.tenant_ids.iter().any(|t| t == id),
        None => false,
    }
}

fn matches_conditions(event: &Value, rule: &Rule) -> bool {
    let conditions = &rule.conditions.rules;
    if conditions.is_empty() {
        return false;
    }
    match rule.conditions.mode {
        MatchMode::All => conditions.iter().all(|c| condition_holds(event, c)),
        MatchMode::Any => conditions.iter().any(|c| condition_holds(event, c)),
    }
}

fn matches_exception(event: &Value, rule: &Rule) -> bool {
    rule.exceptions.iter().any(|c| condition_holds(event, c))
}

fn condition_holds(event: &Value, condition: &Condition) -> bool {
    let actual = accessor::lookup(event, &condition.field);
    let expected = condition
        .value
        .as_deref()
        .map(|v| interpolate::interpolate(v, event))
        .unwrap_or_default();
    operator::apply(condition.operator, actual, &expected)
}
