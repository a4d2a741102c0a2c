//! Grant Policy Evaluator.
//!
//! Pure evaluation of a [`GrantPolicy`] against the requester's presented
//! attributes and an [`EvaluationContext`]. The condition language is
//! pluggable through [`ConditionEvaluator`]; the evaluator holds no state,
//! so a fixed policy and context always produce the same decision.

use super::model::{GrantPolicy, RequesterAttributes};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of evaluating a grant policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Satisfied,
    Unsatisfied(String),
}

impl PolicyDecision {
    #[inline]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Point-in-time inputs to a policy decision.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub attributes: &'a RequesterAttributes,
    pub now: DateTime<Utc>,
}

/// Source of the current time for condition evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, for replaying decisions.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Pluggable grant-condition language.
pub trait ConditionEvaluator: Send + Sync {
    /// Whether `condition` currently holds.
    fn holds(&self, condition: &str, ctx: &EvaluationContext<'_>) -> bool;
}

/// Built-in condition language.
///
/// | Condition | Holds when |
/// |-----------|------------|
/// | `always` or empty | always |
/// | `none`, `never` | never |
/// | `before:<RFC3339>` | `now` is strictly before the instant |
/// | `after:<RFC3339>` | `now` is at or after the instant |
///
/// Anything else never holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinConditions;

impl ConditionEvaluator for BuiltinConditions {
    fn holds(&self, condition: &str, ctx: &EvaluationContext<'_>) -> bool {
        let condition = condition.trim();
        match condition {
            "" | "always" => return true,
            "none" | "never" => return false,
            _ => {}
        }
        if let Some(instant) = condition.strip_prefix("before:") {
            return parse_instant(instant).is_some_and(|t| ctx.now < t);
        }
        if let Some(instant) = condition.strip_prefix("after:") {
            return parse_instant(instant).is_some_and(|t| ctx.now >= t);
        }
        false
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Parsed form of `GrantPolicy::requester_attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeRequirement<'a> {
    None,
    Present(&'a str),
    Equals(&'a str, &'a str),
}

impl<'a> AttributeRequirement<'a> {
    fn parse(raw: &'a str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::None;
        }
        match raw.split_once('=') {
            Some((name, value)) => Self::Equals(name.trim(), value.trim()),
            None => Self::Present(raw),
        }
    }

    fn check(&self, attributes: &RequesterAttributes) -> Result<(), String> {
        match *self {
            Self::None => Ok(()),
            Self::Present(name) => attributes
                .contains_key(name)
                .then_some(())
                .ok_or_else(|| format!("missing requester attribute '{name}'")),
            Self::Equals(name, expected) => match attributes.get(name) {
                Some(actual) if actual == expected => Ok(()),
                Some(actual) => Err(format!(
                    "requester attribute '{name}' is '{actual}', policy requires '{expected}'"
                )),
                None => Err(format!("missing requester attribute '{name}'")),
            },
        }
    }
}

/// Evaluates grant policies with a pluggable condition language.
#[derive(Clone)]
pub struct GrantPolicyEvaluator {
    conditions: Arc<dyn ConditionEvaluator>,
}

impl Default for GrantPolicyEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinConditions))
    }
}

impl GrantPolicyEvaluator {
    pub fn new(conditions: Arc<dyn ConditionEvaluator>) -> Self {
        Self { conditions }
    }

    /// Decide whether `policy` is satisfiable for the given context.
    pub fn evaluate(&self, policy: &GrantPolicy, ctx: &EvaluationContext<'_>) -> PolicyDecision {
        if let Err(reason) =
            AttributeRequirement::parse(&policy.requester_attribute).check(ctx.attributes)
        {
            return PolicyDecision::Unsatisfied(reason);
        }
        if !self.conditions.holds(&policy.grant_condition, ctx) {
            return PolicyDecision::Unsatisfied(format!(
                "grant condition '{}' does not hold",
                policy.grant_condition
            ));
        }
        PolicyDecision::Satisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn attrs(pairs: &[(&str, &str)]) -> RequesterAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn policy(attribute: &str, condition: &str) -> GrantPolicy {
        GrantPolicy {
            requester_attribute: attribute.into(),
            grant_condition: condition.into(),
            grant_value: "logs".into(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn eval(policy: &GrantPolicy, attributes: &RequesterAttributes) -> PolicyDecision {
        let ctx = EvaluationContext {
            attributes,
            now: noon(),
        };
        GrantPolicyEvaluator::default().evaluate(policy, &ctx)
    }

    #[test]
    fn matching_attribute_and_always() {
        let p = policy("role=admin", "always");
        assert_eq!(eval(&p, &attrs(&[("role", "admin")])), PolicyDecision::Satisfied);
    }

    #[test]
    fn wrong_attribute_value_is_unsatisfied() {
        let p = policy("role=admin", "always");
        let decision = eval(&p, &attrs(&[("role", "guest")]));
        match decision {
            PolicyDecision::Unsatisfied(reason) => assert!(reason.contains("guest")),
            other => panic!("expected unsatisfied, got {other:?}"),
        }
    }

    #[test]
    fn bare_attribute_requires_presence_only() {
        let p = policy("team", "always");
        assert!(eval(&p, &attrs(&[("team", "ops")])).is_satisfied());
        assert!(!eval(&p, &attrs(&[("role", "admin")])).is_satisfied());
    }

    #[test]
    fn empty_attribute_has_no_requirement() {
        assert!(eval(&policy("", "always"), &attrs(&[])).is_satisfied());
    }

    #[test]
    fn none_condition_never_holds() {
        assert!(!eval(&policy("", "none"), &attrs(&[])).is_satisfied());
        assert!(!eval(&policy("", "never"), &attrs(&[])).is_satisfied());
    }

    #[test]
    fn time_window_conditions() {
        let a = attrs(&[]);
        assert!(eval(&policy("", "before:2026-06-01T00:00:00Z"), &a).is_satisfied());
        assert!(!eval(&policy("", "before:2025-06-01T00:00:00Z"), &a).is_satisfied());
        assert!(eval(&policy("", "after:2026-01-01T12:00:00Z"), &a).is_satisfied());
        assert!(!eval(&policy("", "after:2026-01-01T12:00:01Z"), &a).is_satisfied());
    }

    #[test]
    fn unknown_or_malformed_conditions_never_hold() {
        let a = attrs(&[]);
        assert!(!eval(&policy("", "quota<5"), &a).is_satisfied());
        assert!(!eval(&policy("", "before:tomorrow"), &a).is_satisfied());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let p = policy("role=admin", "before:2026-06-01T00:00:00Z");
        let a = attrs(&[("role", "admin")]);
        let first = eval(&p, &a);
        for _ in 0..10 {
            assert_eq!(eval(&p, &a), first);
        }
    }

    #[test]
    fn custom_condition_language_is_pluggable() {
        struct QuotaLeft;
        impl ConditionEvaluator for QuotaLeft {
            fn holds(&self, condition: &str, ctx: &EvaluationContext<'_>) -> bool {
                condition == "quota" && ctx.attributes.get("quota").is_some_and(|q| q != "0")
            }
        }
        let evaluator = GrantPolicyEvaluator::new(Arc::new(QuotaLeft));
        let p = policy("", "quota");
        let a = attrs(&[("quota", "3")]);
        let ctx = EvaluationContext {
            attributes: &a,
            now: noon(),
        };
        assert!(evaluator.evaluate(&p, &ctx).is_satisfied());
    }
}
