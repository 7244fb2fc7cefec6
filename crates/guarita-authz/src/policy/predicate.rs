//! Context predicate evaluation.
//!
//! A grant rule may carry a JSON predicate mapping attribute names to
//! expected values. The predicate is conjunctive: every key must match for
//! the rule to apply. Three keys get dedicated semantics (`time`, `location`,
//! `ip`); every other key falls back to exact equality between the request
//! attribute and the expected value.
//!
//! Evaluation is pure and fails closed: any parse or shape error in either
//! side makes that key a non-match, never an error that aborts the caller's
//! request.

use ipnetwork::IpNetwork;
use regex::Regex;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::config::BusinessHours;
use crate::policy::context::{AttrValue, Context};

/// Evaluates context predicates against request attributes.
#[derive(Debug, Clone)]
pub struct PredicateEvaluator {
    business_hours: BusinessHours,
}

impl PredicateEvaluator {
    /// Create an evaluator with the given business-hours window.
    #[must_use]
    pub fn new(business_hours: BusinessHours) -> Self {
        Self { business_hours }
    }

    /// Check a predicate against a request context.
    ///
    /// An absent or empty predicate always matches. `now` is the evaluation
    /// time, used when the request supplies no `time` attribute.
    #[must_use]
    pub fn matches(
        &self,
        context: &Context,
        predicate: Option<&Map<String, Value>>,
        now: OffsetDateTime,
    ) -> bool {
        let Some(predicate) = predicate else {
            return true;
        };
        if predicate.is_empty() {
            return true;
        }

        predicate
            .iter()
            .all(|(key, expected)| self.key_matches(context, key, expected, now))
    }

    fn key_matches(
        &self,
        context: &Context,
        key: &str,
        expected: &Value,
        now: OffsetDateTime,
    ) -> bool {
        match key {
            "time" => self.time_matches(context, expected, now),
            "location" => location_matches(context, expected),
            "ip" => ip_matches(context, expected),
            _ => exact_matches(context.get(key), expected),
        }
    }

    /// `"business_hours"` checks the weekday/hour window against the
    /// request's `time` attribute, defaulting to the evaluation time when
    /// the attribute is absent. An attribute that is present but not a
    /// valid timestamp is a non-match. Other expected values impose no
    /// time constraint.
    fn time_matches(&self, context: &Context, expected: &Value, now: OffsetDateTime) -> bool {
        match expected.as_str() {
            Some("business_hours") => match context.get("time") {
                None => self.business_hours.contains(now),
                Some(attr) => attr
                    .as_timestamp()
                    .is_some_and(|at| self.business_hours.contains(at)),
            },
            _ => true,
        }
    }
}

/// Location matching with wildcard support: a trailing `*` matches any
/// prefix-sharing location, interior `*`s fall back to a regex. A request
/// without a location attribute never matches a location predicate.
fn location_matches(context: &Context, expected: &Value) -> bool {
    let Some(pattern) = expected.as_str() else {
        return false;
    };
    let Some(location) = context.get("location").and_then(AttrValue::as_str) else {
        return false;
    };

    if !pattern.contains('*') {
        return location == pattern;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') {
            return location.starts_with(prefix);
        }
    }
    match wildcard_regex(pattern) {
        Ok(re) => re.is_match(location),
        Err(_) => false,
    }
}

fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}

/// IP matching: CIDR membership when the expected value contains `/`,
/// exact equality otherwise. Unparseable addresses or networks never match.
fn ip_matches(context: &Context, expected: &Value) -> bool {
    let Some(pattern) = expected.as_str() else {
        return false;
    };
    let Some(ip) = context.get("ip").and_then(AttrValue::as_str) else {
        return false;
    };

    if pattern.contains('/') {
        let (Ok(network), Ok(addr)) = (pattern.parse::<IpNetwork>(), ip.parse()) else {
            return false;
        };
        return network.contains(addr);
    }
    ip == pattern
}

/// Exact equality between a context attribute and an expected JSON value.
/// A missing attribute never matches.
fn exact_matches(attr: Option<&AttrValue>, expected: &Value) -> bool {
    let Some(attr) = attr else {
        return false;
    };
    match (attr, expected) {
        (AttrValue::String(s), Value::String(e)) => s == e,
        (AttrValue::Bool(b), Value::Bool(e)) => b == e,
        (AttrValue::Number(n), Value::Number(e)) => e.as_f64().is_some_and(|f| (f - n).abs() < f64::EPSILON),
        (AttrValue::Timestamp(t), Value::String(e)) => {
            AttrValue::String(e.clone()).as_timestamp() == Some(*t)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn evaluator() -> PredicateEvaluator {
        PredicateEvaluator::new(BusinessHours::default())
    }

    fn predicate(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    fn ctx(pairs: &[(&str, &str)]) -> Context {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), AttrValue::from(*v)))
            .collect()
    }

    const TUESDAY_10: OffsetDateTime = datetime!(2024-01-16 10:00 UTC);
    const SATURDAY_10: OffsetDateTime = datetime!(2024-01-20 10:00 UTC);

    #[test]
    fn empty_predicate_always_matches() {
        let e = evaluator();
        assert!(e.matches(&Context::new(), None, TUESDAY_10));
        assert!(e.matches(&Context::new(), Some(&Map::new()), TUESDAY_10));
    }

    #[test]
    fn business_hours_uses_request_time_when_supplied() {
        let e = evaluator();
        let p = predicate(json!({"time": "business_hours"}));

        let saturday = ctx(&[("time", "2024-01-20T10:00:00Z")]);
        assert!(!e.matches(&saturday, Some(&p), TUESDAY_10));

        let tuesday = ctx(&[("time", "2024-01-16T10:00:00Z")]);
        assert!(e.matches(&tuesday, Some(&p), SATURDAY_10));
    }

    #[test]
    fn malformed_time_attribute_fails_closed() {
        let e = evaluator();
        let p = predicate(json!({"time": "business_hours"}));
        // A supplied but unparseable time never falls back to the
        // evaluation instant.
        let garbage = ctx(&[("time", "not-a-timestamp")]);
        assert!(!e.matches(&garbage, Some(&p), TUESDAY_10));
    }

    #[test]
    fn business_hours_defaults_to_evaluation_time() {
        let e = evaluator();
        let p = predicate(json!({"time": "business_hours"}));
        assert!(e.matches(&Context::new(), Some(&p), TUESDAY_10));
        assert!(!e.matches(&Context::new(), Some(&p), SATURDAY_10));
    }

    #[test]
    fn location_prefix_wildcard() {
        let e = evaluator();
        let p = predicate(json!({"location": "branch-*"}));

        assert!(e.matches(&ctx(&[("location", "branch-sp")]), Some(&p), TUESDAY_10));
        assert!(!e.matches(&ctx(&[("location", "hq")]), Some(&p), TUESDAY_10));
        // Missing location attribute fails closed.
        assert!(!e.matches(&Context::new(), Some(&p), TUESDAY_10));
    }

    #[test]
    fn location_interior_wildcard_uses_regex() {
        let e = evaluator();
        let p = predicate(json!({"location": "branch-*-floor2"}));
        assert!(e.matches(
            &ctx(&[("location", "branch-sp-floor2")]),
            Some(&p),
            TUESDAY_10
        ));
        assert!(!e.matches(
            &ctx(&[("location", "branch-sp-floor3")]),
            Some(&p),
            TUESDAY_10
        ));
    }

    #[test]
    fn ip_exact_and_cidr() {
        let e = evaluator();

        let exact = predicate(json!({"ip": "10.0.0.1"}));
        assert!(e.matches(&ctx(&[("ip", "10.0.0.1")]), Some(&exact), TUESDAY_10));
        assert!(!e.matches(&ctx(&[("ip", "10.0.0.2")]), Some(&exact), TUESDAY_10));

        let cidr = predicate(json!({"ip": "10.0.0.0/24"}));
        assert!(e.matches(&ctx(&[("ip", "10.0.0.99")]), Some(&cidr), TUESDAY_10));
        assert!(!e.matches(&ctx(&[("ip", "10.1.0.1")]), Some(&cidr), TUESDAY_10));
    }

    #[test]
    fn bad_ip_patterns_fail_closed() {
        let e = evaluator();
        let p = predicate(json!({"ip": "not-a-network/99"}));
        assert!(!e.matches(&ctx(&[("ip", "10.0.0.1")]), Some(&p), TUESDAY_10));
    }

    #[test]
    fn unknown_keys_require_exact_equality() {
        let e = evaluator();
        let p = predicate(json!({"department": "finance"}));

        assert!(e.matches(&ctx(&[("department", "finance")]), Some(&p), TUESDAY_10));
        assert!(!e.matches(&ctx(&[("department", "hr")]), Some(&p), TUESDAY_10));
        assert!(!e.matches(&Context::new(), Some(&p), TUESDAY_10));
    }

    #[test]
    fn predicate_is_conjunctive() {
        let e = evaluator();
        let p = predicate(json!({"department": "finance", "location": "branch-*"}));

        let both = ctx(&[("department", "finance"), ("location", "branch-sp")]);
        assert!(e.matches(&both, Some(&p), TUESDAY_10));

        let one = ctx(&[("department", "finance"), ("location", "hq")]);
        assert!(!e.matches(&one, Some(&p), TUESDAY_10));
    }

    #[test]
    fn boolean_and_numeric_attributes_compare_exactly() {
        let e = evaluator();
        let mut context = Context::new();
        context.insert("sensitive".into(), AttrValue::Bool(true));
        context.insert("level".into(), AttrValue::Number(3.0));

        assert!(e.matches(
            &context,
            Some(&predicate(json!({"sensitive": true, "level": 3.0}))),
            TUESDAY_10
        ));
        assert!(!e.matches(
            &context,
            Some(&predicate(json!({"sensitive": false}))),
            TUESDAY_10
        ));
    }
}
