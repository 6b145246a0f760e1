//! Conversion of raw rule data into the canonical [`RuleSpec`] shape.
//!
//! Two shapes are accepted for a single option's rules:
//!
//! - the structured form, with `requires`, `incompatible_with`, `mandatory`
//!   (or its alias `obligatoire`) and the optional quantified groups;
//! - the legacy flat form, mapping each target id to a tag such as
//!   `"requires"`, `"incompatible"` or `"mandatory"`.
//!
//! Normalization is total. Anything that is not understood is dropped, and a
//! value that is not an object at all becomes an empty rule.

use serde_json::{Map, Value};
use tracing::trace;

use crate::domain::{OptionId, QuantifiedGroup, RuleSpec, Ruleset, Rulesets};

/// Fields whose presence as an array marks a spec as structured.
const STRUCTURED_FIELDS: [&str; 6] = [
    "requires",
    "incompatible_with",
    "mandatory",
    "obligatoire",
    "requires_groups",
    "incompatible_groups",
];

impl From<Value> for RuleSpec {
    fn from(value: Value) -> Self {
        normalize_spec(&value)
    }
}

/// Normalizes the rules of a single option.
#[must_use]
pub fn normalize_spec(value: &Value) -> RuleSpec {
    let Some(object) = value.as_object() else {
        return RuleSpec::default();
    };

    if STRUCTURED_FIELDS
        .iter()
        .any(|field| object.get(*field).is_some_and(Value::is_array))
    {
        structured(object)
    } else {
        legacy(object)
    }
}

/// Normalizes a `{ from: spec }` map into a [`Ruleset`].
///
/// A value that is not an object yields an empty ruleset.
#[must_use]
pub fn normalize_ruleset(value: &Value) -> Ruleset {
    value
        .as_object()
        .map(|rules| {
            rules
                .iter()
                .map(|(from, spec)| (OptionId::from(from.as_str()), normalize_spec(spec)))
                .collect()
        })
        .unwrap_or_default()
}

/// Normalizes every named ruleset of a payload.
///
/// The expected shape is `{ name: { rules: { from: spec } } }`. When the
/// value holds no ruleset at all, a single empty ruleset called
/// `default_name` is created. `active` selects the active ruleset when it
/// names one of them.
#[must_use]
pub fn normalize_rulesets(value: &Value, default_name: &str, active: Option<&str>) -> Rulesets {
    let sets: Vec<(String, Ruleset)> = value
        .as_object()
        .map(|sets| {
            sets.iter()
                .map(|(name, payload)| {
                    let rules = payload.get("rules").unwrap_or(&Value::Null);
                    (name.clone(), normalize_ruleset(rules))
                })
                .collect()
        })
        .unwrap_or_default();

    if sets.is_empty() {
        return Rulesets::new(default_name);
    }
    Rulesets::from_sets(sets, active.unwrap_or(default_name))
}

fn structured(object: &Map<String, Value>) -> RuleSpec {
    let mandatory = match object.get("mandatory") {
        Some(value) if value.is_array() => string_array(value),
        _ => object.get("obligatoire").map(string_array).unwrap_or_default(),
    };

    RuleSpec {
        requires: object.get("requires").map(string_array).unwrap_or_default(),
        incompatible_with: object
            .get("incompatible_with")
            .map(string_array)
            .unwrap_or_default(),
        mandatory,
        requires_groups: object.get("requires_groups").map(groups).unwrap_or_default(),
        incompatible_groups: object
            .get("incompatible_groups")
            .map(groups)
            .unwrap_or_default(),
    }
}

fn legacy(object: &Map<String, Value>) -> RuleSpec {
    let mut spec = RuleSpec::default();
    for (target, tag) in object {
        let Some(tag) = tag.as_str() else {
            continue;
        };
        match LegacyTag::parse(tag) {
            Some(LegacyTag::Requires) => spec.requires.push(target.as_str().into()),
            Some(LegacyTag::Incompatible) => spec.incompatible_with.push(target.as_str().into()),
            Some(LegacyTag::Mandatory) => spec.mandatory.push(target.as_str().into()),
            None => trace!(option = %target, tag, "ignoring unrecognised legacy rule tag"),
        }
    }
    spec
}

/// The relation named by a legacy rule tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyTag {
    Requires,
    Incompatible,
    Mandatory,
}

impl LegacyTag {
    fn parse(tag: &str) -> Option<Self> {
        let tag = tag.to_lowercase();
        if tag.starts_with("req") {
            Some(Self::Requires)
        } else if tag.starts_with("inc") {
            Some(Self::Incompatible)
        } else if tag.starts_with("man") || tag.starts_with("obli") {
            Some(Self::Mandatory)
        } else {
            None
        }
    }
}

fn string_array(value: &Value) -> Vec<OptionId> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(OptionId::from)
                .collect()
        })
        .unwrap_or_default()
}

fn groups(value: &Value) -> Vec<QuantifiedGroup> {
    value
        .as_array()
        .map(|items| items.iter().map(group).collect())
        .unwrap_or_default()
}

fn group(value: &Value) -> QuantifiedGroup {
    QuantifiedGroup {
        min: value.get("min").and_then(threshold),
        of: value.get("of").map(string_array).unwrap_or_default(),
    }
}

/// Reads a numeric threshold. Fractions round up, since "at least 1.5" of a
/// count means "at least 2".
#[allow(clippy::cast_possible_truncation)]
fn threshold(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then(|| number.ceil() as i64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn ids(items: &[&str]) -> Vec<OptionId> {
        items.iter().copied().map(OptionId::from).collect()
    }

    #[test_case("requires" => Some(LegacyTag::Requires); "full requires")]
    #[test_case("REQ" => Some(LegacyTag::Requires); "uppercase prefix")]
    #[test_case("Incompatible" => Some(LegacyTag::Incompatible); "mixed case incompatible")]
    #[test_case("mandatory" => Some(LegacyTag::Mandatory); "mandatory")]
    #[test_case("Obligatoire" => Some(LegacyTag::Mandatory); "obligatoire alias")]
    #[test_case("optional" => None; "unknown tag")]
    fn legacy_tags(tag: &str) -> Option<LegacyTag> {
        LegacyTag::parse(tag)
    }

    #[test]
    fn structured_spec_keeps_all_fields() {
        let spec = normalize_spec(&json!({
            "requires": ["a", 3, "b"],
            "incompatible_with": ["c"],
            "mandatory": ["d"],
            "requires_groups": [{ "min": 1, "of": ["x", "y"] }],
            "incompatible_groups": [{ "of": ["p", "q", "r"] }],
        }));

        assert_eq!(spec.requires, ids(&["a", "b"]));
        assert_eq!(spec.incompatible_with, ids(&["c"]));
        assert_eq!(spec.mandatory, ids(&["d"]));
        assert_eq!(spec.requires_groups, vec![QuantifiedGroup::new(1, ["x", "y"])]);
        assert_eq!(
            spec.incompatible_groups,
            vec![QuantifiedGroup::with_default_min(["p", "q", "r"])]
        );
    }

    #[test]
    fn obligatoire_is_an_alias_for_mandatory() {
        let aliased = normalize_spec(&json!({ "obligatoire": ["x"] }));
        let canonical = normalize_spec(&json!({ "mandatory": ["x"] }));

        assert_eq!(aliased, canonical);
    }

    #[test]
    fn legacy_and_structured_forms_agree() {
        let legacy = normalize_ruleset(&json!({
            "A": { "B": "requires", "C": "incompatible", "D": "obligatoire" },
            "B": { "A": "inc" },
        }));
        let structured = normalize_ruleset(&json!({
            "A": { "requires": ["B"], "incompatible_with": ["C"], "mandatory": ["D"] },
            "B": { "requires": [], "incompatible_with": ["A"], "mandatory": [] },
        }));

        assert_eq!(legacy, structured);
    }

    #[test]
    fn legacy_form_ignores_non_string_tags() {
        let spec = normalize_spec(&json!({ "B": 1, "C": null, "D": "req" }));
        assert_eq!(spec.requires, ids(&["D"]));
        assert!(spec.incompatible_with.is_empty());
    }

    #[test]
    fn malformed_values_degrade_to_empty() {
        assert!(normalize_spec(&json!("requires")).is_empty());
        assert!(normalize_spec(&json!(null)).is_empty());
        assert!(normalize_spec(&json!({ "requires": "a", "mandatory": 3 })).is_empty());
    }

    #[test]
    fn group_only_spec_is_structured() {
        let spec = normalize_spec(&json!({ "requires_groups": [{ "of": ["a", "b"] }] }));
        assert_eq!(spec.requires_groups, vec![QuantifiedGroup::with_default_min(["a", "b"])]);
    }

    #[test_case(json!(2) => Some(2); "integer")]
    #[test_case(json!(1.5) => Some(2); "fraction rounds up")]
    #[test_case(json!(" 3 ") => Some(3); "numeric string")]
    #[test_case(json!("many") => None; "non numeric string")]
    #[test_case(json!(null) => None; "null")]
    #[test_case(json!(true) => None; "boolean")]
    fn thresholds(value: Value) -> Option<i64> {
        threshold(&value)
    }

    #[test]
    fn deserialising_a_rule_spec_normalizes_it() {
        let spec: RuleSpec = serde_json::from_value(json!({ "X": "mandatory" })).unwrap();
        assert_eq!(spec.mandatory, ids(&["X"]));
    }

    #[test]
    fn rulesets_pick_requested_active() {
        let rulesets = normalize_rulesets(
            &json!({
                "default": { "rules": {} },
                "strict": { "rules": { "A": { "requires": ["B"] } } },
            }),
            "default",
            Some("strict"),
        );

        assert_eq!(rulesets.active_name(), "strict");
        assert_eq!(rulesets.active().spec("A").requires, ids(&["B"]));
    }

    #[test]
    fn missing_rulesets_yield_default() {
        let rulesets = normalize_rulesets(&json!(null), "main", None);

        assert_eq!(rulesets.active_name(), "main");
        assert!(rulesets.active().is_empty());
    }
}
