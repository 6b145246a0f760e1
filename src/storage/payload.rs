//! The schema payload: the JSON document a schema is stored and exchanged as.
//!
//! A payload carries the catalog (`groupedSubgroups`, `groupedCriteria`,
//! `optionLabels`, `criteria`), the named rulesets (`ruleSets` and
//! `activeRuleset`) and the product ranges (`gammes`). Rule data is normalized
//! on the way in; everything else the rule engine does not need is carried
//! through untouched.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, trace};

use crate::domain::{Catalog, Group, OptionId, Rulesets, Session, normalize_rulesets};

/// Name of the single group created when a payload has no hierarchy.
pub const IMPORTED_GROUP: &str = "Imported options";

/// Top-level keys recognised in JavaScript-module exports.
const MODULE_KEYS: [&str; 8] = [
    "gammes",
    "groupedCriteria",
    "groupedSubgroups",
    "optionLabels",
    "criteria",
    "ruleSets",
    "activeRuleset",
    "currentRulesetName",
];

/// Failure to read a payload from text.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The text looked like JSON but did not parse.
    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),

    /// The export pattern could not be compiled.
    #[error("invalid export pattern")]
    Pattern(#[from] regex::Error),
}

/// A hydrated schema: everything needed to start a configuration session.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Option groups and labels.
    pub catalog: Catalog,
    /// Named rulesets, one of them active.
    pub rulesets: Rulesets,
    /// Product ranges, carried through unchanged.
    pub ranges: Value,
}

impl Schema {
    /// Builds a schema from a payload.
    ///
    /// Never fails: missing or malformed sections degrade to empty ones.
    /// `default_ruleset` names the single empty ruleset created when the
    /// payload has none.
    #[must_use]
    #[instrument(level = "debug", skip(payload))]
    pub fn hydrate(payload: &Value, default_ruleset: &str) -> Self {
        let ranges = payload
            .get("gammes")
            .filter(|ranges| ranges.is_object())
            .cloned()
            .unwrap_or_else(|| json!({ "Smart": {}, "Mod": {}, "Evo": {} }));

        let groups = hierarchy(payload, &ranges);
        let labels = labels(payload);
        let catalog = Catalog::new(groups, labels);

        let mut rulesets = normalize_rulesets(
            payload.get("ruleSets").unwrap_or(&Value::Null),
            default_ruleset,
            None,
        );
        if let Some(active) = choose_active(payload, &rulesets) {
            rulesets.set_active(&active);
        }
        debug!(active = rulesets.active_name(), "hydrated schema");

        Self {
            catalog,
            rulesets,
            ranges,
        }
    }

    /// Renders the schema as a payload.
    ///
    /// Rules are written in the canonical shape. Every option gets a label,
    /// falling back to its id.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut grouped_subgroups = Map::new();
        let mut grouped_criteria = Map::new();
        for (name, group) in self.catalog.groups() {
            let mut entry = Map::new();
            if !group.root.is_empty() {
                entry.insert("__root".to_string(), json!(group.distinct_root()));
            }
            entry.insert("subgroups".to_string(), json!(group.distinct_subgroups()));
            grouped_subgroups.insert(name.clone(), Value::Object(entry));
            grouped_criteria.insert(name.clone(), json!(group.ids()));
        }

        let options = self.catalog.options();
        let labels: Map<String, Value> = options
            .iter()
            .map(|id| (id.to_string(), json!(self.catalog.label(id))))
            .collect();

        let rule_sets: Map<String, Value> = self
            .rulesets
            .iter()
            .map(|(name, ruleset)| (name.to_string(), json!({ "rules": ruleset })))
            .collect();

        json!({
            "gammes": self.ranges,
            "groupedCriteria": grouped_criteria,
            "groupedSubgroups": grouped_subgroups,
            "optionLabels": labels,
            "criteria": options,
            "ruleSets": rule_sets,
            "activeRuleset": self.rulesets.active_name(),
        })
    }

    /// Starts a configuration session on this schema.
    #[must_use]
    pub fn into_session(self) -> Session {
        Session::new(self.catalog, self.rulesets)
    }
}

fn hierarchy(payload: &Value, ranges: &Value) -> BTreeMap<String, Group> {
    if let Some(grouped) = non_empty_object(payload.get("groupedSubgroups")) {
        return grouped
            .iter()
            .map(|(name, value)| {
                let subgroups = value
                    .get("subgroups")
                    .and_then(Value::as_object)
                    .map(|subgroups| {
                        subgroups
                            .iter()
                            .map(|(name, ids)| (name.clone(), id_list(Some(ids))))
                            .collect()
                    })
                    .unwrap_or_default();
                let group = Group {
                    root: id_list(value.get("__root")),
                    subgroups,
                };
                (name.clone(), group)
            })
            .collect();
    }

    if let Some(grouped) = non_empty_object(payload.get("groupedCriteria")) {
        return grouped
            .iter()
            .map(|(name, ids)| (name.clone(), Group::flat(id_list(Some(ids)))))
            .collect();
    }

    let mut seen = BTreeSet::new();
    let ids: Vec<OptionId> = ranges
        .as_object()
        .into_iter()
        .flat_map(Map::values)
        .filter_map(Value::as_object)
        .flat_map(Map::keys)
        .filter(|id| seen.insert(id.as_str()))
        .map(|id| OptionId::from(id.as_str()))
        .collect();
    trace!(count = ids.len(), "no hierarchy, grouping range options");
    BTreeMap::from([(IMPORTED_GROUP.to_string(), Group::flat(ids))])
}

fn labels(payload: &Value) -> BTreeMap<OptionId, String> {
    non_empty_object(payload.get("optionLabels"))
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(id, label)| {
                    label
                        .as_str()
                        .map(|label| (OptionId::from(id.as_str()), label.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The requested ruleset if it exists, else the one with the most edges.
fn choose_active(payload: &Value, rulesets: &Rulesets) -> Option<String> {
    let wanted = ["activeRuleset", "currentRulesetName", "rulesetName"]
        .into_iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_str))
        .find(|name| !name.is_empty());
    if let Some(wanted) = wanted.filter(|name| rulesets.get(name).is_some()) {
        return Some(wanted.to_string());
    }

    let mut best: Option<(&str, usize)> = None;
    for (name, ruleset) in rulesets.iter() {
        let edges = ruleset.edge_count();
        if best.is_none_or(|(_, most)| edges > most) {
            best = Some((name, edges));
        }
    }
    best.map(|(name, _)| name.to_string())
}

fn non_empty_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value
        .and_then(Value::as_object)
        .filter(|object| !object.is_empty())
}

fn id_list(value: Option<&Value>) -> Vec<OptionId> {
    value
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(OptionId::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Parses payload text.
///
/// Accepts a JSON document, or a JavaScript module of the form
/// `export const <key> = <json>;` for the known payload keys. In the module
/// form, unknown keys and values that do not parse are skipped.
///
/// # Errors
///
/// Returns an error if the text looks like JSON but does not parse.
pub fn parse_payload_text(text: &str) -> Result<Value, PayloadError> {
    let text = text.trim();
    if text.starts_with('{') || text.starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }

    let pattern = Regex::new(r"export\s+const\s+(\w+)\s*=\s*([\s\S]*?);\s*(?:\n|$)")?;
    let mut payload = Map::new();
    for captures in pattern.captures_iter(text) {
        let (_, [key, value]) = captures.extract();
        if !MODULE_KEYS.contains(&key) || payload.contains_key(key) {
            continue;
        }
        match serde_json::from_str(value) {
            Ok(value) => {
                payload.insert(key.to_string(), value);
            }
            Err(error) => debug!(key, %error, "skipping unparseable export"),
        }
    }
    Ok(Value::Object(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OptionStatus, RuleSpec};

    fn payload() -> Value {
        json!({
            "groupedSubgroups": {
                "Body": {
                    "__root": ["paint"],
                    "subgroups": { "Roof": ["sunroof", "rack"] },
                },
            },
            "optionLabels": { "paint": "Metallic paint" },
            "ruleSets": {
                "small": { "rules": { "rack": { "requires": ["paint"] } } },
                "large": { "rules": {
                    "rack": { "incompatible_with": ["sunroof"], "requires": ["paint"] },
                    "sunroof": { "paint": "mandatory" },
                } },
            },
            "gammes": { "Smart": { "paint": { "included": true } } },
        })
    }

    #[test]
    fn hierarchy_comes_from_grouped_subgroups() {
        let schema = Schema::hydrate(&payload(), "default");

        let group = &schema.catalog.groups()["Body"];
        assert_eq!(group.root, vec![OptionId::from("paint")]);
        assert_eq!(schema.catalog.known_ids().len(), 3);
        assert_eq!(schema.catalog.label("paint"), "Metallic paint");
        assert_eq!(schema.catalog.label("rack"), "rack");
    }

    #[test]
    fn grouped_criteria_is_used_as_fallback() {
        let schema = Schema::hydrate(
            &json!({ "groupedCriteria": { "Engine": ["diesel", "petrol", "diesel"] } }),
            "default",
        );

        let options: Vec<&str> = schema
            .catalog
            .options()
            .into_iter()
            .map(OptionId::as_str)
            .collect();
        assert_eq!(options, ["diesel", "petrol"]);
    }

    #[test]
    fn range_options_are_imported_without_hierarchy() {
        let schema = Schema::hydrate(
            &json!({ "gammes": { "Smart": { "a": {} }, "Evo": { "b": {}, "a": {} } } }),
            "default",
        );

        assert_eq!(schema.catalog.groups().len(), 1);
        assert_eq!(
            schema.catalog.groups()[IMPORTED_GROUP].ids().len(),
            2
        );
    }

    #[test]
    fn ruleset_with_most_edges_is_active_by_default() {
        let schema = Schema::hydrate(&payload(), "default");
        assert_eq!(schema.rulesets.active_name(), "large");
    }

    #[test]
    fn requested_ruleset_wins_when_it_exists() {
        let mut raw = payload();
        raw["activeRuleset"] = json!("small");
        assert_eq!(Schema::hydrate(&raw, "default").rulesets.active_name(), "small");

        raw["activeRuleset"] = json!("missing");
        assert_eq!(Schema::hydrate(&raw, "default").rulesets.active_name(), "large");
    }

    #[test]
    fn empty_payload_gets_default_ruleset() {
        let schema = Schema::hydrate(&json!({}), "base");

        assert_eq!(schema.rulesets.active_name(), "base");
        assert!(schema.rulesets.active().is_empty());
    }

    #[test]
    fn legacy_rules_are_normalized() {
        let schema = Schema::hydrate(&payload(), "default");

        let expected = RuleSpec {
            mandatory: vec![OptionId::from("paint")],
            ..RuleSpec::default()
        };
        assert_eq!(schema.rulesets.active().spec("sunroof"), &expected);
    }

    #[test]
    fn payload_survives_a_round_trip() {
        let schema = Schema::hydrate(&payload(), "default");

        let again = Schema::hydrate(&schema.to_payload(), "default");

        assert_eq!(again.rulesets, schema.rulesets);
        assert_eq!(again.catalog.groups(), schema.catalog.groups());
        assert_eq!(again.ranges, schema.ranges);
        assert_eq!(again.catalog.label("paint"), "Metallic paint");
    }

    #[test]
    fn session_starts_on_active_ruleset() {
        let mut session = Schema::hydrate(&payload(), "default").into_session();

        session.toggle("sunroof");

        assert_eq!(session.status("paint").status, OptionStatus::Selected);
        assert_eq!(session.status("rack").status, OptionStatus::Incompatible);
    }

    #[test]
    fn parses_plain_json() {
        let value = parse_payload_text("  { \"criteria\": [\"a\"] }\n").unwrap();
        assert_eq!(value, json!({ "criteria": ["a"] }));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_payload_text("{ not json"),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn parses_module_exports() {
        let text = r#"
export const gammes = {"Smart": {}};
export const ruleSets = {"default": {"rules": {"a": {"requires": ["b"]}}}};
export const activeRuleset = "default";
export const ignored = {"x": 1};
export const optionLabels = {broken;
"#;

        let value = parse_payload_text(text).unwrap();

        assert_eq!(
            value,
            json!({
                "gammes": { "Smart": {} },
                "ruleSets": { "default": { "rules": { "a": { "requires": ["b"] } } } },
                "activeRuleset": "default",
            })
        );
    }
}
