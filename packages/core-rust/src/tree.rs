//! Helpers for JSON-shaped configuration trees.
//!
//! Section names in a configuration tree are matched case-insensitively,
//! and an override subtree is merged onto a default subtree field by field.

use serde_json::{Map, Value};

/// Separator used by flat configuration keys (`Tenants:9446:Environments`).
pub const KEY_SEPARATOR: char = ':';

/// Finds the child of an object by case-insensitive key.
///
/// Exact matches are preferred over case-insensitive ones.
#[must_use]
pub fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    let object = node.as_object()?;
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Looks up a string leaf by case-insensitive key.
#[must_use]
pub fn string_child(node: &Value, key: &str) -> Option<String> {
    match child(node, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Merges `overlay` onto `base`.
///
/// - objects merge recursively; keys match case-insensitively and the
///   spelling already present in `base` is kept;
/// - any other overlay value replaces the base value (arrays included);
/// - `null` in the overlay means "not specified" and leaves the base alone.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                merge_entry(base_map, key, value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn merge_entry(base: &mut Map<String, Value>, key: &str, value: &Value) {
    let existing = if base.contains_key(key) {
        Some(key.to_string())
    } else {
        base.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()
    };

    match existing.and_then(|k| base.get_mut(&k)) {
        Some(slot) => merge(slot, value),
        None if value.is_null() => {}
        None => {
            base.insert(key.to_string(), value.clone());
        }
    }
}

/// Builds a tree from flat `a:b:c = value` pairs.
///
/// Leaves are strings. Path segments match existing nodes
/// case-insensitively. A pair whose path runs through an existing string
/// leaf replaces that leaf with an object.
pub fn from_pairs<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        let segments: Vec<&str> = key
            .as_ref()
            .split(KEY_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        insert_path(&mut root, &segments, Value::String(value.into()));
    }
    root
}

/// Inserts `value` at `path`, creating intermediate objects as needed.
pub fn insert_path(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        node = object_child_mut(node, segment);
    }

    let map = ensure_object(node);
    let key = map
        .keys()
        .find(|k| k.eq_ignore_ascii_case(last))
        .cloned()
        .unwrap_or_else(|| (*last).to_string());
    map.insert(key, value);
}

fn object_child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let map = ensure_object(node);
    let key = map
        .keys()
        .find(|k| k.eq_ignore_ascii_case(segment))
        .cloned()
        .unwrap_or_else(|| segment.to_string());
    let slot = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn child_lookup_ignores_case() {
        let tree = json!({ "Tenants": { "9446": {} } });
        assert!(child(&tree, "tenants").is_some());
        assert!(child(&tree, "TENANTS").is_some());
        assert!(child(&tree, "missing").is_none());
    }

    #[test]
    fn override_wins_and_defaults_fill_the_rest() {
        let mut base = json!({ "Info": { "SomeProperty": true, "Name": "default" } });
        merge(&mut base, &json!({ "info": { "someproperty": false } }));
        assert_eq!(base, json!({ "Info": { "SomeProperty": false, "Name": "default" } }));
    }

    #[test]
    fn null_overlay_keeps_default() {
        let mut base = json!({ "Name": "default" });
        merge(&mut base, &json!({ "Name": null, "Extra": null }));
        assert_eq!(base, json!({ "Name": "default" }));
    }

    #[test]
    fn arrays_are_replaced_whole() {
        let mut base = json!({ "Hosts": ["a", "b", "c"] });
        merge(&mut base, &json!({ "Hosts": ["z"] }));
        assert_eq!(base, json!({ "Hosts": ["z"] }));
    }

    #[test]
    fn from_pairs_builds_nested_tree() {
        let tree = from_pairs([
            ("tenants:9446:environments:xyz:defaults:tenantcode", "9446"),
            ("Tenants:9446:Environments:xyz:Gemeenten:0599:info:someproperty", "true"),
        ]);
        let env = &tree["tenants"]["9446"]["environments"]["xyz"];
        assert_eq!(env["defaults"]["tenantcode"], "9446");
        assert_eq!(env["Gemeenten"]["0599"]["info"]["someproperty"], "true");
    }

    #[test]
    fn from_pairs_later_value_wins() {
        let tree = from_pairs([("a:b", "1"), ("A:B", "2")]);
        assert_eq!(tree, json!({ "a": { "b": "2" } }));
    }

    fn flat_object() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-d]", any::<i32>(), 0..4)
            .prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
    }

    proptest! {
        #[test]
        fn merged_value_comes_from_override_when_present(
            defaults in flat_object(),
            overrides in flat_object(),
        ) {
            let mut merged = Value::Object(defaults.clone());
            merge(&mut merged, &Value::Object(overrides.clone()));

            for (key, value) in &overrides {
                prop_assert_eq!(&merged[key], value);
            }
            for (key, value) in &defaults {
                if !overrides.contains_key(key) {
                    prop_assert_eq!(&merged[key], value);
                }
            }
        }
    }
}
