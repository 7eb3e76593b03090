//! Flattens whatever a document currently holds into its ordered entry list.
//!
//! Stored shapes drifted over time: bare arrays, `{record: ...}` and
//! `{records: [...]}` wrappers, a lone entry object, and arrays nesting any of
//! those. Every value is first classified into a [`Shape`]; supporting another
//! legacy layout means adding a variant and a match arm.

use crate::entry::{Entry, ID_FIELD, TIMESTAMP_FIELD, TYPE_FIELD};
use serde_json::{Map, Value};

/// Same bound as the JSON parser's recursion limit. Branches nested deeper
/// than this normalize to nothing.
const MAX_DEPTH: usize = 128;

const WRAPPER_KEYS: [&str; 2] = ["record", "records"];

enum Shape<'a> {
    Sequence(&'a [Value]),
    Wrapped(&'a Value),
    Single(&'a Map<String, Value>),
    Unknown,
}

impl<'a> Shape<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Shape::Sequence(items),
            Value::Object(fields) => {
                if let Some(inner) = WRAPPER_KEYS.iter().find_map(|key| fields.get(*key)) {
                    Shape::Wrapped(inner)
                } else if looks_like_entry(fields) {
                    Shape::Single(fields)
                } else {
                    Shape::Unknown
                }
            }
            _ => Shape::Unknown,
        }
    }
}

fn looks_like_entry(fields: &Map<String, Value>) -> bool {
    let has_id = fields
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    has_id && (fields.contains_key(TIMESTAMP_FIELD) || fields.contains_key(TYPE_FIELD))
}

/// Returns the entries held by `value`, in document order. Never fails:
/// anything unrecognized contributes no entries.
pub fn normalize(value: &Value) -> Vec<Entry> {
    let mut out = Vec::new();
    collect(value, 0, &mut out);
    out
}

fn collect(value: &Value, depth: usize, out: &mut Vec<Entry>) {
    if depth > MAX_DEPTH {
        return;
    }

    match Shape::classify(value) {
        Shape::Sequence(items) => {
            for item in items {
                collect(item, depth + 1, out);
            }
        }
        Shape::Wrapped(inner) => collect(inner, depth + 1, out),
        Shape::Single(fields) => out.push(Entry::new(fields.clone())),
        Shape::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().filter_map(Entry::id).collect()
    }

    #[test]
    fn test_bare_array() {
        let value = json!([
            {"id": "a", "timestamp": "t1"},
            {"id": "b", "type": "template"},
        ]);
        assert_eq!(ids(&normalize(&value)), ["a", "b"]);
    }

    #[test]
    fn test_wrappers() {
        let value = json!({"records": [{"id": "a", "timestamp": "t"}]});
        assert_eq!(ids(&normalize(&value)), ["a"]);

        // Store GET envelope around the legacy `{records: [...]}` layout.
        let value = json!({
            "record": {"records": [{"id": "a", "timestamp": "t"}, {"id": "b", "timestamp": "t"}]},
            "metadata": {"id": "bin-1", "private": true}
        });
        assert_eq!(ids(&normalize(&value)), ["a", "b"]);
    }

    #[test]
    fn test_single_entry() {
        let value = json!({"id": "solo", "timestamp": "t", "supplier": "Acme"});
        let entries = normalize(&value);
        assert_eq!(ids(&entries), ["solo"]);
        assert_eq!(entries[0].get_str("supplier"), Some("Acme"));
    }

    #[test]
    fn test_mixed_nesting_keeps_order() {
        let value = json!([
            {"id": "a", "timestamp": "t"},
            [{"id": "b", "timestamp": "t"}, [{"id": "c", "type": "template"}]],
            {"records": [{"id": "d", "timestamp": "t"}]},
            {"record": {"id": "e", "timestamp": "t"}},
            "junk",
            42,
            null,
            {"id": "no-shape"},
            {"timestamp": "no-id"},
        ]);
        assert_eq!(ids(&normalize(&value)), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_total_on_degenerate_input() {
        for value in [
            json!(null),
            json!({}),
            json!([]),
            json!(""),
            json!(true),
            json!({"record": null}),
            json!({"records": {"records": {"records": 7}}}),
            json!({"id": "", "timestamp": "t"}),
            json!([[[[[]]]]]),
        ] {
            assert!(normalize(&value).is_empty(), "expected empty for {value}");
        }
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut value = json!({"id": "deep", "timestamp": "t"});
        for _ in 0..1_000 {
            value = Value::Array(vec![value]);
        }
        assert!(normalize(&value).is_empty());

        let mut shallow = json!({"id": "shallow", "timestamp": "t"});
        for _ in 0..10 {
            shallow = json!({"records": [shallow]});
        }
        assert_eq!(ids(&normalize(&shallow)), ["shallow"]);
    }
}
