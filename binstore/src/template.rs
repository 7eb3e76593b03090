//! Reusable inspection-form skeletons stored next to records.

use crate::entry::{Entry, TEMPLATE_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Fields a template is looked up by. At least one must be set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
}

impl TemplateKeys {
    fn fields(&self) -> [&Option<String>; 7] {
        [
            &self.supplier,
            &self.part_no,
            &self.drawing_no,
            &self.material,
            &self.spec,
            &self.category,
            &self.process,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|field| blank(field))
    }

    /// True when every key set in `filter` is present here with the same
    /// value, ignoring surrounding whitespace and case.
    pub fn matches(&self, filter: &TemplateKeys) -> bool {
        self.fields()
            .iter()
            .zip(filter.fields())
            .all(|(mine, wanted)| match wanted.as_deref().map(str::trim) {
                None | Some("") => true,
                Some(wanted) => mine
                    .as_deref()
                    .is_some_and(|mine| mine.trim().eq_ignore_ascii_case(wanted)),
            })
    }
}

fn blank(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|value| value.trim().is_empty())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRow {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub item: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub nominal: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub tol_minus: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub tol_plus: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub appearance_only: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub keys: TemplateKeys,
    #[serde(default)]
    pub rows: Vec<TemplateRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Template {
    /// Reads a template from a stored entry, coercing loosely typed fields.
    pub fn from_entry(entry: &Entry) -> Option<Self> {
        serde_json::from_value(Value::Object(entry.as_map().clone())).ok()
    }

    /// The stored form, tagged with the template discriminator.
    pub fn to_entry(&self) -> Entry {
        let mut entry = match serde_json::to_value(self).ok().and_then(Entry::from_value) {
            Some(entry) => entry,
            None => Entry::default(),
        };
        entry.insert(crate::entry::TYPE_FIELD, TEMPLATE_TYPE);
        entry
    }
}

/// Accepts numbers, numeric strings, and blanks (as `None`).
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape_coercion() {
        let template: Template = serde_json::from_value(json!({
            "supplier": "Acme",
            "partNo": "P-1",
            "rows": [
                {
                    "code": "A1",
                    "item": "Length",
                    "nominal": "10.5",
                    "tolMinus": -0.1,
                    "tolPlus": "0.1",
                },
                {"code": "A2", "item": "Scratches", "nominal": "", "appearanceOnly": "true"},
                {"item": "Width", "nominal": null, "appearanceOnly": 1},
            ],
            "ignored": {"nested": true},
        }))
        .unwrap();

        assert_eq!(template.keys.supplier.as_deref(), Some("Acme"));
        assert_eq!(template.rows.len(), 3);
        assert_eq!(template.rows[0].nominal, Some(10.5));
        assert_eq!(template.rows[0].tol_minus, Some(-0.1));
        assert_eq!(template.rows[0].tol_plus, Some(0.1));
        assert_eq!(template.rows[1].nominal, None);
        assert!(template.rows[1].appearance_only);
        assert!(template.rows[2].appearance_only);
        assert_eq!(template.rows[2].code, "");
    }

    #[test]
    fn test_keys_empty() {
        assert!(TemplateKeys::default().is_empty());
        let blank = TemplateKeys {
            supplier: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.is_empty());
        let set = TemplateKeys {
            process: Some("anodize".into()),
            ..Default::default()
        };
        assert!(!set.is_empty());
    }

    #[test]
    fn test_keys_matching() {
        let keys = TemplateKeys {
            supplier: Some("Acme ".into()),
            part_no: Some("P-1".into()),
            ..Default::default()
        };

        assert!(keys.matches(&TemplateKeys::default()));
        assert!(keys.matches(&TemplateKeys {
            supplier: Some("acme".into()),
            ..Default::default()
        }));
        assert!(keys.matches(&TemplateKeys {
            supplier: Some("ACME".into()),
            part_no: Some(" P-1".into()),
            material: Some("".into()),
            ..Default::default()
        }));
        assert!(!keys.matches(&TemplateKeys {
            material: Some("steel".into()),
            ..Default::default()
        }));
    }

    #[test]
    fn test_entry_round_trip_keeps_discriminator() {
        let template = Template {
            id: Some("TPL-1".into()),
            keys: TemplateKeys {
                supplier: Some("Acme".into()),
                ..Default::default()
            },
            rows: vec![TemplateRow {
                code: "A1".into(),
                item: "Length".into(),
                nominal: Some(10.0),
                ..Default::default()
            }],
            ..Default::default()
        };

        let entry = template.to_entry();
        assert_eq!(entry.get_str("type"), Some("template"));
        assert_eq!(entry.get_str("supplier"), Some("Acme"));
        assert_eq!(entry.get("rows").unwrap()[0]["nominal"], json!(10.0));
        assert_eq!(Template::from_entry(&entry), Some(template));
    }
}
