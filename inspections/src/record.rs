//! Server-side stamping of new inspection records.

use binstore::entry::{Entry, RECORD_ID_PREFIX, TYPE_FIELD};
use serde::Serialize;
use serde_json::Value;

const INSPECTOR_FIELD: &str = "inspector";
const OVERALL_FIELD: &str = "overall";
const UNKNOWN_INSPECTOR: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Not enough filled in to decide.
    Undecided,
}

impl Verdict {
    fn from_flag(ok: bool) -> Self {
        if ok { Verdict::Pass } else { Verdict::Fail }
    }
}

/// What the client is told about a freshly stamped record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stamp {
    pub id: String,
    pub timestamp: String,
    pub overall: &'static str,
}

/// Fills in id, timestamp and inspector when missing and records the overall
/// verdict on the entry. A client-supplied `type` is dropped so the entry is
/// always stored as a record.
pub fn stamp(entry: &mut Entry, user: Option<&str>) -> Stamp {
    entry.remove(TYPE_FIELD);
    let id = entry.ensure_id(RECORD_ID_PREFIX);
    let timestamp = entry.ensure_timestamp();

    let has_inspector = entry
        .get_str(INSPECTOR_FIELD)
        .is_some_and(|name| !name.trim().is_empty());
    if !has_inspector {
        entry.insert(INSPECTOR_FIELD, user.unwrap_or(UNKNOWN_INSPECTOR));
    }

    let overall = overall(entry);
    entry.insert(OVERALL_FIELD, overall);

    Stamp {
        id,
        timestamp,
        overall,
    }
}

/// `"PASS"`, `"FAIL"`, or `""` when the record does not say enough.
pub fn overall(entry: &Entry) -> &'static str {
    let appearance = appearance_verdict(entry.get("appearance"));
    let measurements = measurement_verdict(entry.get("measurements"));

    match (appearance, measurements) {
        (Verdict::Fail, _) | (_, Verdict::Fail) => "FAIL",
        (Verdict::Pass, _) | (Verdict::Undecided, Verdict::Pass) => "PASS",
        (Verdict::Undecided, Verdict::Undecided) => "",
    }
}

/// Every check must report a result starting with `OK`.
pub fn appearance_verdict(checks: Option<&Value>) -> Verdict {
    match non_empty_list(checks) {
        None => Verdict::Undecided,
        Some(checks) => Verdict::from_flag(checks.iter().all(|check| {
            check
                .get("result")
                .and_then(Value::as_str)
                .is_some_and(|result| result.to_ascii_uppercase().starts_with("OK"))
        })),
    }
}

/// Fails when any measured value of a fully specified row lies outside
/// `[nominal + tolMinus, nominal + tolPlus]`. Rows missing a bound or without
/// numeric measurements are not judged.
pub fn measurement_verdict(rows: Option<&Value>) -> Verdict {
    let Some(rows) = non_empty_list(rows) else {
        return Verdict::Undecided;
    };

    let out_of_tolerance = rows.iter().any(|row| {
        let field = |key: &str| row.get(key).and_then(number);
        let (Some(nominal), Some(minus), Some(plus)) =
            (field("nominal"), field("tolMinus"), field("tolPlus"))
        else {
            return false;
        };
        let (low, high) = (nominal + minus, nominal + plus);

        row.get("measured")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(number)
            .any(|value| value < low || value > high)
    });

    Verdict::from_flag(!out_of_tolerance)
}

fn non_empty_list(value: Option<&Value>) -> Option<&Vec<Value>> {
    value.and_then(Value::as_array).filter(|list| !list.is_empty())
}

/// Finite numbers and numeric strings; blanks are not numbers.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: Value) -> Entry {
        Entry::from_value(value).unwrap()
    }

    #[test]
    fn test_appearance() {
        assert_eq!(appearance_verdict(None), Verdict::Undecided);
        assert_eq!(appearance_verdict(Some(&json!([]))), Verdict::Undecided);
        let checks = json!([{"item": "a", "result": "ok"}, {"result": "OK - minor"}]);
        assert_eq!(appearance_verdict(Some(&checks)), Verdict::Pass);
        assert_eq!(
            appearance_verdict(Some(&json!([{"result": "OK"}, {"result": "NG"}]))),
            Verdict::Fail
        );
        assert_eq!(appearance_verdict(Some(&json!([{"item": "a"}]))), Verdict::Fail);
    }

    #[test]
    fn test_measurements() {
        let row = |measured: Value| {
            json!([{
                "item": "len",
                "nominal": 10,
                "tolMinus": "-0.1",
                "tolPlus": 0.1,
                "measured": measured,
            }])
        };

        assert_eq!(measurement_verdict(None), Verdict::Undecided);
        assert_eq!(measurement_verdict(Some(&row(json!([9.95, "10.05"])))), Verdict::Pass);
        assert_eq!(measurement_verdict(Some(&row(json!([10.0, 10.2])))), Verdict::Fail);
        assert_eq!(measurement_verdict(Some(&row(json!(["", null])))), Verdict::Pass);

        let unbounded = json!([{"nominal": 10, "tolPlus": 0.1, "measured": [50]}]);
        assert_eq!(measurement_verdict(Some(&unbounded)), Verdict::Pass);
    }

    #[test]
    fn test_overall() {
        let ok = json!([{"result": "OK"}]);
        let ng = json!([{"result": "NG"}]);
        let in_tol = json!([{"nominal": 1, "tolMinus": 0, "tolPlus": 1, "measured": [1.5]}]);
        let out_tol = json!([{"nominal": 1, "tolMinus": 0, "tolPlus": 1, "measured": [3]}]);

        assert_eq!(overall(&entry(json!({}))), "");
        assert_eq!(overall(&entry(json!({"appearance": ok}))), "PASS");
        assert_eq!(overall(&entry(json!({"measurements": in_tol}))), "PASS");
        assert_eq!(overall(&entry(json!({"appearance": ok, "measurements": in_tol}))), "PASS");
        assert_eq!(overall(&entry(json!({"appearance": ng, "measurements": in_tol}))), "FAIL");
        assert_eq!(overall(&entry(json!({"appearance": ok, "measurements": out_tol}))), "FAIL");
    }

    #[test]
    fn test_stamp() {
        let mut record = entry(json!({"supplier": "Acme", "appearance": [{"result": "OK"}]}));
        let stamp = stamp(&mut record, Some("bob"));

        assert!(stamp.id.starts_with("QCI-"));
        assert_eq!(record.id(), Some(stamp.id.as_str()));
        assert_eq!(record.get_str("timestamp"), Some(stamp.timestamp.as_str()));
        assert_eq!(record.get_str("inspector"), Some("bob"));
        assert_eq!(record.get_str("overall"), Some("PASS"));
        assert_eq!(stamp.overall, "PASS");
    }

    #[test]
    fn test_stamp_keeps_client_values() {
        let mut record = entry(json!({
            "id": "QCI-1",
            "timestamp": "2024-05-01T00:00:00.000Z",
            "inspector": "carol",
        }));
        let stamp = stamp(&mut record, None);

        assert_eq!(stamp.id, "QCI-1");
        assert_eq!(stamp.timestamp, "2024-05-01T00:00:00.000Z");
        assert_eq!(record.get_str("inspector"), Some("carol"));
        assert_eq!(stamp.overall, "");

        let mut anonymous = entry(json!({}));
        super::stamp(&mut anonymous, None);
        assert_eq!(anonymous.get_str("inspector"), Some("unknown"));
    }

    #[test]
    fn test_stamp_drops_client_type() {
        let mut record = entry(json!({"type": "template", "supplier": "Acme"}));
        stamp(&mut record, Some("bob"));

        assert_eq!(record.get("type"), None);
        assert_eq!(record.kind(), binstore::EntryKind::Record);
    }
}
