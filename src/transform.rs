//! Record shaping: date normalization and field selection.
//!
//! Copper returns date fields as Unix epoch seconds. Records are normalized
//! to RFC 3339 UTC strings before emission so they match the advertised
//! schemas, and bookmark comparisons happen on epoch seconds regardless of
//! which representation a value arrived in.

use std::collections::BTreeSet;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Date fields Copper is known to return as epoch numbers even when the
/// schema does not flag them.
const KNOWN_DATE_FIELDS: &[&str] = &["date_created", "date_modified", "activity_date"];

/// Parse a timestamp string: RFC 3339, a bare date, or a naive datetime
/// (assumed UTC). Returns epoch seconds.
pub fn parse_timestamp(s: &str) -> anyhow::Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date
            .and_hms_opt(0, 0, 0)
            .context("Invalid midnight timestamp")?
            .and_utc()
            .timestamp());
    }
    bail!("Unparseable datetime string: {s:?}")
}

/// Coerce a JSON value holding a timestamp (epoch number or datetime string)
/// into epoch seconds.
pub fn to_epoch_seconds(value: &Value) -> anyhow::Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f as i64)
            } else {
                bail!("Unsupported numeric timestamp: {n}")
            }
        }
        Value::String(s) => parse_timestamp(s),
        other => bail!("Unsupported timestamp type: {other}"),
    }
}

/// Render epoch seconds as an RFC 3339 UTC string with a `Z` suffix.
pub fn to_rfc3339_utc(epoch: i64) -> anyhow::Result<String> {
    let dt = DateTime::<Utc>::from_timestamp(epoch, 0)
        .with_context(|| format!("Timestamp out of range: {epoch}"))?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Detect date/datetime fields from a stream schema: declared `date-time` /
/// `date` formats, common naming patterns, and the known Copper date fields.
pub fn date_fields(schema: &Value) -> BTreeSet<String> {
    let mut fields: BTreeSet<String> = KNOWN_DATE_FIELDS.iter().map(|s| s.to_string()).collect();
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return fields;
    };
    for (key, spec) in props {
        let format = spec.get("format").and_then(Value::as_str);
        if matches!(format, Some("date-time") | Some("date"))
            || key.starts_with("date_")
            || key.ends_with("_date")
        {
            fields.insert(key.clone());
        }
    }
    fields
}

/// Rewrite any recognized date fields on a record to RFC 3339 UTC strings.
/// Unparseable values are left as-is rather than failing the run.
pub fn normalize_record_dates(record: &mut Map<String, Value>, date_fields: &BTreeSet<String>) {
    for (key, value) in record.iter_mut() {
        if value.is_null() || !date_fields.contains(key) {
            continue;
        }
        if let Ok(epoch) = to_epoch_seconds(value) {
            if let Ok(iso) = to_rfc3339_utc(epoch) {
                *value = Value::String(iso);
            }
        }
    }
}

/// Project a record down to the selected fields. Fields outside the schema
/// (absent from the selected set) are dropped, which also tolerates unknown
/// fields the API may add.
pub fn project_record(record: &Map<String, Value>, selected: &BTreeSet<String>) -> Value {
    let filtered: Map<String, Value> = record
        .iter()
        .filter(|(k, _)| selected.contains(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z").unwrap(), 0);
        assert_eq!(parse_timestamp("2020-01-01").unwrap(), 1_577_836_800);
        assert_eq!(parse_timestamp("2020-01-01T00:00:00").unwrap(), 1_577_836_800);
        assert_eq!(
            parse_timestamp("2020-01-01T01:00:00+01:00").unwrap(),
            1_577_836_800
        );
        assert!(parse_timestamp("not a date").is_err());
    }

    #[test]
    fn test_to_epoch_seconds_accepts_numbers_and_strings() {
        assert_eq!(to_epoch_seconds(&json!(1_577_836_800)).unwrap(), 1_577_836_800);
        assert_eq!(to_epoch_seconds(&json!(1_577_836_800.7)).unwrap(), 1_577_836_800);
        assert_eq!(
            to_epoch_seconds(&json!("2020-01-01T00:00:00Z")).unwrap(),
            1_577_836_800
        );
        assert!(to_epoch_seconds(&json!(null)).is_err());
        assert!(to_epoch_seconds(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_to_rfc3339_utc() {
        assert_eq!(to_rfc3339_utc(1_577_836_800).unwrap(), "2020-01-01T00:00:00Z");
    }

    #[test]
    fn test_date_fields_detection() {
        let schema = json!({
            "properties": {
                "id": {"type": ["null", "integer"]},
                "close_date": {"type": ["null", "string"], "format": "date-time"},
                "date_won": {"type": ["null", "integer"]},
                "name": {"type": ["null", "string"]}
            }
        });
        let fields = date_fields(&schema);
        assert!(fields.contains("close_date"));
        assert!(fields.contains("date_won"));
        assert!(fields.contains("date_modified"));
        assert!(!fields.contains("name"));
    }

    #[test]
    fn test_normalize_record_dates() {
        let schema = json!({"properties": {"date_modified": {"type": ["null", "string"], "format": "date-time"}}});
        let fields = date_fields(&schema);

        let mut record = json!({
            "id": 1,
            "date_modified": 1_577_836_800,
            "date_created": "2020-01-01T00:00:00Z",
            "name": "unchanged"
        });
        let map = record.as_object_mut().unwrap();
        normalize_record_dates(map, &fields);

        assert_eq!(map["date_modified"], "2020-01-01T00:00:00Z");
        assert_eq!(map["date_created"], "2020-01-01T00:00:00Z");
        assert_eq!(map["name"], "unchanged");
    }

    #[test]
    fn test_normalize_leaves_unparseable_values() {
        let fields = date_fields(&json!({}));
        let mut record = json!({"date_modified": "garbage"});
        let map = record.as_object_mut().unwrap();
        normalize_record_dates(map, &fields);
        assert_eq!(map["date_modified"], "garbage");
    }

    #[test]
    fn test_project_record_drops_unselected_and_unknown() {
        let selected: BTreeSet<String> =
            ["id", "name"].iter().map(|s| s.to_string()).collect();
        let record = json!({"id": 1, "name": "x", "secret": true, "extra_api_field": 9});
        let projected = project_record(record.as_object().unwrap(), &selected);
        assert_eq!(projected, json!({"id": 1, "name": "x"}));
    }
}
