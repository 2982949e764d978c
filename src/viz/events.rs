//! Temperature-event detection and month/region aggregation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::format::extract_json;

/// Abbreviated key to canonical key.
const KEY_RENAMES: &[(&str, &str)] = &[
    ("DS", "start_date"),
    ("DE", "end_date"),
    ("T", "temperature"),
    ("SC", "spatial_coverage"),
    ("ID", "NERC_ID"),
    ("Type", "event_type"),
];

const REQUIRED_FIELDS: &[&str] = &["start_date", "temperature", "NERC_ID"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Heat,
    Cold,
    Mixed,
}

impl EventKind {
    fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "heat" => EventKind::Heat,
            "cold" => EventKind::Cold,
            _ => EventKind::Mixed,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::Heat => "heat",
            EventKind::Cold => "cold",
            EventKind::Mixed => "mixed",
        };
        f.write_str(label)
    }
}

/// One normalized event row.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureEvent {
    pub start_date: NaiveDate,
    pub region_id: String,
    pub temperature: Option<f64>,
    pub event_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventSet {
    pub events: Vec<TemperatureEvent>,
    pub kind: EventKind,
}

/// Per (month, region) temperature summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionMonthStats {
    /// `YYYY-MM`
    pub period: String,
    pub region_id: String,
    pub event_count: usize,
    pub avg_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
}

/// Finds temperature events in a model response.
///
/// Returns `None` unless the payload has a non-empty `data` array whose
/// first record carries a start date, a temperature and a region id, and
/// every start date parses.
pub fn parse_temperature_events(response: &str) -> Option<EventSet> {
    let Value::Object(mut payload) = extract_json(response)? else {
        return None;
    };
    let Some(Value::Array(mut rows)) = payload.remove("data") else {
        return None;
    };

    let abbreviated = rows
        .first()
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("DS"));
    if abbreviated {
        for row in rows.iter_mut().filter_map(Value::as_object_mut) {
            rename_keys(row);
        }
    }

    let first = rows.first()?.as_object()?;
    if !REQUIRED_FIELDS.iter().all(|field| first.contains_key(*field)) {
        return None;
    }

    let mut events = Vec::with_capacity(rows.len());
    for row in rows.iter().filter_map(Value::as_object) {
        let start_date = row.get("start_date").and_then(parse_date)?;
        events.push(TemperatureEvent {
            start_date,
            region_id: row.get("NERC_ID").map(region_label).unwrap_or_default(),
            temperature: row.get("temperature").and_then(as_number),
            event_type: row.get("event_type").and_then(type_label),
        });
    }

    let kind = infer_kind(&events);
    Some(EventSet { events, kind })
}

/// Buckets events by calendar month and region, sorted by period then region.
pub fn aggregate(events: &[TemperatureEvent]) -> Vec<RegionMonthStats> {
    let mut buckets: BTreeMap<(String, String), Vec<Option<f64>>> = BTreeMap::new();
    for event in events {
        let period = format!("{:04}-{:02}", event.start_date.year(), event.start_date.month());
        buckets
            .entry((period, event.region_id.clone()))
            .or_default()
            .push(event.temperature);
    }

    buckets
        .into_iter()
        .map(|((period, region_id), temps)| {
            let values: Vec<f64> = temps.into_iter().flatten().collect();
            let mean = if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            };
            RegionMonthStats {
                period,
                region_id,
                event_count: values.len(),
                avg_temp: mean.map(round2),
                max_temp: values.iter().copied().reduce(f64::max).map(round2),
                min_temp: values.iter().copied().reduce(f64::min).map(round2),
            }
        })
        .collect()
}

fn infer_kind(events: &[TemperatureEvent]) -> EventKind {
    let mut labels = events.iter().filter_map(|e| e.event_type.as_deref());
    let Some(first) = labels.next() else {
        return EventKind::Mixed;
    };
    if labels.all(|label| label == first) {
        EventKind::from_label(first)
    } else {
        EventKind::Mixed
    }
}

fn rename_keys(row: &mut Map<String, Value>) {
    for (short, long) in KEY_RENAMES {
        if let Some(value) = row.remove(*short) {
            row.insert(long.to_string(), value);
        }
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn region_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn type_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviated_keys_are_normalized() {
        let response = r#"```json
{"data": [{"DS": "2021-07-01", "DE": "2021-07-05", "T": 105.2, "SC": 80.0, "ID": "3", "Type": "heat"}]}
```"#;
        let set = parse_temperature_events(response).expect("events");

        assert_eq!(set.kind, EventKind::Heat);
        assert_eq!(
            set.events,
            vec![TemperatureEvent {
                start_date: NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
                region_id: "3".to_string(),
                temperature: Some(105.2),
                event_type: Some("heat".to_string()),
            }]
        );
    }

    #[test]
    fn verbose_keys_with_numeric_region_ids() {
        let response = r#"{"data": [
            {"start_date": "2014-01-06 00:00:00", "temperature": -15.0, "NERC_ID": 18, "event_type": "cold"},
            {"start_date": "2014-01-21", "temperature": "-9.5", "NERC_ID": 18, "event_type": "cold"}
        ]}"#;
        let set = parse_temperature_events(response).expect("events");

        assert_eq!(set.kind, EventKind::Cold);
        assert_eq!(set.events[0].region_id, "18");
        assert_eq!(set.events[1].temperature, Some(-9.5));
    }

    #[test]
    fn differing_types_are_mixed() {
        let response = r#"{"data": [
            {"DS": "2021-07-01", "T": 101, "ID": "3", "Type": "heat"},
            {"DS": "2021-01-01", "T": 5, "ID": "3", "Type": "cold"}
        ]}"#;
        assert_eq!(parse_temperature_events(response).unwrap().kind, EventKind::Mixed);
    }

    #[test]
    fn missing_type_is_mixed() {
        let response = r#"{"data": [{"DS": "2021-07-01", "T": 101, "ID": "3"}]}"#;
        assert_eq!(parse_temperature_events(response).unwrap().kind, EventKind::Mixed);
    }

    #[test]
    fn required_fields_are_checked_on_the_first_record() {
        let no_region = r#"{"data": [{"DS": "2021-07-01", "T": 101}]}"#;
        assert!(parse_temperature_events(no_region).is_none());

        let empty = r#"{"data": []}"#;
        assert!(parse_temperature_events(empty).is_none());
    }

    #[test]
    fn unparseable_dates_disable_visualization() {
        let response = r#"{"data": [{"DS": "sometime in July", "T": 101, "ID": "3"}]}"#;
        assert!(parse_temperature_events(response).is_none());
    }

    #[test]
    fn prose_has_no_events() {
        assert!(parse_temperature_events("Nothing to chart here.").is_none());
    }

    #[test]
    fn aggregation_buckets_by_month_and_region() {
        let event = |date: &str, region: &str, temp: Option<f64>| TemperatureEvent {
            start_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            region_id: region.to_string(),
            temperature: temp,
            event_type: None,
        };
        let events = vec![
            event("2021-07-01", "3", Some(100.0)),
            event("2021-07-20", "3", Some(104.6)),
            event("2021-07-03", "10", Some(98.0)),
            event("2021-06-12", "3", None),
        ];

        let stats = aggregate(&events);

        assert_eq!(
            stats.iter().map(|s| (s.period.as_str(), s.region_id.as_str())).collect::<Vec<_>>(),
            vec![("2021-06", "3"), ("2021-07", "10"), ("2021-07", "3")]
        );
        assert_eq!(stats[0].event_count, 0);
        assert_eq!(stats[0].max_temp, None);
        assert_eq!(stats[2].event_count, 2);
        assert_eq!(stats[2].avg_temp, Some(102.3));
        assert_eq!(stats[2].max_temp, Some(104.6));
        assert_eq!(stats[2].min_temp, Some(100.0));
    }
}
