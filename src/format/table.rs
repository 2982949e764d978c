//! HTML table rendering for event payloads.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::repair::extract_json;

pub const START_DATE: &str = "Start Date";
pub const END_DATE: &str = "End Date";
pub const EVENT_TYPE: &str = "Event Type";
pub const NERC_ID: &str = "NERC ID";
pub const TEMPERATURE: &str = "Temperature (°F)";
pub const SPATIAL_COVERAGE: &str = "Spatial Coverage (%)";

pub const NO_EVENTS: &str = "No events found.";

/// Abbreviated keys the prompt asks the model to emit.
pub const ABBREVIATED_FIELDS: &[(&str, &str)] = &[
    ("DS", START_DATE),
    ("DE", END_DATE),
    ("T", TEMPERATURE),
    ("SC", SPATIAL_COVERAGE),
    ("ID", NERC_ID),
    ("Type", EVENT_TYPE),
];

/// Verbose keys, matching the database column names.
pub const VERBOSE_FIELDS: &[(&str, &str)] = &[
    ("start_date", START_DATE),
    ("end_date", END_DATE),
    ("temperature", TEMPERATURE),
    ("spatial_coverage", SPATIAL_COVERAGE),
    ("NERC_ID", NERC_ID),
    ("event_type", EVENT_TYPE),
];

const FIELD_CONVENTIONS: &[&[(&str, &str)]] = &[ABBREVIATED_FIELDS, VERBOSE_FIELDS];

const PREFERRED_ORDER: &[&str] = &[
    START_DATE,
    END_DATE,
    EVENT_TYPE,
    NERC_ID,
    TEMPERATURE,
    SPATIAL_COVERAGE,
];

/// Source key to display name, in lookup order.
#[derive(Debug, Default)]
struct DisplayMap {
    entries: Vec<(String, String)>,
}

impl DisplayMap {
    /// Every convention overlapping the first record's keys is merged in;
    /// keys left over get a generated name.
    fn for_record(first: &Map<String, Value>) -> Self {
        let mut map = DisplayMap::default();

        for convention in FIELD_CONVENTIONS {
            if convention.iter().any(|(key, _)| first.contains_key(*key)) {
                for (key, display) in convention.iter() {
                    map.insert(key, display);
                }
            }
        }

        for key in first.keys() {
            if map.get(key).is_none() {
                map.insert(key, &generated_display_name(key));
            }
        }

        map
    }

    fn insert(&mut self, source: &str, display: &str) {
        match self.entries.iter_mut().find(|(src, _)| src == source) {
            Some(entry) => entry.1 = display.to_string(),
            None => self.entries.push((source.to_string(), display.to_string())),
        }
    }

    fn get(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(src, _)| src == source)
            .map(|(_, display)| display.as_str())
    }

    fn display_for(&self, source: &str) -> String {
        self.get(source)
            .map(str::to_string)
            .unwrap_or_else(|| generated_display_name(source))
    }

    fn sources_for<'a>(&'a self, display: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, d)| d == display)
            .map(|(src, _)| src.as_str())
    }
}

/// Renders the event payload embedded in `response` as an HTML table.
///
/// Anything that is not an object holding a `data` array comes back
/// unchanged so the caller can show it as prose.
pub fn render_event_table(response: &str) -> String {
    let Some(Value::Object(payload)) = extract_json(response) else {
        return response.to_string();
    };
    let Some(Value::Array(events)) = payload.get("data") else {
        return response.to_string();
    };
    let Some(Value::Object(first)) = events.first() else {
        return NO_EVENTS.to_string();
    };

    let display_map = DisplayMap::for_record(first);
    let records: Vec<&Map<String, Value>> = events.iter().filter_map(Value::as_object).collect();
    let columns = ordered_columns(&display_map, &records);

    let mut out = String::new();
    out.push_str(r#"<div style="max-height:400px; overflow:auto;">"#);
    out.push_str(r#"<table border="1" style="border-collapse:collapse; width:100%;">"#);
    out.push_str("<thead><tr>");
    for column in &columns {
        out.push_str(r#"<th style="padding:8px; text-align:left;">"#);
        out.push_str(&escape_html(column));
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>");

    for record in &records {
        out.push_str("<tr>");
        for column in &columns {
            let text = value_for_column(&display_map, record, column)
                .map(cell_text)
                .unwrap_or_default();
            out.push_str(r#"<td style="padding:8px;">"#);
            out.push_str(&escape_html(&text));
            out.push_str("</td>");
        }
        out.push_str("</tr>");
    }

    out.push_str("</tbody></table></div>");
    out
}

fn ordered_columns(display_map: &DisplayMap, records: &[&Map<String, Value>]) -> Vec<String> {
    let all: BTreeSet<String> = records
        .iter()
        .flat_map(|record| record.keys())
        .map(|key| display_map.display_for(key))
        .collect();

    let mut columns: Vec<String> = PREFERRED_ORDER
        .iter()
        .filter(|name| all.contains(**name))
        .map(|name| name.to_string())
        .collect();
    columns.extend(all.into_iter().filter(|name| !PREFERRED_ORDER.contains(&name.as_str())));
    columns
}

fn value_for_column<'a>(
    display_map: &DisplayMap,
    record: &'a Map<String, Value>,
    column: &str,
) -> Option<&'a Value> {
    if let Some(value) = display_map.sources_for(column).find_map(|src| record.get(src)) {
        return Some(value);
    }

    let normalized = column
        .to_lowercase()
        .replace(' ', "_")
        .replace("(%)", "");
    record.get(normalized.trim())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| format!("{:.1}", f))
            .unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// `spatial_coverage` becomes `Spatial Coverage`.
pub fn generated_display_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut previous_cased = false;
    for ch in key.replace('_', " ").chars() {
        if previous_cased {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        previous_cased = ch.is_alphabetic();
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
