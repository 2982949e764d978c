//! Recovering JSON from free-form model output.
//!
//! Each strategy is a pure function from the raw text to an optional value and
//! always sees the original text; repairs are never stacked on top of each
//! other. The first strategy that yields a value wins.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//[^\n]*").expect("line comment pattern"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern"));

static DANGLING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*$").expect("dangling comma pattern"));

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```\s*(json)?\s*\n(.*?)```").expect("json fence pattern")
});

/// Non-finite literals some models emit; parsed as `null`.
const NON_FINITE: &[&str] = &["-Infinity", "Infinity", "NaN"];

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("strict", parse_strict),
    ("strip_line_comments", parse_without_line_comments),
    ("strip_trailing_commas", parse_without_trailing_commas),
    ("truncate_balanced", parse_balanced_prefix),
    ("complete_closures", parse_with_completed_closures),
];

/// Runs the repair cascade over `text`.
pub fn repair_json(text: &str) -> Option<Value> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let value = strategy(text)?;
        tracing::trace!(strategy = name, "json repaired");
        Some(value)
    })
}

/// Pulls the structured payload out of a model response.
///
/// A fenced code block wins when its body repairs into a value; otherwise
/// everything from the first `{` onward goes through the cascade.
pub fn extract_json(response: &str) -> Option<Value> {
    let cleaned = response.trim();

    if let Some(body) = JSON_FENCE.captures(cleaned).and_then(|caps| caps.get(2)) {
        if let Some(value) = repair_json(body.as_str().trim()) {
            return Some(value);
        }
    }

    let start = cleaned.find('{')?;
    repair_json(&cleaned[start..])
}

fn parse_strict(text: &str) -> Option<Value> {
    serde_json::from_str(&non_finite_to_null(text)).ok()
}

/// Replaces bare `NaN`/`Infinity` tokens with `null`. String contents are
/// left alone.
fn non_finite_to_null(text: &str) -> Cow<'_, str> {
    if !NON_FINITE.iter().any(|lit| text.contains(lit)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        } else if let Some(lit) = NON_FINITE.iter().find(|lit| rest.starts_with(**lit)) {
            out.push_str("null");
            rest = &rest[lit.len()..];
            continue;
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    Cow::Owned(out)
}

fn parse_without_line_comments(text: &str) -> Option<Value> {
    parse_strict(&LINE_COMMENT.replace_all(text, ""))
}

fn parse_without_trailing_commas(text: &str) -> Option<Value> {
    parse_strict(&TRAILING_COMMA.replace_all(text, "$1"))
}

/// Cuts the text after the last character at which brace depth is zero.
fn parse_balanced_prefix(text: &str) -> Option<Value> {
    let mut depth: i64 = 0;
    let mut end = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            end = idx + ch.len_utf8();
        }
    }

    // Mirrors slicing up to the first character when depth never settles.
    if end == 0 {
        end = text.chars().next().map(char::len_utf8).unwrap_or(0);
    }

    parse_strict(&text[..end])
}

/// Cuts after the last `}` and appends whatever closers are missing,
/// brackets first, then braces.
fn parse_with_completed_closures(text: &str) -> Option<Value> {
    let last_brace = text.rfind('}')?;
    let mut candidate = DANGLING_COMMA.replace(&text[..=last_brace], "").into_owned();

    let count = |c: char| candidate.matches(c).count();
    let (open_braces, close_braces) = (count('{'), count('}'));
    let (open_brackets, close_brackets) = (count('['), count(']'));

    candidate.push_str(&"]".repeat(open_brackets.saturating_sub(close_brackets)));
    candidate.push_str(&"}".repeat(open_braces.saturating_sub(close_braces)));

    parse_strict(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_input_matches_a_direct_parse() {
        let inputs = [
            r#"{"data": [{"DS": "2021-07-01", "T": 105.2}]}"#,
            r#"{"a": "http://example.com", "b": [1, 2, 3]}"#,
            r#"[1, {"x": null}]"#,
        ];
        for input in inputs {
            let direct: Value = serde_json::from_str(input).unwrap();
            assert_eq!(repair_json(input), Some(direct), "input: {input}");
        }
    }

    #[test]
    fn line_comments_are_stripped() {
        let input = "{\n  \"a\": 1, // first\n  \"b\": 2 // second\n}";
        assert_eq!(repair_json(input), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn trailing_commas_are_removed() {
        let input = r#"{"data": [{"T": 1.5,}, {"T": 2.5},],}"#;
        let expected: Value = serde_json::from_str(r#"{"data": [{"T": 1.5}, {"T": 2.5}]}"#).unwrap();
        assert_eq!(repair_json(input), Some(expected));
    }

    #[test]
    fn trailing_prose_is_cut_at_the_balanced_brace() {
        let input = r#"{"data": [{"ID": "3"}]} and that is the answer {maybe"#;
        assert_eq!(repair_json(input), Some(json!({"data": [{"ID": "3"}]})));
    }

    #[test]
    fn truncated_output_gets_missing_closers() {
        // missing one `]` and one `}`
        let input = r#"{"data": [{"ID": "3", "T": 101.0}, {"ID": "4", "T": 99.5}, {"ID": "5", "T""#;
        assert_eq!(
            parse_with_completed_closures(input),
            Some(json!({"data": [{"ID": "3", "T": 101.0}, {"ID": "4", "T": 99.5}]}))
        );
        assert_eq!(
            repair_json(input),
            Some(json!({"data": [{"ID": "3", "T": 101.0}, {"ID": "4", "T": 99.5}]}))
        );
    }

    #[test]
    fn nested_truncation_appends_brackets_before_braces() {
        let input = r#"{"meta": {"rows": [{"a": 1}"#;
        assert_eq!(
            repair_json(input),
            Some(json!({"meta": {"rows": [{"a": 1}]}}))
        );
    }

    #[test]
    fn strategies_are_not_chained() {
        // Needs both comment stripping and trailing comma removal.
        let input = "{\"a\": 1, // note\n}";
        assert_eq!(parse_without_line_comments(input), None);
        assert_eq!(parse_without_trailing_commas(input), None);
        assert_eq!(repair_json(input), None);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let input = r#"{"data": [{"DS": "2021-07-01", "T": NaN, "ID": "3"}, {"T": -Infinity, "note": "NaN stays"}]}"#;
        assert_eq!(
            repair_json(input),
            Some(json!({"data": [{"DS": "2021-07-01", "T": null, "ID": "3"}, {"T": null, "note": "NaN stays"}]}))
        );
    }

    #[test]
    fn hopeless_text_yields_none() {
        assert_eq!(repair_json("no json here"), None);
        assert_eq!(repair_json(""), None);
        assert_eq!(repair_json("{{{"), None);
    }

    #[test]
    fn fenced_block_is_preferred() {
        let response = "Here you go:\n```JSON\n{\"data\": [1]}\n```\nAlso {\"data\": [2]}";
        assert_eq!(extract_json(response), Some(json!({"data": [1]})));
    }

    #[test]
    fn unfenced_response_parses_from_first_brace() {
        let response = "Results follow. {\"data\": [{\"T\": 10}]}\n\n### Technical Insights:\n- warm";
        assert_eq!(extract_json(response), Some(json!({"data": [{"T": 10}]})));
    }

    #[test]
    fn broken_fence_falls_back_to_first_brace() {
        let response = "```json\nnot json\n```\n{\"ok\": true}";
        assert_eq!(extract_json(response), Some(json!({"ok": true})));
    }

    #[test]
    fn prose_without_braces_has_no_payload() {
        assert_eq!(extract_json("The hottest event was in July."), None);
    }
}
