//! Turning raw agent answers into something presentable.

pub mod repair;
pub mod table;

use once_cell::sync::Lazy;
use regex::Regex;

pub use repair::{extract_json, repair_json};
pub use table::{escape_html, render_event_table};

pub const INSIGHTS_HEADING: &str = "### Technical Insights:";

pub const METHODOLOGY_NOTE: &str = "*Heat wave and cold snap events identified using Definition 6: Heat wave events are detected based on daily maximum temperature with two temperature thresholds (T1 ~ 97.5th percentile and T2 ~ 81st percentile). All days in the event must have temperature > T2, with at least 3 consecutive days > T1, and the average temperature across all event days > T1.*";

static EMPTY_VISUALIZATION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n*### Supporting Visualization\s*$").expect("visualization heading pattern")
});

/// Builds the markdown/HTML shown for an answer.
///
/// When the answer carries an event table, the table replaces the raw JSON
/// and the model's technical insights follow it with the methodology note.
/// Plain answers gain a heading unless they already use markdown emphasis.
pub fn enhance_presentation(response: &str) -> String {
    let table = render_event_table(response);
    if table != response {
        let mut out = format!("## Analysis Results\n\n{}", table);
        if let Some(idx) = response.find(INSIGHTS_HEADING) {
            let insights = response[idx..].trim();
            let insights = EMPTY_VISUALIZATION_HEADING.replace(insights, "");
            out.push_str("\n\n");
            out.push_str(&insights);
            out.push_str("\n\n");
            out.push_str(METHODOLOGY_NOTE);
        }
        return out;
    }

    if response.contains("**") || response.contains("##") {
        response.to_string()
    } else {
        format!("## Analysis\n{}", response)
    }
}
