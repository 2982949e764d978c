//! Automatic map visualization of temperature events found in an answer.

pub mod choropleth;
pub mod events;
pub mod geometry;
pub mod scale;

use serde::Serialize;

pub use choropleth::{build_figure, Figure};
pub use events::{aggregate, parse_temperature_events, EventKind, EventSet, RegionMonthStats};
pub use geometry::{GeometryCache, GeometryError, RegionGeometry};

pub const TEMPERATURE_NOTE: &str = "*Temperatures shown in NERC region represent maximum recorded during the heat wave event or minimum recorded during the cold snap event.*";

pub const NO_VISUALIZATION: &str = "No visualization data detected. Please provide temperature event data.";

pub const CHOROPLETH_FAILED: &str = "Error creating animated choropleth.";

/// What the page shows under "Supporting Visualization".
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisualizationOutcome {
    Figure {
        note: &'static str,
        event_kind: EventKind,
        figure: Figure,
    },
    Unavailable {
        message: &'static str,
    },
    Failed {
        error: String,
    },
}

/// What gets remembered about a drawn map. The figure itself embeds the
/// region boundaries and is rebuilt from the answer text on demand.
#[derive(Serialize)]
struct FigureSummary<'a> {
    event_kind: &'a EventKind,
    periods: Vec<&'a str>,
}

impl VisualizationOutcome {
    /// Event kind and animation periods as JSON, for figures only.
    pub fn summary(&self) -> Option<String> {
        let VisualizationOutcome::Figure { event_kind, figure, .. } = self else {
            return None;
        };
        let summary = FigureSummary {
            event_kind,
            periods: figure.periods().collect(),
        };
        serde_json::to_string(&summary).ok()
    }
}

/// Detects event data in `response` and builds the animated map.
///
/// Missing event data is not an error; a missing boundary file is.
pub fn visualize(response: &str, geometry: &GeometryCache) -> VisualizationOutcome {
    let Some(EventSet { events, kind }) = parse_temperature_events(response) else {
        return VisualizationOutcome::Unavailable { message: NO_VISUALIZATION };
    };

    let regions = match geometry.get() {
        Ok(regions) => regions,
        Err(err) => {
            tracing::warn!(error = %err, "region boundaries unavailable");
            return VisualizationOutcome::Failed { error: err.to_string() };
        }
    };

    let stats = aggregate(&events);
    tracing::debug!(
        events = events.len(),
        buckets = stats.len(),
        kind = %kind,
        "building choropleth"
    );

    match build_figure(&stats, &kind, &regions) {
        Some(figure) => VisualizationOutcome::Figure {
            note: TEMPERATURE_NOTE,
            event_kind: kind,
            figure,
        },
        None => VisualizationOutcome::Failed { error: CHOROPLETH_FAILED.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> GeometryCache {
        let geometry = RegionGeometry::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"ID": "3"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-100.0, 28.0], [-96.0, 28.0], [-96.0, 32.0], [-100.0, 32.0], [-100.0, 28.0]]]
                }
            }]
        }));
        GeometryCache::with_geometry("unused.json", geometry)
    }

    #[test]
    fn heat_event_builds_a_single_frame_map() {
        let response = "```json\n{\"data\": [{\"DS\": \"2021-07-01\", \"DE\": \"2021-07-05\", \"T\": 105.2, \"SC\": 80.0, \"ID\": \"3\", \"Type\": \"heat\"}]}\n```";
        let outcome = visualize(response, &cache());

        let VisualizationOutcome::Figure { event_kind, figure, .. } = outcome else {
            panic!("expected a figure, got {outcome:?}");
        };
        assert_eq!(event_kind, EventKind::Heat);
        assert_eq!(figure.frames.len(), 1);
        assert_eq!(figure.frames[0].name, "2021-07");
        assert_eq!(figure.frames[0].data[0]["locations"], json!(["3"]));
        assert_eq!(figure.layout["coloraxis"]["colorscale"][0], json!([0.0, "#ffffcc"]));
    }

    #[test]
    fn prose_reports_no_visualization() {
        let outcome = visualize("No events matched your question.", &cache());
        assert!(matches!(
            outcome,
            VisualizationOutcome::Unavailable { message: NO_VISUALIZATION }
        ));
    }

    #[test]
    fn missing_boundaries_become_an_error_banner() {
        let response = r#"{"data": [{"DS": "2021-07-01", "T": 101, "ID": "3"}]}"#;
        let outcome = visualize(response, &GeometryCache::new("/no/such/regions.json"));

        let VisualizationOutcome::Failed { error } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("GeoJSON file not found"));
    }

    #[test]
    fn summary_names_kind_and_periods_only() {
        let response = r#"{"data": [
            {"DS": "2021-07-01", "T": 101, "ID": "3", "Type": "heat"},
            {"DS": "2021-08-03", "T": 99, "ID": "3", "Type": "heat"}
        ]}"#;
        let outcome = visualize(response, &cache());

        let summary = outcome.summary().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&summary).unwrap(),
            json!({"event_kind": "heat", "periods": ["2021-07", "2021-08"]})
        );
        assert!(!summary.contains("coordinates"));

        let prose = visualize("No events matched.", &cache());
        assert_eq!(prose.summary(), None);
    }

    #[test]
    fn outcome_serializes_with_a_status_tag() {
        let outcome = VisualizationOutcome::Unavailable { message: NO_VISUALIZATION };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "unavailable", "message": NO_VISUALIZATION})
        );
    }
}
