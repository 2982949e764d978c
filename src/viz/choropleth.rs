//! Animated choropleth figure, emitted as Plotly figure JSON.

use serde::Serialize;
use serde_json::{json, Value};

use super::events::{EventKind, RegionMonthStats};
use super::geometry::RegionGeometry;
use super::scale::{ColorRange, ScaleSpec, TempMetric};

const MAP_CENTER: (f64, f64) = (39.5, -98.0);
const MAP_ZOOM: f64 = 3.2;
const FRAME_DURATION_MS: u64 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub name: String,
    pub data: Vec<Value>,
}

/// A complete figure: initial traces, layout and one frame per month.
#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub data: Vec<Value>,
    pub layout: Value,
    pub frames: Vec<Frame>,
}

impl Figure {
    pub fn periods(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(|f| f.name.as_str())
    }
}

/// Builds the animation. Returns `None` when there is nothing to animate.
pub fn build_figure(
    stats: &[RegionMonthStats],
    kind: &EventKind,
    geometry: &RegionGeometry,
) -> Option<Figure> {
    let spec = ScaleSpec::for_kind(kind);
    let range = ColorRange::global(stats, kind, spec.metric);

    let mut periods: Vec<&str> = stats.iter().map(|s| s.period.as_str()).collect();
    periods.dedup();
    let first_period = *periods.first()?;

    let frames: Vec<Frame> = periods
        .iter()
        .map(|period| Frame {
            name: period.to_string(),
            data: vec![choropleth_trace(stats, period, &spec, geometry)],
        })
        .collect();

    let data = vec![
        choropleth_trace(stats, first_period, &spec, geometry),
        label_trace(geometry),
    ];

    Some(Figure {
        data,
        layout: layout(&spec, range, geometry, &frames),
        frames,
    })
}

fn choropleth_trace(
    stats: &[RegionMonthStats],
    period: &str,
    spec: &ScaleSpec,
    geometry: &RegionGeometry,
) -> Value {
    let slice: Vec<&RegionMonthStats> = stats.iter().filter(|s| s.period == period).collect();
    let locations: Vec<&str> = slice.iter().map(|s| s.region_id.as_str()).collect();
    let z: Vec<Option<f64>> = slice.iter().map(|s| spec.metric.value(s)).collect();

    json!({
        "type": "choroplethmapbox",
        "geojson": geometry.geojson,
        "featureidkey": "properties.ID",
        "locations": locations,
        "z": z,
        "coloraxis": "coloraxis",
        "marker": {"opacity": 0.8, "line": {"width": 1, "color": "white"}},
        "hovertemplate": hover_template(spec.metric),
        "name": format!("{} - {}", spec.title_suffix, period),
    })
}

fn hover_template(metric: TempMetric) -> String {
    format!(
        "<b>NERC Region: %{{location}}</b><br>{}: %{{z:.1f}}°F<br><extra></extra>",
        metric.label()
    )
}

/// Region names at polygon centroids; identical in every frame.
fn label_trace(geometry: &RegionGeometry) -> Value {
    let lat: Vec<f64> = geometry.labels.iter().map(|l| l.lat).collect();
    let lon: Vec<f64> = geometry.labels.iter().map(|l| l.lon).collect();
    let text: Vec<&str> = geometry.labels.iter().map(|l| l.name.as_str()).collect();

    json!({
        "type": "scattermapbox",
        "lat": lat,
        "lon": lon,
        "mode": "text",
        "text": text,
        "textfont": {"size": 12, "color": "black"},
        "showlegend": false,
        "hoverinfo": "none",
    })
}

fn layout(
    spec: &ScaleSpec,
    range: ColorRange,
    geometry: &RegionGeometry,
    frames: &[Frame],
) -> Value {
    let colorscale: Vec<Value> = spec
        .colorscale
        .iter()
        .map(|(pos, color)| json!([pos, color]))
        .collect();

    let steps: Vec<Value> = frames
        .iter()
        .map(|frame| {
            json!({
                "label": frame.name,
                "method": "animate",
                "args": [[frame.name], {"frame": {"duration": 0}, "mode": "immediate"}],
            })
        })
        .collect();

    json!({
        "title": {
            "text": format!("{} Events - NERC Regions", spec.title_suffix),
            "x": 0.5,
            "xanchor": "center",
        },
        "mapbox": {
            "style": "carto-positron",
            "zoom": MAP_ZOOM,
            "center": {"lat": MAP_CENTER.0, "lon": MAP_CENTER.1},
            "layers": [{
                "sourcetype": "geojson",
                "source": geometry.geojson,
                "type": "line",
                "color": "black",
                "line": {"width": 2},
            }],
        },
        "coloraxis": {
            "colorscale": colorscale,
            "cmin": range.min,
            "cmax": range.max,
            "showscale": true,
            "colorbar": {
                "title": {
                    "text": format!("Temperature (°F)<br>{}", spec.title_suffix),
                    "side": "right",
                },
            },
        },
        "margin": {"r": 10, "t": 80, "l": 10, "b": 10},
        "height": 700,
        "updatemenus": [{
            "type": "buttons",
            "showactive": false,
            "x": 1.05,
            "y": 0,
            "xanchor": "right",
            "yanchor": "top",
            "pad": {"t": 0, "r": 10},
            "buttons": [{
                "label": "Play",
                "method": "animate",
                "args": [null, {"frame": {"duration": FRAME_DURATION_MS, "redraw": true}, "fromcurrent": true}],
            }],
        }],
        "sliders": [{
            "active": 0,
            "pad": {"t": 50},
            "steps": steps,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> RegionGeometry {
        RegionGeometry::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"ID": "3"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-100.0, 28.0], [-96.0, 28.0], [-96.0, 32.0], [-100.0, 32.0], [-100.0, 28.0]]]
                }
            }]
        }))
    }

    fn bucket(period: &str, region: &str, max: f64, min: f64) -> RegionMonthStats {
        RegionMonthStats {
            period: period.to_string(),
            region_id: region.to_string(),
            event_count: 1,
            avg_temp: Some((max + min) / 2.0),
            max_temp: Some(max),
            min_temp: Some(min),
        }
    }

    #[test]
    fn one_frame_per_period_with_static_labels() {
        let stats = vec![
            bucket("2021-06", "3", 101.0, 99.0),
            bucket("2021-07", "3", 106.0, 100.0),
            bucket("2021-07", "10", 98.0, 97.0),
        ];
        let figure = build_figure(&stats, &EventKind::Heat, &geometry()).unwrap();

        assert_eq!(figure.periods().collect::<Vec<_>>(), vec!["2021-06", "2021-07"]);
        assert_eq!(figure.frames[1].data.len(), 1);
        assert_eq!(figure.frames[1].data[0]["locations"], json!(["3", "10"]));
        assert_eq!(figure.frames[1].data[0]["z"], json!([106.0, 98.0]));

        assert_eq!(figure.data.len(), 2);
        assert_eq!(figure.data[0]["locations"], json!(["3"]));
        assert_eq!(figure.data[1]["mode"], "text");
        assert_eq!(figure.data[1]["text"], json!(["ERCOT"]));

        let steps = figure.layout["sliders"][0]["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["label"], "2021-06");
    }

    #[test]
    fn color_axis_is_shared_and_global() {
        let stats = vec![
            bucket("2014-01", "18", -4.0, -12.0),
            bucket("2014-02", "18", -2.0, -11.0),
        ];
        let figure = build_figure(&stats, &EventKind::Cold, &geometry()).unwrap();

        let axis = &figure.layout["coloraxis"];
        assert_eq!(axis["cmin"], json!(-14.5));
        assert_eq!(axis["cmax"], json!(-8.5));
        assert_eq!(figure.layout["title"]["text"], "Cold Snap Events - NERC Regions");
        for frame in &figure.frames {
            assert_eq!(frame.data[0]["coloraxis"], "coloraxis");
        }
        assert_eq!(figure.frames[0].data[0]["z"], json!([-12.0]));
    }

    #[test]
    fn no_buckets_no_figure() {
        assert!(build_figure(&[], &EventKind::Mixed, &geometry()).is_none());
    }
}
