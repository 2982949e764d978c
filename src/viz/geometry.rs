//! NERC region boundaries: loading, simplification and label placement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{json, Value};

/// Douglas-Peucker tolerance in degrees.
pub const SIMPLIFY_TOLERANCE: f64 = 0.01;

/// Region id (the `ID` feature property) to display name.
pub const REGION_NAMES: &[(&str, &str)] = &[
    ("1", "AZ-NM-SNV"),
    ("2", "CA-MX US"),
    ("3", "ERCOT"),
    ("4", "FRCC"),
    ("5", "NEW ENGLAND"),
    ("6", "NWPP"),
    ("7", "RMPA"),
    ("8", "SPP"),
    ("9", "DELTA"),
    ("10", "SOUTHEASTERN"),
    ("11", "CENTRAL"),
    ("12", "VACAR"),
    ("15", "NEW YORK"),
    ("17", "RFC"),
    ("18", "MRO US"),
    ("20", "GATEWAY"),
];

pub fn region_name(id: &str) -> Option<&'static str> {
    REGION_NAMES
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, name)| *name)
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("GeoJSON file not found at {0}. Cannot create choropleth map.")]
    Missing(PathBuf),

    #[error("Failed to read GeoJSON file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Text label placed at a region's centroid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionLabel {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub region_id: String,
}

/// Simplified boundaries plus precomputed labels. Read-only once built.
#[derive(Debug, Clone)]
pub struct RegionGeometry {
    pub geojson: Value,
    pub labels: Vec<RegionLabel>,
}

impl RegionGeometry {
    pub fn load(path: &Path) -> Result<Self, GeometryError> {
        if !path.exists() {
            return Err(GeometryError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let geojson: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_geojson(geojson))
    }

    pub fn from_geojson(mut geojson: Value) -> Self {
        if let Some(features) = geojson.get_mut("features").and_then(Value::as_array_mut) {
            for feature in features.iter_mut() {
                if let Some(geometry) = feature.get_mut("geometry") {
                    simplify_geometry(geometry, SIMPLIFY_TOLERANCE);
                }
            }
        }
        let labels = region_labels(&geojson);
        Self { geojson, labels }
    }
}

/// Process-wide memo of the boundary file. A failed load is not cached, so a
/// file dropped in place later is picked up.
#[derive(Debug)]
pub struct GeometryCache {
    path: PathBuf,
    cell: OnceCell<Arc<RegionGeometry>>,
}

impl GeometryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    pub fn with_geometry(path: impl Into<PathBuf>, geometry: RegionGeometry) -> Self {
        let cache = Self::new(path);
        cache.cell.set(Arc::new(geometry)).ok();
        cache
    }

    pub fn get(&self) -> Result<Arc<RegionGeometry>, GeometryError> {
        self.cell
            .get_or_try_init(|| {
                let geometry = RegionGeometry::load(&self.path)?;
                tracing::info!(
                    path = %self.path.display(),
                    labels = geometry.labels.len(),
                    "loaded region boundaries"
                );
                Ok(Arc::new(geometry))
            })
            .cloned()
    }
}

type Point = [f64; 2];

fn parse_ring(value: &Value) -> Option<Vec<Point>> {
    value
        .as_array()?
        .iter()
        .map(|p| {
            let coords = p.as_array()?;
            Some([coords.first()?.as_f64()?, coords.get(1)?.as_f64()?])
        })
        .collect()
}

fn parse_polygon(value: &Value) -> Option<Vec<Vec<Point>>> {
    value.as_array()?.iter().map(parse_ring).collect()
}

fn parse_multi_polygon(value: &Value) -> Option<Vec<Vec<Vec<Point>>>> {
    value.as_array()?.iter().map(parse_polygon).collect()
}

/// Leaves geometries it cannot read untouched.
fn simplify_geometry(geometry: &mut Value, tolerance: f64) {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    let Some(coords) = geometry.get("coordinates") else {
        return;
    };

    let simplified = match kind.as_str() {
        "Polygon" => parse_polygon(coords).map(|rings| json!(simplify_polygon(&rings, tolerance))),
        "MultiPolygon" => parse_multi_polygon(coords).map(|polys| {
            let polys: Vec<_> = polys
                .iter()
                .map(|rings| simplify_polygon(rings, tolerance))
                .collect();
            json!(polys)
        }),
        _ => None,
    };

    if let Some(simplified) = simplified {
        geometry["coordinates"] = simplified;
    }
}

fn simplify_polygon(rings: &[Vec<Point>], tolerance: f64) -> Vec<Vec<Point>> {
    rings
        .iter()
        .map(|ring| {
            let simplified = douglas_peucker(ring, tolerance);
            // A ring needs four positions to stay a ring.
            if simplified.len() >= 4 { simplified } else { ring.clone() }
        })
        .collect()
}

fn douglas_peucker(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        let mut farthest = None;
        let mut max_dist = tolerance;
        for idx in start + 1..end {
            let dist = segment_distance(points[idx], points[start], points[end]);
            if dist > max_dist {
                max_dist = dist;
                farthest = Some(idx);
            }
        }
        if let Some(idx) = farthest {
            keep[idx] = true;
            stack.push((start, idx));
            stack.push((idx, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return ((p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2)).sqrt();
    }
    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (a[0] + t * dx, a[1] + t * dy);
    ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt()
}

/// Signed area and area-weighted centroid numerators of one ring.
fn ring_moments(ring: &[Point]) -> (f64, f64, f64) {
    let mut area = 0.0;
    let (mut cx, mut cy) = (0.0, 0.0);
    for pair in ring.windows(2) {
        let ([x0, y0], [x1, y1]) = (pair[0], pair[1]);
        let cross = x0 * y1 - x1 * y0;
        area += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    (area / 2.0, cx / 6.0, cy / 6.0)
}

/// Area-weighted centroid; holes subtract. Falls back to the vertex mean for
/// degenerate shapes.
fn polygons_centroid(polygons: &[Vec<Vec<Point>>]) -> Option<Point> {
    let (mut area, mut mx, mut my) = (0.0, 0.0, 0.0);
    let mut vertices: Vec<Point> = Vec::new();

    for rings in polygons {
        for (idx, ring) in rings.iter().enumerate() {
            let (a, cx, cy) = ring_moments(ring);
            let sign = if (a >= 0.0) == (idx == 0) { 1.0 } else { -1.0 };
            area += sign * a;
            mx += sign * cx;
            my += sign * cy;
            if idx == 0 {
                vertices.extend_from_slice(ring);
            }
        }
    }

    if area.abs() > f64::EPSILON {
        return Some([mx / area, my / area]);
    }
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let (sx, sy) = vertices.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    Some([sx / n, sy / n])
}

fn geometry_centroid(geometry: &Value) -> Option<Point> {
    let coords = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => polygons_centroid(&[parse_polygon(coords)?]),
        "MultiPolygon" => polygons_centroid(&parse_multi_polygon(coords)?),
        _ => None,
    }
}

fn property_id(feature: &Value) -> Option<String> {
    match feature.get("properties")?.get("ID")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn region_labels(geojson: &Value) -> Vec<RegionLabel> {
    let Some(features) = geojson.get("features").and_then(Value::as_array) else {
        return Vec::new();
    };

    features
        .iter()
        .filter_map(|feature| {
            let [lon, lat] = geometry_centroid(feature.get("geometry")?)?;
            let region_id = property_id(feature)?;
            let name = region_name(&region_id)?;
            Some(RegionLabel {
                lat,
                lon,
                name: name.to_string(),
                region_id,
            })
        })
        .collect()
}
