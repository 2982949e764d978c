//! Color scales and the shared color range used across animation frames.

use serde::Serialize;

use super::events::{EventKind, RegionMonthStats};

/// Cold spreads narrower than this get widened.
pub const MIN_COLD_SPREAD: f64 = 5.0;

const YL_OR_RD: &[&str] = &[
    "#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#bd0026",
    "#800026",
];

const BLUES: &[&str] = &[
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c",
    "#08306b",
];

const RD_BU: &[&str] = &[
    "#67001f", "#b2182b", "#d6604d", "#f4a582", "#fddbc7", "#f7f7f7", "#d1e5f0", "#92c5de",
    "#4393c3", "#2166ac", "#053061",
];

/// Which aggregate drives the fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TempMetric {
    Max,
    Min,
    Mean,
}

impl TempMetric {
    pub fn value(self, stats: &RegionMonthStats) -> Option<f64> {
        match self {
            TempMetric::Max => stats.max_temp,
            TempMetric::Min => stats.min_temp,
            TempMetric::Mean => stats.avg_temp,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TempMetric::Max => "Max Temp",
            TempMetric::Min => "Min Temp",
            TempMetric::Mean => "Avg Temp",
        }
    }
}

/// Per-kind rendering choices.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpec {
    pub metric: TempMetric,
    pub title_suffix: &'static str,
    /// Plotly colorscale: `[position, color]` pairs from low to high.
    pub colorscale: Vec<(f64, &'static str)>,
}

impl ScaleSpec {
    pub fn for_kind(kind: &EventKind) -> Self {
        match kind {
            EventKind::Heat => Self {
                metric: TempMetric::Max,
                title_suffix: "Heat Wave",
                colorscale: stops(YL_OR_RD.iter().copied()),
            },
            // Darkest blue marks the coldest region.
            EventKind::Cold => Self {
                metric: TempMetric::Min,
                title_suffix: "Cold Snap",
                colorscale: stops(BLUES.iter().rev().copied()),
            },
            EventKind::Mixed => Self {
                metric: TempMetric::Mean,
                title_suffix: "Temperature",
                colorscale: stops(RD_BU.iter().rev().copied()),
            },
        }
    }
}

fn stops<'a>(colors: impl ExactSizeIterator<Item = &'a str>) -> Vec<(f64, &'a str)> {
    let last = colors.len().saturating_sub(1).max(1) as f64;
    colors
        .enumerate()
        .map(|(i, color)| (i as f64 / last, color))
        .collect()
}

/// Bounds of the shared color axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorRange {
    pub min: f64,
    pub max: f64,
}

impl ColorRange {
    /// One range for every frame, so a temperature keeps its color over time.
    ///
    /// Cold spreads under [`MIN_COLD_SPREAD`] are widened by half of it on each
    /// side. The result always has `min < max`.
    pub fn global(stats: &[RegionMonthStats], kind: &EventKind, metric: TempMetric) -> Self {
        let values = stats.iter().filter_map(|s| metric.value(s)).filter(|v| v.is_finite());
        let bounds = values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

        let Some((mut min, mut max)) = bounds else {
            return ColorRange { min: 0.0, max: 1.0 };
        };

        if *kind == EventKind::Cold && max - min < MIN_COLD_SPREAD {
            min -= MIN_COLD_SPREAD / 2.0;
            max += MIN_COLD_SPREAD / 2.0;
        }

        if min == max {
            let eps = if max == 0.0 { 0.1 } else { max.abs() * 0.01 };
            min -= eps;
            max += eps;
        }

        ColorRange { min, max }
    }

    #[cfg(test)]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}
