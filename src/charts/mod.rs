//! Chart payloads: the JSON shapes the dashboard's Chart.js widgets consume
//!
//! Line charts are `{labels, datasets}`; every dataset carries its colours
//! from a fixed table keyed by metric and series position.

use serde::Serialize;

use crate::dashboard::MetricKind;
use crate::sampler::LEVEL_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesStyle {
    pub fill: &'static str,
    pub stroke: &'static str,
    pub point: &'static str,
}

impl SeriesStyle {
    const fn rgb(fill: &'static str, stroke: &'static str) -> Self {
        Self { fill, stroke, point: stroke }
    }
}

const POINT_STROKE: &str = "#fff";

// Memory datasets are drawn used, free, buffers, cached
const MEMORY_STYLES: [SeriesStyle; 4] = [
    SeriesStyle::rgb("rgba(247,70,74,0.5)", "rgba(247,70,74,1)"),
    SeriesStyle::rgb("rgba(43,214,66,0.5)", "rgba(43,214,66,1)"),
    SeriesStyle::rgb("rgba(0,154,205,0.5)", "rgba(0,154,205,1)"),
    SeriesStyle::rgb("rgba(255,185,15,0.5)", "rgba(255,185,15,1)"),
];

const LOAD_STYLES: [SeriesStyle; 1] = [
    SeriesStyle::rgb("rgba(151,187,205,0.5)", "rgba(151,187,205,1)"),
];

const TRAFFIC_STYLES: [SeriesStyle; 2] = [
    SeriesStyle::rgb("rgba(105,210,231,0.5)", "rgba(105,210,231,1)"),
    SeriesStyle::rgb("rgba(227,48,81,0.5)", "rgba(227,48,81,1)"),
];

const DISK_IO_STYLES: [SeriesStyle; 2] = [
    SeriesStyle::rgb("rgba(245,134,15,0.5)", "rgba(245,134,15,1)"),
    SeriesStyle::rgb("rgba(15,103,245,0.5)", "rgba(15,103,245,1)"),
];

/// Style for the `index`-th dataset of a chart. Positions past the table
/// reuse the last entry.
pub fn style(kind: MetricKind, index: usize) -> SeriesStyle {
    let table: &[SeriesStyle] = match kind {
        MetricKind::Memory => &MEMORY_STYLES,
        MetricKind::LoadAverage => &LOAD_STYLES,
        MetricKind::Traffic => &TRAFFIC_STYLES,
        MetricKind::DiskIo => &DISK_IO_STYLES,
    };
    table[index.min(table.len() - 1)]
}

// ─── Payloads ───

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub fill_color: &'static str,
    pub stroke_color: &'static str,
    pub point_color: &'static str,
    pub point_stroke_color: &'static str,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartPayload {
    /// Build a line chart from series data in display order
    pub fn line(kind: MetricKind, label: &str, series: Vec<Vec<f64>>) -> Self {
        let datasets = series
            .into_iter()
            .enumerate()
            .map(|(i, data)| {
                let s = style(kind, i);
                Dataset {
                    fill_color: s.fill,
                    stroke_color: s.stroke,
                    point_color: s.point,
                    point_stroke_color: POINT_STROKE,
                    data,
                }
            })
            .collect();

        Self {
            labels: vec![label.to_string(); LEVEL_CAPACITY],
            datasets,
        }
    }
}

/// One slice of the CPU usage doughnut
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub value: f64,
    pub color: &'static str,
}

/// Free/used CPU split; `used_percent` is clamped to 0..=100
pub fn cpu_pie(used_percent: f64) -> Vec<PieSlice> {
    let used = if used_percent.is_finite() { used_percent.clamp(0.0, 100.0) } else { 0.0 };
    vec![
        PieSlice { value: 100.0 - used, color: "#0AD11B" },
        PieSlice { value: used, color: "#F7464A" },
    ]
}
