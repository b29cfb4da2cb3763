//! Sliding window sampler: bounded sample history and counter rate derivation
//!
//! Every chart on the dashboard is backed by one or more fixed-length windows:
//! - level series (10 points) hold the values that are drawn
//! - counter pairs (2 points) hold consecutive cumulative readings so a rate
//!   can be derived from their difference
//!
//! Nothing in here performs I/O. Windows are rebuilt from client state,
//! pushed once per poll and handed back to the caller.

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Points kept for a charted series
pub const LEVEL_CAPACITY: usize = 10;

/// Readings kept for a cumulative counter
pub const COUNTER_CAPACITY: usize = 2;

/// Added to the newest point when a full series is flat or sums to zero.
/// Chart.js derives its y-axis scale from the data range and divides by zero
/// on a perfectly flat line, so the series is nudged to keep it drawable.
pub const CHART_NUDGE: f64 = 0.1;

/// Counter rates above this (in either direction) are shown in the next unit up
pub const RESCALE_THRESHOLD: f64 = 1024.0;

// ─── Readings ───

/// One raw value from the metrics provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    Unavailable,
}

impl Reading {
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(v) if v.is_finite() => Some(v),
            _ => None,
        }
    }

    /// The reading, or 0 when the provider had nothing
    pub fn or_neutral(self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        value.map(Reading::Value).unwrap_or(Reading::Unavailable)
    }
}

impl<E> From<Result<f64, E>> for Reading {
    fn from(value: Result<f64, E>) -> Self {
        value.ok().into()
    }
}

// ─── Bounded FIFO ───

/// Fixed-capacity FIFO of samples, newest last
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity.max(1) + 1),
        }
    }

    /// Rebuild a window from persisted values, keeping only the newest `capacity`
    pub fn from_values(capacity: usize, values: impl IntoIterator<Item = f64>) -> Self {
        let mut window = Self::new(capacity);
        for v in values {
            window.push(v);
        }
        window
    }

    /// Append a sample, evicting the oldest once over capacity
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn first(&self) -> Option<f64> {
        self.values.front().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Largest magnitude in the window, 0 when empty
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    fn bump_last(&mut self, delta: f64) {
        if let Some(last) = self.values.back_mut() {
            *last += delta;
        }
    }
}

/// Windows persist as a plain JSON array; the capacity is implied by the slot
impl Serialize for SampleWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values.iter())
    }
}

// ─── Level series ───

/// Window of values drawn directly on a chart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LevelSeries(SampleWindow);

impl LevelSeries {
    pub fn new() -> Self {
        Self(SampleWindow::new(LEVEL_CAPACITY))
    }

    /// State for a client that has never polled: a single zero point
    pub fn seeded() -> Self {
        let mut series = Self::new();
        series.0.push(0.0);
        series
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        Self(SampleWindow::from_values(LEVEL_CAPACITY, values))
    }

    /// Push a point, then keep a full flat or zero-sum series drawable
    pub fn push_level(&mut self, value: f64) {
        self.0.push(value);
        if !self.0.is_full() {
            return;
        }
        let len = self.0.len() as f64;
        let sum = self.0.sum();
        let mean = sum / len;
        let first = self.0.first().unwrap_or(0.0);
        // Summing n values can drift by about n ulps of the largest one
        let tolerance = f64::EPSILON * self.0.max_abs().max(1.0) * len;
        if sum.abs() <= tolerance || (mean - first).abs() <= tolerance {
            self.0.bump_last(CHART_NUDGE);
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }
}

impl Default for LevelSeries {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Counter pairs ───

/// The two most recent readings of a cumulative counter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CounterPair(SampleWindow);

impl CounterPair {
    pub fn new() -> Self {
        Self(SampleWindow::new(COUNTER_CAPACITY))
    }

    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        Self(SampleWindow::from_values(COUNTER_CAPACITY, values))
    }

    pub fn push_counter_pair(&mut self, cumulative: f64) {
        self.0.push(cumulative);
    }

    /// (latest - previous), or None until two readings exist
    pub fn delta(&self) -> Option<f64> {
        if self.0.len() < COUNTER_CAPACITY {
            return None;
        }
        Some(self.0.last()? - self.0.first()?)
    }
}

impl Default for CounterPair {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate of change between the two readings of a counter pair.
///
/// Zero until the pair is full. Counter resets show up as a negative rate;
/// they are passed through as-is.
pub fn derive_rate(pair: &CounterPair, elapsed_secs: f64, unit_divisor: f64) -> f64 {
    if elapsed_secs <= 0.0 || unit_divisor == 0.0 {
        return 0.0;
    }
    match pair.delta() {
        Some(delta) => delta / unit_divisor / elapsed_secs,
        None => 0.0,
    }
}

// ─── Throughput units ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    KBps,
    MBps,
}

impl RateUnit {
    pub fn label(self) -> &'static str {
        match self {
            RateUnit::KBps => "KBps",
            RateUnit::MBps => "MBps",
        }
    }
}

/// An inbound/outbound rate pair sharing one display unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub inbound: f64,
    pub outbound: f64,
    pub unit: RateUnit,
}

impl Throughput {
    /// Pick the display unit for rates given in KBps. Decided fresh on every poll.
    pub fn from_kbps(inbound: f64, outbound: f64) -> Self {
        if inbound > RESCALE_THRESHOLD || outbound > RESCALE_THRESHOLD {
            Self {
                inbound: inbound / 1024.0,
                outbound: outbound / 1024.0,
                unit: RateUnit::MBps,
            }
        } else {
            Self { inbound, outbound, unit: RateUnit::KBps }
        }
    }
}
