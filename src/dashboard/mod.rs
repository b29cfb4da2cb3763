//! Dashboard sampling: turns one poll of raw readings into a chart payload
//!
//! The server keeps no history. Each chart's windows travel with the client
//! as a JSON blob; `sample` rebuilds them from the previous blob, pushes the
//! new readings and returns both the chart and the blob to hand back.
//!
//! Blob shapes:
//! - memory: `[free, used, buffers, cached]`
//! - load average: `[v0, v1, ...]`
//! - traffic / disk I/O: `[levels_in, levels_out, counter_in, counter_out]`

use serde_json::Value;
use tracing::debug;

use crate::charts::ChartPayload;
use crate::monitoring::Quantity;
use crate::sampler::{derive_rate, CounterPair, LevelSeries, Reading, Throughput};

/// Network counters are bytes; charts show KBps before any rescaling
const TRAFFIC_DIVISOR: f64 = 1024.0;

/// Disk counters are sectors; charts show sectors/s
const DISK_IO_DIVISOR: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Memory,
    LoadAverage,
    Traffic,
    DiskIo,
}

impl MetricKind {
    /// Cookie carrying this chart's state between polls
    pub fn cookie_name(self) -> &'static str {
        match self {
            MetricKind::Memory => "memory_usage",
            MetricKind::LoadAverage => "load_average",
            MetricKind::Traffic => "traffic",
            MetricKind::DiskIo => "diskrw",
        }
    }

    /// Provider readings consumed per poll, in the order `sample` expects them
    pub fn quantities(self) -> &'static [Quantity] {
        match self {
            MetricKind::Memory => &[
                Quantity::MemoryFree,
                Quantity::MemoryUsed,
                Quantity::MemoryBuffers,
                Quantity::MemoryCached,
            ],
            MetricKind::LoadAverage => &[Quantity::LoadAverage],
            MetricKind::Traffic => &[Quantity::NetworkBytesIn, Quantity::NetworkBytesOut],
            MetricKind::DiskIo => &[Quantity::DiskSectorsRead, Quantity::DiskSectorsWritten],
        }
    }
}

/// Result of one poll: what to draw and what the client should send back
#[derive(Debug, Clone)]
pub struct Sample {
    pub chart: ChartPayload,
    pub state: String,
}

/// Advance one chart by a poll.
///
/// `readings` follow `kind.quantities()`; missing entries count as unavailable.
/// `elapsed_secs` is the polling interval used to turn counter deltas into rates.
/// Never fails: unreadable state starts over, unavailable readings chart as 0.
pub fn sample(kind: MetricKind, previous: Option<&str>, readings: &[Reading], elapsed_secs: f64) -> Sample {
    let reading = |i: usize| readings.get(i).copied().unwrap_or(Reading::Unavailable);
    let previous = parse_state(kind, previous);

    match kind {
        MetricKind::Memory => {
            let mut state = MemoryState::restore(previous.as_ref());
            state.free.push_level(reading(0).or_neutral());
            state.used.push_level(reading(1).or_neutral());
            state.buffers.push_level(reading(2).or_neutral());
            state.cached.push_level(reading(3).or_neutral());

            let chart = ChartPayload::line(kind, "", vec![
                state.used.to_vec(),
                state.free.to_vec(),
                state.buffers.to_vec(),
                state.cached.to_vec(),
            ]);
            let blob = encode(&(&state.free, &state.used, &state.buffers, &state.cached));
            Sample { chart, state: blob }
        }
        MetricKind::LoadAverage => {
            let mut series = match previous.as_ref() {
                Some(value) => level_from(kind, value, "load"),
                None => LevelSeries::seeded(),
            };
            series.push_level(reading(0).or_neutral());

            let chart = ChartPayload::line(kind, "", vec![series.to_vec()]);
            Sample { chart, state: encode(&series) }
        }
        MetricKind::Traffic => {
            let mut state = CounterState::restore(kind, previous.as_ref());
            let (rate_in, rate_out) = state.advance(reading(0), reading(1), elapsed_secs, TRAFFIC_DIVISOR);
            let throughput = Throughput::from_kbps(rate_in, rate_out);
            state.levels_in.push_level(throughput.inbound);
            state.levels_out.push_level(throughput.outbound);
            state.into_sample(kind, throughput.unit.label())
        }
        MetricKind::DiskIo => {
            let mut state = CounterState::restore(kind, previous.as_ref());
            let (rate_in, rate_out) = state.advance(reading(0), reading(1), elapsed_secs, DISK_IO_DIVISOR);
            state.levels_in.push_level(rate_in);
            state.levels_out.push_level(rate_out);
            state.into_sample(kind, "")
        }
    }
}

// ─── Per-chart state ───

struct MemoryState {
    free: LevelSeries,
    used: LevelSeries,
    buffers: LevelSeries,
    cached: LevelSeries,
}

impl MemoryState {
    fn restore(previous: Option<&Value>) -> Self {
        let slot = |i: usize, name: &str| match previous {
            Some(value) => slot_level(MetricKind::Memory, value, i, name),
            None => LevelSeries::seeded(),
        };
        Self {
            free: slot(0, "free"),
            used: slot(1, "used"),
            buffers: slot(2, "buffers"),
            cached: slot(3, "cached"),
        }
    }
}

/// Two charted rates, each derived from a cumulative counter
struct CounterState {
    levels_in: LevelSeries,
    levels_out: LevelSeries,
    counter_in: CounterPair,
    counter_out: CounterPair,
}

impl CounterState {
    fn restore(kind: MetricKind, previous: Option<&Value>) -> Self {
        match previous {
            Some(value) => Self {
                levels_in: slot_level(kind, value, 0, "in"),
                levels_out: slot_level(kind, value, 1, "out"),
                counter_in: slot_counter(kind, value, 2, "in counter"),
                counter_out: slot_counter(kind, value, 3, "out counter"),
            },
            None => Self {
                levels_in: LevelSeries::seeded(),
                levels_out: LevelSeries::seeded(),
                counter_in: CounterPair::new(),
                counter_out: CounterPair::new(),
            },
        }
    }

    /// Record both counters and return their rates
    fn advance(&mut self, inbound: Reading, outbound: Reading, elapsed_secs: f64, divisor: f64) -> (f64, f64) {
        (
            counter_rate(&mut self.counter_in, inbound, elapsed_secs, divisor),
            counter_rate(&mut self.counter_out, outbound, elapsed_secs, divisor),
        )
    }

    fn into_sample(self, kind: MetricKind, label: &str) -> Sample {
        let chart = ChartPayload::line(kind, label, vec![
            self.levels_in.to_vec(),
            self.levels_out.to_vec(),
        ]);
        let blob = encode(&(&self.levels_in, &self.levels_out, &self.counter_in, &self.counter_out));
        Sample { chart, state: blob }
    }
}

/// A missing counter reading leaves the pair as it was, so the next good
/// reading is compared against the last good one rather than against zero.
fn counter_rate(pair: &mut CounterPair, reading: Reading, elapsed_secs: f64, divisor: f64) -> f64 {
    match reading.value() {
        Some(cumulative) => {
            pair.push_counter_pair(cumulative);
            derive_rate(pair, elapsed_secs, divisor)
        }
        None => 0.0,
    }
}

// ─── State decoding ───

fn parse_state(kind: MetricKind, blob: Option<&str>) -> Option<Value> {
    let blob = blob?.trim();
    if blob.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(blob) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Discarding unreadable {} state: {}", kind.cookie_name(), e);
            None
        }
    }
}

/// A JSON array made only of numbers
fn numbers(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn level_from(kind: MetricKind, value: &Value, name: &str) -> LevelSeries {
    match numbers(value) {
        Some(values) => LevelSeries::from_values(values),
        None => {
            debug!("Resetting malformed {} series in {} state", name, kind.cookie_name());
            LevelSeries::seeded()
        }
    }
}

fn slot_level(kind: MetricKind, state: &Value, index: usize, name: &str) -> LevelSeries {
    match state.get(index) {
        Some(value) => level_from(kind, value, name),
        None => {
            debug!("Resetting missing {} series in {} state", name, kind.cookie_name());
            LevelSeries::seeded()
        }
    }
}

fn slot_counter(kind: MetricKind, state: &Value, index: usize, name: &str) -> CounterPair {
    match state.get(index).and_then(numbers) {
        Some(values) => CounterPair::from_values(values),
        None => {
            debug!("Resetting malformed {} in {} state", name, kind.cookie_name());
            CounterPair::new()
        }
    }
}

fn encode<T: serde::Serialize>(state: &T) -> String {
    serde_json::to_string(state).unwrap_or_default()
}
