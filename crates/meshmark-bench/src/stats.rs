//! Latency measurement aggregation

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Set,
    Get,
}

/// One timed overlay operation
#[derive(Debug, Clone)]
pub struct Measurement {
    pub kind: OpKind,
    pub key: String,
    pub elapsed: Duration,
    /// Value retrieved by a get, if any
    pub value: Option<String>,
}

impl Measurement {
    pub fn set(key: String, elapsed: Duration) -> Self {
        Self {
            kind: OpKind::Set,
            key,
            elapsed,
            value: None,
        }
    }

    pub fn get(key: String, elapsed: Duration, value: Option<String>) -> Self {
        Self {
            kind: OpKind::Get,
            key,
            elapsed,
            value,
        }
    }
}

/// Mean latencies over a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub average_set: Duration,
    pub average_get: Duration,
}

/// Reduces measurements into running totals; individual measurements are
/// not retained
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_set_time: Duration,
    set_count: u32,
    total_get_time: Duration,
    get_count: u32,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, measurement: Measurement) {
        match measurement.kind {
            OpKind::Set => {
                self.total_set_time += measurement.elapsed;
                self.set_count += 1;
            }
            OpKind::Get => {
                self.total_get_time += measurement.elapsed;
                self.get_count += 1;
            }
        }
    }

    pub fn set_count(&self) -> u32 {
        self.set_count
    }

    pub fn get_count(&self) -> u32 {
        self.get_count
    }

    pub fn total_set_time(&self) -> Duration {
        self.total_set_time
    }

    pub fn total_get_time(&self) -> Duration {
        self.total_get_time
    }

    /// Mean latencies; an empty phase yields a zero average
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            average_set: self
                .total_set_time
                .checked_div(self.set_count)
                .unwrap_or_default(),
            average_get: self
                .total_get_time
                .checked_div(self.get_count)
                .unwrap_or_default(),
        }
    }
}
