use crate::model::Reading;
use std::collections::VecDeque;

/// Maximum number of readings kept per sensor.
pub const RETENTION_LIMIT: usize = 100;

/// Bounded, insertion-ordered log of readings. The oldest entries are evicted
/// first once `RETENTION_LIMIT` is exceeded.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    readings: VecDeque<Reading>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            readings: VecDeque::with_capacity(RETENTION_LIMIT),
        }
    }

    pub fn from_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let mut store = Self::new();
        for reading in readings {
            store.append(reading);
        }
        store
    }

    pub fn append(&mut self, reading: Reading) {
        self.readings.push_back(reading);
        while self.readings.len() > RETENTION_LIMIT {
            self.readings.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn mean_value(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let sum: f64 = self.readings.iter().map(|r| r.value).sum();
        Some(sum / self.readings.len() as f64)
    }

    /// Readings outside the bounds recorded on them. Calling this again
    /// re-derives the sequence from the current contents.
    pub fn critical_entries(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter().filter(|r| r.is_critical())
    }

    /// Replaces the whole history, retention still applies.
    pub fn reset(&mut self, seed: impl IntoIterator<Item = Reading>) {
        self.readings.clear();
        for reading in seed {
            self.append(reading);
        }
    }

    /// Last `n` readings as `(upper, value, lower)`, oldest first.
    pub fn chart_rows(&self, n: usize) -> Vec<(f64, f64, f64)> {
        let skip = self.readings.len().saturating_sub(n);
        self.readings
            .iter()
            .skip(skip)
            .map(|r| (r.upper_bound, r.value, r.lower_bound))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
