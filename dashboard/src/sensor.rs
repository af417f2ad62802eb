use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::history::HistoryStore;
use crate::metrics::{ALERTS_TOTAL, READINGS_TOTAL, SINK_FAILURES_TOTAL};
use crate::model::{Alert, Bounds, Reading};
use crate::record;
use crate::sink::TabularSink;

pub const SEED_COUNT: usize = 10;
pub const SEED_INTERVAL_SECS: i64 = 5;

/// How far past each bound simulated values may land. Out-of-range readings
/// are expected, that is what the alerts are for.
pub const SIMULATION_MARGIN: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Sensor {
    id: u32,
    bounds: Bounds,
    history: HistoryStore,
}

impl Sensor {
    pub fn new(id: u32, bounds: Bounds) -> Self {
        Self::with_history(id, bounds, HistoryStore::new())
    }

    pub fn with_history(id: u32, bounds: Bounds, history: HistoryStore) -> Self {
        Self {
            id,
            bounds,
            history,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn generate_seed_history(&mut self, rng: &mut impl Rng, count: usize, interval: Duration) {
        self.generate_seed_history_at(rng, count, interval, Utc::now());
    }

    /// Appends `count` in-bounds readings spaced `interval` apart, the last
    /// one falling `interval` before `now`.
    pub fn generate_seed_history_at(
        &mut self,
        rng: &mut impl Rng,
        count: usize,
        interval: Duration,
        now: DateTime<Utc>,
    ) {
        for reading in self.seed_readings(rng, count, interval, now) {
            self.history.append(reading);
        }
    }

    fn seed_readings(
        &self,
        rng: &mut impl Rng,
        count: usize,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Vec<Reading> {
        (0..count)
            .map(|i| {
                let value = rng.gen_range(self.bounds.lower()..=self.bounds.upper());
                let timestamp = now - interval * (count - i) as i32;
                Reading::new(timestamp, value, self.bounds)
            })
            .collect()
    }

    pub fn simulate_reading(&mut self, rng: &mut impl Rng) -> Reading {
        self.simulate_reading_at(rng, Utc::now())
    }

    pub fn simulate_reading_at(&mut self, rng: &mut impl Rng, now: DateTime<Utc>) -> Reading {
        let low = self.bounds.lower() - SIMULATION_MARGIN;
        let high = self.bounds.upper() + SIMULATION_MARGIN;
        let reading = Reading::new(now, rng.gen_range(low..=high), self.bounds);

        let alert = self.classify(&reading);
        READINGS_TOTAL.inc();
        if alert != Alert::Normal {
            ALERTS_TOTAL.with_label_values(&[alert.as_str()]).inc();
        }
        debug!(
            "Sensor {} reading {:.2} ({})",
            self.id, reading.value, alert
        );

        self.history.append(reading.clone());
        reading
    }

    pub fn classify(&self, reading: &Reading) -> Alert {
        Alert::for_value(reading.value, self.bounds.upper(), self.bounds.lower())
    }

    /// Replaces the history with a fresh default seed set.
    pub fn reset(&mut self, rng: &mut impl Rng) {
        let seed = self.seed_readings(
            rng,
            SEED_COUNT,
            Duration::seconds(SEED_INTERVAL_SECS),
            Utc::now(),
        );
        self.history.reset(seed);
    }

    /// Best-effort flush of this sensor to the sheet named `key`. Returns
    /// whether the write went through; failures are only logged.
    pub fn persist(&self, sink: &mut impl TabularSink, key: &str) -> bool {
        match sink.write_sheet(key, record::encode(self)) {
            Ok(()) => true,
            Err(e) => {
                SINK_FAILURES_TOTAL.inc();
                warn!("Skipping write of sheet {}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Error, Result};
    use crate::sink::{Sheet, Workbook};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct LockedSink;

    impl TabularSink for LockedSink {
        fn write_sheets(&mut self, _sheets: Vec<(String, Sheet)>) -> Result<()> {
            Err(Error::SinkUnavailable(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "locked by another process",
            )))
        }
    }

    fn sensor() -> Sensor {
        Sensor::new(1, Bounds::DEFAULT)
    }

    fn at(value: f64) -> Reading {
        Reading::new(Utc::now(), value, Bounds::DEFAULT)
    }

    #[test]
    fn test_classify() {
        let sensor = sensor();
        assert_eq!(sensor.classify(&at(12.0)), Alert::Overheat);
        assert_eq!(sensor.classify(&at(-6.0)), Alert::Freeze);
        assert_eq!(sensor.classify(&at(3.0)), Alert::Normal);
    }

    #[test]
    fn test_classify_uses_sensor_bounds() {
        let sensor = Sensor::new(2, Bounds::new(0.0, -20.0).unwrap());
        // recorded under the default bounds, but judged against the sensor's
        assert_eq!(sensor.classify(&at(3.0)), Alert::Overheat);
    }

    #[test]
    fn test_simulate_reading_range_and_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sensor = sensor();
        let mut min = f64::MAX;
        let mut max = f64::MIN;

        for _ in 0..10_000 {
            let reading = sensor.simulate_reading(&mut rng);
            assert!(reading.value >= -7.0 && reading.value <= 12.0);
            min = min.min(reading.value);
            max = max.max(reading.value);
        }

        assert!(max - min > 10.0, "spread too small: {} .. {}", min, max);
        assert_eq!(sensor.history().len(), crate::history::RETENTION_LIMIT);
    }

    #[test]
    fn test_seed_history_timestamps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sensor = sensor();
        let now = Utc::now();
        let interval = Duration::seconds(5);

        sensor.generate_seed_history_at(&mut rng, 10, interval, now);

        let readings: Vec<&Reading> = sensor.history().iter().collect();
        assert_eq!(readings.len(), 10);
        assert!(readings
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(readings[0].timestamp, now - Duration::seconds(50));
        assert_eq!(readings[9].timestamp, now - interval);
        assert!(readings
            .iter()
            .all(|r| r.value >= -5.0 && r.value <= 10.0));
    }

    #[test]
    fn test_reset_replaces_history() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sensor = sensor();
        for _ in 0..40 {
            sensor.simulate_reading(&mut rng);
        }

        sensor.reset(&mut rng);

        assert_eq!(sensor.history().len(), SEED_COUNT);
        assert_eq!(sensor.history().critical_entries().count(), 0);
    }

    #[test]
    fn test_persist_failure_does_not_propagate() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut sensor = sensor();
        sensor.simulate_reading(&mut rng);

        assert!(!sensor.persist(&mut LockedSink, "C-001"));
        assert_eq!(sensor.history().len(), 1);

        let reading = sensor.simulate_reading(&mut rng);
        assert_eq!(sensor.history().latest(), Some(&reading));
    }

    #[test]
    fn test_persist_overwrites_sheet() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut sensor = sensor();
        let mut workbook = Workbook::default();

        sensor.simulate_reading(&mut rng);
        assert!(sensor.persist(&mut workbook, "C-001"));
        sensor.simulate_reading(&mut rng);
        assert!(sensor.persist(&mut workbook, "C-001"));

        let sheet = workbook.sheet("C-001").unwrap();
        let parsed = record::decode("C-001", sheet).unwrap();
        assert_eq!(parsed.history.len(), 2);
        assert_eq!(workbook.len(), 1);
    }
}
