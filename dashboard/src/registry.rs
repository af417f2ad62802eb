use chrono::Duration;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::history::HistoryStore;
use crate::metrics::RECORDS_SKIPPED_TOTAL;
use crate::model::Bounds;
use crate::record;
use crate::sensor::{Sensor, SEED_COUNT, SEED_INTERVAL_SECS};
use crate::sink::{Sheet, TabularSink, TabularSource};

pub const DEFAULT_FLEET_SIZE: u32 = 200;

pub fn truck_id(index: u32) -> String {
    format!("C-{:03}", index)
}

pub fn truck_label(index: u32) -> String {
    format!("JJ-KL-{:02}", index)
}

/// Index encoded in a `C-NNN` sheet name.
pub fn parse_truck_index(id: &str) -> Option<u32> {
    let digits = id.strip_prefix("C-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone)]
pub struct Truck {
    id: String,
    label: String,
    sensor: Sensor,
}

impl Truck {
    pub fn new(id: impl Into<String>, label: impl Into<String>, sensor: Sensor) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            sensor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut Sensor {
        &mut self.sensor
    }

    pub fn display_key(&self) -> String {
        format!("{} | {}", self.id, self.label)
    }

    /// Flushes this truck's sensor to its own sheet.
    pub fn persist(&self, sink: &mut impl TabularSink) -> bool {
        self.sensor.persist(sink, &self.id)
    }
}

/// Result of [`Fleet::load`]: the trucks that parsed plus the sheets that did not.
#[derive(Debug)]
pub struct Loaded {
    pub fleet: Fleet,
    pub skipped: Vec<(String, Error)>,
}

/// All trucks keyed by display key (`"C-001 | JJ-KL-01"`).
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    trucks: BTreeMap<String, Truck>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, truck: Truck) {
        self.trucks.insert(truck.display_key(), truck);
    }

    /// Creates the source with `size` default trucks, unless it already exists.
    pub fn bootstrap<S>(source: &mut S, size: u32, rng: &mut impl Rng) -> Result<bool>
    where
        S: TabularSource + TabularSink,
    {
        if source.exists() {
            return Ok(false);
        }

        info!("Bootstrapping workbook with {} trucks", size);
        let sheets = (1..=size)
            .map(|index| {
                let mut sensor = Sensor::new(index, Bounds::DEFAULT);
                sensor.generate_seed_history(
                    rng,
                    SEED_COUNT,
                    Duration::seconds(SEED_INTERVAL_SECS),
                );
                (truck_id(index), record::encode(&sensor))
            })
            .collect();

        source.write_sheets(sheets)?;
        Ok(true)
    }

    /// Builds the fleet from every sheet of `source`. Sheets that fail to
    /// parse are logged and skipped; only an unreadable source is an error.
    pub fn load(source: &impl TabularSource, rng: &mut impl Rng) -> Result<Loaded> {
        let mut fleet = Fleet::new();
        let mut skipped = Vec::new();

        for (name, sheet) in source.read_sheets()? {
            match Self::parse_truck(&name, &sheet, rng) {
                Ok(truck) => fleet.insert(truck),
                Err(e) => {
                    RECORDS_SKIPPED_TOTAL.inc();
                    warn!("Skipping sheet {}: {}", name, e);
                    skipped.push((name, e));
                }
            }
        }

        info!(
            "Loaded {} trucks ({} sheets skipped)",
            fleet.len(),
            skipped.len()
        );
        Ok(Loaded { fleet, skipped })
    }

    fn parse_truck(name: &str, sheet: &Sheet, rng: &mut impl Rng) -> Result<Truck> {
        let index = parse_truck_index(name)
            .ok_or_else(|| Error::parse(name, "sheet name is not a truck id"))?;
        let parsed = record::decode(name, sheet)?;

        let empty = parsed.history.is_empty();
        let history = HistoryStore::from_readings(parsed.history);
        let mut sensor = Sensor::with_history(parsed.serial_id, parsed.bounds, history);
        if empty {
            sensor.generate_seed_history(rng, SEED_COUNT, Duration::seconds(SEED_INTERVAL_SECS));
        }

        Ok(Truck::new(name, truck_label(index), sensor))
    }

    pub fn get(&self, key: &str) -> Result<&Truck> {
        self.trucks
            .get(key)
            .ok_or_else(|| Error::LookupMiss(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> Result<&mut Truck> {
        self.trucks
            .get_mut(key)
            .ok_or_else(|| Error::LookupMiss(key.to_string()))
    }

    /// Keys containing `needle`, ignoring case.
    pub fn filter<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a str> + 'a {
        let needle = needle.to_lowercase();
        self.trucks
            .keys()
            .filter(move |key| key.to_lowercase().contains(&needle))
            .map(String::as_str)
    }

    /// Display key of the truck with the given id, e.g. `C-007`.
    pub fn key_for_id(&self, id: &str) -> Option<&str> {
        self.trucks
            .iter()
            .find(|(_, truck)| truck.id().eq_ignore_ascii_case(id))
            .map(|(key, _)| key.as_str())
    }

    /// In-memory reading for every truck except `key`.
    pub fn simulate_all_except(&mut self, key: &str, rng: &mut impl Rng) {
        for (_, truck) in self.trucks.iter_mut().filter(|(k, _)| k.as_str() != key) {
            truck.sensor_mut().simulate_reading(rng);
        }
    }

    pub fn simulate_all(&mut self, rng: &mut impl Rng) {
        for truck in self.trucks.values_mut() {
            truck.sensor_mut().simulate_reading(rng);
        }
    }

    /// Single write of every truck's sheet.
    pub fn persist_all(&self, sink: &mut impl TabularSink) -> Result<()> {
        let sheets = self
            .trucks
            .values()
            .map(|truck| (truck.id().to_string(), record::encode(truck.sensor())))
            .collect();
        sink.write_sheets(sheets)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.trucks.keys().map(String::as_str)
    }

    pub fn trucks(&self) -> impl Iterator<Item = &Truck> + '_ {
        self.trucks.values()
    }

    pub fn len(&self) -> usize {
        self.trucks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trucks.is_empty()
    }
}
