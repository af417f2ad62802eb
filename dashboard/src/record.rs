//! Sheet layout for one sensor.
//!
//! ```text
//! row 1   Serial_ID | Umbral_Max | Umbral_Min
//! row 2   <id>      | <upper>    | <lower>
//! row 3   (empty)
//! row 4   Hora      | Valor      | LimSup     | LimInf
//! row 5+  <rfc3339> | <value>    | <upper>    | <lower>
//! ```

use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};
use crate::model::{Bounds, Reading};
use crate::sensor::Sensor;
use crate::sink::{Cell, Row, Sheet};

pub const META_HEADER: [&str; 3] = ["Serial_ID", "Umbral_Max", "Umbral_Min"];
pub const HISTORY_HEADER: [&str; 4] = ["Hora", "Valor", "LimSup", "LimInf"];

const HISTORY_HEADER_ROW: usize = 3;

/// Typed contents of one sheet, validated at parse time.
#[derive(Debug, Clone)]
pub struct SensorRecord {
    pub serial_id: u32,
    pub bounds: Bounds,
    pub history: Vec<Reading>,
}

pub fn encode(sensor: &Sensor) -> Sheet {
    let bounds = sensor.bounds();
    let mut rows: Vec<Row> = Vec::with_capacity(sensor.history().len() + 4);

    rows.push(header(&META_HEADER));
    rows.push(vec![
        Cell::Number(sensor.id() as f64),
        Cell::Number(bounds.upper()),
        Cell::Number(bounds.lower()),
    ]);
    rows.push(Vec::new());
    rows.push(header(&HISTORY_HEADER));
    rows.extend(sensor.history().iter().map(|r| {
        vec![
            Cell::Text(r.timestamp.to_rfc3339()),
            Cell::Number(r.value),
            Cell::Number(r.upper_bound),
            Cell::Number(r.lower_bound),
        ]
    }));

    Sheet { rows }
}

pub fn decode(name: &str, sheet: &Sheet) -> Result<SensorRecord> {
    let rows = &sheet.rows;

    expect_header(name, rows.first(), &META_HEADER)?;
    let meta = rows
        .get(1)
        .ok_or_else(|| Error::parse(name, "missing metadata row"))?;

    let serial = number(name, meta, 0, "Serial_ID")?;
    if serial < 0.0 || serial.fract() != 0.0 || serial > u32::MAX as f64 {
        return Err(Error::parse(name, format!("Serial_ID {} is not an id", serial)));
    }
    let upper = number(name, meta, 1, "Umbral_Max")?;
    let lower = number(name, meta, 2, "Umbral_Min")?;
    let bounds = Bounds::new(upper, lower)?;

    let mut history = Vec::new();
    if rows.len() > HISTORY_HEADER_ROW {
        expect_header(name, rows.get(HISTORY_HEADER_ROW), &HISTORY_HEADER)?;
        for row in &rows[HISTORY_HEADER_ROW + 1..] {
            if row.is_empty() {
                continue;
            }
            history.push(reading(name, row)?);
        }
    }

    Ok(SensorRecord {
        serial_id: serial as u32,
        bounds,
        history,
    })
}

fn header(names: &[&str]) -> Row {
    names.iter().map(|n| Cell::text(*n)).collect()
}

fn expect_header(name: &str, row: Option<&Row>, expected: &[&str]) -> Result<()> {
    let row = row.ok_or_else(|| Error::parse(name, format!("missing {} header", expected[0])))?;
    let matches = row.len() >= expected.len()
        && expected
            .iter()
            .zip(row)
            .all(|(want, cell)| cell.as_text() == Some(*want));
    if !matches {
        return Err(Error::parse(
            name,
            format!("expected header {}", expected.join(", ")),
        ));
    }
    Ok(())
}

fn number(name: &str, row: &Row, col: usize, field: &str) -> Result<f64> {
    let cell = row
        .get(col)
        .ok_or_else(|| Error::parse(name, format!("missing {}", field)))?;
    match cell.as_number() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(Error::parse(name, format!("{} is not a number: {:?}", field, cell))),
    }
}

fn reading(name: &str, row: &Row) -> Result<Reading> {
    let stamp = row
        .first()
        .and_then(Cell::as_text)
        .ok_or_else(|| Error::parse(name, "history row without Hora"))?;
    let timestamp = DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| Error::parse(name, format!("bad timestamp {:?}: {}", stamp, e)))?
        .with_timezone(&Utc);

    Ok(Reading {
        timestamp,
        value: number(name, row, 1, "Valor")?,
        upper_bound: number(name, row, 2, "LimSup")?,
        lower_bound: number(name, row, 3, "LimInf")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStore;
    use chrono::TimeZone;

    fn sample() -> Sensor {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let history = HistoryStore::from_readings(vec![
            Reading::new(base, 4.5, Bounds::DEFAULT),
            Reading::new(base, 11.25, Bounds::DEFAULT),
        ]);
        Sensor::with_history(42, Bounds::DEFAULT, history)
    }

    #[test]
    fn test_encoded_layout() {
        let sheet = encode(&sample());

        assert_eq!(sheet.rows.len(), 6);
        assert_eq!(sheet.rows[0][0], Cell::text("Serial_ID"));
        assert_eq!(sheet.rows[1][0], Cell::Number(42.0));
        assert!(sheet.rows[2].is_empty());
        assert_eq!(sheet.rows[3][3], Cell::text("LimInf"));
        assert_eq!(sheet.rows[5][1], Cell::Number(11.25));
    }

    #[test]
    fn test_decode_encoded_sheet() {
        let sensor = sample();
        let record = decode("C-042", &encode(&sensor)).unwrap();

        assert_eq!(record.serial_id, 42);
        assert_eq!(record.bounds, Bounds::DEFAULT);
        let original: Vec<Reading> = sensor.history().iter().cloned().collect();
        assert_eq!(record.history, original);
    }

    #[test]
    fn test_metadata_only_sheet_has_empty_history() {
        let mut sheet = encode(&sample());
        sheet.rows.truncate(2);

        let record = decode("C-042", &sheet).unwrap();
        assert!(record.history.is_empty());
    }

    #[test]
    fn test_text_numbers_are_accepted() {
        let mut sheet = encode(&sample());
        sheet.rows[1][1] = Cell::text("12.5");

        let record = decode("C-042", &sheet).unwrap();
        assert_eq!(record.bounds.upper(), 12.5);
    }

    #[test]
    fn test_malformed_records() {
        let mut missing_meta = encode(&sample());
        missing_meta.rows.truncate(1);
        assert!(matches!(
            decode("C-042", &missing_meta),
            Err(Error::Parse { .. })
        ));

        let mut bad_number = encode(&sample());
        bad_number.rows[1][2] = Cell::text("cold");
        assert!(matches!(decode("C-042", &bad_number), Err(Error::Parse { .. })));

        let mut bad_id = encode(&sample());
        bad_id.rows[1][0] = Cell::Number(4.5);
        assert!(decode("C-042", &bad_id).is_err());

        let mut inverted = encode(&sample());
        inverted.rows[1][1] = Cell::Number(-10.0);
        assert!(matches!(
            decode("C-042", &inverted),
            Err(Error::InvalidBounds { .. })
        ));

        let mut bad_header = encode(&sample());
        bad_header.rows[0][0] = Cell::text("Id");
        assert!(decode("C-042", &bad_header).is_err());

        let mut bad_stamp = encode(&sample());
        bad_stamp.rows[4][0] = Cell::text("12:00:00");
        assert!(decode("C-042", &bad_stamp).is_err());

        assert!(decode("C-042", &Sheet::default()).is_err());
    }
}
