use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Error, Result};

/// One temperature measurement together with the bounds in effect when it was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64, bounds: Bounds) -> Self {
        Self {
            timestamp,
            value,
            upper_bound: bounds.upper(),
            lower_bound: bounds.lower(),
        }
    }

    /// Classification against the bounds recorded on the reading itself.
    pub fn alert(&self) -> Alert {
        Alert::for_value(self.value, self.upper_bound, self.lower_bound)
    }

    pub fn is_critical(&self) -> bool {
        self.alert() != Alert::Normal
    }
}

/// Alert thresholds, always with `upper > lower`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    upper: f64,
    lower: f64,
}

impl Bounds {
    pub const DEFAULT: Bounds = Bounds {
        upper: 10.0,
        lower: -5.0,
    };

    pub fn new(upper: f64, lower: f64) -> Result<Self> {
        if !upper.is_finite() || !lower.is_finite() || upper <= lower {
            return Err(Error::InvalidBounds { upper, lower });
        }
        Ok(Self { upper, lower })
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alert {
    Normal,
    Overheat,
    Freeze,
}

impl Alert {
    pub fn for_value(value: f64, upper: f64, lower: f64) -> Self {
        if value > upper {
            Alert::Overheat
        } else if value < lower {
            Alert::Freeze
        } else {
            Alert::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alert::Normal => "normal",
            Alert::Overheat => "overheat",
            Alert::Freeze => "freeze",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the selected truck, handed to whatever renders the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct TruckView {
    pub key: String,
    pub sensor_id: u32,
    pub bounds: Bounds,
    pub latest: Option<Reading>,
    pub alert: Option<Alert>,
    pub mean: Option<f64>,
    pub critical: usize,
    pub total: usize,
    /// `(upper, value, lower)` per reading, oldest first
    pub chart: Vec<(f64, f64, f64)>,
}
