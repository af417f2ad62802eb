//! Simulated fleet temperature monitoring backed by a workbook file.

pub mod commands;
pub mod config;
pub mod errors;
pub mod history;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod record;
pub mod registry;
pub mod sensor;
pub mod session;
pub mod sink;

pub use errors::{Error, Result, ValidationFailure};
pub use history::{HistoryStore, RETENTION_LIMIT};
pub use model::{Alert, Bounds, Reading, TruckView};
pub use monitor::Monitor;
pub use registry::{Fleet, Loaded, Truck};
pub use sensor::Sensor;
pub use session::{Credentials, Event, Notice, Session, State};
pub use sink::{TabularSink, TabularSource, Workbook, WorkbookFile};
