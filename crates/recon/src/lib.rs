//! `georecon`: coordinate reconciliation engine for multi-year field observations.
//!
//! Pure engine crate: receives CSV text or a loaded table, returns cleaned
//! tables plus an audit report. No CLI or file IO.

pub mod audit;
pub mod cleaning;
pub mod config;
pub mod conflicts;
pub mod corrections;
pub mod distance;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod load;
pub mod model;
pub mod neighbors;
pub mod reporter;
pub mod spatial;

pub use audit::AuditReport;
pub use config::ReconConfig;
pub use engine::{run, run_csv, ReconOutcome, Stage};
pub use error::ReconError;
pub use load::load_csv;
pub use model::{Coordinate, IdentityKey, KeyPart, Table};
pub use reporter::{LogReporter, MemoryReporter, NullReporter, Reporter};
