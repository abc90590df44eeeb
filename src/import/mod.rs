//! Bulk product import: spreadsheet rows in, products plus category links out, with a
//! per-row report.

pub mod config;
pub mod csv_source;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod row;
pub mod upsert;

pub use config::ImportConfig;
pub use error::{ErrorKind, RowError};
pub use orchestrator::{BatchImporter, ImportReport, ReportStatus, RowOutcome, RowStage};
pub use row::{Cell, RawRow};
