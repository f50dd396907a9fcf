//! Shared data model for the match tracker.
//!
//! Holds the domain events, match records and streak types passed between the
//! ingestion, session and statistics layers, plus the rating formulas,
//! arena-name table, display helpers and CLI settings.

pub mod error;
pub mod formatting;
pub mod maps;
pub mod models;
pub mod ratings;
pub mod settings;

pub use error::{Result, TrackerError};
