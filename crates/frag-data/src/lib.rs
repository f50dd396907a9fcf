//! Data layer for fragtrack.
//!
//! Classifies raw diagnostic lines into domain events, analyses kill
//! timelines, loads persisted match history and folds it into aggregate
//! statistics.

pub mod aggregator;
pub mod classifier;
pub mod reader;
pub mod streaks;

pub use frag_core as core;
