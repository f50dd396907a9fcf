//! Runtime layer for fragtrack.
//!
//! Owns the match-in-progress state machine, drives it line by line, persists
//! finished matches and runs the async live tracker.

pub mod batcher;
pub mod driver;
pub mod session;
pub mod store;
pub mod tracker;

pub use frag_core as core;
pub use frag_data as data;
