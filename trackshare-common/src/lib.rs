//! # TrackShare Common Library
//!
//! Shared code for the TrackShare membership and track-lifecycle engine:
//! - Database schema initialization and row models
//! - Membership tier definitions
//! - Configuration loading and resolution
//! - Common error type
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{Account, ProcessedEvent, StoredObject, Tier, Track};
