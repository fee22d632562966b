//! Coldcast Core: types, errors and configuration shared by every crate.

pub mod config;
pub mod error;
pub mod schema;
pub mod types;

pub use config::{ColdStartSettings, ColdcastConfig, PollSettings};
pub use error::{Error, Result};
pub use schema::{AttributeType, DataFrequency, Schema, SchemaAttribute};
pub use types::*;
