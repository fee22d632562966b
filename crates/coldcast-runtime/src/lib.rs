//! Workflow runtime: drives the cold-start scenario end to end.
//!
//! Stages the prepared CSVs, creates every remote resource in order, waits
//! for each to become ACTIVE, queries and exports the forecast, and tears
//! everything down again in reverse creation order.

pub mod staging;
pub mod types;
pub mod workflow;

pub use staging::{prepare_inputs, PreparedInputs};
pub use types::*;
pub use workflow::WorkflowContext;
