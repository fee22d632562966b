//! Resource lifecycle waiter.
//!
//! Every remote resource in the workflow is created asynchronously and must
//! be polled until it settles. `Waiter` runs that polling loop with a fixed
//! interval and an optional deadline, and reports success, failure and
//! timeout as distinct outcomes.

pub mod waiter;

pub use waiter::{StatusBearing, StatusSets, WaitOutcome, WaitPolicy, WaitReport, Waiter};
