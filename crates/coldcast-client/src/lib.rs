//! Clients for the managed forecasting service and object storage.
//!
//! `ForecastApi` and `ObjectStore` are the seams the workflow talks to.
//! `HttpForecastClient` and `S3ObjectStore` speak the real wire protocols
//! with SigV4 signing; `LocalObjectStore` and `SimulatedForecastService`
//! run the whole flow in-process for dry runs and tests.

pub mod api;
pub mod forecast;
mod http;
pub mod sigv4;
pub mod simulated;
pub mod storage;

pub use api::*;
pub use forecast::HttpForecastClient;
pub use sigv4::Credentials;
pub use simulated::SimulatedForecastService;
pub use storage::{LocalObjectStore, ObjectStore, S3ObjectStore};
