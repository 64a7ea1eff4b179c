//! NFL game prediction and betting recommendation service.
//!
//! The pipeline runs fetch -> normalize -> analyze -> score -> recommend,
//! with a sqlite cache store between the service and the upstream API.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod market;
pub mod models;
pub mod predictor;
pub mod schedule;
pub mod scoring;
pub mod stats;
pub mod store;

pub use config::Config;
pub use error::{GridironError, Result};
pub use fetcher::{ApiClient, DataFetcher};
pub use predictor::Predictor;
pub use schedule::ScheduleManager;
pub use store::CacheStore;
