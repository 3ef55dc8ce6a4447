//! sepcheck core data models.
//!
//! This crate defines the tests, results, context and configuration that the
//! execution engine schedules and the SEP catalog populates.

#![warn(missing_docs)]

// Core identities
mod id;

mod catalog;
mod failure;

// Execution data
mod context;
mod result;

// Configuration
pub mod config;

// Re-exports
pub use id::*;

// Tests & catalog
pub use test::{Test, TestBody, TestOutcome, ContextSpec};
pub use catalog::{TestCatalog, CatalogError};
pub use failure::{Failure, FailureMode, FailureCatalog, names as failure_names};

// Context & results
pub use context::{ContextStore, ContextError, TestContext};
pub use result::{TestResult, ResultStatus, NetworkCall, NetworkRequest, NetworkResponse, RunStats};

// Configuration
pub use config::{Config, ConfigError, SepConfig};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
