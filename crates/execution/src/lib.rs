//! Execution layer - test selection, dependency resolution, and the runner.

#![warn(missing_docs)]

pub mod selector;
pub mod dependency;
pub mod engine;
pub mod run;

pub use selector::{TestSelector, DefaultSelector};
pub use dependency::{DependencyResolver, ResolveError};
pub use engine::Runner;
pub use run::{get_tests, run, run_tests, RunError};

#[cfg(test)]
pub(crate) mod testing;
