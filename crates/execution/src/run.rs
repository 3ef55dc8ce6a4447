//! Top-level entry points: list the tests a configuration implies, or run them.

use futures::Stream;
use sepcheck_core::{Config, ConfigError, Test, TestCatalog, TestResult};
use std::sync::Arc;
use tracing::info;

use crate::dependency::{DependencyResolver, ResolveError};
use crate::engine::Runner;
use crate::selector::{DefaultSelector, TestSelector};

/// Errors that stop a run before any test executes.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The dependency graph could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Resolve the full, ordered list of tests a configuration implies without
/// running anything.
pub fn get_tests(config: &Config, catalog: &TestCatalog) -> Result<Vec<Arc<Test>>, RunError> {
    config.validate()?;

    let selected = DefaultSelector::new().select(config, catalog);
    let tests = DependencyResolver::new(catalog).resolve(&selected)?;

    info!("{} tests selected, {} including dependencies", selected.len(), tests.len());
    Ok(tests)
}

/// Run every test the configuration selects.
pub fn run(
    config: Config,
    catalog: Arc<TestCatalog>,
) -> Result<impl Stream<Item = TestResult> + Send, RunError> {
    config.validate()?;
    let selected = DefaultSelector::new().select(&config, &catalog);
    run_tests(selected, config, catalog)
}

/// Run `tests` and their dependencies, yielding one result at a time.
///
/// Nothing executes until the stream is polled; dropping the stream stops
/// the run after the test in flight.
pub fn run_tests(
    tests: Vec<Arc<Test>>,
    config: Config,
    catalog: Arc<TestCatalog>,
) -> Result<impl Stream<Item = TestResult> + Send, RunError> {
    config.validate()?;
    DependencyResolver::new(&catalog).check_dependencies(&tests)?;

    Ok(Runner::new(tests, Arc::new(config), catalog).into_stream())
}
