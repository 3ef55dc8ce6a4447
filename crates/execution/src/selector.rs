//! Test selection strategies.

use sepcheck_core::{Config, Test, TestCatalog};
use std::collections::HashSet;
use std::sync::Arc;

/// Strategy for choosing the top-level tests of a run.
pub trait TestSelector: Send + Sync {
    /// Select top-level tests from the catalog.
    fn select(&self, config: &Config, catalog: &TestCatalog) -> Vec<Arc<Test>>;
}

/// Default selector using the configured SEPs and search strings.
///
/// Tests are returned SEP by SEP in the configured order, and in
/// registration order within a SEP. With search strings present, a test is
/// kept when its group or assertion contains any of them, ignoring case.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSelector;

impl DefaultSelector {
    /// Create a new default selector.
    pub fn new() -> Self {
        Self
    }
}

impl TestSelector for DefaultSelector {
    fn select(&self, config: &Config, catalog: &TestCatalog) -> Vec<Arc<Test>> {
        let filters: Option<Vec<String>> = config
            .search_strings
            .as_ref()
            .map(|strings| strings.iter().map(|s| s.to_lowercase()).collect());

        let mut seen = HashSet::new();
        config
            .seps
            .iter()
            .copied()
            .filter(|sep| seen.insert(*sep))
            .flat_map(|sep| catalog.find_by_sep(sep))
            .filter(|test| match &filters {
                None => true,
                Some(filters) => matches_any(test, filters),
            })
            .cloned()
            .collect()
    }
}

fn matches_any(test: &Test, filters: &[String]) -> bool {
    let group = test.id.group.to_lowercase();
    let assertion = test.id.assertion.to_lowercase();
    filters
        .iter()
        .any(|filter| group.contains(filter.as_str()) || assertion.contains(filter.as_str()))
}
