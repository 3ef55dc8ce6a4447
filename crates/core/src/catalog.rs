//! Test catalog - the explicit registry tests are selected from.

use std::collections::HashMap;
use std::sync::Arc;

use crate::id::{Sep, TestId};
use crate::test::Test;

/// Errors raised while assembling a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two tests share an identity
    #[error("duplicate test: {0}")]
    DuplicateTest(TestId),
}

/// Registry of every known test, in registration order.
#[derive(Debug, Default)]
pub struct TestCatalog {
    tests: HashMap<TestId, Arc<Test>>,
    order: Vec<TestId>,
    by_sep: HashMap<Sep, Vec<TestId>>,
}

impl TestCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test.
    pub fn register(&mut self, test: Test) -> Result<(), CatalogError> {
        if self.tests.contains_key(&test.id) {
            return Err(CatalogError::DuplicateTest(test.id));
        }

        let id = test.id.clone();
        self.by_sep.entry(id.sep).or_default().push(id.clone());
        self.order.push(id.clone());
        self.tests.insert(id, Arc::new(test));
        Ok(())
    }

    /// Register several tests.
    pub fn register_all(
        &mut self,
        tests: impl IntoIterator<Item = Test>,
    ) -> Result<(), CatalogError> {
        for test in tests {
            self.register(test)?;
        }
        Ok(())
    }

    /// Get a test by id.
    pub fn get(&self, id: &TestId) -> Option<&Arc<Test>> {
        self.tests.get(id)
    }

    /// List all tests in registration order.
    pub fn list(&self) -> Vec<&Arc<Test>> {
        self.order.iter().filter_map(|id| self.tests.get(id)).collect()
    }

    /// Tests belonging to a SEP, in registration order.
    pub fn find_by_sep(&self, sep: Sep) -> Vec<&Arc<Test>> {
        self.by_sep
            .get(&sep)
            .into_iter()
            .flat_map(|ids| ids.iter().filter_map(|id| self.tests.get(id)))
            .collect()
    }

    /// Number of tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, TestBody, TestContext, TestOutcome};

    struct Noop;

    #[async_trait::async_trait]
    impl TestBody for Noop {
        async fn run(
            &self,
            _config: &Config,
            _ctx: &mut TestContext,
        ) -> anyhow::Result<TestOutcome> {
            Ok(TestOutcome::passed())
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut catalog = TestCatalog::new();
        let id = TestId::new(Sep::Sep1, "stellar.toml", "can be fetched");

        catalog.register(Test::new(id.clone(), Noop)).unwrap();
        let err = catalog.register(Test::new(id.clone(), Noop)).unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateTest(dup) if dup == id));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let mut catalog = TestCatalog::new();
        catalog
            .register_all([
                Test::new(TestId::new(Sep::Sep10, "auth", "z"), Noop),
                Test::new(TestId::new(Sep::Sep1, "toml", "a"), Noop),
            ])
            .unwrap();

        let ids: Vec<_> = catalog.list().into_iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].contains("auth"));
        assert!(ids[1].contains("toml"));
    }

    #[test]
    fn test_find_by_sep_keeps_order() {
        let mut catalog = TestCatalog::new();
        catalog
            .register_all([
                Test::new(TestId::new(Sep::Sep10, "auth", "b"), Noop),
                Test::new(TestId::new(Sep::Sep1, "toml", "a"), Noop),
                Test::new(TestId::new(Sep::Sep10, "auth", "a"), Noop),
            ])
            .unwrap();

        let sep10: Vec<_> = catalog
            .find_by_sep(Sep::Sep10)
            .into_iter()
            .map(|t| t.id.assertion.clone())
            .collect();
        assert_eq!(sep10, vec!["b", "a"]);
        assert!(catalog.find_by_sep(Sep::Sep31).is_empty());
    }
}
