//! Dependency resolution for tests.

use sepcheck_core::{Test, TestCatalog, TestId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Errors that abort closure computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A test reappears on its own ancestor path
    #[error("dependency cycle detected at test '{test}'")]
    Cycle {
        /// The test that depends on itself
        test: TestId,
    },

    /// A test names a dependency the catalog does not hold
    #[error("test '{test}' depends on unknown test '{dependency}'")]
    UnknownDependency {
        /// The dependent test
        test: TestId,
        /// The missing dependency
        dependency: TestId,
    },
}

/// Computes dependency closures over a catalog.
pub struct DependencyResolver<'a> {
    catalog: &'a TestCatalog,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver over a catalog.
    pub fn new(catalog: &'a TestCatalog) -> Self {
        Self { catalog }
    }

    /// Compute the ordered closure of `tests`.
    ///
    /// Every test appears once, after all of its transitive dependencies.
    pub fn resolve(&self, tests: &[Arc<Test>]) -> Result<Vec<Arc<Test>>, ResolveError> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let mut path = Vec::new();

        self.resolve_recursive(tests, &mut ordered, &mut seen, &mut path)?;

        debug!("Resolved {} requested tests into {}", tests.len(), ordered.len());
        Ok(ordered)
    }

    fn resolve_recursive(
        &self,
        tests: &[Arc<Test>],
        ordered: &mut Vec<Arc<Test>>,
        seen: &mut HashSet<TestId>,
        path: &mut Vec<TestId>,
    ) -> Result<(), ResolveError> {
        for test in tests {
            if path.contains(&test.id) {
                return Err(ResolveError::Cycle { test: test.id.clone() });
            }
            if seen.contains(&test.id) {
                continue;
            }

            if !test.dependencies.is_empty() {
                let dependencies = self.lookup_dependencies(test)?;
                path.push(test.id.clone());
                let result = self.resolve_recursive(&dependencies, ordered, seen, path);
                path.pop();
                result?;
            }

            seen.insert(test.id.clone());
            ordered.push(test.clone());
        }

        Ok(())
    }

    fn lookup_dependencies(&self, test: &Test) -> Result<Vec<Arc<Test>>, ResolveError> {
        test.dependencies
            .iter()
            .map(|dep| {
                self.catalog
                    .get(dep)
                    .cloned()
                    .ok_or_else(|| ResolveError::UnknownDependency {
                        test: test.id.clone(),
                        dependency: dep.clone(),
                    })
            })
            .collect()
    }

    /// Check that every dependency reachable from `tests` is in the catalog.
    ///
    /// Unlike [`resolve`](Self::resolve) this tolerates cycles; the runner
    /// reports those per test.
    pub fn check_dependencies(&self, tests: &[Arc<Test>]) -> Result<(), ResolveError> {
        let mut visited = HashSet::new();
        let mut pending: Vec<Arc<Test>> = tests.to_vec();

        while let Some(test) = pending.pop() {
            if !visited.insert(test.id.clone()) {
                continue;
            }
            pending.extend(self.lookup_dependencies(&test)?);
        }

        Ok(())
    }
}
