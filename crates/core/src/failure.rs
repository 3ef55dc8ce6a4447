//! Failure taxonomy - symbolic failure codes and their message templates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::id::TestId;

/// Names of the failures the execution engine synthesizes itself.
pub mod names {
    /// A test transitively depends on itself
    pub const DEPENDENCY_CYCLE: &str = "DEPENDENCY_CYCLE";
    /// A dependency of the test failed
    pub const FAILED_DEPENDENCY: &str = "FAILED_DEPENDENCY";
    /// A required context key was absent before the run
    pub const MISSING_EXPECTED_CONTEXT: &str = "MISSING_EXPECTED_CONTEXT";
    /// A promised context key was absent after the run
    pub const MISSING_PROVIDED_CONTEXT: &str = "MISSING_PROVIDED_CONTEXT";
    /// The test body returned an error or panicked
    pub const UNEXPECTED_EXCEPTION: &str = "UNEXPECTED_EXCEPTION";

    /// Every code the engine reports on a test's behalf.
    pub const ENGINE: [&str; 5] = [
        DEPENDENCY_CYCLE,
        FAILED_DEPENDENCY,
        MISSING_EXPECTED_CONTEXT,
        MISSING_PROVIDED_CONTEXT,
        UNEXPECTED_EXCEPTION,
    ];
}

/// A failure attached to a test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Symbolic failure code
    pub name: String,

    /// Rendered human-readable message
    pub text: String,

    /// Expected value, when the assertion compares values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,

    /// Actual value, when the assertion compares values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,

    /// The related test for dependency and cycle failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<TestId>,
}

impl Failure {
    /// Create a failure with a name and rendered text.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            expected: None,
            actual: None,
            related: None,
        }
    }

    /// Attach expected and actual values.
    pub fn with_values(
        mut self,
        expected: impl Into<serde_json::Value>,
        actual: impl Into<serde_json::Value>,
    ) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Attach the related test.
    pub fn with_related(mut self, related: TestId) -> Self {
        self.related = Some(related);
        self
    }

    /// The test is part of a dependency cycle rooted at itself.
    pub fn dependency_cycle(test: &TestId) -> Self {
        Self::new(
            names::DEPENDENCY_CYCLE,
            format!("A dependency cycle was detected for test '{}'", test),
        )
        .with_related(test.clone())
    }

    /// A dependency failed, so the test was not run.
    pub fn failed_dependency(test: &TestId, dependency: &TestId) -> Self {
        Self::new(
            names::FAILED_DEPENDENCY,
            format!(
                "Test '{}' was not run because its dependency '{}' failed",
                test, dependency
            ),
        )
        .with_related(dependency.clone())
    }

    /// A context key the test expects was not present.
    pub fn missing_expected_context(test: &TestId, key: &str) -> Self {
        Self::new(
            names::MISSING_EXPECTED_CONTEXT,
            format!(
                "Test '{}' expects context key '{}' but no earlier test provided it",
                test, key
            ),
        )
    }

    /// A context key the test promised was not provided.
    pub fn missing_provided_context(test: &TestId, key: &str) -> Self {
        Self::new(
            names::MISSING_PROVIDED_CONTEXT,
            format!(
                "Test '{}' completed but did not provide context key '{}'",
                test, key
            ),
        )
    }

    /// The test body raised an error instead of returning a failure.
    pub fn unexpected_exception(test: &TestId, message: &str) -> Self {
        Self::new(
            names::UNEXPECTED_EXCEPTION,
            format!("Test '{}' raised an unexpected exception: {}", test, message),
        )
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.text)
    }
}

/// A failure mode declared by a test author.
///
/// Templates use `{name}` placeholders that are filled from arguments at
/// render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMode {
    /// Symbolic failure code
    pub name: String,

    /// Message template
    pub template: String,
}

impl FailureMode {
    /// Create a new failure mode.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    /// Render the template, replacing each `{key}` with its argument.
    pub fn render(&self, args: &[(&str, &str)]) -> String {
        let mut text = self.template.clone();
        for (key, value) in args {
            text = text.replace(&format!("{{{}}}", key), value);
        }
        text
    }

    /// Build a failure from this mode.
    pub fn failure(&self, args: &[(&str, &str)]) -> Failure {
        Failure::new(self.name.clone(), self.render(args))
    }
}

/// Failure modes a test may report, keyed by code.
#[derive(Debug, Clone, Default)]
pub struct FailureCatalog {
    modes: HashMap<String, FailureMode>,
}

impl FailureCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a failure mode, replacing any mode with the same name.
    pub fn insert(&mut self, mode: FailureMode) {
        self.modes.insert(mode.name.clone(), mode);
    }

    /// Look up a failure mode.
    pub fn get(&self, name: &str) -> Option<&FailureMode> {
        self.modes.get(name)
    }

    /// Whether a result failing with `name` is accounted for: the code is
    /// declared here or is one the engine reports itself.
    pub fn covers(&self, name: &str) -> bool {
        self.modes.contains_key(name) || names::ENGINE.contains(&name)
    }

    /// Declared modes, sorted by name.
    pub fn modes(&self) -> Vec<&FailureMode> {
        let mut modes: Vec<_> = self.modes.values().collect();
        modes.sort_by(|a, b| a.name.cmp(&b.name));
        modes
    }

    /// Render a failure by code.
    ///
    /// An undeclared code still produces a failure carrying the code as its
    /// text, so a typo in a test body never hides the failure itself.
    pub fn failure(&self, name: &str, args: &[(&str, &str)]) -> Failure {
        match self.modes.get(name) {
            Some(mode) => mode.failure(args),
            None => Failure::new(name, name),
        }
    }

    /// Number of declared modes.
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Whether no modes are declared.
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}
