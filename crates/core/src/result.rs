//! Test results and the network exchanges recorded while producing them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::failure::Failure;
use crate::id::TestId;
use crate::Time;

/// Final status of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum ResultStatus {
    /// The test ran and every assertion held
    Passed,

    /// The test failed, or was not run because of an engine-detected problem
    Failed(Failure),

    /// The test was not run; not counted as a failure
    Skipped,
}

/// Outcome record for one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// The originating test
    pub test: TestId,

    /// Final status
    #[serde(flatten)]
    pub status: ResultStatus,

    /// Requests made while running the test
    pub network_calls: Vec<NetworkCall>,

    /// When the result was produced or the body started
    pub started_at: Time,

    /// Time spent in the body (zero for synthesized results)
    pub duration: Duration,
}

impl TestResult {
    /// Create a result the engine produced without running the body.
    pub fn synthetic(test: TestId, status: ResultStatus) -> Self {
        Self {
            test,
            status,
            network_calls: Vec::new(),
            started_at: chrono::Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match &self.status {
            ResultStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the test failed.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ResultStatus::Failed(_))
    }

    /// Whether the test was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ResultStatus::Skipped)
    }

    /// Whether the test passed.
    pub fn is_passed(&self) -> bool {
        matches!(self.status, ResultStatus::Passed)
    }
}

/// One request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCall {
    /// The request sent
    pub request: NetworkRequest,

    /// The response, if one was received
    pub response: Option<NetworkResponse>,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// HTTP method
    pub method: String,

    /// Full URL
    pub url: String,

    /// Request headers
    pub headers: BTreeMap<String, String>,

    /// Request body
    pub body: Option<String>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: BTreeMap<String, String>,

    /// Response body
    pub body: Option<String>,
}

/// Running totals over a stream of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Passed tests
    pub passed: usize,

    /// Failed tests
    pub failed: usize,

    /// Skipped tests
    pub skipped: usize,
}

impl RunStats {
    /// Count one result.
    pub fn record(&mut self, result: &TestResult) {
        match result.status {
            ResultStatus::Passed => self.passed += 1,
            ResultStatus::Failed(_) => self.failed += 1,
            ResultStatus::Skipped => self.skipped += 1,
        }
    }

    /// Total results counted.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Whether nothing failed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
