//! The runner - executes tests depth-first and streams their results.
//!
//! The runner is a pull-based state machine: nothing runs until the caller
//! asks for the next result, and dropping the runner (or the stream built
//! from it) is all it takes to stop a run.
//!
//! ```text
//! visit test → walk dependencies → classify → run body → check context → yield
//! ```

use futures::{FutureExt, Stream};
use sepcheck_core::{
    Config, ContextStore, Failure, ResultStatus, RunId, Test, TestCatalog, TestContext, TestId,
    TestOutcome, TestResult,
};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a visit to a test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Visit {
    /// The test was pushed and runs once its dependencies are walked
    Entered,
    /// The test already ran; its cached result was applied to the dependent
    Satisfied,
    /// The test is already on the path, so a cycle is rooted at it
    Cycle(TestId),
}

/// A test whose dependencies are being walked.
struct Frame {
    test: Arc<Test>,
    next_dependency: usize,
    cycle: bool,
    skipped_dependency: bool,
    failed_dependency: Option<TestId>,
}

impl Frame {
    fn new(test: Arc<Test>) -> Self {
        Self {
            test,
            next_dependency: 0,
            cycle: false,
            skipped_dependency: false,
            failed_dependency: None,
        }
    }

    /// The next dependency to visit. A frame that caught a cycle visits no more.
    fn advance(&mut self) -> Option<TestId> {
        if self.cycle {
            return None;
        }
        let dependency = self.test.dependencies.get(self.next_dependency)?.clone();
        self.next_dependency += 1;
        Some(dependency)
    }

    /// Fold a direct dependency's result into this frame.
    fn absorb(&mut self, result: &TestResult) {
        match result.status {
            ResultStatus::Passed => {}
            ResultStatus::Skipped => self.skipped_dependency = true,
            ResultStatus::Failed(_) => {
                self.failed_dependency.get_or_insert_with(|| result.test.clone());
            }
        }
    }

    /// The status decided by dependencies alone, if they decide it.
    ///
    /// Priority: cycle, then skipped dependency, then failed dependency.
    fn preempted_status(&self) -> Option<ResultStatus> {
        if self.cycle {
            return Some(ResultStatus::Failed(Failure::dependency_cycle(&self.test.id)));
        }
        if self.skipped_dependency {
            return Some(ResultStatus::Skipped);
        }
        let dependency = self.failed_dependency.as_ref()?;
        Some(ResultStatus::Failed(Failure::failed_dependency(&self.test.id, dependency)))
    }
}

/// What the runner does next.
enum Step {
    Visit(Arc<Test>),
    Dependency(TestId),
    Complete,
}

/// Executes a set of top-level tests and all of their dependencies.
///
/// Each test runs at most once per runner. Results come out in dependency
/// order: a test is never yielded before its dependencies.
pub struct Runner {
    run_id: RunId,
    config: Arc<Config>,
    catalog: Arc<TestCatalog>,
    roots: Vec<Arc<Test>>,
    next_root: usize,
    frames: Vec<Frame>,
    ran: HashMap<TestId, TestResult>,
    store: ContextStore,
}

impl Runner {
    /// Create a runner for `tests`, resolving dependencies through `catalog`.
    pub fn new(tests: Vec<Arc<Test>>, config: Arc<Config>, catalog: Arc<TestCatalog>) -> Self {
        let run_id = RunId::new();
        info!("Starting run {} with {} top-level tests", run_id, tests.len());

        Self {
            run_id,
            config,
            catalog,
            roots: tests,
            next_root: 0,
            frames: Vec::new(),
            ran: HashMap::new(),
            store: ContextStore::new(),
        }
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The shared context store as it stands.
    pub fn context(&self) -> &ContextStore {
        &self.store
    }

    /// Number of tests that have a committed result.
    pub fn ran(&self) -> usize {
        self.ran.len()
    }

    /// Produce the next result, or `None` once every test has been handled.
    pub async fn next_result(&mut self) -> Option<TestResult> {
        loop {
            let step = match self.frames.last_mut() {
                None => {
                    let test = self.roots.get(self.next_root)?.clone();
                    self.next_root += 1;
                    Step::Visit(test)
                }
                Some(frame) => match frame.advance() {
                    Some(dependency) => Step::Dependency(dependency),
                    None => Step::Complete,
                },
            };

            match step {
                Step::Visit(test) => self.enter(test),
                Step::Dependency(id) => match self.catalog.get(&id).cloned() {
                    Some(dependency) => self.enter(dependency),
                    None => {
                        warn!("Unknown dependency {} treated as failed", id);
                        if let Some(frame) = self.frames.last_mut() {
                            frame.failed_dependency.get_or_insert(id);
                        }
                    }
                },
                Step::Complete => {
                    let Some(frame) = self.frames.pop() else {
                        continue;
                    };
                    let result = self.complete(frame).await;
                    if let Some(parent) = self.frames.last_mut() {
                        parent.absorb(&result);
                    }
                    return Some(result);
                }
            }
        }
    }

    /// Turn the runner into a lazy stream of results.
    pub fn into_stream(self) -> impl Stream<Item = TestResult> + Send {
        futures::stream::unfold(self, |mut runner| async move {
            let result = runner.next_result().await?;
            Some((result, runner))
        })
    }

    fn enter(&mut self, test: Arc<Test>) {
        if let Visit::Cycle(root) = self.visit(test) {
            self.unwind_to(&root);
        }
    }

    fn visit(&mut self, test: Arc<Test>) -> Visit {
        if self.frames.iter().any(|frame| frame.test.id == test.id) {
            return Visit::Cycle(test.id.clone());
        }

        if let Some(cached) = self.ran.get(&test.id) {
            if let Some(parent) = self.frames.last_mut() {
                parent.absorb(cached);
            }
            return Visit::Satisfied;
        }

        self.frames.push(Frame::new(test));
        Visit::Entered
    }

    /// Discard the frames above the cycle root and flag the root.
    fn unwind_to(&mut self, root: &TestId) {
        let Some(position) = self.frames.iter().position(|frame| &frame.test.id == root) else {
            return;
        };

        for frame in self.frames.drain(position + 1..) {
            debug!("Abandoning {} inside cycle rooted at {}", frame.test.id, root);
        }
        if let Some(frame) = self.frames.get_mut(position) {
            frame.cycle = true;
        }
    }

    async fn complete(&mut self, frame: Frame) -> TestResult {
        let test = frame.test.clone();

        let result = match frame.preempted_status() {
            Some(status) => TestResult::synthetic(test.id.clone(), status),
            None => match self.prepare_context(&test) {
                Ok(ctx) => self.execute(&test, ctx).await,
                Err(key) => {
                    // Not committed to `ran`: the key may still appear on a later path.
                    let failure = Failure::missing_expected_context(&test.id, &key);
                    let result =
                        TestResult::synthetic(test.id.clone(), ResultStatus::Failed(failure));
                    log_result(&result);
                    return result;
                }
            },
        };

        self.ran.insert(test.id.clone(), result.clone());
        log_result(&result);
        result
    }

    /// Copy the test's expected keys out of the store, or name the first
    /// missing one.
    fn prepare_context(&self, test: &Test) -> Result<TestContext, String> {
        let mut ctx = TestContext::new();
        for key in &test.context.expects {
            let value = self.store.get(key).ok_or_else(|| key.clone())?;
            ctx.set_expected(key.clone(), value.clone());
        }
        Ok(ctx)
    }

    async fn execute(&mut self, test: &Test, mut ctx: TestContext) -> TestResult {
        debug!("Run {}: running {}", self.run_id, test.id);
        let started_at = chrono::Utc::now();
        let timer = Instant::now();

        let outcome = AssertUnwindSafe(test.body().run(&self.config, &mut ctx))
            .catch_unwind()
            .await;
        let duration = timer.elapsed();

        let outcome = match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                warn!("Test {} returned an error: {:#}", test.id, error);
                let message = format!("{:#}", error);
                TestOutcome::passed().fail(Failure::unexpected_exception(&test.id, &message))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Test {} panicked: {}", test.id, message);
                TestOutcome::passed().fail(Failure::unexpected_exception(&test.id, &message))
            }
        };

        let mut status = outcome.status;
        if matches!(status, ResultStatus::Passed) {
            let missing = test
                .context
                .provides
                .iter()
                .find(|key| ctx.provided(key).is_none());
            match missing {
                Some(key) => {
                    let failure = Failure::missing_provided_context(&test.id, key);
                    status = ResultStatus::Failed(failure);
                }
                None => self.store.merge(ctx.into_provided()),
            }
        }

        TestResult {
            test: test.id.clone(),
            status,
            network_calls: outcome.network_calls,
            started_at,
            duration,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test body panicked".to_string()
    }
}

fn log_result(result: &TestResult) {
    match &result.status {
        ResultStatus::Passed => debug!("PASS {}", result.test),
        ResultStatus::Skipped => debug!("SKIP {}", result.test),
        ResultStatus::Failed(failure) => debug!("FAIL {} ({})", result.test, failure.name),
    }
}
