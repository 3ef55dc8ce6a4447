//! Scripted test bodies shared by the unit tests in this crate.

use async_trait::async_trait;
use serde_json::Value;
use sepcheck_core::{Config, Failure, Sep, TestBody, TestContext, TestId, TestOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a scripted body finishes.
#[derive(Debug, Clone)]
pub(crate) enum Finish {
    Pass,
    Fail(&'static str),
    Skip,
    Error(&'static str),
    Panic(&'static str),
}

/// A body that records its invocations and does what it is told.
#[derive(Clone)]
pub(crate) struct Scripted {
    finish: Finish,
    provide: Vec<(String, Value)>,
    calls: Arc<AtomicUsize>,
    observed: Arc<Mutex<Vec<(String, Option<Value>)>>>,
    watch: Vec<String>,
}

impl Scripted {
    pub(crate) fn new(finish: Finish) -> Self {
        Self {
            finish,
            provide: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            observed: Arc::new(Mutex::new(Vec::new())),
            watch: Vec::new(),
        }
    }

    pub(crate) fn pass() -> Self {
        Self::new(Finish::Pass)
    }

    /// Write a context value before finishing.
    pub(crate) fn providing(mut self, key: &str, value: Value) -> Self {
        self.provide.push((key.to_string(), value));
        self
    }

    /// Record what the expected view holds for `key` when the body runs.
    pub(crate) fn watching(mut self, key: &str) -> Self {
        self.watch.push(key.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn observed(&self) -> Vec<(String, Option<Value>)> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestBody for Scripted {
    async fn run(&self, _config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut observed = self.observed.lock().unwrap();
            for key in &self.watch {
                observed.push((key.clone(), ctx.expected(key).cloned()));
            }
        }
        for (key, value) in &self.provide {
            ctx.provide(key.clone(), value.clone());
        }

        match &self.finish {
            Finish::Pass => Ok(TestOutcome::passed()),
            Finish::Fail(code) => {
                Ok(TestOutcome::passed().fail(Failure::new(*code, "assertion failed")))
            }
            Finish::Skip => Ok(TestOutcome::passed().skip()),
            Finish::Error(message) => Err(anyhow::anyhow!(*message)),
            Finish::Panic(message) => panic!("{}", message),
        }
    }
}

pub(crate) fn id(name: &str) -> TestId {
    TestId::new(Sep::Sep1, "graph", name)
}

pub(crate) fn config() -> Config {
    Config::new(url::Url::parse("https://anchor.test").unwrap(), [Sep::Sep1])
}
