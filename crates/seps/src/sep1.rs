//! SEP-1: stellar.toml.

use async_trait::async_trait;
use sepcheck_core::config::is_public_key;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::http::Fetcher;
use crate::{get, keys, Declare, Mode, CONNECTION_ERROR};

pub(crate) const GROUP: &str = "stellar.toml";

/// Largest stellar.toml accepted, in bytes.
const MAX_TOML_SIZE: usize = 100 * 1024;

const TOML_NOT_FOUND: Mode = Mode::new("TOML_NOT_FOUND", "{url} returned status {status}");
const INVALID_TOML: Mode = Mode::new("INVALID_TOML", "stellar.toml could not be parsed: {error}");
const TOML_TOO_LARGE: Mode = Mode::new(
    "TOML_TOO_LARGE",
    "stellar.toml is {size} bytes, the limit is {limit}",
);
const NO_CORS_HEADERS: Mode = Mode::new(
    "NO_CORS_HEADERS",
    "no Access-Control-Allow-Origin header on {url}",
);
const INCORRECT_CORS_HEADER: Mode = Mode::new(
    "INCORRECT_CORS_HEADER",
    "Access-Control-Allow-Origin must be '*', got '{value}'",
);
const NO_NETWORK_PASSPHRASE: Mode = Mode::new(
    "NO_NETWORK_PASSPHRASE",
    "NETWORK_PASSPHRASE is missing or empty",
);
const NO_SIGNING_KEY: Mode = Mode::new(
    "NO_SIGNING_KEY",
    "SIGNING_KEY is required when SEP-10 is offered",
);
const INVALID_SIGNING_KEY: Mode = Mode::new(
    "INVALID_SIGNING_KEY",
    "SIGNING_KEY is not a public key: {value}",
);
const INVALID_ACCOUNTS: Mode = Mode::new(
    "INVALID_ACCOUNTS",
    "ACCOUNTS must be a list of public keys, found {value}",
);

/// Identity of the test that fetches stellar.toml.
pub(crate) fn fetched() -> TestId {
    TestId::new(Sep::Sep1, GROUP, "can be fetched")
}

fn toml_url(config: &Config) -> anyhow::Result<Url> {
    Ok(config.home_domain.join("/.well-known/stellar.toml")?)
}

/// Fetches and parses stellar.toml.
pub(crate) struct FetchToml {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for FetchToml {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let url = toml_url(config)?;

        let fetched = match get(&self.fetcher, &url, config, &mut outcome).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        if fetched.status != 200 {
            let status = fetched.status.to_string();
            let failure = TOML_NOT_FOUND.failure(&[("url", url.as_str()), ("status", &status)]);
            return Ok(outcome.fail(failure));
        }

        let table = match toml::from_str::<toml::Table>(&fetched.body) {
            Ok(table) => table,
            Err(error) => {
                let error = error.to_string();
                return Ok(outcome.fail(INVALID_TOML.failure(&[("error", error.trim())])));
            }
        };
        debug!("stellar.toml has {} top-level keys", table.len());

        ctx.provide(keys::TOML, serde_json::to_value(table)?);
        ctx.provide(keys::TOML_CONTENTS, fetched.body);
        Ok(outcome)
    }
}

/// Checks the stellar.toml size limit.
pub(crate) struct TomlSize;

#[async_trait]
impl TestBody for TomlSize {
    async fn run(&self, _config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let size = ctx.require_str(keys::TOML_CONTENTS)?.len();
        if size > MAX_TOML_SIZE {
            let failure = TOML_TOO_LARGE.failure(&[
                ("size", &size.to_string()),
                ("limit", &MAX_TOML_SIZE.to_string()),
            ]);
            return Ok(TestOutcome::passed().fail(failure));
        }
        Ok(TestOutcome::passed())
    }
}

/// Checks that stellar.toml can be read cross-origin.
pub(crate) struct Cors {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for Cors {
    async fn run(&self, config: &Config, _ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let url = toml_url(config)?;

        let fetched = match get(&self.fetcher, &url, config, &mut outcome).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        match fetched.header("access-control-allow-origin") {
            None => Ok(outcome.fail(NO_CORS_HEADERS.failure(&[("url", url.as_str())]))),
            Some("*") => Ok(outcome),
            Some(value) => Ok(outcome.fail(INCORRECT_CORS_HEADER.failure(&[("value", value)]))),
        }
    }
}

/// Checks `NETWORK_PASSPHRASE`.
pub(crate) struct NetworkPassphrase;

#[async_trait]
impl TestBody for NetworkPassphrase {
    async fn run(&self, _config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let toml = ctx.require(keys::TOML)?;
        match toml.get("NETWORK_PASSPHRASE").and_then(|v| v.as_str()) {
            Some(passphrase) if !passphrase.trim().is_empty() => Ok(TestOutcome::passed()),
            _ => Ok(TestOutcome::passed().fail(NO_NETWORK_PASSPHRASE.failure(&[]))),
        }
    }
}

/// Checks `SIGNING_KEY`, which only SEP-10 servers must publish.
pub(crate) struct SigningKey;

#[async_trait]
impl TestBody for SigningKey {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let toml = ctx.require(keys::TOML)?;
        match toml.get("SIGNING_KEY") {
            None if config.seps.contains(&Sep::Sep10) => {
                Ok(TestOutcome::passed().fail(NO_SIGNING_KEY.failure(&[])))
            }
            None => Ok(TestOutcome::passed().skip()),
            Some(value) => match value.as_str() {
                Some(key) if is_public_key(key) => Ok(TestOutcome::passed()),
                _ => {
                    let value = value.to_string();
                    let failure = INVALID_SIGNING_KEY.failure(&[("value", &value)]);
                    Ok(TestOutcome::passed().fail(failure))
                }
            },
        }
    }
}

/// Checks `ACCOUNTS` when present.
pub(crate) struct Accounts;

#[async_trait]
impl TestBody for Accounts {
    async fn run(&self, _config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let toml = ctx.require(keys::TOML)?;
        let Some(accounts) = toml.get("ACCOUNTS") else {
            return Ok(TestOutcome::passed().skip());
        };

        let valid = accounts
            .as_array()
            .map(|list| list.iter().all(|a| a.as_str().is_some_and(is_public_key)))
            .unwrap_or(false);
        if valid {
            Ok(TestOutcome::passed())
        } else {
            let value = accounts.to_string();
            Ok(TestOutcome::passed().fail(INVALID_ACCOUNTS.failure(&[("value", &value)])))
        }
    }
}

pub(crate) fn tests(fetcher: &Arc<Fetcher>) -> Vec<Test> {
    let id = |assertion: &str| TestId::new(Sep::Sep1, GROUP, assertion);

    vec![
        Test::new(fetched(), FetchToml { fetcher: fetcher.clone() })
            .provides(keys::TOML)
            .provides(keys::TOML_CONTENTS)
            .declaring(&[CONNECTION_ERROR, TOML_NOT_FOUND, INVALID_TOML]),
        Test::new(id("is under 100KB"), TomlSize)
            .depends_on(fetched())
            .expects(keys::TOML_CONTENTS)
            .declaring(&[TOML_TOO_LARGE]),
        Test::new(id("has CORS headers"), Cors { fetcher: fetcher.clone() })
            .depends_on(fetched())
            .declaring(&[CONNECTION_ERROR, NO_CORS_HEADERS, INCORRECT_CORS_HEADER]),
        Test::new(id("has NETWORK_PASSPHRASE"), NetworkPassphrase)
            .depends_on(fetched())
            .expects(keys::TOML)
            .declaring(&[NO_NETWORK_PASSPHRASE]),
        Test::new(id("has a valid SIGNING_KEY"), SigningKey)
            .depends_on(fetched())
            .expects(keys::TOML)
            .declaring(&[NO_SIGNING_KEY, INVALID_SIGNING_KEY]),
        Test::new(id("ACCOUNTS lists public keys"), Accounts)
            .depends_on(fetched())
            .expects(keys::TOML)
            .declaring(&[INVALID_ACCOUNTS]),
    ]
}
