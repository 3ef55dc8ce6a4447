//! SEP-10: web authentication.

use async_trait::async_trait;
use regex::Regex;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use serde_json::json;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use url::Url;

use crate::http::{Fetched, Fetcher};
use crate::{
    endpoint, get, keys, post_json, sep1, unexpected_status, Declare, Mode, CONNECTION_ERROR,
    NOT_JSON, UNEXPECTED_STATUS,
};

const GROUP: &str = "challenge";

const NO_ERROR_MESSAGE: Mode = Mode::new(
    "NO_ERROR_MESSAGE",
    "error responses must carry an 'error' string",
);
const NO_TRANSACTION: Mode = Mode::new(
    "NO_TRANSACTION",
    "the challenge response has no 'transaction'",
);
const NETWORK_PASSPHRASE_MISMATCH: Mode = Mode::new(
    "NETWORK_PASSPHRASE_MISMATCH",
    "the challenge network_passphrase does not match stellar.toml",
);
const INVALID_ENCODING: Mode = Mode::new(
    "INVALID_ENCODING",
    "the challenge transaction is not base64",
);

fn id(assertion: &str) -> TestId {
    TestId::new(Sep::Sep10, GROUP, assertion)
}

fn endpoint_id() -> TestId {
    endpoint::id(Sep::Sep10, "WEB_AUTH_ENDPOINT")
}

fn challenge_id() -> TestId {
    id("returns a challenge transaction")
}

fn auth_url(ctx: &TestContext) -> anyhow::Result<Url> {
    Ok(Url::parse(ctx.require_str(keys::WEB_AUTH_ENDPOINT)?)?)
}

/// Requests a challenge without an account.
pub(crate) struct RejectsMissingAccount {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for RejectsMissingAccount {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let url = auth_url(ctx)?;

        let fetched = match get(&self.fetcher, &url, config, &mut outcome).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        Ok(rejected(outcome, &url, &fetched))
    }
}

/// Passes when the server answered 400 with an `error` string.
fn rejected(outcome: TestOutcome, url: &Url, fetched: &Fetched) -> TestOutcome {
    if fetched.status != 400 {
        return outcome.fail(unexpected_status(url, 400, fetched.status));
    }

    let has_error = fetched
        .json()
        .is_some_and(|body| body.get("error").is_some_and(|e| e.is_string()));
    if !has_error {
        return outcome.fail(NO_ERROR_MESSAGE.failure(&[]));
    }
    outcome
}

/// Requests a challenge for the first configured client account.
pub(crate) struct Challenge {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for Challenge {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let Some(account) = config.sep10().and_then(|c| c.client_accounts.first()) else {
            debug!("no SEP-10 client accounts configured");
            return Ok(outcome.skip());
        };

        let mut url = auth_url(ctx)?;
        url.query_pairs_mut().append_pair("account", account);

        let fetched = match get(&self.fetcher, &url, config, &mut outcome).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        if fetched.status != 200 {
            return Ok(outcome.fail(unexpected_status(&url, 200, fetched.status)));
        }

        let Some(body) = fetched.json().filter(|body| body.is_object()) else {
            return Ok(outcome.fail(NOT_JSON.failure(&[("url", url.as_str())])));
        };
        let Some(transaction) = body.get("transaction").and_then(|t| t.as_str()) else {
            return Ok(outcome.fail(NO_TRANSACTION.failure(&[])));
        };

        let published = ctx
            .require(keys::TOML)?
            .get("NETWORK_PASSPHRASE")
            .and_then(|v| v.as_str());
        let returned = body.get("network_passphrase").and_then(|v| v.as_str());
        if let (Some(returned), Some(published)) = (returned, published) {
            if returned != published {
                let failure = NETWORK_PASSPHRASE_MISMATCH
                    .failure(&[])
                    .with_values(published, returned);
                return Ok(outcome.fail(failure));
            }
        }

        ctx.provide(keys::CHALLENGE_TRANSACTION, json!(transaction));
        Ok(outcome)
    }
}

/// Submits the challenge back without a client signature.
pub(crate) struct RejectsUnsignedChallenge {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for RejectsUnsignedChallenge {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let url = auth_url(ctx)?;
        let transaction = ctx.require_str(keys::CHALLENGE_TRANSACTION)?;
        let body = json!({ "transaction": transaction });

        let fetched = match post_json(&self.fetcher, &url, &body, config, &mut outcome).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        Ok(rejected(outcome, &url, &fetched))
    }
}

/// Checks the challenge transaction is base64 encoded XDR.
pub(crate) struct ChallengeEncoding;

#[async_trait]
impl TestBody for ChallengeEncoding {
    async fn run(&self, _config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        static BASE64: OnceLock<Regex> = OnceLock::new();
        let pattern = BASE64
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("static pattern"));

        let transaction = ctx.require_str(keys::CHALLENGE_TRANSACTION)?;
        if transaction.len() % 4 == 0 && pattern.is_match(transaction) {
            Ok(TestOutcome::passed())
        } else {
            Ok(TestOutcome::passed().fail(INVALID_ENCODING.failure(&[])))
        }
    }
}

pub(crate) fn tests(fetcher: &Arc<Fetcher>) -> Vec<Test> {
    vec![
        endpoint::test(Sep::Sep10, &["WEB_AUTH_ENDPOINT"], keys::WEB_AUTH_ENDPOINT),
        Test::new(
            id("rejects a request without account"),
            RejectsMissingAccount { fetcher: fetcher.clone() },
        )
        .depends_on(endpoint_id())
        .expects(keys::WEB_AUTH_ENDPOINT)
        .declaring(&[CONNECTION_ERROR, UNEXPECTED_STATUS, NO_ERROR_MESSAGE]),
        Test::new(challenge_id(), Challenge { fetcher: fetcher.clone() })
            .depends_on(sep1::fetched())
            .depends_on(endpoint_id())
            .expects(keys::TOML)
            .expects(keys::WEB_AUTH_ENDPOINT)
            .provides(keys::CHALLENGE_TRANSACTION)
            .declaring(&[
                CONNECTION_ERROR,
                UNEXPECTED_STATUS,
                NOT_JSON,
                NO_TRANSACTION,
                NETWORK_PASSPHRASE_MISMATCH,
            ]),
        Test::new(id("challenge transaction is base64"), ChallengeEncoding)
            .depends_on(challenge_id())
            .expects(keys::CHALLENGE_TRANSACTION)
            .declaring(&[INVALID_ENCODING]),
        Test::new(
            id("rejects an unsigned challenge"),
            RejectsUnsignedChallenge { fetcher: fetcher.clone() },
        )
        .depends_on(challenge_id())
        .expects(keys::WEB_AUTH_ENDPOINT)
        .expects(keys::CHALLENGE_TRANSACTION)
        .declaring(&[CONNECTION_ERROR, UNEXPECTED_STATUS, NO_ERROR_MESSAGE]),
    ]
}
