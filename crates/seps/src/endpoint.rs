//! Service endpoints advertised in stellar.toml.

use async_trait::async_trait;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use url::Url;

use crate::{keys, sep1, Declare, Mode};

const NO_ENDPOINT: Mode = Mode::new("NO_ENDPOINT", "{key} is not present in stellar.toml");
const INVALID_ENDPOINT: Mode = Mode::new("INVALID_ENDPOINT", "{key} is not a valid URL: {value}");
const ENDPOINT_NOT_HTTPS: Mode = Mode::new("ENDPOINT_NOT_HTTPS", "{key} must use https: {value}");

/// Reads a server URL out of the parsed stellar.toml.
///
/// `keys` are tried in order, so a protocol that may share another
/// protocol's server lists its own key first.
pub(crate) struct TomlEndpoint {
    pub keys: &'static [&'static str],
    pub provides: &'static str,
}

#[async_trait]
impl TestBody for TomlEndpoint {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let outcome = TestOutcome::passed();
        let toml = ctx.require(keys::TOML)?;
        let primary = self.keys.first().copied().unwrap_or_default();

        let found = self
            .keys
            .iter()
            .find_map(|key| {
                let value = toml.get(*key).and_then(|v| v.as_str())?;
                Some((*key, value.to_string()))
            });
        let Some((key, value)) = found else {
            return Ok(outcome.fail(NO_ENDPOINT.failure(&[("key", primary)])));
        };

        let url = match Url::parse(&value) {
            Ok(url) => url,
            Err(_) => {
                let failure = INVALID_ENDPOINT.failure(&[("key", key), ("value", &value)]);
                return Ok(outcome.fail(failure));
            }
        };
        if config.home_domain.scheme() == "https" && url.scheme() != "https" {
            let failure = ENDPOINT_NOT_HTTPS.failure(&[("key", key), ("value", &value)]);
            return Ok(outcome.fail(failure));
        }

        ctx.provide(self.provides, value.trim_end_matches('/'));
        Ok(outcome)
    }
}

/// Identity of the test that reads `key` for `sep`.
pub(crate) fn id(sep: Sep, key: &str) -> TestId {
    TestId::new(sep, sep1::GROUP, format!("has {}", key))
}

/// A test reading `keys` from stellar.toml and providing the first one found.
pub(crate) fn test(sep: Sep, keys: &'static [&'static str], provides: &'static str) -> Test {
    let primary = keys.first().copied().unwrap_or_default();
    Test::new(id(sep, primary), TomlEndpoint { keys, provides })
        .depends_on(sep1::fetched())
        .expects(keys::TOML)
        .provides(provides)
        .declaring(&[NO_ENDPOINT, INVALID_ENDPOINT, ENDPOINT_NOT_HTTPS])
}

/// Endpoint tests for SEPs with no further checks of their own.
pub(crate) fn tests() -> Vec<Test> {
    vec![test(Sep::Sep12, &["KYC_SERVER", "TRANSFER_SERVER"], keys::KYC_SERVER)]
}
