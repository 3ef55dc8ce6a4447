//! SEP conformance tests.
//!
//! Each module contributes the tests for one protocol family. Tests share
//! data through context keys (see [`keys`]) and declare the failures their
//! bodies may report as [`Mode`] constants, so the declaration on the
//! [`Test`] and the failure a body builds come from the same place.

#![warn(missing_docs)]

use sepcheck_core::{CatalogError, Config, Failure, FailureMode, Test, TestCatalog, TestOutcome};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub mod http;

mod endpoint;
mod sep1;
mod sep10;
mod sep31;
mod sep38;
mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use http::{Fetched, Fetcher};

/// Context keys shared between tests.
pub mod keys {
    /// Parsed stellar.toml as a JSON object
    pub const TOML: &str = "toml";
    /// Raw stellar.toml text
    pub const TOML_CONTENTS: &str = "toml_contents";
    /// SEP-10 `WEB_AUTH_ENDPOINT`
    pub const WEB_AUTH_ENDPOINT: &str = "web_auth_endpoint";
    /// SEP-6 `TRANSFER_SERVER`
    pub const TRANSFER_SERVER: &str = "transfer_server";
    /// SEP-24 `TRANSFER_SERVER_SEP0024`
    pub const TRANSFER_SERVER_SEP24: &str = "transfer_server_sep24";
    /// SEP-12 `KYC_SERVER`
    pub const KYC_SERVER: &str = "kyc_server";
    /// SEP-31 `DIRECT_PAYMENT_SERVER`
    pub const DIRECT_PAYMENT_SERVER: &str = "direct_payment_server";
    /// SEP-38 `ANCHOR_QUOTE_SERVER`
    pub const QUOTE_SERVER: &str = "quote_server";
    /// Asset identifiers listed by the SEP-38 `/info` endpoint
    pub const QUOTE_ASSETS: &str = "quote_assets";
    /// Base64 challenge transaction returned by SEP-10
    pub const CHALLENGE_TRANSACTION: &str = "challenge_transaction";
}

/// A failure mode known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// Symbolic failure code
    pub name: &'static str,

    /// Message template with `{placeholders}`
    pub template: &'static str,
}

impl Mode {
    /// Create a mode.
    pub const fn new(name: &'static str, template: &'static str) -> Self {
        Self { name, template }
    }

    /// Render a failure from this mode.
    pub fn failure(&self, args: &[(&str, &str)]) -> Failure {
        FailureMode::from(*self).failure(args)
    }
}

impl From<Mode> for FailureMode {
    fn from(mode: Mode) -> Self {
        FailureMode::new(mode.name, mode.template)
    }
}

/// Declare a batch of [`Mode`]s on a test.
pub trait Declare {
    /// Add every mode to the test's failure catalog.
    fn declaring(self, modes: &[Mode]) -> Self;
}

impl Declare for Test {
    fn declaring(self, modes: &[Mode]) -> Self {
        modes
            .iter()
            .fold(self, |test, mode| test.with_failure_mode(mode.name, mode.template))
    }
}

/// The server could not be reached.
pub const CONNECTION_ERROR: Mode = Mode::new(
    "CONNECTION_ERROR",
    "unable to connect to {url}: {error}",
);

/// The server answered with an unexpected status code.
pub const UNEXPECTED_STATUS: Mode = Mode::new(
    "UNEXPECTED_STATUS",
    "{url} returned {actual}, expected {expected}",
);

/// The response body is not a JSON object.
pub const NOT_JSON: Mode = Mode::new("NOT_JSON", "{url} did not return a JSON object");

fn connection_error(url: &Url, error: reqwest::Error) -> Failure {
    CONNECTION_ERROR.failure(&[("url", url.as_str()), ("error", &error.to_string())])
}

/// An [`UNEXPECTED_STATUS`] failure for `url`.
pub(crate) fn unexpected_status(url: &Url, expected: u16, actual: u16) -> Failure {
    UNEXPECTED_STATUS
        .failure(&[
            ("url", url.as_str()),
            ("actual", &actual.to_string()),
            ("expected", &expected.to_string()),
        ])
        .with_values(expected, actual)
}

/// GET `url`, recording the exchange on `outcome`.
///
/// A transport error becomes a [`CONNECTION_ERROR`] failure.
pub(crate) async fn get(
    fetcher: &Fetcher,
    url: &Url,
    config: &Config,
    outcome: &mut TestOutcome,
) -> Result<Fetched, Failure> {
    let (call, fetched) = fetcher.get(url, config.request_timeout).await;
    outcome.record(call);
    fetched.map_err(|error| connection_error(url, error))
}

/// POST `body` as JSON to `url`, recording the exchange on `outcome`.
pub(crate) async fn post_json(
    fetcher: &Fetcher,
    url: &Url,
    body: &Value,
    config: &Config,
    outcome: &mut TestOutcome,
) -> Result<Fetched, Failure> {
    let (call, fetched) = fetcher.post_json(url, body, config.request_timeout).await;
    outcome.record(call);
    fetched.map_err(|error| connection_error(url, error))
}

/// GET `url` and require a 200 response carrying a JSON object.
pub(crate) async fn get_object(
    fetcher: &Fetcher,
    url: &Url,
    config: &Config,
    outcome: &mut TestOutcome,
) -> Result<Value, Failure> {
    let fetched = get(fetcher, url, config, outcome).await?;
    if fetched.status != 200 {
        return Err(unexpected_status(url, 200, fetched.status));
    }
    fetched
        .json()
        .filter(Value::is_object)
        .ok_or_else(|| NOT_JSON.failure(&[("url", url.as_str())]))
}

/// Build the catalog of every known test.
pub fn catalog(fetcher: Arc<Fetcher>) -> Result<TestCatalog, CatalogError> {
    let mut catalog = TestCatalog::new();
    catalog.register_all(sep1::tests(&fetcher))?;
    catalog.register_all(sep10::tests(&fetcher))?;
    catalog.register_all(transfer::tests(&fetcher))?;
    catalog.register_all(sep31::tests(&fetcher))?;
    catalog.register_all(sep38::tests(&fetcher))?;
    catalog.register_all(endpoint::tests())?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve, test_fetcher, Reply};
    use futures::StreamExt;
    use sepcheck_core::{failure_names, Config, Sep, SepConfig};
    use sepcheck_core::config::Sep10Config;
    use sepcheck_execution::{get_tests, run};

    const ACCOUNT: &str = "GCQJX6WGG7SSFU2RBO5QANTFXY7C5GTTFJDCBAAO42JCCAIIYTCYDOGE";
    const PASSPHRASE: &str = "Test SDF Network ; September 2015";

    fn stellar_toml(base: &str) -> String {
        format!(
            r#"NETWORK_PASSPHRASE = "{passphrase}"
SIGNING_KEY = "{account}"
ACCOUNTS = ["{account}"]
WEB_AUTH_ENDPOINT = "{base}auth"
TRANSFER_SERVER_SEP0024 = "{base}sep24"
"#,
            passphrase = PASSPHRASE,
            account = ACCOUNT,
            base = base,
        )
    }

    async fn anchor() -> url::Url {
        let base = Arc::new(std::sync::OnceLock::<String>::new());
        let toml_base = base.clone();
        let url = serve(move |path| {
            let base = toml_base.get().cloned().unwrap_or_default();
            match path {
                "/.well-known/stellar.toml" => Reply::text(200, &stellar_toml(&base))
                    .header("Access-Control-Allow-Origin", "*"),
                "/auth" => Reply::json(400, r#"{"error":"account is required"}"#),
                p if p.starts_with("/auth?account=") => Reply::json(
                    200,
                    &format!(
                        r#"{{"transaction":"AAAAAgAAAAA=","network_passphrase":"{}"}}"#,
                        PASSPHRASE
                    ),
                ),
                "/sep24/info" => {
                    Reply::json(200, r#"{"deposit":{"USDC":{}},"withdraw":{"USDC":{}}}"#)
                }
                _ => Reply::text(404, "not found"),
            }
        })
        .await;
        base.set(url.to_string()).unwrap();
        url
    }

    fn config(home: url::Url) -> Config {
        let sep10 = Sep10Config {
            client_accounts: vec![ACCOUNT.to_string()],
        };
        Config::new(home, [Sep::Sep1, Sep::Sep10, Sep::Sep24])
            .with_sep_config(SepConfig::Sep10(sep10))
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = catalog(Arc::new(test_fetcher())).unwrap();
        assert!(!catalog.is_empty());
        for sep in Sep::ALL {
            assert!(!catalog.find_by_sep(sep).is_empty(), "{} has no tests", sep);
        }
    }

    #[test]
    fn test_catalog_dependencies_resolve() {
        let catalog = catalog(Arc::new(test_fetcher())).unwrap();
        let home = url::Url::parse("https://anchor.test").unwrap();
        let config = Config::new(home, [Sep::Sep10]);

        let tests = get_tests(&config, &catalog).unwrap();
        let position = |assertion: &str| {
            tests
                .iter()
                .position(|t| t.id.assertion == assertion)
                .unwrap()
        };

        assert_eq!(tests[0].id.sep, Sep::Sep1);
        assert!(position("can be fetched") < position("has WEB_AUTH_ENDPOINT"));
        assert!(position("has WEB_AUTH_ENDPOINT") < position("returns a challenge transaction"));
    }

    #[test]
    fn test_declaring_adds_modes() {
        let test = Test::new(
            sepcheck_core::TestId::new(Sep::Sep1, "g", "a"),
            sep1::Accounts,
        )
        .declaring(&[CONNECTION_ERROR]);

        let failure = test
            .failure_modes
            .failure(CONNECTION_ERROR.name, &[("url", "https://x"), ("error", "refused")]);
        assert_eq!(failure.text, "unable to connect to https://x: refused");
    }

    #[tokio::test]
    async fn test_conformant_anchor_passes() {
        let home = anchor().await;
        let catalog = Arc::new(catalog(Arc::new(test_fetcher())).unwrap());

        let results: Vec<_> = run(config(home), catalog).unwrap().collect().await;

        let failures: Vec<_> = results
            .iter()
            .filter_map(|r| r.failure().map(|f| format!("{}: {}", r.test, f.text)))
            .collect();
        assert!(failures.is_empty(), "{:?}", failures);
        let passed = |sep: Sep, assertion: &str| {
            results
                .iter()
                .any(|r| r.test.sep == sep && r.test.assertion == assertion && r.is_passed())
        };
        assert!(passed(Sep::Sep10, "returns a challenge transaction"));
        assert!(passed(Sep::Sep10, "rejects an unsigned challenge"));
        assert!(passed(Sep::Sep24, "/info lists deposit and withdraw"));
    }

    #[tokio::test]
    async fn test_unreachable_anchor_fails_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let home = url::Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
        let catalog = Arc::new(catalog(Arc::new(test_fetcher())).unwrap());
        let config = Config::new(home, [Sep::Sep1]);
        let results: Vec<_> = run(config, catalog).unwrap().collect().await;

        let fetch = results.iter().find(|r| r.test.assertion == "can be fetched").unwrap();
        assert_eq!(fetch.failure().unwrap().name, CONNECTION_ERROR.name);

        let dependents: Vec<_> = results
            .iter()
            .filter(|r| r.test.assertion != "can be fetched")
            .collect();
        assert!(!dependents.is_empty());
        for result in dependents {
            let failure = result.failure().unwrap();
            assert_eq!(failure.name, failure_names::FAILED_DEPENDENCY);
            let related = failure.related.as_ref().map(|t| t.assertion.as_str());
            assert_eq!(related, Some("can be fetched"));
        }
    }

    #[tokio::test]
    async fn test_reported_failures_are_declared() {
        let base = Arc::new(std::sync::OnceLock::<String>::new());
        let toml_base = base.clone();
        let home = serve(move |path| {
            let base = toml_base.get().cloned().unwrap_or_default();
            match path {
                "/.well-known/stellar.toml" => Reply::text(
                    200,
                    &format!(
                        "SIGNING_KEY = \"not-a-key\"\nACCOUNTS = \"one\"\n\
                         WEB_AUTH_ENDPOINT = \"{base}auth\"\n\
                         TRANSFER_SERVER_SEP0024 = \"{base}sep24\"\n",
                        base = base
                    ),
                ),
                "/sep24/info" => Reply::json(200, r#"{"deposit":{}}"#),
                _ => Reply::text(500, "oops"),
            }
        })
        .await;
        base.set(home.to_string()).unwrap();

        let catalog = Arc::new(catalog(Arc::new(test_fetcher())).unwrap());
        let results: Vec<_> = run(config(home), catalog.clone()).unwrap().collect().await;

        let failed: Vec<_> = results.iter().filter_map(|r| Some((r, r.failure()?))).collect();
        assert!(failed.len() > 3);
        for (result, failure) in failed {
            let test = catalog.get(&result.test).unwrap();
            assert!(
                test.failure_modes.covers(&failure.name),
                "{} reported undeclared {}",
                result.test,
                failure.name
            );
        }
    }
}
