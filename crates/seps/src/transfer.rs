//! SEP-6 and SEP-24: deposit and withdrawal servers.

use async_trait::async_trait;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use std::sync::Arc;
use url::Url;

use crate::http::Fetcher;
use crate::{
    endpoint, get_object, keys, Declare, Mode, CONNECTION_ERROR, NOT_JSON, UNEXPECTED_STATUS,
};

const GROUP: &str = "info";

const NO_OPERATION: Mode = Mode::new("NO_OPERATION", "/info has no '{operation}' object");
const ASSET_NOT_LISTED: Mode = Mode::new(
    "ASSET_NOT_LISTED",
    "{asset} is not listed under '{operation}'",
);
const WITHDRAW_TYPE_NOT_LISTED: Mode = Mode::new(
    "WITHDRAW_TYPE_NOT_LISTED",
    "withdraw type '{kind}' is not listed for {asset}",
);

/// Checks the `/info` endpoint of a transfer server.
pub(crate) struct Info {
    fetcher: Arc<Fetcher>,
    sep: Sep,
    endpoint: &'static str,
}

impl Info {
    fn asset<'a>(&self, config: &'a Config) -> Option<&'a str> {
        match self.sep {
            Sep::Sep6 => config.sep6().and_then(|c| c.asset_code.as_deref()),
            Sep::Sep24 => config.sep24().and_then(|c| c.asset_code.as_deref()),
            _ => None,
        }
    }

    fn withdraw_types<'a>(&self, config: &'a Config) -> &'a [String] {
        match (self.sep, config.sep6()) {
            (Sep::Sep6, Some(sep6)) => &sep6.withdraw_types,
            _ => &[],
        }
    }
}

#[async_trait]
impl TestBody for Info {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let server = ctx.require_str(self.endpoint)?;
        let url = Url::parse(&format!("{}/info", server.trim_end_matches('/')))?;

        let info = match get_object(&self.fetcher, &url, config, &mut outcome).await {
            Ok(info) => info,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        for operation in ["deposit", "withdraw"] {
            let Some(assets) = info.get(operation).filter(|v| v.is_object()) else {
                return Ok(outcome.fail(NO_OPERATION.failure(&[("operation", operation)])));
            };
            if let Some(asset) = self.asset(config) {
                if assets.get(asset).is_none() {
                    let failure =
                        ASSET_NOT_LISTED.failure(&[("asset", asset), ("operation", operation)]);
                    return Ok(outcome.fail(failure));
                }
            }
        }

        if let Some(asset) = self.asset(config) {
            let listed = info["withdraw"][asset]["types"].as_object();
            for kind in self.withdraw_types(config) {
                if !listed.is_some_and(|types| types.contains_key(kind)) {
                    let failure = WITHDRAW_TYPE_NOT_LISTED
                        .failure(&[("kind", kind.as_str()), ("asset", asset)]);
                    return Ok(outcome.fail(failure));
                }
            }
        }

        Ok(outcome)
    }
}

fn info_test(fetcher: &Arc<Fetcher>, sep: Sep, key: &'static str, provided: &'static str) -> Test {
    let body = Info {
        fetcher: fetcher.clone(),
        sep,
        endpoint: provided,
    };
    Test::new(TestId::new(sep, GROUP, "/info lists deposit and withdraw"), body)
        .depends_on(endpoint::id(sep, key))
        .expects(provided)
        .declaring(&[
            CONNECTION_ERROR,
            UNEXPECTED_STATUS,
            NOT_JSON,
            NO_OPERATION,
            ASSET_NOT_LISTED,
            WITHDRAW_TYPE_NOT_LISTED,
        ])
}

pub(crate) fn tests(fetcher: &Arc<Fetcher>) -> Vec<Test> {
    vec![
        endpoint::test(Sep::Sep6, &["TRANSFER_SERVER"], keys::TRANSFER_SERVER),
        info_test(fetcher, Sep::Sep6, "TRANSFER_SERVER", keys::TRANSFER_SERVER),
        endpoint::test(Sep::Sep24, &["TRANSFER_SERVER_SEP0024"], keys::TRANSFER_SERVER_SEP24),
        info_test(fetcher, Sep::Sep24, "TRANSFER_SERVER_SEP0024", keys::TRANSFER_SERVER_SEP24),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve, test_fetcher, Reply};
    use sepcheck_core::config::{Sep24Config, Sep6Config};
    use sepcheck_core::{ResultStatus, SepConfig};
    use serde_json::json;

    const INFO: &str = r#"{
        "deposit": {"USDC": {"enabled": true}},
        "withdraw": {"USDC": {"enabled": true, "types": {"bank_account": {}}}}
    }"#;

    fn info(sep: Sep) -> Info {
        let endpoint = match sep {
            Sep::Sep6 => keys::TRANSFER_SERVER,
            _ => keys::TRANSFER_SERVER_SEP24,
        };
        Info {
            fetcher: Arc::new(test_fetcher()),
            sep,
            endpoint,
        }
    }

    async fn server(body: &'static str) -> (Url, TestContext) {
        let home = serve(move |path| match path {
            "/transfer/info" => Reply::json(200, body),
            _ => Reply::text(404, ""),
        })
        .await;
        let ctx = TestContext::new()
            .with_expected(keys::TRANSFER_SERVER, json!(format!("{}transfer", home)))
            .with_expected(keys::TRANSFER_SERVER_SEP24, json!(format!("{}transfer/", home)));
        (home, ctx)
    }

    fn failure_name(outcome: &TestOutcome) -> Option<&str> {
        match &outcome.status {
            ResultStatus::Failed(failure) => Some(failure.name.as_str()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_info_lists_operations() {
        let (home, mut ctx) = server(INFO).await;
        let config = Config::new(home, [Sep::Sep24]);

        let outcome = info(Sep::Sep24).run(&config, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, ResultStatus::Passed);
        assert_eq!(outcome.network_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_info_missing_operation() {
        let (home, mut ctx) = server(r#"{"deposit": {}}"#).await;
        let config = Config::new(home, [Sep::Sep6]);

        let outcome = info(Sep::Sep6).run(&config, &mut ctx).await.unwrap();
        let ResultStatus::Failed(failure) = &outcome.status else { unreachable!() };
        assert_eq!(failure.name, "NO_OPERATION");
        assert_eq!(failure.text, "/info has no 'withdraw' object");
    }

    #[tokio::test]
    async fn test_info_configured_asset() {
        let (home, mut ctx) = server(INFO).await;

        let sep24 = |asset: &str| {
            SepConfig::Sep24(Sep24Config {
                asset_code: Some(asset.to_string()),
            })
        };

        let config = Config::new(home.clone(), [Sep::Sep24]).with_sep_config(sep24("USDC"));
        let outcome = info(Sep::Sep24).run(&config, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, ResultStatus::Passed);

        let config = Config::new(home, [Sep::Sep24]).with_sep_config(sep24("EURT"));
        let outcome = info(Sep::Sep24).run(&config, &mut ctx).await.unwrap();
        assert_eq!(failure_name(&outcome), Some("ASSET_NOT_LISTED"));
    }

    #[tokio::test]
    async fn test_info_withdraw_types() {
        let (home, mut ctx) = server(INFO).await;
        let sep6 = |types: &[&str]| {
            SepConfig::Sep6(Sep6Config {
                asset_code: Some("USDC".to_string()),
                withdraw_types: types.iter().map(|t| t.to_string()).collect(),
            })
        };

        let config =
            Config::new(home.clone(), [Sep::Sep6]).with_sep_config(sep6(&["bank_account"]));
        let outcome = info(Sep::Sep6).run(&config, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, ResultStatus::Passed);

        let config =
            Config::new(home, [Sep::Sep6]).with_sep_config(sep6(&["bank_account", "cash"]));
        let outcome = info(Sep::Sep6).run(&config, &mut ctx).await.unwrap();
        assert_eq!(failure_name(&outcome), Some("WITHDRAW_TYPE_NOT_LISTED"));
    }

    #[tokio::test]
    async fn test_info_unexpected_status() {
        let (home, mut ctx) = server(INFO).await;
        ctx.set_expected(keys::TRANSFER_SERVER, json!(format!("{}elsewhere", home)));
        let config = Config::new(home, [Sep::Sep6]);

        let outcome = info(Sep::Sep6).run(&config, &mut ctx).await.unwrap();
        let ResultStatus::Failed(failure) = &outcome.status else { unreachable!() };
        assert_eq!(failure.name, "UNEXPECTED_STATUS");
        assert_eq!(failure.actual, Some(json!(404)));
    }

    #[test]
    fn test_info_depends_on_endpoint() {
        let tests = tests(&Arc::new(test_fetcher()));
        let info = &tests[3];

        assert_eq!(info.id.sep, Sep::Sep24);
        assert_eq!(info.dependencies, vec![tests[2].id.clone()]);
        assert_eq!(info.context.expects, tests[2].context.provides);
    }
}
