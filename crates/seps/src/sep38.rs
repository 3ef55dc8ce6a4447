//! SEP-38: anchor RFQ quotes.

use async_trait::async_trait;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::http::Fetcher;
use crate::{
    endpoint, get_object, keys, Declare, Mode, CONNECTION_ERROR, NOT_JSON, UNEXPECTED_STATUS,
};

const GROUP: &str = "quotes";

const NO_ASSETS: Mode = Mode::new("NO_ASSETS", "/info lists no assets");
const INVALID_ASSET: Mode = Mode::new(
    "INVALID_ASSET",
    "'{asset}' is not a stellar: or iso4217: asset identifier",
);
const NO_STELLAR_ASSET: Mode = Mode::new(
    "NO_STELLAR_ASSET",
    "/info lists no stellar: asset to sell",
);
const NO_BUY_ASSETS: Mode = Mode::new(
    "NO_BUY_ASSETS",
    "/prices for context '{context}' has no 'buy_assets' array",
);

fn id(assertion: &str) -> TestId {
    TestId::new(Sep::Sep38, GROUP, assertion)
}

fn info_id() -> TestId {
    id("/info lists assets")
}

fn quote_url(ctx: &TestContext, path: &str) -> anyhow::Result<Url> {
    let server = ctx.require_str(keys::QUOTE_SERVER)?;
    Ok(Url::parse(&format!("{}/{}", server, path))?)
}

/// Reads the assets a quote server trades.
pub(crate) struct Info {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for Info {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let url = quote_url(ctx, "info")?;

        let info = match get_object(&self.fetcher, &url, config, &mut outcome).await {
            Ok(info) => info,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        let listed = info["assets"].as_array().map(Vec::as_slice).unwrap_or_default();
        if listed.is_empty() {
            return Ok(outcome.fail(NO_ASSETS.failure(&[])));
        }

        let mut assets = Vec::with_capacity(listed.len());
        for entry in listed {
            let asset = entry["asset"].as_str().unwrap_or_default();
            if !(asset.starts_with("stellar:") || asset.starts_with("iso4217:")) {
                return Ok(outcome.fail(INVALID_ASSET.failure(&[("asset", asset)])));
            }
            assets.push(asset);
        }

        ctx.provide(keys::QUOTE_ASSETS, json!(assets));
        Ok(outcome)
    }
}

/// Requests indicative prices once per configured quote context.
pub(crate) struct Prices {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for Prices {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let contexts = config.sep38().map(|c| c.contexts.as_slice()).unwrap_or_default();
        if contexts.is_empty() {
            debug!("no SEP-38 quote contexts configured");
            return Ok(outcome.skip());
        }

        let assets = ctx.require(keys::QUOTE_ASSETS)?;
        let sell_asset = assets
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find(|asset| asset.starts_with("stellar:"))
            .map(str::to_string);
        let Some(sell_asset) = sell_asset else {
            return Ok(outcome.fail(NO_STELLAR_ASSET.failure(&[])));
        };

        for context in contexts {
            let mut url = quote_url(ctx, "prices")?;
            url.query_pairs_mut()
                .append_pair("sell_asset", &sell_asset)
                .append_pair("sell_amount", "100")
                .append_pair("context", context);

            let prices = match get_object(&self.fetcher, &url, config, &mut outcome).await {
                Ok(prices) => prices,
                Err(failure) => return Ok(outcome.fail(failure)),
            };
            if !prices["buy_assets"].is_array() {
                let failure = NO_BUY_ASSETS.failure(&[("context", context)]);
                return Ok(outcome.fail(failure));
            }
        }

        Ok(outcome)
    }
}

pub(crate) fn tests(fetcher: &Arc<Fetcher>) -> Vec<Test> {
    vec![
        endpoint::test(Sep::Sep38, &["ANCHOR_QUOTE_SERVER"], keys::QUOTE_SERVER),
        Test::new(info_id(), Info { fetcher: fetcher.clone() })
            .depends_on(endpoint::id(Sep::Sep38, "ANCHOR_QUOTE_SERVER"))
            .expects(keys::QUOTE_SERVER)
            .provides(keys::QUOTE_ASSETS)
            .declaring(&[CONNECTION_ERROR, UNEXPECTED_STATUS, NOT_JSON, NO_ASSETS, INVALID_ASSET]),
        Test::new(id("/prices answers each context"), Prices { fetcher: fetcher.clone() })
            .depends_on(info_id())
            .expects(keys::QUOTE_SERVER)
            .expects(keys::QUOTE_ASSETS)
            .declaring(&[
                CONNECTION_ERROR,
                UNEXPECTED_STATUS,
                NOT_JSON,
                NO_STELLAR_ASSET,
                NO_BUY_ASSETS,
            ]),
    ]
}
