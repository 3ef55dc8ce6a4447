//! SEP-31: cross-border payments.

use async_trait::async_trait;
use sepcheck_core::{Config, Sep, Test, TestBody, TestContext, TestId, TestOutcome};
use std::sync::Arc;
use url::Url;

use crate::http::Fetcher;
use crate::{
    endpoint, get_object, keys, Declare, Mode, CONNECTION_ERROR, NOT_JSON, UNEXPECTED_STATUS,
};

const NO_RECEIVE: Mode = Mode::new("NO_RECEIVE", "/info has no 'receive' object");
const ASSET_NOT_RECEIVED: Mode = Mode::new(
    "ASSET_NOT_RECEIVED",
    "{asset} is not listed under 'receive'",
);

/// Checks the `/info` endpoint of a direct payment server.
pub(crate) struct Info {
    fetcher: Arc<Fetcher>,
}

#[async_trait]
impl TestBody for Info {
    async fn run(&self, config: &Config, ctx: &mut TestContext) -> anyhow::Result<TestOutcome> {
        let mut outcome = TestOutcome::passed();
        let server = ctx.require_str(keys::DIRECT_PAYMENT_SERVER)?;
        let url = Url::parse(&format!("{}/info", server))?;

        let info = match get_object(&self.fetcher, &url, config, &mut outcome).await {
            Ok(info) => info,
            Err(failure) => return Ok(outcome.fail(failure)),
        };

        let Some(receive) = info.get("receive").and_then(|v| v.as_object()) else {
            return Ok(outcome.fail(NO_RECEIVE.failure(&[])));
        };
        let asset = config.sep31().and_then(|c| c.asset_code.as_deref());
        if let Some(asset) = asset.filter(|asset| !receive.contains_key(*asset)) {
            return Ok(outcome.fail(ASSET_NOT_RECEIVED.failure(&[("asset", asset)])));
        }

        Ok(outcome)
    }
}

pub(crate) fn tests(fetcher: &Arc<Fetcher>) -> Vec<Test> {
    let info = Info {
        fetcher: fetcher.clone(),
    };
    vec![
        endpoint::test(Sep::Sep31, &["DIRECT_PAYMENT_SERVER"], keys::DIRECT_PAYMENT_SERVER),
        Test::new(TestId::new(Sep::Sep31, "info", "/info lists receive assets"), info)
            .depends_on(endpoint::id(Sep::Sep31, "DIRECT_PAYMENT_SERVER"))
            .expects(keys::DIRECT_PAYMENT_SERVER)
            .declaring(&[
                CONNECTION_ERROR,
                UNEXPECTED_STATUS,
                NOT_JSON,
                NO_RECEIVE,
                ASSET_NOT_RECEIVED,
            ]),
    ]
}
