//! ListBuckets response headers.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::expect_success;
use s3conform_core::{CaseContext, CaseResult, FailureReason, Scenario};

use super::{parse_http_date, scenario};

const SUITE: &str = "list_buckets";

/// How far the service clock may drift from ours.
const MAX_CLOCK_SKEW_SECS: i64 = 30;

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![scenario(SUITE, "date_header", date_header)]
}

fn date_header(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let requested = Utc::now();
        let output = ctx.client().list_buckets().await?;
        expect_success("ListBuckets", &output)?;

        let served = parse_http_date("ListBuckets Date", output.date.as_deref())?;
        let skew = (served.with_timezone(&Utc) - requested).num_seconds();
        if skew.abs() > MAX_CLOCK_SKEW_SECS {
            return Err(FailureReason::Mismatch {
                operation: "ListBuckets Date".to_string(),
                expected: format!("within {}s of {}", MAX_CLOCK_SKEW_SECS, requested.to_rfc2822()),
                observed: served.to_rfc2822(),
            });
        }
        Ok(())
    }
    .boxed()
}
