//! Conditional PutObject with `If-None-Match` and `If-Match`.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_status};
use s3conform_core::storage::{GetOptions, PutOptions, PutOutput};
use s3conform_core::{CaseContext, CaseResult, ObjectKey, Quirk, Scenario};

use super::{put, scenario};

const SUITE: &str = "conditional";

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            sensitive_to: &[Quirk::PutObjectIfNoneMatchStarNotSupported],
            ..scenario(SUITE, "if_none_match_star", if_none_match_star)
        },
        Scenario {
            sensitive_to: &[Quirk::PutObjectIfNoneMatchEtagNotSupported],
            ..scenario(SUITE, "if_none_match_etag", if_none_match_etag)
        },
        Scenario {
            sensitive_to: &[Quirk::PutObjectIfMatchEtagNotSupported],
            ..scenario(SUITE, "if_match_etag", if_match_etag)
        },
    ]
}

/// Checks the stored body and ETag of `object`.
async fn expect_current(ctx: &CaseContext, body: &[u8], etag: &Option<String>) -> CaseResult {
    let output = ctx
        .client()
        .get_object(&ObjectKey::from("object"), GetOptions::default())
        .await?;
    expect_status("GetObject", &output, 200)?;
    expect_eq("GetObject body", body, output.body.as_slice())?;
    expect_eq("GetObject ETag", etag, &output.etag)
}

async fn conditional_put(ctx: &CaseContext, options: PutOptions) -> CaseResult<PutOutput> {
    let output = ctx
        .client()
        .put_object(&ObjectKey::from("object"), b"bar", options)
        .await?;
    Ok(output)
}

fn if_none_match_star(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let initial = put(ctx, "object", b"hello").await?;
        let output = conditional_put(
            ctx,
            PutOptions {
                if_none_match: Some("*".to_string()),
                ..Default::default()
            },
        )
        .await?;
        let expected = ctx.resolve(412, 501, Quirk::PutObjectIfNoneMatchStarNotSupported)?;
        expect_status("PutObject If-None-Match: *", &output, expected)?;
        expect_current(ctx, b"hello", &initial.etag).await
    }
    .boxed()
}

fn if_none_match_etag(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let initial = put(ctx, "object", b"hello").await?;
        let output = conditional_put(
            ctx,
            PutOptions {
                if_none_match: initial.etag.clone(),
                ..Default::default()
            },
        )
        .await?;
        let expected = ctx.resolve(412, 501, Quirk::PutObjectIfNoneMatchEtagNotSupported)?;
        expect_status("PutObject If-None-Match: <etag>", &output, expected)?;
        expect_current(ctx, b"hello", &initial.etag).await
    }
    .boxed()
}

fn if_match_etag(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let initial = put(ctx, "object", b"hello").await?;
        let output = conditional_put(
            ctx,
            PutOptions {
                if_match: initial.etag.clone(),
                ..Default::default()
            },
        )
        .await?;
        let supported = !ctx.has_quirk(Quirk::PutObjectIfMatchEtagNotSupported)?;
        if supported {
            expect_status("PutObject If-Match: <etag>", &output, 200)?;
            expect_current(ctx, b"bar", &output.etag).await
        } else {
            expect_status("PutObject If-Match: <etag>", &output, 501)?;
            expect_current(ctx, b"hello", &initial.etag).await
        }
    }
    .boxed()
}
