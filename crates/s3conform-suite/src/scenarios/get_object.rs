//! GetObject: full reads, missing keys and byte ranges.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_status, parse_content_range};
use s3conform_core::range::BYTES_UNIT;
use s3conform_core::storage::GetOptions;
use s3conform_core::{
    ByteRangeRequest, ByteRangeResponse, CaseContext, CaseResult, FailureReason, ObjectKey,
    RangeSpec, Resolution, Scenario,
};

use super::{put, scenario};

const SUITE: &str = "get_object";
const HELLO: &[u8] = b"Hello, World!";

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(SUITE, "full_object", full_object),
        scenario(SUITE, "missing_key", missing_key),
        scenario(SUITE, "open_ended_range", open_ended_range),
        scenario(SUITE, "clamped_range", clamped_range),
        scenario(SUITE, "suffix_range", suffix_range),
        scenario(SUITE, "unsatisfiable_range", unsatisfiable_range),
        scenario(SUITE, "range_starting_at_size", range_starting_at_size),
    ]
}

fn full_object(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let stored = put(ctx, "foo", HELLO).await?;
        let output = ctx
            .client()
            .get_object(&ObjectKey::from("foo"), GetOptions::default())
            .await?;
        expect_status("GetObject", &output, 200)?;
        expect_eq("GetObject body", HELLO, output.body.as_slice())?;
        expect_eq("GetObject ETag", stored.etag, output.etag)
    }
    .boxed()
}

fn missing_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let output = ctx
            .client()
            .get_object(&ObjectKey::from("foo"), GetOptions::default())
            .await?;
        expect_status("GetObject", &output, 404)
    }
    .boxed()
}

/// Reads `spec` of the hello-world object and checks body, `Content-Range`
/// and length against the locally resolved span.
async fn read_range(ctx: &CaseContext, spec: RangeSpec) -> CaseResult {
    put(ctx, "foo", HELLO).await?;
    let size = HELLO.len() as u64;
    let request = ByteRangeRequest::bytes(spec);
    let span = spec.resolve(size).span().ok_or_else(|| FailureReason::Mismatch {
        operation: "resolve range".to_string(),
        expected: "a satisfiable range".to_string(),
        observed: request.to_string(),
    })?;
    let expected_body = span.slice(HELLO).unwrap_or_default();
    let expected_range = span.content_range(BYTES_UNIT, size).map_err(|e| FailureReason::Mismatch {
        operation: "Content-Range".to_string(),
        expected: "a valid Content-Range".to_string(),
        observed: e.to_string(),
    })?;

    let operation = format!("GetObject Range: {}", request);
    let output = ctx
        .client()
        .get_object(
            &ObjectKey::from("foo"),
            GetOptions {
                range: Some(request.to_string()),
                ..Default::default()
            },
        )
        .await?;
    expect_status(&operation, &output, 206)?;
    expect_eq(&format!("{} body", operation), expected_body, output.body.as_slice())?;
    let content_range = parse_content_range(&operation, output.content_range.as_deref())?;
    expect_eq(&format!("{} Content-Range", operation), expected_range, content_range)?;
    expect_eq(&format!("{} Content-Length", operation), span.len(), output.content_length)
}

fn open_ended_range(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    read_range(ctx, RangeSpec::from_start(7)).boxed()
}

fn clamped_range(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let spec = RangeSpec::bounded(10, 100).map_err(|e| FailureReason::Mismatch {
            operation: "range spec".to_string(),
            expected: "bytes=10-100".to_string(),
            observed: e.to_string(),
        })?;
        read_range(ctx, spec).await
    }
    .boxed()
}

fn suffix_range(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    read_range(ctx, RangeSpec::suffix(6)).boxed()
}

/// Requests a range starting at `start` and expects 416 with `bytes */size`.
async fn read_unsatisfiable(ctx: &CaseContext, start: u64) -> CaseResult {
    put(ctx, "foo", HELLO).await?;
    let size = HELLO.len() as u64;
    let spec = RangeSpec::from_start(start);
    expect_eq("resolve range", Resolution::Unsatisfiable, spec.resolve(size))?;

    let request = ByteRangeRequest::bytes(spec);
    let operation = format!("GetObject Range: {}", request);
    let output = ctx
        .client()
        .get_object(
            &ObjectKey::from("foo"),
            GetOptions {
                range: Some(request.to_string()),
                ..Default::default()
            },
        )
        .await?;
    expect_status(&operation, &output, 416)?;
    if let Some(raw) = output.content_range.as_deref() {
        let content_range = parse_content_range(&operation, Some(raw))?;
        let expected = ByteRangeResponse::unsatisfied(BYTES_UNIT, size).map_err(|e| FailureReason::Mismatch {
            operation: operation.clone(),
            expected: "a valid unsatisfied Content-Range".to_string(),
            observed: e.to_string(),
        })?;
        expect_eq(&format!("{} Content-Range", operation), expected, content_range)?;
    }
    Ok(())
}

fn unsatisfiable_range(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    read_unsatisfiable(ctx, 200).boxed()
}

fn range_starting_at_size(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    read_unsatisfiable(ctx, HELLO.len() as u64).boxed()
}
