//! PutObject: stored bodies, ETags and the headers a service must keep.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_ne, expect_status, expect_success};
use s3conform_core::storage::{GetOptions, GetOutput, HeadOptions, HeadOutput, PutOptions};
use s3conform_core::{CaseContext, CaseResult, FailureReason, ObjectKey, Quirk, Scenario};

use super::{parse_http_date, put, put_with, scenario};

const SUITE: &str = "put_object";

/// Last-Modified has one-second resolution.
const OVERWRITE_DELAY: Duration = Duration::from_secs(2);

/// `<root></root>`, gzip-compressed.
const GZIPPED_XML: &[u8] = &[
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xb3, 0x29, 0xca, 0xcf, 0x2f,
    0xb1, 0xb3, 0xd1, 0x07, 0x53, 0x00, 0xd3, 0xe2, 0xd9, 0x34, 0x0d, 0x00, 0x00, 0x00,
];

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(SUITE, "put_and_head", put_and_head),
        scenario(SUITE, "empty_object", empty_object),
        scenario(SUITE, "overwrite_changes_etag", overwrite_changes_etag),
        scenario(SUITE, "content_encoding_gzip", content_encoding_gzip),
        scenario(SUITE, "arbitrary_content_encoding", arbitrary_content_encoding),
        Scenario {
            skip_for: &[Quirk::ContentTypeNotSetForKeysWithTrailingSlash],
            ..scenario(SUITE, "content_type_with_trailing_slash", content_type_with_trailing_slash)
        },
        Scenario {
            sensitive_to: &[Quirk::StorageClassNotKept],
            ..scenario(SUITE, "storage_class_retained", storage_class_retained)
        },
        scenario(SUITE, "user_metadata_retained", user_metadata_retained),
        scenario(
            SUITE,
            "metadata_overwrite_updates_last_modified",
            metadata_overwrite_updates_last_modified,
        ),
        scenario(
            SUITE,
            "data_overwrite_updates_last_modified",
            data_overwrite_updates_last_modified,
        ),
    ]
}

async fn head(ctx: &CaseContext, key: &str) -> CaseResult<HeadOutput> {
    let output = ctx
        .client()
        .head_object(&ObjectKey::from(key), HeadOptions::default())
        .await?;
    expect_success(&format!("HeadObject {}", key), &output)?;
    Ok(output)
}

async fn get(ctx: &CaseContext, key: &str) -> CaseResult<GetOutput> {
    let output = ctx
        .client()
        .get_object(&ObjectKey::from(key), GetOptions::default())
        .await?;
    expect_status(&format!("GetObject {}", key), &output, 200)?;
    Ok(output)
}

async fn put_and_check_length(ctx: &CaseContext, body: &[u8]) -> CaseResult {
    let stored = put(ctx, "foo", body).await?;
    let output = head(ctx, "foo").await?;
    expect_eq("HeadObject Content-Length", body.len() as u64, output.content_length)?;
    expect_eq("HeadObject ETag", stored.etag, output.etag)
}

fn put_and_head(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_and_check_length(ctx, b"bar").boxed()
}

fn empty_object(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_and_check_length(ctx, b"").boxed()
}

fn overwrite_changes_etag(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let first = put(ctx, "key", b"a").await?;
        let output = get(ctx, "key").await?;
        expect_eq("GetObject ETag", &first.etag, &output.etag)?;
        expect_eq("GetObject body", b"a".as_slice(), output.body.as_slice())?;

        let second = put(ctx, "key", b"bb").await?;
        expect_ne("PutObject ETag after update", &first.etag, &second.etag)?;

        let output = get(ctx, "key").await?;
        expect_eq("GetObject ETag", &second.etag, &output.etag)?;
        expect_eq("GetObject body", b"bb".as_slice(), output.body.as_slice())
    }
    .boxed()
}

async fn put_encoded(ctx: &CaseContext, key: &str, body: &[u8], encoding: &str) -> CaseResult {
    put_with(
        ctx,
        key,
        body,
        PutOptions {
            content_type: Some("text/xml".to_string()),
            content_encoding: Some(encoding.to_string()),
            ..Default::default()
        },
    )
    .await?;
    let output = get(ctx, key).await?;
    expect_eq(
        "GetObject Content-Encoding",
        Some(encoding),
        output.content_encoding.as_deref(),
    )?;
    expect_eq("GetObject body", body, output.body.as_slice())
}

fn content_encoding_gzip(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_encoded(ctx, "content-encoding-gzip", GZIPPED_XML, "gzip").boxed()
}

fn arbitrary_content_encoding(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_encoded(
        ctx,
        "content-encoding-unknown",
        b"<root></root>",
        "dd-plain-no-encoding",
    )
    .boxed()
}

fn content_type_with_trailing_slash(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put_with(
            ctx,
            "content-type/",
            b"",
            PutOptions {
                content_type: Some("text/empty".to_string()),
                ..Default::default()
            },
        )
        .await?;
        let output = get(ctx, "content-type/").await?;
        expect_eq(
            "GetObject Content-Type",
            Some("text/empty"),
            output.content_type.as_deref(),
        )
    }
    .boxed()
}

fn storage_class_retained(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put_with(
            ctx,
            "cold",
            b"archived",
            PutOptions {
                storage_class: Some("STANDARD_IA".to_string()),
                ..Default::default()
            },
        )
        .await?;
        let output = head(ctx, "cold").await?;
        let expected = ctx.resolve(Some("STANDARD_IA"), None, Quirk::StorageClassNotKept)?;
        expect_eq("HeadObject StorageClass", expected, output.storage_class.as_deref())
    }
    .boxed()
}

fn user_metadata_retained(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let metadata = BTreeMap::from([
            ("key1".to_string(), "var1".to_string()),
            ("key2".to_string(), "var2".to_string()),
        ]);
        put_with(
            ctx,
            "key",
            b"aaaaaaaaaa",
            PutOptions {
                metadata: metadata.clone(),
                ..Default::default()
            },
        )
        .await?;
        let output = head(ctx, "key").await?;
        expect_eq("HeadObject metadata", metadata, output.metadata)
    }
    .boxed()
}

/// Fails unless the second `Last-Modified` is later than the first.
fn expect_later(operation: &str, first: &HeadOutput, second: &HeadOutput) -> CaseResult {
    let earlier = parse_http_date(operation, first.last_modified.as_deref())?;
    let later = parse_http_date(operation, second.last_modified.as_deref())?;
    if later > earlier {
        return Ok(());
    }
    Err(FailureReason::Mismatch {
        operation: operation.to_string(),
        expected: format!("later than {}", earlier.to_rfc2822()),
        observed: later.to_rfc2822(),
    })
}

fn metadata_overwrite_updates_last_modified(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let content = b"aaaaaaaaaa";
        let first = put(ctx, "key", content).await?;
        let before = head(ctx, "key").await?;
        expect_eq("HeadObject ETag", &first.etag, &before.etag)?;

        tokio::time::sleep(OVERWRITE_DELAY).await;
        let metadata = BTreeMap::from([
            ("key1".to_string(), "var1".to_string()),
            ("key2".to_string(), "var2".to_string()),
        ]);
        let second = put_with(
            ctx,
            "key",
            content,
            PutOptions {
                metadata,
                ..Default::default()
            },
        )
        .await?;
        let after = head(ctx, "key").await?;
        expect_eq("HeadObject ETag", &second.etag, &after.etag)?;
        expect_later("HeadObject Last-Modified after metadata update", &before, &after)
    }
    .boxed()
}

fn data_overwrite_updates_last_modified(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "key", b"aaaaaaaaaaa").await?;
        let before = head(ctx, "key").await?;

        tokio::time::sleep(OVERWRITE_DELAY).await;
        put(ctx, "key", b"bbbbbbbbbbbbbbbbb").await?;
        let after = head(ctx, "key").await?;

        expect_ne("HeadObject ETag after data update", &before.etag, &after.etag)?;
        expect_later("HeadObject Last-Modified after data update", &before, &after)
    }
    .boxed()
}
