//! Additional checksums on PutObject.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_success};
use s3conform_core::storage::{ChecksumAlgorithm, HeadOptions, PutOptions};
use s3conform_core::{CaseContext, CaseResult, ObjectKey, Quirk, Scenario, ScenarioBody};

use crate::checksums::checksum_of;

use super::{put_with, scenario};

const SUITE: &str = "checksum";

fn checksummed(name: &'static str, body: ScenarioBody) -> Scenario {
    Scenario {
        skip_for: &[Quirk::ChecksumsNotSupported],
        ..scenario(SUITE, name, body)
    }
}

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        checksummed("crc32", crc32),
        checksummed("crc32c", crc32c),
        checksummed("sha1", sha1),
        checksummed("sha256", sha256),
        checksummed("crc64nvme", crc64nvme),
        checksummed("large_body_crc32", large_body_crc32),
        checksummed("unknown_length_crc32", unknown_length_crc32),
    ]
}

/// A 1 MiB body that is not a repetition of a short pattern.
fn large_body() -> Vec<u8> {
    (0..1024 * 1024).map(|i: u32| (i % 251) as u8).collect()
}

async fn put_with_checksum(ctx: &CaseContext, algorithm: ChecksumAlgorithm, body: &[u8]) -> CaseResult {
    put_and_verify(ctx, algorithm, body, false).await
}

/// Stores `body` under `foo` and checks the checksum the service reports on
/// PutObject and on HeadObject with checksum mode enabled.
async fn put_and_verify(
    ctx: &CaseContext,
    algorithm: ChecksumAlgorithm,
    body: &[u8],
    unknown_length: bool,
) -> CaseResult {
    let key = ObjectKey::from("foo");
    let stored = put_with(
        ctx,
        key.clone(),
        body,
        PutOptions {
            checksum: Some(algorithm),
            unknown_length,
            ..Default::default()
        },
    )
    .await?;
    let expected = Some(checksum_of(algorithm, body));
    expect_eq(&format!("PutObject {:?} checksum", algorithm), &expected, &stored.checksum)?;

    let head = ctx
        .client()
        .head_object(
            &key,
            HeadOptions {
                checksum_mode: true,
                ..Default::default()
            },
        )
        .await?;
    expect_success("HeadObject", &head)?;
    expect_eq("HeadObject Content-Length", body.len() as u64, head.content_length)?;
    expect_eq("HeadObject ETag", stored.etag, head.etag)?;
    expect_eq(&format!("HeadObject {:?} checksum", algorithm), expected, head.checksum)
}

fn crc32(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_with_checksum(ctx, ChecksumAlgorithm::Crc32, b"bar").boxed()
}

fn crc32c(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_with_checksum(ctx, ChecksumAlgorithm::Crc32c, b"bar").boxed()
}

fn sha1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_with_checksum(ctx, ChecksumAlgorithm::Sha1, b"bar").boxed()
}

fn sha256(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_with_checksum(ctx, ChecksumAlgorithm::Sha256, b"bar").boxed()
}

fn crc64nvme(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    put_with_checksum(ctx, ChecksumAlgorithm::Crc64Nvme, b"bar").boxed()
}

fn large_body_crc32(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move { put_with_checksum(ctx, ChecksumAlgorithm::Crc32, &large_body()).await }.boxed()
}

fn unknown_length_crc32(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move { put_and_verify(ctx, ChecksumAlgorithm::Crc32, &large_body(), true).await }.boxed()
}
