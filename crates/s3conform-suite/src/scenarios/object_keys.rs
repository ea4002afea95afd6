//! Object key encoding: which byte sequences a service accepts as keys, and
//! whether it stores them verbatim.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_rejected, expect_status, expect_success};
use s3conform_core::codepoint::{self, raw_utf8, raw_utf8_with_width};
use s3conform_core::storage::{GetOptions, ListObjectsParams, PutOptions};
use s3conform_core::{CaseContext, CaseResult, FailureReason, ObjectKey, Quirk, Scenario};

use super::{keys, list_all_keys, put, scenario};

const SUITE: &str = "object_keys";

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(SUITE, "simple_key", simple_key),
        Scenario {
            skip_for: &[Quirk::KeysWithCodepointsOutsideBmpRejected],
            ..scenario(SUITE, "high_code_points_accepted", high_code_points_accepted)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithSlashesCreateImplicitObjects],
            ..scenario(SUITE, "no_implicit_directories", no_implicit_directories)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithInvalidUtf8NotRejected],
            ..scenario(SUITE, "encoded_surrogates_rejected", encoded_surrogates_rejected)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithCodepointMinRejected],
            ..scenario(SUITE, "codepoint_min_accepted", codepoint_min_accepted)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithNullNotRejected, Quirk::KeysWithNullAreTruncated],
            ..scenario(SUITE, "null_rejected", null_rejected)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithInvalidUtf8NotRejected],
            ..scenario(SUITE, "overlong_null_rejected", overlong_null_rejected)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithInvalidUtf8NotRejected],
            ..scenario(SUITE, "overlong_encoding_rejected", overlong_encoding_rejected)
        },
        scenario(SUITE, "no_normalization", no_normalization),
        Scenario {
            skip_for: &[Quirk::KeysWithNullAreTruncated],
            sensitive_to: &[Quirk::KeysWithNullNotRejected],
            ..scenario(SUITE, "null_sorts_first", null_sorts_first)
        },
    ]
}

/// Concatenates raw byte chunks into a key without validating them.
fn raw_key(chunks: &[&[u8]]) -> ObjectKey {
    ObjectKey::new(chunks.concat())
}

fn content() -> Vec<u8> {
    format!("Content: {}", uuid::Uuid::new_v4()).into_bytes()
}

async fn put_raw(ctx: &CaseContext, key: &ObjectKey) -> CaseResult<u16> {
    let output = ctx.client().put_object(key, &content(), PutOptions::default()).await?;
    Ok(output.status)
}

async fn expect_put_rejected(ctx: &CaseContext, key: ObjectKey) -> CaseResult {
    let output = ctx.client().put_object(&key, &content(), PutOptions::default()).await?;
    expect_rejected(&format!("PutObject {}", key), &output)
}

async fn expect_listed(ctx: &CaseContext, key: &ObjectKey) -> CaseResult {
    let listed = list_all_keys(ctx, ListObjectsParams::default()).await?;
    if listed.contains(key) {
        return Ok(());
    }
    Err(FailureReason::Mismatch {
        operation: "ListObjectsV2 keys".to_string(),
        expected: format!("a listing containing {:?}", key),
        observed: format!("{:?}", listed),
    })
}

fn simple_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let key = ObjectKey::from("key");
        put(ctx, key.clone(), &content()).await?;
        expect_listed(ctx, &key).await
    }
    .boxed()
}

fn high_code_points_accepted(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "a/b/c", &content()).await?;
        let key = raw_key(&[
            b"high-codepoints-",
            &raw_utf8(codepoint::CLAPPING_HANDS),
            b".key",
        ]);
        put(ctx, key.clone(), &content()).await?;
        expect_listed(ctx, &key).await
    }
    .boxed()
}

fn no_implicit_directories(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "a/b/c", b"abcd").await?;
        let listed = list_all_keys(ctx, ListObjectsParams::default()).await?;
        expect_eq("ListObjectsV2 keys", keys(&["a/b/c"]), listed)
    }
    .boxed()
}

fn encoded_surrogates_rejected(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let key = raw_key(&[
            b"surrogate-pairs-",
            &raw_utf8(codepoint::CLAPPING_HANDS_HIGH_SURROGATE),
            &raw_utf8(codepoint::CLAPPING_HANDS_LOW_SURROGATE),
            b".key",
        ]);
        expect_put_rejected(ctx, key).await
    }
    .boxed()
}

fn codepoint_min_accepted(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let key = raw_key(&[b"min-codepoint-", &raw_utf8(codepoint::CODEPOINT_MIN), b".key"]);
        let output = ctx.client().put_object(&key, &content(), PutOptions::default()).await?;
        expect_success(&format!("PutObject {}", key), &output)
    }
    .boxed()
}

fn null_rejected(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move { expect_put_rejected(ctx, raw_key(&[b"with-null-byte-", &[0], b".key"])).await }.boxed()
}

fn overlong_null_rejected(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let overlong = raw_utf8_with_width(0, 2).unwrap_or_default();
        expect_put_rejected(ctx, raw_key(&[b"keyPrefix", &overlong, b".key"])).await
    }
    .boxed()
}

fn overlong_encoding_rejected(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let overlong = raw_utf8_with_width(u32::from('a'), 4).unwrap_or_default();
        expect_put_rejected(ctx, raw_key(&[b"overlong-", &overlong, b".key"])).await
    }
    .boxed()
}

fn no_normalization(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let equivalents: [&[&str]; 2] = [
            &["\u{212B}", "\u{0041}\u{030A}", "\u{00C5}"],
            &["\u{00F6}", "o\u{0308}"],
        ];
        for forms in equivalents {
            let data = content();
            let stored = ObjectKey::from(forms[0]);
            put(ctx, stored.clone(), &data).await?;

            let output = ctx.client().get_object(&stored, GetOptions::default()).await?;
            expect_status(&format!("GetObject {}", stored), &output, 200)?;
            expect_eq(&format!("GetObject {} body", stored), data, output.body)?;

            for other in &forms[1..] {
                let key = ObjectKey::from(*other);
                let output = ctx.client().get_object(&key, GetOptions::default()).await?;
                expect_rejected(&format!("GetObject {} (equivalent of {})", key, stored), &output)?;
            }
        }
        Ok(())
    }
    .boxed()
}

fn null_sorts_first(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let with_null = raw_key(&[b"with-null-byte-", &[0], b".key"]);
        let with_a = raw_key(&[b"with-null-byte-", b"A", b".key"]);

        let accepted = ctx.has_quirk(Quirk::KeysWithNullNotRejected)?;
        let status = put_raw(ctx, &with_null).await?;
        expect_eq(
            &format!("PutObject {} accepted", with_null),
            accepted,
            (200..300).contains(&status),
        )?;
        put(ctx, with_a.clone(), &content()).await?;

        let expected = if accepted {
            vec![with_null, with_a]
        } else {
            vec![with_a]
        };
        let listed = list_all_keys(ctx, ListObjectsParams::default()).await?;
        expect_eq("ListObjectsV2 keys", expected, listed)
    }
    .boxed()
}
