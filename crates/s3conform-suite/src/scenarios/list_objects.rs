//! ListObjects (V1 and V2): pagination, start-after and marker bounds, sort
//! order, URL-encoded keys and listed ETags.

use std::collections::BTreeMap;

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_success};
use s3conform_core::codepoint::{self, raw_utf8};
use s3conform_core::storage::{HeadOptions, ListApi, ListObjectsParams};
use s3conform_core::{
    CaseContext, CaseResult, ListingSimulator, ObjectKey, OrderingDiscipline, Quirk, Scenario,
};

use super::{expect_listing, keys, list, listing_order, put, put_all, scenario, stored_keys};

const SUITE: &str = "list_objects";

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(SUITE, "empty_bucket", empty_bucket),
        scenario(SUITE, "simple", simple),
        scenario(SUITE, "simple_v1", simple_v1),
        scenario(SUITE, "paged_143_keys", paged_143_keys),
        scenario(SUITE, "paged_143_keys_v1", paged_143_keys_v1),
        scenario(SUITE, "start_after_existing_key", start_after_existing_key),
        scenario(SUITE, "start_after_missing_key", start_after_missing_key),
        scenario(SUITE, "marker_existing_key_v1", marker_existing_key_v1),
        scenario(SUITE, "marker_missing_key_v1", marker_missing_key_v1),
        scenario(SUITE, "marker_after_key_space", marker_after_key_space),
        Scenario {
            sensitive_to: &[Quirk::KeysWithSlashesCreateImplicitObjects],
            ..scenario(SUITE, "marker_before_prefix", marker_before_prefix)
        },
        scenario(SUITE, "marker_after_prefix", marker_after_prefix),
        scenario(SUITE, "key_with_comma", key_with_comma),
        scenario(SUITE, "key_with_comma_v1", key_with_comma_v1),
        Scenario {
            sensitive_to: &[Quirk::KeysWithSlashesCreateImplicitObjects],
            ..scenario(SUITE, "url_encoded_keys", url_encoded_keys)
        },
        Scenario {
            sensitive_to: &[Quirk::KeysWithSlashesCreateImplicitObjects],
            ..scenario(SUITE, "url_encoded_keys_v1", url_encoded_keys_v1)
        },
        Scenario {
            skip_for: &[Quirk::KeysWithCodepointsOutsideBmpRejected],
            sensitive_to: &[Quirk::KeysAreSortedInUtf16BinaryOrder],
            ..scenario(SUITE, "sort_order", sort_order)
        },
        Scenario {
            sensitive_to: &[Quirk::EtagEmptyAfterCopyObject],
            ..scenario(SUITE, "etag_after_copy", etag_after_copy)
        },
    ]
}

fn v1() -> ListObjectsParams {
    ListObjectsParams {
        api: ListApi::V1,
        ..Default::default()
    }
}

/// ASCII keys list identically under both orderings.
fn ascii_simulator(names: &[&str]) -> ListingSimulator {
    ListingSimulator::new(keys(names), OrderingDiscipline::Utf8Binary)
}

fn empty_bucket(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = ascii_simulator(&[]);
        expect_listing(ctx, &sim, ListObjectsParams::default()).await?;
        expect_listing(ctx, &sim, v1()).await
    }
    .boxed()
}

async fn list_simple(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult {
    let names = ["a", "l", "z"];
    put_all(ctx, names).await?;
    expect_listing(ctx, &ascii_simulator(&names), params).await
}

fn simple(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_simple(ctx, ListObjectsParams::default()).boxed()
}

fn simple_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_simple(ctx, v1()).boxed()
}

/// 143 decimal keys in pages of 7.
async fn list_paged(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult {
    let names: Vec<String> = (0..143).map(|i| i.to_string()).collect();
    put_all(ctx, names.iter().map(String::as_str)).await?;
    let sim = ListingSimulator::new(
        names.iter().map(|n| ObjectKey::from(n.as_str())),
        OrderingDiscipline::Utf8Binary,
    );
    expect_listing(
        ctx,
        &sim,
        ListObjectsParams {
            max_keys: Some(7),
            ..params
        },
    )
    .await
}

fn paged_143_keys(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_paged(ctx, ListObjectsParams::default()).boxed()
}

fn paged_143_keys_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_paged(ctx, v1()).boxed()
}

/// Keys `180`, `190` and `200`, one key per page after `bound`.
async fn list_after(ctx: &CaseContext, api: ListApi, bound: &str) -> CaseResult {
    let names = ["180", "190", "200"];
    put_all(ctx, names).await?;
    let bound = Some(ObjectKey::from(bound));
    let params = match api {
        ListApi::V1 => ListObjectsParams {
            marker: bound,
            ..v1()
        },
        ListApi::V2 => ListObjectsParams {
            start_after: bound,
            ..Default::default()
        },
    };
    expect_listing(
        ctx,
        &ascii_simulator(&names),
        ListObjectsParams {
            max_keys: Some(1),
            ..params
        },
    )
    .await
}

fn start_after_existing_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_after(ctx, ListApi::V2, "180").boxed()
}

fn start_after_missing_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_after(ctx, ListApi::V2, "185").boxed()
}

fn marker_existing_key_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_after(ctx, ListApi::V1, "180").boxed()
}

fn marker_missing_key_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_after(ctx, ListApi::V1, "185").boxed()
}

fn marker_params(prefix: Option<&str>, marker: &str) -> ListObjectsParams {
    ListObjectsParams {
        prefix: prefix.map(ObjectKey::from),
        marker: Some(ObjectKey::from(marker)),
        max_keys: Some(10),
        ..v1()
    }
}

fn marker_after_key_space(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "A/B", b"content").await?;
        let sim = ascii_simulator(&["A/B"]);
        expect_listing(ctx, &sim, marker_params(None, "A/C")).await
    }
    .boxed()
}

fn marker_before_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "Z/A", b"content").await?;
        let stored = stored_keys(ctx, keys(&["Z/A"]))?;
        let sim = ListingSimulator::new(stored, OrderingDiscipline::Utf8Binary);
        expect_listing(ctx, &sim, marker_params(Some("Z"), "A/C")).await
    }
    .boxed()
}

fn marker_after_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "A/A", b"content").await?;
        let sim = ascii_simulator(&["A/A"]);
        expect_listing(ctx, &sim, marker_params(Some("A/"), "Z/")).await
    }
    .boxed()
}

async fn list_with_comma(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult {
    put(ctx, "a", b"dataA").await?;
    put(ctx, "c", b"dataC").await?;
    put(ctx, "z,a", b"dataZ").await?;
    let sim = ascii_simulator(&["a", "c", "z,a"]);
    expect_listing(
        ctx,
        &sim,
        ListObjectsParams {
            max_keys: Some(10),
            url_encoded: true,
            ..params
        },
    )
    .await
}

fn key_with_comma(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_with_comma(ctx, ListObjectsParams::default()).boxed()
}

fn key_with_comma_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_with_comma(ctx, v1()).boxed()
}

/// Keys that only survive a listing if the service percent-encodes them.
/// They all sit below the surrogate block, so both orderings agree.
const AWKWARD_KEYS: &[&str] = &[
    "a b",
    "c+d",
    "e%2Ff",
    "g&h=i?j",
    "k/l m/n",
    "o<p>q",
    "\u{fc}/\u{df}",
    "z,a",
];

async fn list_url_encoded(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult {
    put_all(ctx, AWKWARD_KEYS.to_vec()).await?;
    let stored = stored_keys(ctx, keys(AWKWARD_KEYS))?;
    let sim = ListingSimulator::new(stored.clone(), OrderingDiscipline::Utf8Binary);
    let encoded = |delimiter: Option<&str>| ListObjectsParams {
        delimiter: delimiter.map(ObjectKey::from),
        max_keys: Some(3),
        url_encoded: true,
        ..params.clone()
    };
    expect_listing(ctx, &sim, encoded(None)).await?;
    expect_listing(ctx, &sim, encoded(Some("/"))).await
}

fn url_encoded_keys(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_url_encoded(ctx, ListObjectsParams::default()).boxed()
}

fn url_encoded_keys_v1(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    list_url_encoded(ctx, v1()).boxed()
}

fn sort_order(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let a = ObjectKey::from("a");
        let before_surrogates = ObjectKey::new(raw_utf8(codepoint::BEFORE_SURROGATES));
        let after_surrogates = ObjectKey::new(raw_utf8(codepoint::AFTER_SURROGATES));
        let clapping = ObjectKey::new(raw_utf8(codepoint::CLAPPING_HANDS));
        let open_hands = ObjectKey::new(raw_utf8(codepoint::OPEN_HANDS));
        let stored = vec![
            a,
            before_surrogates.clone(),
            after_surrogates,
            clapping.clone(),
            open_hands,
        ];
        for key in &stored {
            put(ctx, key.clone(), key.as_bytes()).await?;
        }

        let sim = ListingSimulator::new(stored, listing_order(ctx)?);
        let bounds = [
            None,
            Some(before_surrogates),
            Some(clapping),
            Some(ObjectKey::new(raw_utf8(codepoint::CODEPOINT_MAX))),
        ];
        for start_after in bounds {
            let params = ListObjectsParams {
                start_after,
                url_encoded: true,
                ..Default::default()
            };
            expect_listing(ctx, &sim, params).await?;
        }
        Ok(())
    }
    .boxed()
}

fn etag_after_copy(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let key = ObjectKey::from("key");
        let stored = put(ctx, key.clone(), b"body").await?;

        let metadata = BTreeMap::from([("metakey".to_string(), "metavalue".to_string())]);
        let copied = ctx.client().copy_object(&key, &key, metadata).await?;
        expect_success("CopyObject", &copied)?;
        expect_eq("CopyObject ETag", stored.etag.clone(), copied.etag.clone())?;

        let head = ctx.client().head_object(&key, HeadOptions::default()).await?;
        expect_success("HeadObject", &head)?;
        expect_eq("HeadObject ETag", copied.etag.clone(), head.etag)?;

        let expected = ctx.resolve(
            copied.etag,
            Some("\"\"".to_string()),
            Quirk::EtagEmptyAfterCopyObject,
        )?;
        for params in [ListObjectsParams::default(), v1()] {
            let operation = format!("{} ETag", params.api.operation());
            let listed = list(ctx, params).await?;
            let listed_etag = listed.entries.first().map(|entry| entry.etag.clone());
            expect_eq(&operation, expected.clone(), listed_etag)?;
        }
        Ok(())
    }
    .boxed()
}
