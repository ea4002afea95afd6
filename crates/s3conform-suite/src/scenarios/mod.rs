//! The scenario catalog.
//!
//! Every scenario is plain data: a name, the suite it belongs to, the quirks
//! that skip it, the quirks its expectations depend on, and an async body.

use chrono::{DateTime, FixedOffset};

use s3conform_core::case::{expect_marker_page, expect_page, expect_success};
use s3conform_core::storage::{ListApi, ListObjectsParams, ListOutput, PutOptions, PutOutput};
use s3conform_core::{
    CaseContext, CaseResult, FailureReason, ListingRequest, ListingSimulator, ObjectKey,
    OrderingDiscipline, Quirk, Scenario, ScenarioBody,
};

pub mod checksum;
pub mod conditional;
pub mod delete;
pub mod get_object;
pub mod list_buckets;
pub mod list_objects;
pub mod multipart;
pub mod object_keys;
pub mod prefix_delimiter;
pub mod put_object;

/// Every scenario, grouped by suite in catalog order.
pub fn catalog() -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    scenarios.extend(get_object::scenarios());
    scenarios.extend(list_objects::scenarios());
    scenarios.extend(list_buckets::scenarios());
    scenarios.extend(prefix_delimiter::scenarios());
    scenarios.extend(object_keys::scenarios());
    scenarios.extend(conditional::scenarios());
    scenarios.extend(put_object::scenarios());
    scenarios.extend(delete::scenarios());
    scenarios.extend(checksum::scenarios());
    scenarios.extend(multipart::scenarios());
    scenarios
}

/// A scenario with no quirk declarations.
pub(crate) fn scenario(suite: &'static str, name: &'static str, body: ScenarioBody) -> Scenario {
    Scenario {
        name,
        suite,
        skip_for: &[],
        sensitive_to: &[],
        body,
    }
}

pub(crate) fn keys(names: &[&str]) -> Vec<ObjectKey> {
    names.iter().map(|name| ObjectKey::from(*name)).collect()
}

/// Stores `body` under `key` and requires the put to succeed.
pub(crate) async fn put(ctx: &CaseContext, key: impl Into<ObjectKey>, body: &[u8]) -> CaseResult<PutOutput> {
    put_with(ctx, key, body, PutOptions::default()).await
}

pub(crate) async fn put_with(
    ctx: &CaseContext,
    key: impl Into<ObjectKey>,
    body: &[u8],
    options: PutOptions,
) -> CaseResult<PutOutput> {
    let key = key.into();
    let output = ctx.client().put_object(&key, body, options).await?;
    expect_success(&format!("PutObject {}", key), &output)?;
    Ok(output)
}

/// Stores each name with its own name as body.
pub(crate) async fn put_all<'a>(ctx: &CaseContext, names: impl IntoIterator<Item = &'a str>) -> CaseResult {
    for name in names {
        put(ctx, name, name.as_bytes()).await?;
    }
    Ok(())
}

/// Parses an RFC 1123 date header (`Date`, `Last-Modified`), failing with
/// [`FailureReason::MalformedHeader`] if it is absent or malformed.
pub(crate) fn parse_http_date(operation: &str, raw: Option<&str>) -> CaseResult<DateTime<FixedOffset>> {
    raw.and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .ok_or_else(|| FailureReason::MalformedHeader {
            operation: operation.to_string(),
            header: raw.unwrap_or("<absent>").to_string(),
        })
}

/// Lists with `params`. A URL-encoded response is decoded back to raw keys,
/// so callers compare it exactly like an unencoded one.
pub(crate) async fn list(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult<ListOutput> {
    let url_encoded = params.url_encoded;
    let operation = params.api.operation();
    let mut output = ctx.client().list_objects(params).await?;
    expect_success(operation, &output)?;
    if url_encoded {
        for entry in &mut output.entries {
            entry.key = url_decode(&entry.key);
        }
        output.common_prefixes = output.common_prefixes.iter().map(url_decode).collect();
        output.next_marker = output.next_marker.as_ref().map(url_decode);
    }
    Ok(output)
}

/// Decodes an `encoding-type=url` value. A `+` stands for a space; a literal
/// plus arrives as `%2B`.
pub(crate) fn url_decode(encoded: &ObjectKey) -> ObjectKey {
    let form: Vec<u8> = encoded
        .as_bytes()
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    ObjectKey::new(urlencoding::decode_binary(&form).into_owned())
}

/// Points `params` at the page after `page`: the continuation token for V2,
/// and for V1 the `NextMarker`, falling back to the last listed key.
fn advance(params: &mut ListObjectsParams, page: &ListOutput) -> CaseResult {
    let operation = params.api.operation();
    let missing = |what: &str| FailureReason::Mismatch {
        operation: format!("{} paging", operation),
        expected: format!("{} on a truncated page", what),
        observed: "none".to_string(),
    };
    match params.api {
        ListApi::V2 => {
            let token = page.next_token.clone().ok_or_else(|| missing("a continuation token"))?;
            params.continuation_token = Some(token);
        }
        ListApi::V1 => {
            let marker = page
                .next_marker
                .clone()
                .or_else(|| page.entries.last().map(|entry| entry.key.clone()))
                .ok_or_else(|| missing("a NextMarker or a listed key"))?;
            params.marker = Some(marker);
        }
    }
    Ok(())
}

/// Follows tokens (or markers) until the listing is exhausted and returns
/// every key in service order.
pub(crate) async fn list_all_keys(ctx: &CaseContext, params: ListObjectsParams) -> CaseResult<Vec<ObjectKey>> {
    let mut params = params;
    let mut all = Vec::new();
    loop {
        let page = list(ctx, params.clone()).await?;
        all.extend(page.keys());
        if !page.truncated {
            return Ok(all);
        }
        advance(&mut params, &page)?;
    }
}

/// Lists with `params` and checks every page, following tokens (or
/// markers), against the pages `sim` computes for the same request.
pub(crate) async fn expect_listing(
    ctx: &CaseContext,
    sim: &ListingSimulator,
    params: ListObjectsParams,
) -> CaseResult {
    let expected = sim.pages(ListingRequest::from_params(&params));
    let mut params = params;
    for (i, page) in expected.iter().enumerate() {
        let observed = list(ctx, params.clone()).await?;
        let operation = format!("{} page {}", params.api.operation(), i + 1);
        match params.api {
            ListApi::V1 => expect_marker_page(&operation, page, &observed)?,
            ListApi::V2 => expect_page(&operation, page, &observed)?,
        }
        if observed.truncated {
            advance(&mut params, &observed)?;
        }
    }
    Ok(())
}

/// `keys` plus every parent directory a service with
/// [`Quirk::KeysWithSlashesCreateImplicitObjects`] materializes.
pub(crate) fn with_implicit_parents(keys: Vec<ObjectKey>) -> Vec<ObjectKey> {
    let mut all = keys.clone();
    for key in &keys {
        let bytes = key.as_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            if *byte == b'/' && i + 1 < bytes.len() {
                all.push(ObjectKey::new(&bytes[..=i]));
            }
        }
    }
    all
}

/// The keys a service holds after `keys` were written, given its declared
/// quirks. The scenario must declare the implicit-object quirk.
pub(crate) fn stored_keys(ctx: &CaseContext, keys: Vec<ObjectKey>) -> CaseResult<Vec<ObjectKey>> {
    Ok(if ctx.has_quirk(Quirk::KeysWithSlashesCreateImplicitObjects)? {
        with_implicit_parents(keys)
    } else {
        keys
    })
}

/// The order the service is declared to list keys in. The scenario must
/// declare the UTF-16 ordering quirk.
pub(crate) fn listing_order(ctx: &CaseContext) -> CaseResult<OrderingDiscipline> {
    ctx.resolve(
        OrderingDiscipline::Utf8Binary,
        OrderingDiscipline::Utf16Binary,
        Quirk::KeysAreSortedInUtf16BinaryOrder,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_full_names_are_unique() {
        let catalog = catalog();
        let names: HashSet<String> = catalog.iter().map(Scenario::full_name).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_names_are_filter_friendly() {
        for scenario in catalog() {
            assert!(
                scenario
                    .full_name()
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.'),
                "{}",
                scenario.full_name()
            );
        }
    }

    #[test]
    fn test_url_decode_handles_form_and_percent_encoding() {
        assert_eq!(url_decode(&ObjectKey::from("a+b%2Bc%2Fd")), ObjectKey::from("a b+c/d"));
        assert_eq!(url_decode(&ObjectKey::from("%FF%00")), ObjectKey::new(vec![0xFF, 0x00]));
        assert_eq!(url_decode(&ObjectKey::from("plain")), ObjectKey::from("plain"));
    }

    #[test]
    fn test_parse_http_date() {
        let date = parse_http_date("Date", Some("Sun, 06 Nov 1994 08:49:37 GMT")).unwrap();
        assert_eq!(date.timestamp(), 784111777);
        assert!(matches!(
            parse_http_date("Date", Some("1994-11-06T08:49:37Z")),
            Err(FailureReason::MalformedHeader { .. })
        ));
        assert!(parse_http_date("Date", None).is_err());
    }

    #[test]
    fn test_with_implicit_parents() {
        let all = with_implicit_parents(keys(&["a/b/c", "d", "e/"]));
        assert_eq!(all, keys(&["a/b/c", "d", "e/", "a/", "a/b/"]));
    }

    #[test]
    fn test_advance_v1_falls_back_to_last_key() {
        let mut params = ListObjectsParams {
            api: ListApi::V1,
            ..Default::default()
        };
        let page = ListOutput {
            status: 200,
            truncated: true,
            entries: vec![s3conform_core::storage::ObjectSummary {
                key: ObjectKey::from("k"),
                etag: "\"e\"".to_string(),
                size: 1,
            }],
            ..Default::default()
        };
        advance(&mut params, &page).unwrap();
        assert_eq!(params.marker, Some(ObjectKey::from("k")));

        let mut v2 = ListObjectsParams::default();
        assert!(advance(&mut v2, &page).is_err());
    }

    #[test]
    fn test_every_suite_contributes() {
        let suites: HashSet<&str> = catalog().iter().map(|s| s.suite).collect();
        for suite in [
            "get_object",
            "list_objects",
            "list_buckets",
            "prefix_delimiter",
            "object_keys",
            "conditional",
            "put_object",
            "delete",
            "checksum",
            "multipart",
        ] {
            assert!(suites.contains(suite), "missing suite {}", suite);
        }
    }
}
