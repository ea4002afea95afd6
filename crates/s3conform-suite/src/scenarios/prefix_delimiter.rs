//! Prefix and delimiter listings.
//!
//! All of these assume that writing `a/b/c` creates exactly one object, so
//! they are skipped for services that materialize parent directories.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::storage::ListObjectsParams;
use s3conform_core::{
    CaseContext, CaseResult, ListingSimulator, ObjectKey, OrderingDiscipline, Quirk, Scenario,
    ScenarioBody,
};

use super::{expect_listing, put, scenario};

const SUITE: &str = "prefix_delimiter";

fn grouped(name: &'static str, body: ScenarioBody) -> Scenario {
    Scenario {
        skip_for: &[Quirk::KeysWithSlashesCreateImplicitObjects],
        ..scenario(SUITE, name, body)
    }
}

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        grouped("simple", simple),
        grouped("truncated_prefix", truncated_prefix),
        grouped("prefix_only", prefix_only),
        grouped("more_prefixes_than_max_keys", more_prefixes_than_max_keys),
        grouped("null_prefix", null_prefix),
        grouped("slash_prefix", slash_prefix),
        grouped("prefix_matching_object_key", prefix_matching_object_key),
        grouped("single_object_is_common_prefix", single_object_is_common_prefix),
    ]
}

/// Writes every key with its index as body and returns a simulator over
/// what was written. The keys are ASCII, so both orderings agree.
async fn populate(ctx: &CaseContext, names: Vec<String>) -> CaseResult<ListingSimulator> {
    for (i, name) in names.iter().enumerate() {
        put(ctx, name.as_str(), i.to_string().as_bytes()).await?;
    }
    Ok(ListingSimulator::new(
        names.into_iter().map(ObjectKey::from),
        OrderingDiscipline::Utf8Binary,
    ))
}

fn numbered(dir: &str, range: std::ops::Range<usize>) -> impl Iterator<Item = String> + '_ {
    range.map(move |i| format!("{}{}", dir, i))
}

/// `a`, `a/b/0..9`, `a/c/0..9` and `a/d`.
async fn populate_tree(ctx: &CaseContext) -> CaseResult<ListingSimulator> {
    let mut names = vec!["a".to_string()];
    names.extend(numbered("a/b/", 0..10));
    names.extend(numbered("a/c/", 0..10));
    names.push("a/d".to_string());
    populate(ctx, names).await
}

fn params(prefix: Option<&str>, delimiter: Option<&str>, max_keys: usize) -> ListObjectsParams {
    ListObjectsParams {
        prefix: prefix.map(ObjectKey::from),
        delimiter: delimiter.map(ObjectKey::from),
        max_keys: Some(max_keys),
        ..Default::default()
    }
}

fn simple(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = populate_tree(ctx).await?;
        expect_listing(ctx, &sim, params(Some("a/"), Some("/"), 10)).await
    }
    .boxed()
}

fn truncated_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = populate_tree(ctx).await?;
        expect_listing(ctx, &sim, params(Some("a/b/"), Some("/"), 10)).await
    }
    .boxed()
}

fn prefix_only(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = populate_tree(ctx).await?;
        expect_listing(ctx, &sim, params(Some("a/"), None, 10)).await
    }
    .boxed()
}

fn more_prefixes_than_max_keys(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let mut names = Vec::new();
        for i in 0..15u8 {
            names.push(format!("a/{}", i));
            names.push(format!("a/{}/b", i));
            names.push(format!("a/{}/{}", char::from(b'b' + i), i));
        }
        let sim = populate(ctx, names).await?;
        expect_listing(ctx, &sim, params(Some("a/"), Some("/"), 10)).await
    }
    .boxed()
}

fn null_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let mut names = vec!["a".to_string()];
        names.extend(numbered("b/", 0..500));
        names.extend(numbered("c/", 0..500));
        names.push("d".to_string());
        let sim = populate(ctx, names).await?;
        expect_listing(ctx, &sim, params(None, Some("/"), 10)).await
    }
    .boxed()
}

fn slash_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = populate_tree(ctx).await?;
        expect_listing(ctx, &sim, params(Some("/"), Some("/"), 10)).await
    }
    .boxed()
}

fn prefix_matching_object_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let mut names = vec!["a".to_string(), "b/".to_string()];
        names.extend(numbered("b/", 0..200));
        names.extend(numbered("c/", 0..10));
        names.push("d".to_string());
        let sim = populate(ctx, names).await?;
        expect_listing(ctx, &sim, params(Some("b/"), Some("/"), 10)).await
    }
    .boxed()
}

fn single_object_is_common_prefix(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        let sim = populate(ctx, vec!["b/".to_string()]).await?;
        expect_listing(ctx, &sim, params(Some(""), Some("/"), 10)).await
    }
    .boxed()
}
