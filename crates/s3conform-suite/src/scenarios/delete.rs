//! DeleteObject and DeleteObjects.

use futures::future::{BoxFuture, FutureExt};

use s3conform_core::case::{expect_eq, expect_status, expect_success};
use s3conform_core::storage::{DeleteObjectsOutput, DeleteTarget, HeadOptions};
use s3conform_core::{CaseContext, CaseResult, ObjectKey, Scenario};

use super::{keys, put, scenario};

const SUITE: &str = "delete";

pub(crate) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(SUITE, "delete_object", delete_object),
        scenario(SUITE, "delete_key_with_dot_dot", delete_key_with_dot_dot),
        scenario(SUITE, "delete_objects_by_key", delete_objects_by_key),
        scenario(SUITE, "delete_objects_matching_etag", delete_objects_matching_etag),
        scenario(SUITE, "delete_objects_different_etag", delete_objects_different_etag),
        scenario(SUITE, "delete_objects_with_dot_dot", delete_objects_with_dot_dot),
    ]
}

/// Deletes `name` and checks that it is gone.
async fn delete_and_verify(ctx: &CaseContext, name: &str) -> CaseResult {
    let key = ObjectKey::from(name);
    let output = ctx.client().delete_object(&key).await?;
    expect_success(&format!("DeleteObject {}", name), &output)?;
    let head = ctx.client().head_object(&key, HeadOptions::default()).await?;
    expect_status(&format!("HeadObject {} after delete", name), &head, 404)
}

async fn delete_many(ctx: &CaseContext, targets: Vec<DeleteTarget>) -> CaseResult<DeleteObjectsOutput> {
    let output = ctx.client().delete_objects(targets).await?;
    expect_success("DeleteObjects", &output)?;
    Ok(output)
}

fn sorted(mut deleted: Vec<ObjectKey>) -> Vec<ObjectKey> {
    deleted.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    deleted
}

fn delete_object(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "foo", b"Hello, World!").await?;
        delete_and_verify(ctx, "foo").await
    }
    .boxed()
}

fn delete_key_with_dot_dot(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "f..o", b"Hello, World!").await?;
        let head = ctx
            .client()
            .head_object(&ObjectKey::from("f..o"), HeadOptions::default())
            .await?;
        expect_success("HeadObject f..o", &head)?;
        delete_and_verify(ctx, "f..o").await
    }
    .boxed()
}

async fn delete_pair(ctx: &CaseContext, first: &str, second: &str) -> CaseResult {
    put(ctx, first, b"Hello").await?;
    put(ctx, second, b"World").await?;
    let output = delete_many(ctx, vec![DeleteTarget::key(first), DeleteTarget::key(second)]).await?;
    expect_eq("DeleteObjects deleted", keys(&[first, second]), sorted(output.deleted))
}

fn delete_objects_by_key(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    delete_pair(ctx, "a", "b").boxed()
}

fn delete_objects_with_dot_dot(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    delete_pair(ctx, "a..b", "c..d").boxed()
}

fn delete_objects_matching_etag(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "a", b"Hello").await?;
        let head = ctx
            .client()
            .head_object(&ObjectKey::from("a"), HeadOptions::default())
            .await?;
        expect_success("HeadObject a", &head)?;
        let target = match head.etag {
            Some(etag) => DeleteTarget::with_etag("a", etag),
            None => DeleteTarget::key("a"),
        };
        let output = delete_many(ctx, vec![target]).await?;
        expect_eq("DeleteObjects deleted", keys(&["a"]), sorted(output.deleted))
    }
    .boxed()
}

fn delete_objects_different_etag(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
    async move {
        put(ctx, "a", b"Hello").await?;
        let output = delete_many(ctx, vec![DeleteTarget::with_etag("a", "\"foo\"")]).await?;
        expect_eq("DeleteObjects deleted", Vec::<ObjectKey>::new(), output.deleted)
    }
    .boxed()
}
