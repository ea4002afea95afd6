//! Running a single conformance scenario.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::listing::ListingPage;
use crate::outcome::{ConformanceOutcome, FailureReason};
use crate::quirks::{Quirk, QuirkMatrix};
use crate::range::ByteRangeResponse;
use crate::storage::{ListOutput, StatusReply, StorageClient, StorageError, StorageProvider};

/// Result of a scenario body or of one of its assertions.
pub type CaseResult<T = ()> = std::result::Result<T, FailureReason>;

/// The asynchronous body of a scenario.
pub type ScenarioBody = for<'a> fn(&'a CaseContext) -> BoxFuture<'a, CaseResult>;

impl From<StorageError> for FailureReason {
    fn from(err: StorageError) -> Self {
        FailureReason::Storage {
            message: err.to_string(),
        }
    }
}

/// A conformance scenario, declared as data.
#[derive(Clone, Copy)]
pub struct Scenario {
    /// Scenario name, unique within its suite
    pub name: &'static str,
    /// Suite the scenario belongs to
    pub suite: &'static str,
    /// The scenario is not run if any of these quirks is declared
    pub skip_for: &'static [Quirk],
    /// Quirks the body may resolve expectations against
    pub sensitive_to: &'static [Quirk],
    /// The body
    pub body: ScenarioBody,
}

impl Scenario {
    /// `suite.name`, the string include/exclude filters match against.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.suite, self.name)
    }

    /// Whether the scenario declares `quirk` through either list.
    pub fn declares(&self, quirk: Quirk) -> bool {
        self.skip_for.contains(&quirk) || self.sensitive_to.contains(&quirk)
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("suite", &self.suite)
            .field("skip_for", &self.skip_for)
            .field("sensitive_to", &self.sensitive_to)
            .finish_non_exhaustive()
    }
}

/// What a scenario body sees: its storage session and the quirk matrix.
pub struct CaseContext {
    client: Box<dyn StorageClient>,
    quirks: Arc<QuirkMatrix>,
    scenario: Scenario,
}

impl CaseContext {
    /// Builds a context for `scenario` around an open session.
    pub fn new(client: Box<dyn StorageClient>, quirks: Arc<QuirkMatrix>, scenario: Scenario) -> Self {
        Self {
            client,
            quirks,
            scenario,
        }
    }

    /// The storage session.
    pub fn client(&self) -> &dyn StorageClient {
        self.client.as_ref()
    }

    /// The scenario being run.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// `alternate` if `quirk` is declared for the service, `baseline`
    /// otherwise. Resolving a quirk the scenario did not declare fails the
    /// scenario with [`FailureReason::QuirkGap`].
    pub fn resolve<T>(&self, baseline: T, alternate: T, quirk: Quirk) -> CaseResult<T> {
        if !self.scenario.declares(quirk) {
            return Err(FailureReason::QuirkGap { quirk });
        }
        Ok(self.quirks.resolve_expectation(baseline, alternate, quirk))
    }

    /// Whether the service has `quirk`, subject to the same declaration rule
    /// as [`CaseContext::resolve`].
    pub fn has_quirk(&self, quirk: Quirk) -> CaseResult<bool> {
        self.resolve(false, true, quirk)
    }
}

/// Runs one scenario against a storage provider.
pub struct ConformanceCase {
    scenario: Scenario,
    quirks: Arc<QuirkMatrix>,
}

impl ConformanceCase {
    /// Creates a case for `scenario` under the shared quirk matrix.
    pub fn new(scenario: Scenario, quirks: Arc<QuirkMatrix>) -> Self {
        Self { scenario, quirks }
    }

    /// Skips, or opens a session, runs the body, tears the session down and
    /// classifies the result.
    pub async fn run(&self, provider: &dyn StorageProvider) -> ConformanceOutcome {
        let span = info_span!("case", suite = self.scenario.suite, name = self.scenario.name);
        self.run_inner(provider).instrument(span).await
    }

    async fn run_inner(&self, provider: &dyn StorageProvider) -> ConformanceOutcome {
        if let Some(quirk) = self.quirks.skipping_quirk(self.scenario.skip_for) {
            info!(quirk = %quirk, "skipped");
            return ConformanceOutcome::Skipped(quirk);
        }

        let client = match provider.open_session(self.scenario.name).await {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to open storage session");
                return ConformanceOutcome::Failed(err.into());
            }
        };
        let ctx = CaseContext::new(client, Arc::clone(&self.quirks), self.scenario);

        debug!("running scenario body");
        let result = (self.scenario.body)(&ctx).await;

        if let Err(err) = ctx.client.close().await {
            warn!(error = %err, "failed to close storage session");
        }

        match result {
            Ok(()) => {
                info!("passed");
                ConformanceOutcome::Passed
            }
            Err(reason) => {
                info!(reason = %reason, "failed");
                ConformanceOutcome::Failed(reason)
            }
        }
    }
}

/// Fails with [`FailureReason::Mismatch`] unless `expected == observed`.
pub fn expect_eq<T>(operation: &str, expected: T, observed: T) -> CaseResult
where
    T: PartialEq + fmt::Debug,
{
    if expected == observed {
        return Ok(());
    }
    Err(FailureReason::Mismatch {
        operation: operation.to_string(),
        expected: format!("{:?}", expected),
        observed: format!("{:?}", observed),
    })
}

/// Fails with [`FailureReason::Mismatch`] if `unexpected == observed`.
pub fn expect_ne<T>(operation: &str, unexpected: T, observed: T) -> CaseResult
where
    T: PartialEq + fmt::Debug,
{
    if unexpected != observed {
        return Ok(());
    }
    Err(FailureReason::Mismatch {
        operation: operation.to_string(),
        expected: format!("anything but {:?}", unexpected),
        observed: format!("{:?}", observed),
    })
}

/// Fails with [`FailureReason::UnexpectedStatus`] unless the reply carries
/// exactly `expected`.
pub fn expect_status(operation: &str, reply: &impl StatusReply, expected: u16) -> CaseResult {
    if reply.status() == expected {
        return Ok(());
    }
    Err(FailureReason::UnexpectedStatus {
        operation: operation.to_string(),
        status: reply.status(),
        message: format!(
            "expected {}, service error: {}",
            expected,
            reply.error().unwrap_or("none")
        ),
    })
}

/// Fails with [`FailureReason::UnexpectedStatus`] unless the reply is 2xx.
pub fn expect_success(operation: &str, reply: &impl StatusReply) -> CaseResult {
    if reply.is_success() {
        return Ok(());
    }
    Err(FailureReason::UnexpectedStatus {
        operation: operation.to_string(),
        status: reply.status(),
        message: reply.error().unwrap_or("none").to_string(),
    })
}

/// Fails with [`FailureReason::UnexpectedStatus`] unless the reply is an
/// error status (3xx and above).
pub fn expect_rejected(operation: &str, reply: &impl StatusReply) -> CaseResult {
    if reply.status() >= 300 {
        return Ok(());
    }
    Err(FailureReason::UnexpectedStatus {
        operation: operation.to_string(),
        status: reply.status(),
        message: "expected the request to be rejected".to_string(),
    })
}

/// Parses a `Content-Range` header, failing with
/// [`FailureReason::MalformedHeader`] if it is absent or malformed.
pub fn parse_content_range(operation: &str, raw: Option<&str>) -> CaseResult<ByteRangeResponse> {
    raw.and_then(ByteRangeResponse::parse)
        .ok_or_else(|| FailureReason::MalformedHeader {
            operation: operation.to_string(),
            header: raw.unwrap_or("<absent>").to_string(),
        })
}

/// Compares an observed listing page with the simulated one. Continuation
/// tokens are opaque and only checked for presence.
pub fn expect_page(operation: &str, expected: &ListingPage, observed: &ListOutput) -> CaseResult {
    expect_page_contents(operation, expected, observed)?;
    expect_eq(
        &format!("{} continuation token present", operation),
        expected.truncated,
        observed.next_token.is_some(),
    )
}

/// Like [`expect_page`] for a V1 listing, which pages by marker. `NextMarker`
/// is optional even on a truncated page, so only the contents are compared.
pub fn expect_marker_page(operation: &str, expected: &ListingPage, observed: &ListOutput) -> CaseResult {
    expect_page_contents(operation, expected, observed)
}

fn expect_page_contents(operation: &str, expected: &ListingPage, observed: &ListOutput) -> CaseResult {
    expect_success(operation, observed)?;
    expect_eq(
        &format!("{} keys", operation),
        &expected.entries,
        &observed.keys(),
    )?;
    expect_eq(
        &format!("{} common prefixes", operation),
        &expected.common_prefixes,
        &observed.common_prefixes,
    )?;
    expect_eq(
        &format!("{} truncated", operation),
        expected.truncated,
        observed.truncated,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ObjectKey;
    use crate::quirks::QuirkSet;
    use crate::storage::*;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        fail_open: bool,
    }

    struct NullClient {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StorageProvider for CountingProvider {
        async fn open_session(&self, _case_name: &str) -> StorageResult<Box<dyn StorageClient>> {
            if self.fail_open {
                return Err(StorageError::Session("bucket creation refused".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullClient {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn unsupported<T>(op: &str) -> StorageResult<T> {
        Err(StorageError::NotImplemented(op.to_string()))
    }

    #[async_trait]
    impl StorageClient for NullClient {
        async fn put_object(&self, _: &ObjectKey, _: &[u8], _: PutOptions) -> StorageResult<PutOutput> {
            Ok(PutOutput {
                status: 200,
                etag: Some("\"e\"".to_string()),
                ..Default::default()
            })
        }
        async fn get_object(&self, _: &ObjectKey, _: GetOptions) -> StorageResult<GetOutput> {
            unsupported("GetObject")
        }
        async fn head_object(&self, _: &ObjectKey, _: HeadOptions) -> StorageResult<HeadOutput> {
            unsupported("HeadObject")
        }
        async fn copy_object(
            &self,
            _: &ObjectKey,
            _: &ObjectKey,
            _: BTreeMap<String, String>,
        ) -> StorageResult<CopyOutput> {
            unsupported("CopyObject")
        }
        async fn delete_object(&self, _: &ObjectKey) -> StorageResult<DeleteOutput> {
            unsupported("DeleteObject")
        }
        async fn delete_objects(&self, _: Vec<DeleteTarget>) -> StorageResult<DeleteObjectsOutput> {
            unsupported("DeleteObjects")
        }
        async fn list_objects(&self, _: ListObjectsParams) -> StorageResult<ListOutput> {
            unsupported("ListObjectsV2")
        }
        async fn list_buckets(&self) -> StorageResult<ListBucketsOutput> {
            unsupported("ListBuckets")
        }
        async fn create_multipart_upload(&self, _: &ObjectKey) -> StorageResult<CreateMultipartOutput> {
            unsupported("CreateMultipartUpload")
        }
        async fn upload_part(&self, _: &ObjectKey, _: &str, _: u32, _: &[u8]) -> StorageResult<UploadPartOutput> {
            unsupported("UploadPart")
        }
        async fn complete_multipart_upload(
            &self,
            _: &ObjectKey,
            _: &str,
            _: Vec<CompletedPart>,
        ) -> StorageResult<CompleteMultipartOutput> {
            unsupported("CompleteMultipartUpload")
        }
        async fn close(&self) -> StorageResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn put_succeeds(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
        async move {
            let out = ctx
                .client()
                .put_object(&ObjectKey::from("k"), b"v", PutOptions::default())
                .await?;
            expect_status("PutObject", &out, 200)
        }
        .boxed()
    }

    fn get_fails(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
        async move {
            ctx.client()
                .get_object(&ObjectKey::from("k"), GetOptions::default())
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn resolves_undeclared(ctx: &CaseContext) -> BoxFuture<'_, CaseResult> {
        async move {
            ctx.resolve(412, 501, Quirk::PutObjectIfMatchEtagNotSupported)?;
            Ok(())
        }
        .boxed()
    }

    fn scenario(body: ScenarioBody, skip_for: &'static [Quirk]) -> Scenario {
        Scenario {
            name: "sample",
            suite: "case",
            skip_for,
            sensitive_to: &[],
            body,
        }
    }

    fn matrix(quirks: &[Quirk]) -> Arc<QuirkMatrix> {
        Arc::new(QuirkMatrix::new(quirks.iter().copied().collect::<QuirkSet>()))
    }

    #[tokio::test]
    async fn test_passing_case_closes_session() {
        let provider = CountingProvider::default();
        let case = ConformanceCase::new(scenario(put_succeeds, &[]), matrix(&[]));
        assert_eq!(case.run(&provider).await, ConformanceOutcome::Passed);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_does_not_open_session() {
        let provider = CountingProvider::default();
        let case = ConformanceCase::new(
            scenario(put_succeeds, &[Quirk::ChecksumsNotSupported]),
            matrix(&[Quirk::ChecksumsNotSupported]),
        );
        assert_eq!(
            case.run(&provider).await,
            ConformanceOutcome::Skipped(Quirk::ChecksumsNotSupported)
        );
        assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_error_is_reported_verbatim() {
        let provider = CountingProvider::default();
        let case = ConformanceCase::new(scenario(get_fails, &[]), matrix(&[]));
        assert_eq!(
            case.run(&provider).await,
            ConformanceOutcome::Failed(FailureReason::Storage {
                message: "operation not implemented by storage client: GetObject".to_string()
            })
        );
        assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_failure() {
        let provider = CountingProvider {
            fail_open: true,
            ..Default::default()
        };
        let case = ConformanceCase::new(scenario(put_succeeds, &[]), matrix(&[]));
        assert!(case.run(&provider).await.is_failed());
    }

    #[tokio::test]
    async fn test_undeclared_quirk_fails_closed() {
        let provider = CountingProvider::default();
        let case = ConformanceCase::new(scenario(resolves_undeclared, &[]), matrix(&[]));
        assert_eq!(
            case.run(&provider).await,
            ConformanceOutcome::Failed(FailureReason::QuirkGap {
                quirk: Quirk::PutObjectIfMatchEtagNotSupported
            })
        );
    }

    #[test]
    fn test_expect_helpers() {
        assert!(expect_eq("op", 1, 1).is_ok());
        assert_eq!(
            expect_eq("op", "a", "b"),
            Err(FailureReason::Mismatch {
                operation: "op".to_string(),
                expected: "\"a\"".to_string(),
                observed: "\"b\"".to_string(),
            })
        );
        assert!(expect_ne("op", 1, 2).is_ok());
        assert!(expect_ne("op", 1, 1).is_err());
    }

    #[test]
    fn test_expect_status_reports_observed_status() {
        let reply = GetOutput {
            status: 200,
            ..Default::default()
        };
        match expect_status("GetObject", &reply, 416) {
            Err(FailureReason::UnexpectedStatus { status, .. }) => assert_eq!(status, 200),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(expect_rejected("GetObject", &reply).is_err());
    }

    #[test]
    fn test_parse_content_range_failures() {
        assert!(parse_content_range("GetObject", Some("bytes 7-12/13")).is_ok());
        assert_eq!(
            parse_content_range("GetObject", Some("bytes 7-12")),
            Err(FailureReason::MalformedHeader {
                operation: "GetObject".to_string(),
                header: "bytes 7-12".to_string(),
            })
        );
        assert!(parse_content_range("GetObject", None).is_err());
    }

    #[test]
    fn test_expect_page() {
        let expected = ListingPage {
            entries: vec![ObjectKey::from("a")],
            common_prefixes: vec![ObjectKey::from("b/")],
            truncated: false,
            cursor: None,
        };
        let observed = ListOutput {
            status: 200,
            entries: vec![ObjectSummary {
                key: ObjectKey::from("a"),
                etag: "\"e\"".to_string(),
                size: 0,
            }],
            common_prefixes: vec![ObjectKey::from("b/")],
            ..Default::default()
        };
        assert!(expect_page("ListObjectsV2", &expected, &observed).is_ok());

        let mut wrong = observed.clone();
        wrong.truncated = true;
        assert!(expect_page("ListObjectsV2", &expected, &wrong).is_err());
    }

    #[test]
    fn test_expect_marker_page_ignores_missing_next_marker() {
        let expected = ListingPage {
            entries: vec![ObjectKey::from("a")],
            common_prefixes: vec![],
            truncated: true,
            cursor: Some(crate::listing::ListingCursor::new(ObjectKey::from("a"))),
        };
        let observed = ListOutput {
            status: 200,
            entries: vec![ObjectSummary {
                key: ObjectKey::from("a"),
                etag: "\"e\"".to_string(),
                size: 0,
            }],
            truncated: true,
            ..Default::default()
        };
        assert!(expect_marker_page("ListObjects", &expected, &observed).is_ok());
        assert!(expect_page("ListObjectsV2", &expected, &observed).is_err());
    }
}
