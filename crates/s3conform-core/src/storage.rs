//! The storage collaborator seam.
//!
//! The engine never talks to a network itself. A [`StorageProvider`] opens
//! one [`StorageClient`] session per scenario (backed by a fresh bucket), and
//! the scenario drives the session through the protocol operations below.
//!
//! Protocol-level outcomes, including error statuses such as 404, 412 or 416,
//! come back as values carrying `status`. Only failures below the protocol
//! (connection refused, TLS, session setup) are `Err(StorageError)`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::ObjectKey;

/// Failure of the storage collaborator itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The request never produced a protocol response
    #[error("transport error: {0}")]
    Transport(String),
    /// The session (bucket) could not be set up or torn down
    #[error("session error: {0}")]
    Session(String),
    /// The collaborator does not implement the operation
    #[error("operation not implemented by storage client: {0}")]
    NotImplemented(String),
}

/// Result type for storage collaborator calls.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Checksum algorithms a client can ask the server to verify and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE), base64 of the big-endian value
    Crc32,
    /// CRC-32C (Castagnoli), base64 of the big-endian value
    Crc32c,
    /// SHA-1, base64 of the digest
    Sha1,
    /// SHA-256, base64 of the digest
    Sha256,
    /// CRC-64/NVME, base64 of the big-endian value
    Crc64Nvme,
}

impl ChecksumAlgorithm {
    /// Every algorithm, in the order the protocol lists them.
    pub const ALL: [ChecksumAlgorithm; 5] = [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Crc32c,
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Crc64Nvme,
    ];

    /// The `x-amz-checksum-*` header suffix.
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Crc32c => "crc32c",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Crc64Nvme => "crc64nvme",
        }
    }
}

/// Status line of a protocol response.
pub trait StatusReply {
    /// Protocol status code.
    fn status(&self) -> u16;

    /// Error code returned with a non-success status.
    fn error(&self) -> Option<&str>;

    /// True for any 2xx status.
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status())
    }
}

macro_rules! status_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StatusReply for $ty {
                fn status(&self) -> u16 {
                    self.status
                }

                fn error(&self) -> Option<&str> {
                    self.error.as_deref()
                }
            }
        )*
    };
}

status_reply!(
    PutOutput,
    GetOutput,
    HeadOutput,
    CopyOutput,
    DeleteOutput,
    DeleteObjectsOutput,
    ListOutput,
    ListBucketsOutput,
    CreateMultipartOutput,
    UploadPartOutput,
    CompleteMultipartOutput,
);

/// Optional request fields of PutObject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// `Content-Type`
    pub content_type: Option<String>,
    /// `Content-Encoding`
    pub content_encoding: Option<String>,
    /// `If-Match`
    pub if_match: Option<String>,
    /// `If-None-Match`
    pub if_none_match: Option<String>,
    /// Checksum the server must compute and store
    pub checksum: Option<ChecksumAlgorithm>,
    /// Stream the body `aws-chunked` without a declared `Content-Length`;
    /// the checksum travels in the trailer
    pub unknown_length: bool,
    /// `x-amz-storage-class`
    pub storage_class: Option<String>,
    /// User metadata (`x-amz-meta-*`)
    pub metadata: BTreeMap<String, String>,
}

/// PutObject response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// ETag of the stored object
    pub etag: Option<String>,
    /// Checksum the server computed, if one was requested
    pub checksum: Option<String>,
}

/// Optional request fields of GetObject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Raw `Range` header value
    pub range: Option<String>,
    /// `partNumber` query parameter
    pub part_number: Option<u32>,
}

/// GetObject response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// Response body
    pub body: Vec<u8>,
    /// Raw `Content-Range` header value
    pub content_range: Option<String>,
    /// `Content-Length`
    pub content_length: u64,
    /// `ETag`
    pub etag: Option<String>,
    /// `Content-Type`
    pub content_type: Option<String>,
    /// `Content-Encoding`
    pub content_encoding: Option<String>,
    /// `x-amz-mp-parts-count`
    pub parts_count: Option<u32>,
}

/// Optional request fields of HeadObject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadOptions {
    /// `partNumber` query parameter
    pub part_number: Option<u32>,
    /// `x-amz-checksum-mode: ENABLED`
    pub checksum_mode: bool,
}

/// HeadObject response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// `Content-Length`
    pub content_length: u64,
    /// `ETag`
    pub etag: Option<String>,
    /// `Content-Type`
    pub content_type: Option<String>,
    /// `x-amz-storage-class`
    pub storage_class: Option<String>,
    /// `x-amz-mp-parts-count`
    pub parts_count: Option<u32>,
    /// Stored checksum, returned when checksum mode is enabled
    pub checksum: Option<String>,
    /// User metadata
    pub metadata: BTreeMap<String, String>,
    /// `Last-Modified`, as sent on the wire
    pub last_modified: Option<String>,
}

/// CopyObject response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// ETag of the copy
    pub etag: Option<String>,
}

/// DeleteObject response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
}

/// One entry of a DeleteObjects request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    /// Key to delete
    pub key: ObjectKey,
    /// Only delete if the current ETag matches
    pub etag: Option<String>,
}

impl DeleteTarget {
    /// Unconditional delete of `key`.
    pub fn key(key: impl Into<ObjectKey>) -> Self {
        Self {
            key: key.into(),
            etag: None,
        }
    }

    /// Delete of `key` guarded by `etag`.
    pub fn with_etag(key: impl Into<ObjectKey>, etag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            etag: Some(etag.into()),
        }
    }
}

/// DeleteObjects response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteObjectsOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// Keys reported as deleted
    pub deleted: Vec<ObjectKey>,
    /// Keys that were not deleted, with the per-key error code
    pub failed: Vec<(ObjectKey, String)>,
}

/// Which ListObjects API a listing call goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ListApi {
    /// `GET /?marker=...`, paged by `NextMarker` or the last listed key
    V1,
    /// `GET /?list-type=2`, paged by continuation token
    #[default]
    V2,
}

impl ListApi {
    /// Operation name, for failure messages.
    pub fn operation(&self) -> &'static str {
        match self {
            ListApi::V1 => "ListObjects",
            ListApi::V2 => "ListObjectsV2",
        }
    }
}

/// ListObjects request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsParams {
    /// API version
    pub api: ListApi,
    /// `prefix`
    pub prefix: Option<ObjectKey>,
    /// `delimiter`
    pub delimiter: Option<ObjectKey>,
    /// `max-keys`
    pub max_keys: Option<usize>,
    /// `start-after` (V2 only)
    pub start_after: Option<ObjectKey>,
    /// `continuation-token` (V2 only)
    pub continuation_token: Option<String>,
    /// `marker` (V1 only)
    pub marker: Option<ObjectKey>,
    /// `encoding-type=url`: keys, prefixes and markers in the response are
    /// percent-encoded
    pub url_encoded: bool,
}

/// One `<Contents>` element of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key
    pub key: ObjectKey,
    /// ETag
    pub etag: String,
    /// Size in bytes
    pub size: u64,
}

/// ListObjects response, either version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// Listed objects
    pub entries: Vec<ObjectSummary>,
    /// Common prefixes
    pub common_prefixes: Vec<ObjectKey>,
    /// `IsTruncated`
    pub truncated: bool,
    /// `NextContinuationToken` (V2)
    pub next_token: Option<String>,
    /// `NextMarker` (V1); only sent for delimited listings
    pub next_marker: Option<ObjectKey>,
}

impl ListOutput {
    /// The listed keys, in response order.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }
}

/// ListBuckets response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketsOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// Bucket names owned by the caller
    pub buckets: Vec<String>,
    /// Raw `Date` response header
    pub date: Option<String>,
}

/// CreateMultipartUpload response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMultipartOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// Upload id
    pub upload_id: String,
}

/// UploadPart response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPartOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// ETag of the part
    pub etag: Option<String>,
}

/// A part listed in CompleteMultipartUpload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// ETag returned by UploadPart
    pub etag: String,
}

/// CompleteMultipartUpload response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartOutput {
    /// Protocol status
    pub status: u16,
    /// Error code for non-2xx statuses
    pub error: Option<String>,
    /// ETag of the assembled object
    pub etag: Option<String>,
}

/// Opens storage sessions for scenarios.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Open a session backed by a fresh, empty bucket.
    ///
    /// # Arguments
    /// * `case_name` - Name of the scenario the session is for
    ///
    /// # Returns
    /// A client bound to the new bucket.
    async fn open_session(&self, case_name: &str) -> StorageResult<Box<dyn StorageClient>>;
}

/// One scenario's view of the storage service, bound to a single bucket.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// PutObject.
    async fn put_object(
        &self,
        key: &ObjectKey,
        body: &[u8],
        options: PutOptions,
    ) -> StorageResult<PutOutput>;

    /// GetObject.
    async fn get_object(&self, key: &ObjectKey, options: GetOptions) -> StorageResult<GetOutput>;

    /// HeadObject.
    async fn head_object(&self, key: &ObjectKey, options: HeadOptions)
        -> StorageResult<HeadOutput>;

    /// CopyObject within the bucket, replacing user metadata with `metadata`.
    async fn copy_object(
        &self,
        source: &ObjectKey,
        destination: &ObjectKey,
        metadata: BTreeMap<String, String>,
    ) -> StorageResult<CopyOutput>;

    /// DeleteObject.
    async fn delete_object(&self, key: &ObjectKey) -> StorageResult<DeleteOutput>;

    /// DeleteObjects (multi-object delete).
    async fn delete_objects(&self, targets: Vec<DeleteTarget>) -> StorageResult<DeleteObjectsOutput>;

    /// ListObjects or ListObjectsV2, per `params.api`.
    async fn list_objects(&self, params: ListObjectsParams) -> StorageResult<ListOutput>;

    /// ListBuckets.
    async fn list_buckets(&self) -> StorageResult<ListBucketsOutput>;

    /// CreateMultipartUpload.
    async fn create_multipart_upload(&self, key: &ObjectKey)
        -> StorageResult<CreateMultipartOutput>;

    /// UploadPart.
    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> StorageResult<UploadPartOutput>;

    /// CompleteMultipartUpload.
    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<CompleteMultipartOutput>;

    /// Tear down the session, deleting its bucket.
    async fn close(&self) -> StorageResult<()>;
}
