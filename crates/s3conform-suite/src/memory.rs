//! In-memory reference storage service.
//!
//! Implements the storage collaborator with strict protocol behavior, and can
//! emulate any [`QuirkSet`] so the scenario catalog can be checked against a
//! service that deviates in exactly the declared ways.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use s3conform_core::key_order::{classify_utf8, OrderingDiscipline};
use s3conform_core::listing::common_prefix_of;
use s3conform_core::range::{ByteRangeRequest, ByteRangeResponse, Resolution, BYTES_UNIT};
use s3conform_core::storage::{
    ChecksumAlgorithm, CompleteMultipartOutput, CompletedPart, CopyOutput, CreateMultipartOutput,
    DeleteObjectsOutput, DeleteOutput, DeleteTarget, GetOptions, GetOutput, HeadOptions,
    HeadOutput, ListApi, ListBucketsOutput, ListObjectsParams, ListOutput, ObjectSummary,
    PutOptions, PutOutput, StorageClient, StorageError, StorageProvider, StorageResult,
    UploadPartOutput,
};
use s3conform_core::{ObjectKey, Quirk, QuirkSet};

use crate::checksums::checksum_of;
use crate::error::ServiceError;

const MAX_KEY_LENGTH: usize = 1024;
const MAX_LIST_KEYS: usize = 1000;
const MAX_PART_NUMBER: u32 = 10_000;
const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";
const EMPTY_ETAG: &str = "\"\"";
const STORAGE_CLASSES: &[&str] = &[
    "STANDARD",
    "REDUCED_REDUNDANCY",
    "STANDARD_IA",
    "ONEZONE_IA",
    "INTELLIGENT_TIERING",
    "GLACIER",
    "GLACIER_IR",
    "DEEP_ARCHIVE",
];

/// Internal object storage (metadata + data).
#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    listed_etag: String,
    content_type: Option<String>,
    content_encoding: Option<String>,
    storage_class: Option<String>,
    metadata: BTreeMap<String, String>,
    checksum: Option<String>,
    part_sizes: Vec<u64>,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn new(data: Vec<u8>, last_modified: DateTime<Utc>) -> Self {
        let etag = etag_of(&data);
        Self {
            data,
            listed_etag: etag.clone(),
            etag,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            content_encoding: None,
            storage_class: None,
            metadata: BTreeMap::new(),
            checksum: None,
            part_sizes: Vec::new(),
            last_modified,
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_multipart(&self) -> bool {
        !self.part_sizes.is_empty()
    }

    /// Byte offset and length of a 1-based part. A single-part object has
    /// exactly one part covering the whole body.
    fn part_span(&self, part_number: u32) -> Result<(usize, usize), ServiceError> {
        let sizes = if self.is_multipart() {
            self.part_sizes.clone()
        } else {
            vec![self.size()]
        };
        let index = (part_number as usize).checked_sub(1);
        match index.filter(|i| *i < sizes.len()) {
            Some(i) => {
                let start: u64 = sizes[..i].iter().sum();
                Ok((start as usize, sizes[i] as usize))
            }
            None => Err(ServiceError::InvalidRange { size: self.size() }),
        }
    }
}

#[derive(Debug)]
struct Upload {
    key: ObjectKey,
    parts: BTreeMap<u32, (Vec<u8>, String)>,
}

#[derive(Debug, Default)]
struct BucketState {
    objects: HashMap<ObjectKey, StoredObject>,
    uploads: HashMap<String, Upload>,
}

/// Wall-clock time that advances with the tokio clock, so a paused runtime
/// controls Last-Modified and Date.
#[derive(Debug)]
struct ServiceClock {
    epoch: DateTime<Utc>,
    started: Instant,
}

impl ServiceClock {
    fn new() -> Self {
        Self {
            epoch: Utc::now(),
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + elapsed
    }
}

#[derive(Debug)]
struct MemoryService {
    quirks: QuirkSet,
    clock: ServiceClock,
    buckets: RwLock<HashMap<String, BucketState>>,
}

/// Opens sessions on an in-memory service. Each session gets its own bucket.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    service: Arc<MemoryService>,
}

impl MemoryProvider {
    /// A fully compliant service.
    pub fn new() -> Self {
        Self::with_quirks(QuirkSet::empty())
    }

    /// A service that deviates from the protocol exactly as `quirks` describes.
    pub fn with_quirks(quirks: QuirkSet) -> Self {
        Self {
            service: Arc::new(MemoryService {
                quirks,
                clock: ServiceClock::new(),
                buckets: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The emulated quirks.
    pub fn quirks(&self) -> &QuirkSet {
        &self.service.quirks
    }

    /// Number of buckets currently open.
    pub fn bucket_count(&self) -> usize {
        self.service.buckets.read().map(|b| b.len()).unwrap_or_default()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn open_session(&self, case_name: &str) -> StorageResult<Box<dyn StorageClient>> {
        let bucket = format!("s3conform-{}", Uuid::new_v4());
        let mut buckets = self.service.buckets.write().map_err(|_| lock_poisoned())?;
        buckets.insert(bucket.clone(), BucketState::default());
        debug!(case = case_name, bucket = %bucket, "created bucket");
        Ok(Box::new(MemorySession {
            service: Arc::clone(&self.service),
            bucket,
        }))
    }
}

/// A session bound to one bucket of a [`MemoryProvider`].
#[derive(Debug)]
pub struct MemorySession {
    service: Arc<MemoryService>,
    bucket: String,
}

impl MemorySession {
    /// Name of the session's bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn lock_poisoned() -> StorageError {
    StorageError::Session("reference service state lock poisoned".to_string())
}

fn etag_of(data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!("\"{}\"", &digest[..32])
}

/// RFC 1123 date as sent in `Date` and `Last-Modified`.
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn url_encode(key: &ObjectKey) -> ObjectKey {
    ObjectKey::from(urlencoding::encode_binary(key.as_bytes()).into_owned())
}

fn etag_matches(condition: &str, etag: &str) -> bool {
    condition
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn no_such_key(key: &ObjectKey) -> ServiceError {
    ServiceError::NoSuchKey {
        key: key.to_string(),
    }
}

fn invalid_key(reason: impl Into<String>) -> ServiceError {
    ServiceError::InvalidKey {
        reason: reason.into(),
    }
}

impl MemoryService {
    fn has(&self, quirk: Quirk) -> bool {
        self.quirks.contains(quirk)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn discipline(&self) -> OrderingDiscipline {
        if self.has(Quirk::KeysAreSortedInUtf16BinaryOrder) {
            OrderingDiscipline::Utf16Binary
        } else {
            OrderingDiscipline::Utf8Binary
        }
    }

    fn with_bucket<T>(
        &self,
        bucket: &str,
        op: impl FnOnce(&Self, &mut BucketState) -> Result<T, ServiceError>,
    ) -> StorageResult<Result<T, ServiceError>> {
        let mut buckets = self.buckets.write().map_err(|_| lock_poisoned())?;
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::Session(format!("bucket {} does not exist", bucket)))?;
        Ok(op(self, state))
    }

    /// Validates a request key and returns the key the service stores it as.
    fn admit_key(&self, key: &ObjectKey) -> Result<ObjectKey, ServiceError> {
        let bytes = key.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_KEY_LENGTH {
            return Err(invalid_key("key length must be between 1 and 1024 bytes"));
        }

        let class = classify_utf8(bytes);
        if !class.is_valid() && !self.has(Quirk::KeysWithInvalidUtf8NotRejected) {
            return Err(invalid_key(format!("key is not valid UTF-8 ({:?})", class)));
        }

        if let Some(text) = key.to_str() {
            if self.has(Quirk::KeysWithCodepointsOutsideBmpRejected)
                && text.chars().any(|c| u32::from(c) > 0xFFFF)
            {
                return Err(invalid_key("key contains a code point outside the BMP"));
            }
            if self.has(Quirk::KeysWithCodepointMinRejected) && text.contains('\u{1}') {
                return Err(invalid_key("key contains U+0001"));
            }
        }

        if let Some(pos) = bytes.iter().position(|b| *b == 0) {
            if self.has(Quirk::KeysWithNullAreTruncated) && pos > 0 {
                return Ok(ObjectKey::new(&bytes[..pos]));
            }
            if !self.has(Quirk::KeysWithNullNotRejected) {
                return Err(invalid_key("key contains a null byte"));
            }
        }

        Ok(key.clone())
    }

    fn check_preconditions(
        &self,
        key: &ObjectKey,
        current: Option<&StoredObject>,
        options: &PutOptions,
    ) -> Result<(), ServiceError> {
        if let Some(condition) = options.if_none_match.as_deref() {
            if condition.trim() == "*" {
                if self.has(Quirk::PutObjectIfNoneMatchStarNotSupported) {
                    return Err(ServiceError::NotImplemented {
                        feature: "If-None-Match: *".to_string(),
                    });
                }
                if current.is_some() {
                    return Err(ServiceError::PreconditionFailed);
                }
            } else {
                if self.has(Quirk::PutObjectIfNoneMatchEtagNotSupported) {
                    return Err(ServiceError::NotImplemented {
                        feature: "If-None-Match: <etag>".to_string(),
                    });
                }
                if current.map_or(false, |o| etag_matches(condition, &o.etag)) {
                    return Err(ServiceError::PreconditionFailed);
                }
            }
        }

        if let Some(condition) = options.if_match.as_deref() {
            if self.has(Quirk::PutObjectIfMatchEtagNotSupported) {
                return Err(ServiceError::NotImplemented {
                    feature: "If-Match: <etag>".to_string(),
                });
            }
            match current {
                None => return Err(no_such_key(key)),
                Some(o) if !etag_matches(condition, &o.etag) => {
                    return Err(ServiceError::PreconditionFailed)
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn admit_storage_class(&self, class: Option<String>) -> Result<Option<String>, ServiceError> {
        match class {
            Some(class) if !STORAGE_CLASSES.contains(&class.as_str()) => {
                Err(ServiceError::InvalidArgument {
                    reason: format!("unknown storage class {}", class),
                })
            }
            _ if self.has(Quirk::StorageClassNotKept) => Ok(None),
            class => Ok(class),
        }
    }

    fn create_implicit_parents(&self, bucket: &mut BucketState, key: &ObjectKey) {
        let now = self.now();
        let bytes = key.as_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            if *byte == b'/' && i + 1 < bytes.len() {
                bucket
                    .objects
                    .entry(ObjectKey::new(&bytes[..=i]))
                    .or_insert_with(|| StoredObject::new(Vec::new(), now));
            }
        }
    }

    fn store(&self, bucket: &mut BucketState, key: ObjectKey, object: StoredObject) {
        if self.has(Quirk::KeysWithSlashesCreateImplicitObjects) {
            self.create_implicit_parents(bucket, &key);
        }
        bucket.objects.insert(key, object);
    }

    fn content_type_for(&self, key: &ObjectKey, requested: Option<String>) -> Option<String> {
        if key.as_bytes().ends_with(b"/")
            && self.has(Quirk::ContentTypeNotSetForKeysWithTrailingSlash)
        {
            return None;
        }
        Some(requested.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()))
    }

    fn parts_count(&self, object: &StoredObject) -> Option<u32> {
        if self.has(Quirk::GetObjectPartcountNotSupported) || !object.is_multipart() {
            return None;
        }
        Some(object.part_sizes.len() as u32)
    }

    fn put(
        &self,
        bucket: &mut BucketState,
        key: &ObjectKey,
        body: &[u8],
        options: PutOptions,
    ) -> Result<PutOutput, ServiceError> {
        let key = self.admit_key(key)?;
        self.check_preconditions(&key, bucket.objects.get(&key), &options)?;
        let storage_class = self.admit_storage_class(options.storage_class)?;

        let mut object = StoredObject::new(body.to_vec(), self.now());
        object.content_type = self.content_type_for(&key, options.content_type);
        object.content_encoding = options.content_encoding;
        object.storage_class = storage_class;
        object.metadata = options.metadata;
        object.checksum = options
            .checksum
            .filter(|_| !self.has(Quirk::ChecksumsNotSupported))
            .map(|algorithm| checksum_of(algorithm, body));

        let output = PutOutput {
            status: 200,
            error: None,
            etag: Some(object.etag.clone()),
            checksum: object.checksum.clone(),
        };
        debug!(key = %key, size = body.len(), chunked = options.unknown_length, "stored object");
        self.store(bucket, key, object);
        Ok(output)
    }

    fn get(
        &self,
        bucket: &BucketState,
        key: &ObjectKey,
        options: GetOptions,
    ) -> Result<GetOutput, ServiceError> {
        let key = self.admit_key(key)?;
        let object = bucket.objects.get(&key).ok_or_else(|| no_such_key(&key))?;
        let size = object.size();
        let mut output = GetOutput {
            status: 200,
            error: None,
            body: Vec::new(),
            content_range: None,
            content_length: size,
            etag: Some(object.etag.clone()),
            content_type: object.content_type.clone(),
            content_encoding: object.content_encoding.clone(),
            parts_count: None,
        };

        if let Some(part_number) = options.part_number {
            if self.has(Quirk::GetObjectPartNotSupported) {
                return Err(ServiceError::NotImplemented {
                    feature: "GetObject partNumber".to_string(),
                });
            }
            let (start, len) = object.part_span(part_number)?;
            output.body = object.data[start..start + len].to_vec();
            output.content_length = len as u64;
            output.parts_count = self.parts_count(object);
            if len > 0 {
                output.status = 206;
                output.content_range = Some(format!(
                    "{} {}-{}/{}",
                    BYTES_UNIT,
                    start,
                    start + len - 1,
                    size
                ));
            }
            return Ok(output);
        }

        if let Some(raw) = options.range.as_deref() {
            match ByteRangeRequest::parse(raw) {
                Some(request) if request.unit() == BYTES_UNIT && request.single().is_some() => {
                    if let Some(spec) = request.single() {
                        return match spec.resolve(size) {
                            Resolution::Satisfiable(span) => {
                                let content_range = span
                                    .content_range(BYTES_UNIT, size)
                                    .map_err(|e| ServiceError::InvalidArgument {
                                        reason: e.to_string(),
                                    })?;
                                output.status = 206;
                                output.body =
                                    span.slice(&object.data).unwrap_or_default().to_vec();
                                output.content_length = span.len();
                                output.content_range = Some(content_range.to_string());
                                Ok(output)
                            }
                            Resolution::Unsatisfiable => Err(ServiceError::InvalidRange { size }),
                        };
                    }
                }
                _ => debug!(range = raw, "ignoring Range header"),
            }
        }

        output.body = object.data.clone();
        Ok(output)
    }

    fn head(
        &self,
        bucket: &BucketState,
        key: &ObjectKey,
        options: HeadOptions,
    ) -> Result<HeadOutput, ServiceError> {
        let key = self.admit_key(key)?;
        let object = bucket.objects.get(&key).ok_or_else(|| no_such_key(&key))?;
        let mut output = HeadOutput {
            status: 200,
            error: None,
            content_length: object.size(),
            etag: Some(object.etag.clone()),
            content_type: object.content_type.clone(),
            storage_class: object.storage_class.clone(),
            parts_count: None,
            checksum: None,
            metadata: object.metadata.clone(),
            last_modified: Some(http_date(object.last_modified)),
        };
        if options.checksum_mode {
            output.checksum = object.checksum.clone();
        }
        match options.part_number {
            Some(part_number) if !self.has(Quirk::GetObjectPartNotSupported) => {
                let (_, len) = object.part_span(part_number)?;
                output.content_length = len as u64;
                output.parts_count = self.parts_count(object);
                if len > 0 {
                    output.status = 206;
                }
            }
            _ => {}
        }
        Ok(output)
    }

    fn copy(
        &self,
        bucket: &mut BucketState,
        source: &ObjectKey,
        destination: &ObjectKey,
        metadata: BTreeMap<String, String>,
    ) -> Result<CopyOutput, ServiceError> {
        let source = self.admit_key(source)?;
        let destination = self.admit_key(destination)?;
        let mut copy = bucket
            .objects
            .get(&source)
            .cloned()
            .ok_or_else(|| no_such_key(&source))?;
        copy.metadata = metadata;
        copy.last_modified = self.now();
        if self.has(Quirk::EtagEmptyAfterCopyObject) {
            copy.listed_etag = EMPTY_ETAG.to_string();
        }
        let etag = copy.etag.clone();
        self.store(bucket, destination, copy);
        Ok(CopyOutput {
            status: 200,
            error: None,
            etag: Some(etag),
        })
    }

    fn delete(&self, bucket: &mut BucketState, key: &ObjectKey) -> Result<DeleteOutput, ServiceError> {
        let key = self.admit_key(key)?;
        bucket.objects.remove(&key);
        Ok(DeleteOutput {
            status: 204,
            error: None,
        })
    }

    fn delete_many(
        &self,
        bucket: &mut BucketState,
        targets: Vec<DeleteTarget>,
    ) -> Result<DeleteObjectsOutput, ServiceError> {
        let mut output = DeleteObjectsOutput {
            status: 200,
            ..Default::default()
        };
        for target in targets {
            let key = match self.admit_key(&target.key) {
                Ok(key) => key,
                Err(err) => {
                    output.failed.push((target.key, err.code().to_string()));
                    continue;
                }
            };
            let current = bucket.objects.get(&key).map(|o| o.etag.as_str());
            match (target.etag.as_deref(), current) {
                (Some(_), None) => {
                    output.failed.push((target.key, "NoSuchKey".to_string()));
                }
                (Some(expected), Some(etag)) if !etag_matches(expected, etag) => {
                    output
                        .failed
                        .push((target.key, "PreconditionFailed".to_string()));
                }
                _ => {
                    bucket.objects.remove(&key);
                    output.deleted.push(target.key);
                }
            }
        }
        Ok(output)
    }

    fn list(&self, bucket: &BucketState, params: ListObjectsParams) -> Result<ListOutput, ServiceError> {
        let prefix = params.prefix.unwrap_or_default();
        let delimiter = params.delimiter.filter(|d| !d.is_empty());
        let max_keys = params.max_keys.unwrap_or(MAX_LIST_KEYS).min(MAX_LIST_KEYS);
        let lower = match (params.api, params.continuation_token) {
            (ListApi::V1, _) => params.marker,
            (ListApi::V2, Some(token)) => {
                Some(ObjectKey::new(URL_SAFE_NO_PAD.decode(&token).map_err(|_| {
                    ServiceError::InvalidArgument {
                        reason: format!("invalid continuation token {}", token),
                    }
                })?))
            }
            (ListApi::V2, None) => params.start_after,
        };

        let mut output = ListOutput {
            status: 200,
            ..Default::default()
        };
        if max_keys == 0 {
            return Ok(output);
        }

        let discipline = self.discipline();
        let mut keys: Vec<&ObjectKey> = bucket
            .objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .filter(|k| lower.as_ref().map_or(true, |l| discipline.compare(k, l).is_gt()))
            .collect();
        keys.sort_by(|a, b| discipline.compare(a, b));

        let mut remaining = keys.into_iter().peekable();
        let mut last_key: Option<&ObjectKey> = None;
        let mut last_group: Option<ObjectKey> = None;
        while let Some(key) = remaining.peek().copied() {
            let group = common_prefix_of(key, &prefix, delimiter.as_ref());
            if group.is_some() && group == last_group {
                last_key = remaining.next();
                continue;
            }
            if output.entries.len() + output.common_prefixes.len() >= max_keys {
                break;
            }
            last_key = remaining.next();
            match group {
                Some(group) => {
                    output.common_prefixes.push(group.clone());
                    last_group = Some(group);
                }
                None => {
                    if let Some(object) = bucket.objects.get(key) {
                        output.entries.push(ObjectSummary {
                            key: key.clone(),
                            etag: object.listed_etag.clone(),
                            size: object.size(),
                        });
                    }
                    last_group = None;
                }
            }
        }

        output.truncated = remaining.peek().is_some();
        if output.truncated {
            match params.api {
                ListApi::V1 if delimiter.is_some() => output.next_marker = last_key.cloned(),
                ListApi::V1 => {}
                ListApi::V2 => {
                    output.next_token = last_key.map(|k| URL_SAFE_NO_PAD.encode(k.as_bytes()))
                }
            }
        }

        if params.url_encoded {
            for entry in &mut output.entries {
                entry.key = url_encode(&entry.key);
            }
            output.common_prefixes = output.common_prefixes.iter().map(url_encode).collect();
            output.next_marker = output.next_marker.as_ref().map(url_encode);
        }
        Ok(output)
    }

    fn create_upload(
        &self,
        bucket: &mut BucketState,
        key: &ObjectKey,
    ) -> Result<CreateMultipartOutput, ServiceError> {
        let key = self.admit_key(key)?;
        let upload_id = Uuid::new_v4().to_string();
        bucket.uploads.insert(
            upload_id.clone(),
            Upload {
                key,
                parts: BTreeMap::new(),
            },
        );
        Ok(CreateMultipartOutput {
            status: 200,
            error: None,
            upload_id,
        })
    }

    fn upload_part(
        &self,
        bucket: &mut BucketState,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<UploadPartOutput, ServiceError> {
        let key = self.admit_key(key)?;
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(ServiceError::InvalidArgument {
                reason: format!("part number {} out of range", part_number),
            });
        }
        let upload = bucket
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| ServiceError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            })?;
        let etag = etag_of(body);
        upload.parts.insert(part_number, (body.to_vec(), etag.clone()));
        Ok(UploadPartOutput {
            status: 200,
            error: None,
            etag: Some(etag),
        })
    }

    fn complete_upload(
        &self,
        bucket: &mut BucketState,
        key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<CompleteMultipartOutput, ServiceError> {
        let key = self.admit_key(key)?;
        let upload = match bucket.uploads.get(upload_id) {
            Some(upload) if upload.key == key => upload,
            _ => {
                return Err(ServiceError::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                })
            }
        };

        let mut data = Vec::new();
        let mut sizes = Vec::with_capacity(parts.len());
        let mut etag_digest = Sha256::new();
        let mut previous = 0;
        for part in &parts {
            let invalid = ServiceError::InvalidPart {
                part_number: part.part_number,
            };
            if part.part_number <= previous {
                return Err(invalid);
            }
            let (body, etag) = upload.parts.get(&part.part_number).ok_or(invalid.clone())?;
            if *etag != part.etag {
                return Err(invalid);
            }
            data.extend_from_slice(body);
            sizes.push(body.len() as u64);
            etag_digest.update(etag.as_bytes());
            previous = part.part_number;
        }
        if sizes.is_empty() {
            return Err(ServiceError::InvalidArgument {
                reason: "multipart upload completed without parts".to_string(),
            });
        }

        let total = data.len() as u64;
        let mut object = StoredObject::new(data, self.now());
        let digest = hex::encode(etag_digest.finalize());
        object.etag = format!("\"{}-{}\"", &digest[..32], sizes.len());
        object.listed_etag = object.etag.clone();
        object.part_sizes = if self.has(Quirk::MultipartSizesNotKept) {
            vec![total]
        } else {
            sizes
        };

        bucket.uploads.remove(upload_id);
        let etag = object.etag.clone();
        debug!(key = %key, parts = object.part_sizes.len(), size = total, "completed multipart upload");
        self.store(bucket, key, object);
        Ok(CompleteMultipartOutput {
            status: 200,
            error: None,
            etag: Some(etag),
        })
    }
}

/// Error response of a service operation.
trait ErrorReply {
    fn from_service_error(err: &ServiceError) -> Self;
}

macro_rules! error_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ErrorReply for $ty {
                fn from_service_error(err: &ServiceError) -> Self {
                    Self {
                        status: err.status(),
                        error: Some(err.code().to_string()),
                        ..Default::default()
                    }
                }
            }
        )*
    };
}

error_reply!(
    PutOutput,
    GetOutput,
    HeadOutput,
    CopyOutput,
    DeleteOutput,
    DeleteObjectsOutput,
    ListOutput,
    CreateMultipartOutput,
    UploadPartOutput,
    CompleteMultipartOutput,
);

fn reply<T: ErrorReply>(operation: &str, result: Result<T, ServiceError>) -> T {
    match result {
        Ok(output) => output,
        Err(err) => {
            debug!(operation, status = err.status(), error = %err, "request rejected");
            T::from_service_error(&err)
        }
    }
}

#[async_trait]
impl StorageClient for MemorySession {
    async fn put_object(
        &self,
        key: &ObjectKey,
        body: &[u8],
        options: PutOptions,
    ) -> StorageResult<PutOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.put(b, key, body, options))?;
        Ok(reply("PutObject", result))
    }

    async fn get_object(&self, key: &ObjectKey, options: GetOptions) -> StorageResult<GetOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.get(b, key, options))?;
        Ok(match result {
            Err(ServiceError::InvalidRange { size }) => GetOutput {
                status: 416,
                error: Some("InvalidRange".to_string()),
                content_range: ByteRangeResponse::unsatisfied(BYTES_UNIT, size)
                    .ok()
                    .map(|c| c.to_string()),
                ..Default::default()
            },
            other => reply("GetObject", other),
        })
    }

    async fn head_object(&self, key: &ObjectKey, options: HeadOptions) -> StorageResult<HeadOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.head(b, key, options))?;
        Ok(reply("HeadObject", result))
    }

    async fn copy_object(
        &self,
        source: &ObjectKey,
        destination: &ObjectKey,
        metadata: BTreeMap<String, String>,
    ) -> StorageResult<CopyOutput> {
        let result = self.service.with_bucket(&self.bucket, |svc, b| {
            svc.copy(b, source, destination, metadata)
        })?;
        Ok(reply("CopyObject", result))
    }

    async fn delete_object(&self, key: &ObjectKey) -> StorageResult<DeleteOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.delete(b, key))?;
        Ok(reply("DeleteObject", result))
    }

    async fn delete_objects(&self, targets: Vec<DeleteTarget>) -> StorageResult<DeleteObjectsOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.delete_many(b, targets))?;
        Ok(reply("DeleteObjects", result))
    }

    async fn list_objects(&self, params: ListObjectsParams) -> StorageResult<ListOutput> {
        let operation = params.api.operation();
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.list(b, params))?;
        Ok(reply(operation, result))
    }

    async fn list_buckets(&self) -> StorageResult<ListBucketsOutput> {
        let buckets = self.service.buckets.read().map_err(|_| lock_poisoned())?;
        let mut names: Vec<String> = buckets.keys().cloned().collect();
        names.sort();
        Ok(ListBucketsOutput {
            status: 200,
            error: None,
            buckets: names,
            date: Some(http_date(self.service.now())),
        })
    }

    async fn create_multipart_upload(
        &self,
        key: &ObjectKey,
    ) -> StorageResult<CreateMultipartOutput> {
        let result = self
            .service
            .with_bucket(&self.bucket, |svc, b| svc.create_upload(b, key))?;
        Ok(reply("CreateMultipartUpload", result))
    }

    async fn upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> StorageResult<UploadPartOutput> {
        let result = self.service.with_bucket(&self.bucket, |svc, b| {
            svc.upload_part(b, key, upload_id, part_number, body)
        })?;
        Ok(reply("UploadPart", result))
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<CompleteMultipartOutput> {
        let result = self.service.with_bucket(&self.bucket, |svc, b| {
            svc.complete_upload(b, key, upload_id, parts)
        })?;
        Ok(reply("CompleteMultipartUpload", result))
    }

    async fn close(&self) -> StorageResult<()> {
        let mut buckets = self.service.buckets.write().map_err(|_| lock_poisoned())?;
        match buckets.remove(&self.bucket) {
            Some(state) => {
                info!(bucket = %self.bucket, objects = state.objects.len(), "removed bucket");
                Ok(())
            }
            None => Err(StorageError::Session(format!(
                "bucket {} already closed",
                self.bucket
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session(quirks: &[Quirk]) -> Box<dyn StorageClient> {
        MemoryProvider::with_quirks(quirks.iter().copied().collect())
            .open_session("memory-test")
            .await
            .unwrap()
    }

    async fn put(client: &dyn StorageClient, key: &str, body: &str) -> PutOutput {
        client
            .put_object(&ObjectKey::from(key), body.as_bytes(), PutOptions::default())
            .await
            .unwrap()
    }

    fn range(header: &str) -> GetOptions {
        GetOptions {
            range: Some(header.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_put_get_and_head() {
        let client = session(&[]).await;
        let stored = put(client.as_ref(), "foo", "Hello, World!").await;
        assert_eq!(stored.status, 200);

        let got = client
            .get_object(&ObjectKey::from("foo"), GetOptions::default())
            .await
            .unwrap();
        assert_eq!(got.body, b"Hello, World!");
        assert_eq!(got.etag, stored.etag);

        let head = client
            .head_object(&ObjectKey::from("foo"), HeadOptions::default())
            .await
            .unwrap();
        assert_eq!(head.content_length, 13);
        assert!(head.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_key_is_404() {
        let client = session(&[]).await;
        let got = client
            .get_object(&ObjectKey::from("nope"), GetOptions::default())
            .await
            .unwrap();
        assert_eq!(got.status, 404);
        assert_eq!(got.error.as_deref(), Some("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_range_reads() {
        let client = session(&[]).await;
        put(client.as_ref(), "foo", "Hello, World!").await;
        let key = ObjectKey::from("foo");

        let partial = client.get_object(&key, range("bytes=7-")).await.unwrap();
        assert_eq!(partial.status, 206);
        assert_eq!(partial.body, b"World!");
        assert_eq!(partial.content_range.as_deref(), Some("bytes 7-12/13"));

        let clamped = client.get_object(&key, range("bytes=10-100")).await.unwrap();
        assert_eq!(clamped.body, b"ld!");

        let unsatisfiable = client.get_object(&key, range("bytes=200-")).await.unwrap();
        assert_eq!(unsatisfiable.status, 416);
        assert_eq!(unsatisfiable.content_range.as_deref(), Some("bytes */13"));

        let malformed = client.get_object(&key, range("bytes=x-")).await.unwrap();
        assert_eq!(malformed.status, 200);
        assert_eq!(malformed.body.len(), 13);
    }

    #[tokio::test]
    async fn test_strict_key_validation() {
        let client = session(&[]).await;
        let null_key = ObjectKey::new(b"a\0b".to_vec());
        let overlong = ObjectKey::new(vec![b'a', 0xC0, 0x80]);
        for key in [null_key, overlong] {
            let out = client
                .put_object(&key, b"x", PutOptions::default())
                .await
                .unwrap();
            assert_eq!(out.status, 400, "{} should be rejected", key);
        }
    }

    #[tokio::test]
    async fn test_null_truncation_quirk() {
        let client = session(&[Quirk::KeysWithNullAreTruncated]).await;
        let out = client
            .put_object(&ObjectKey::new(b"ab\0cd".to_vec()), b"x", PutOptions::default())
            .await
            .unwrap();
        assert_eq!(out.status, 200);
        let listed = client.list_objects(ListObjectsParams::default()).await.unwrap();
        assert_eq!(listed.keys(), vec![ObjectKey::from("ab")]);
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let client = session(&[]).await;
        let first = put(client.as_ref(), "object", "hello").await;
        let key = ObjectKey::from("object");

        let star = client
            .put_object(
                &key,
                b"bar",
                PutOptions {
                    if_none_match: Some("*".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(star.status, 412);

        let matched = client
            .put_object(
                &key,
                b"bar",
                PutOptions {
                    if_match: first.etag.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(matched.status, 200);
    }

    #[tokio::test]
    async fn test_conditional_put_quirk_returns_501() {
        let client = session(&[Quirk::PutObjectIfNoneMatchStarNotSupported]).await;
        put(client.as_ref(), "object", "hello").await;
        let out = client
            .put_object(
                &ObjectKey::from("object"),
                b"bar",
                PutOptions {
                    if_none_match: Some("*".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.status, 501);
    }

    #[tokio::test]
    async fn test_listing_groups_and_paginates() {
        let client = session(&[]).await;
        for key in ["a", "b/", "b/0", "b/1", "c"] {
            put(client.as_ref(), key, key).await;
        }
        let first = client
            .list_objects(ListObjectsParams {
                delimiter: Some(ObjectKey::from("/")),
                max_keys: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.keys(), vec![ObjectKey::from("a")]);
        assert_eq!(first.common_prefixes, vec![ObjectKey::from("b/")]);
        assert!(first.truncated);

        let second = client
            .list_objects(ListObjectsParams {
                delimiter: Some(ObjectKey::from("/")),
                max_keys: Some(2),
                continuation_token: first.next_token.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second.keys(), vec![ObjectKey::from("c")]);
        assert!(!second.truncated);
    }

    #[tokio::test]
    async fn test_implicit_directory_quirk() {
        let client = session(&[Quirk::KeysWithSlashesCreateImplicitObjects]).await;
        put(client.as_ref(), "a/b/c", "abcd").await;
        let listed = client.list_objects(ListObjectsParams::default()).await.unwrap();
        assert_eq!(
            listed.keys(),
            vec![
                ObjectKey::from("a/"),
                ObjectKey::from("a/b/"),
                ObjectKey::from("a/b/c")
            ]
        );
    }

    #[tokio::test]
    async fn test_multipart_parts_are_addressable() {
        let client = session(&[]).await;
        let key = ObjectKey::from("multiparted");
        let upload = client.create_multipart_upload(&key).await.unwrap();
        let mut parts = Vec::new();
        for (i, size) in [3usize, 5, 2].iter().enumerate() {
            let part_number = i as u32 + 1;
            let out = client
                .upload_part(&key, &upload.upload_id, part_number, &vec![b'x'; *size])
                .await
                .unwrap();
            parts.push(CompletedPart {
                part_number,
                etag: out.etag.unwrap(),
            });
        }
        let done = client
            .complete_multipart_upload(&key, &upload.upload_id, parts)
            .await
            .unwrap();
        assert_eq!(done.status, 200);

        let head = client
            .head_object(
                &key,
                HeadOptions {
                    part_number: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(head.parts_count, Some(3));
        let part = client
            .get_object(
                &key,
                GetOptions {
                    part_number: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(part.content_length, 5);
        assert_eq!(part.content_range.as_deref(), Some("bytes 3-7/10"));
    }

    #[tokio::test]
    async fn test_checksums() {
        let client = session(&[]).await;
        let out = client
            .put_object(
                &ObjectKey::from("foo"),
                b"bar",
                PutOptions {
                    checksum: Some(ChecksumAlgorithm::Crc32),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(out.checksum.as_deref(), Some("dv+Mqg=="));
    }

    #[tokio::test]
    async fn test_every_checksum_algorithm_is_stored() {
        let client = session(&[]).await;
        let key = ObjectKey::from("foo");
        for algorithm in ChecksumAlgorithm::ALL {
            let out = client
                .put_object(
                    &key,
                    b"bar",
                    PutOptions {
                        checksum: Some(algorithm),
                        unknown_length: algorithm == ChecksumAlgorithm::Crc32,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let head = client
                .head_object(
                    &key,
                    HeadOptions {
                        checksum_mode: true,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(out.checksum, Some(checksum_of(algorithm, b"bar")));
            assert_eq!(head.checksum, out.checksum, "{:?}", algorithm);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_modified_follows_tokio_clock() {
        let client = session(&[]).await;
        let key = ObjectKey::from("key");
        put(client.as_ref(), "key", "aaaaaaaaaa").await;
        let first = client.head_object(&key, HeadOptions::default()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        put(client.as_ref(), "key", "aaaaaaaaaa").await;
        let second = client.head_object(&key, HeadOptions::default()).await.unwrap();

        let parse = |raw: Option<String>| {
            DateTime::parse_from_rfc2822(&raw.unwrap()).unwrap().with_timezone(&Utc)
        };
        let (first, second) = (parse(first.last_modified), parse(second.last_modified));
        assert_eq!((second - first).num_seconds(), 2);
    }

    #[tokio::test]
    async fn test_list_buckets_reports_date() {
        let provider = MemoryProvider::new();
        let client = provider.open_session("buckets").await.unwrap();
        let out = client.list_buckets().await.unwrap();
        assert_eq!(out.buckets.len(), 1);
        let date = out.date.unwrap();
        assert!(date.ends_with(" GMT"), "{}", date);
        let sent = DateTime::parse_from_rfc2822(&date).unwrap().with_timezone(&Utc);
        assert!((Utc::now() - sent).num_seconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_v1_listing_pages_by_marker() {
        let client = session(&[]).await;
        for key in ["a", "b/0", "b/1", "c"] {
            put(client.as_ref(), key, key).await;
        }
        let plain = client
            .list_objects(ListObjectsParams {
                api: ListApi::V1,
                max_keys: Some(2),
                marker: Some(ObjectKey::from("a")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plain.keys(), vec![ObjectKey::from("b/0"), ObjectKey::from("b/1")]);
        assert!(plain.truncated);
        assert_eq!(plain.next_token, None);
        assert_eq!(plain.next_marker, None);

        let delimited = client
            .list_objects(ListObjectsParams {
                api: ListApi::V1,
                max_keys: Some(2),
                delimiter: Some(ObjectKey::from("/")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(delimited.common_prefixes, vec![ObjectKey::from("b/")]);
        assert_eq!(delimited.next_marker, Some(ObjectKey::from("b/1")));
    }

    #[tokio::test]
    async fn test_url_encoded_listing() {
        let client = session(&[]).await;
        put(client.as_ref(), "a b/c+d", "x").await;
        let out = client
            .list_objects(ListObjectsParams {
                url_encoded: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(out.keys(), vec![ObjectKey::from("a%20b%2Fc%2Bd")]);

        let grouped = client
            .list_objects(ListObjectsParams {
                delimiter: Some(ObjectKey::from("/")),
                url_encoded: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(grouped.common_prefixes, vec![ObjectKey::from("a%20b%2F")]);
    }

    #[tokio::test]
    async fn test_close_removes_bucket() {
        let provider = MemoryProvider::new();
        let client = provider.open_session("close").await.unwrap();
        assert_eq!(provider.bucket_count(), 1);
        client.close().await.unwrap();
        assert_eq!(provider.bucket_count(), 0);
        assert!(client.close().await.is_err());
        assert!(client
            .get_object(&ObjectKey::from("x"), GetOptions::default())
            .await
            .is_err());
    }
}
