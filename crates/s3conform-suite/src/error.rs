//! Error types for the s3conform suite

use s3conform_core::ConformError;
use thiserror::Error;

/// Errors raised while configuring or driving a conformance run.
#[derive(Error, Debug)]
pub enum SuiteError {
    /// A configuration value was rejected by the core
    #[error("configuration error: {0}")]
    Conform(#[from] ConformError),
    /// A configuration file with an extension we cannot parse
    #[error("unsupported config file extension: {ext:?}")]
    UnsupportedConfigFormat {
        /// The file extension
        ext: String,
    },
    /// A configuration file that did not deserialize
    #[error("invalid config file {path}: {reason}")]
    InvalidConfig {
        /// Path of the file
        path: String,
        /// Parser message
        reason: String,
    },
    /// A target URI that does not parse
    #[error("invalid target {uri:?}: {reason}")]
    InvalidTarget {
        /// The rejected URI
        uri: String,
        /// What is wrong with it
        reason: String,
    },
    /// A target scheme no built-in provider serves
    #[error("no storage provider for scheme {scheme:?}")]
    UnsupportedTarget {
        /// The URI scheme
        scheme: String,
    },
    /// An include/exclude pattern that is not a valid regex
    #[error("invalid scenario filter: {0}")]
    InvalidFilter(#[from] regex::Error),
    /// Report serialization failed
    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using SuiteError as the error type.
pub type Result<T> = std::result::Result<T, SuiteError>;

/// Protocol errors produced by the in-memory reference service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The key does not exist
    #[error("S3: object not found: {key}")]
    NoSuchKey {
        /// The missing key, rendered
        key: String,
    },
    /// The upload id does not exist
    #[error("S3: upload not found: {upload_id}")]
    NoSuchUpload {
        /// The missing upload id
        upload_id: String,
    },
    /// The key is not acceptable to the service
    #[error("S3: invalid object key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },
    /// A request argument is malformed
    #[error("S3: invalid argument: {reason}")]
    InvalidArgument {
        /// Which argument and why
        reason: String,
    },
    /// The requested range starts beyond the object
    #[error("S3: range not satisfiable for object of {size} bytes")]
    InvalidRange {
        /// Object size
        size: u64,
    },
    /// A conditional request failed
    #[error("S3: precondition failed")]
    PreconditionFailed,
    /// A completed part list does not match the uploaded parts
    #[error("S3: invalid part {part_number}")]
    InvalidPart {
        /// Offending part number
        part_number: u32,
    },
    /// The service does not implement a feature
    #[error("S3: not implemented: {feature}")]
    NotImplemented {
        /// The unimplemented feature name
        feature: String,
    },
}

impl ServiceError {
    /// HTTP status code of the error response.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::NoSuchKey { .. } | ServiceError::NoSuchUpload { .. } => 404,
            ServiceError::InvalidKey { .. }
            | ServiceError::InvalidArgument { .. }
            | ServiceError::InvalidPart { .. } => 400,
            ServiceError::InvalidRange { .. } => 416,
            ServiceError::PreconditionFailed => 412,
            ServiceError::NotImplemented { .. } => 501,
        }
    }

    /// S3 error code of the error response.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NoSuchKey { .. } => "NoSuchKey",
            ServiceError::NoSuchUpload { .. } => "NoSuchUpload",
            ServiceError::InvalidKey { .. } => "InvalidObjectName",
            ServiceError::InvalidArgument { .. } => "InvalidArgument",
            ServiceError::InvalidRange { .. } => "InvalidRange",
            ServiceError::PreconditionFailed => "PreconditionFailed",
            ServiceError::InvalidPart { .. } => "InvalidPart",
            ServiceError::NotImplemented { .. } => "NotImplemented",
        }
    }
}
