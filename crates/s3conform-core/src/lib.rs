#![warn(missing_docs)]

//! s3conform core: the protocol-semantics verification engine.
//!
//! The pure components compute ground truth for S3 protocol behavior:
//! byte-range header grammar and resolution ([`range`]), key ordering and
//! UTF-8 classification ([`key_order`]), paginated prefix/delimiter listings
//! ([`listing`]) and quirk-dependent expectations ([`quirks`]). The
//! [`case`] module runs one scenario against a [`storage::StorageClient`] and
//! classifies the result as a [`outcome::ConformanceOutcome`].

pub mod case;
pub mod codepoint;
pub mod error;
pub mod key;
pub mod key_order;
pub mod listing;
pub mod outcome;
pub mod quirks;
pub mod range;
pub mod storage;

pub use case::{CaseContext, CaseResult, ConformanceCase, Scenario, ScenarioBody};
pub use error::{ConformError, Result};
pub use key::ObjectKey;
pub use key_order::{classify_utf8, OrderingDiscipline, Utf8Class};
pub use listing::{ListingCursor, ListingPage, ListingRequest, ListingSimulator};
pub use outcome::{ConformanceOutcome, FailureReason};
pub use quirks::{Quirk, QuirkMatrix, QuirkSet};
pub use range::{ByteRangeRequest, ByteRangeResponse, RangeSpec, Resolution, ResolvedSpan};
pub use storage::{StorageClient, StorageError, StorageProvider};
