//! Byte-range request (`Range`) and response (`Content-Range`) grammar.
//!
//! Request:  `range-unit "=" range-spec *( OWS "," OWS range-spec )`
//! where `range-spec = first-pos "-" last-pos / first-pos "-" / "-" suffix-length`.
//!
//! Response: `range-unit SP ( "*/" complete-length / first-pos "-" last-pos "/" ( complete-length / "*" ) )`.
//!
//! Parsers return `None` on any syntax error and never produce partial
//! results. `Display` yields the canonical form, which parses back to an
//! identical value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConformError, Result};

/// The only range unit the protocol defines.
pub const BYTES_UNIT: &str = "bytes";

/// One `range-spec` of a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeSpecFields")]
pub struct RangeSpec {
    start: Option<u64>,
    end: Option<u64>,
}

#[derive(Deserialize)]
struct RangeSpecFields {
    start: Option<u64>,
    end: Option<u64>,
}

impl TryFrom<RangeSpecFields> for RangeSpec {
    type Error = ConformError;

    fn try_from(fields: RangeSpecFields) -> Result<Self> {
        Self::new(fields.start, fields.end)
    }
}

/// The three shapes a [`RangeSpec`] can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeShape {
    /// `start-end`, both inclusive
    Bounded {
        /// First byte position
        start: u64,
        /// Last byte position
        end: u64,
    },
    /// `start-`, through the end of the object
    From {
        /// First byte position
        start: u64,
    },
    /// `-len`, the last `len` bytes
    Suffix {
        /// Number of trailing bytes
        len: u64,
    },
}

impl RangeSpec {
    /// Builds a spec, rejecting the empty and the inverted bounded forms.
    pub fn new(start: Option<u64>, end: Option<u64>) -> Result<Self> {
        match (start, end) {
            (None, None) => Err(ConformError::EmptyRangeSpec),
            (Some(start), Some(end)) if end < start => {
                Err(ConformError::InvertedRangeSpec { start, end })
            }
            _ => Ok(Self { start, end }),
        }
    }

    /// `start-end`
    pub fn bounded(start: u64, end: u64) -> Result<Self> {
        Self::new(Some(start), Some(end))
    }

    /// `start-`
    pub fn from_start(start: u64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// `-len`
    pub fn suffix(len: u64) -> Self {
        Self {
            start: None,
            end: Some(len),
        }
    }

    /// First position, absent for suffix specs.
    pub fn start(&self) -> Option<u64> {
        self.start
    }

    /// Last position (or suffix length), absent for open-ended specs.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Which of the three grammar shapes this spec has.
    pub fn shape(&self) -> RangeShape {
        match (self.start, self.end) {
            (Some(start), Some(end)) => RangeShape::Bounded { start, end },
            (Some(start), None) => RangeShape::From { start },
            (None, Some(len)) => RangeShape::Suffix { len },
            (None, None) => unreachable!("RangeSpec invariant: start or end is present"),
        }
    }

    /// Resolves this spec against an object of `object_size` bytes.
    pub fn resolve(&self, object_size: u64) -> Resolution {
        resolve(self, object_size)
    }

    fn parse(s: &str) -> Option<Self> {
        let (first, last) = s.split_once('-')?;
        let start = parse_optional_pos(first)?;
        let end = parse_optional_pos(last)?;
        Self::new(start, end).ok()
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        f.write_str("-")?;
        if let Some(end) = self.end {
            write!(f, "{}", end)?;
        }
        Ok(())
    }
}

/// A parsed `Range` request header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ByteRangeRequestFields")]
pub struct ByteRangeRequest {
    unit: String,
    specs: Vec<RangeSpec>,
}

#[derive(Deserialize)]
struct ByteRangeRequestFields {
    unit: String,
    specs: Vec<RangeSpec>,
}

impl TryFrom<ByteRangeRequestFields> for ByteRangeRequest {
    type Error = ConformError;

    fn try_from(fields: ByteRangeRequestFields) -> Result<Self> {
        Self::new(&fields.unit, fields.specs)
    }
}

impl ByteRangeRequest {
    /// Builds a request from a unit token and a non-empty spec list.
    pub fn new(unit: &str, specs: Vec<RangeSpec>) -> Result<Self> {
        if !is_unit_token(unit) {
            return Err(ConformError::InvalidRangeUnit {
                unit: unit.to_string(),
            });
        }
        if specs.is_empty() {
            return Err(ConformError::NoRangeSpecs);
        }
        Ok(Self {
            unit: unit.to_string(),
            specs,
        })
    }

    /// A single-spec `bytes=` request.
    pub fn bytes(spec: RangeSpec) -> Self {
        Self {
            unit: BYTES_UNIT.to_string(),
            specs: vec![spec],
        }
    }

    /// Parses a `Range` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let (unit, range_set) = header.split_once('=')?;
        let specs = range_set
            .split(',')
            .map(|part| RangeSpec::parse(part.trim_matches(is_ows)))
            .collect::<Option<Vec<_>>>()?;
        Self::new(unit, specs).ok()
    }

    /// The range unit, normally `bytes`.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The specs in header order.
    pub fn specs(&self) -> &[RangeSpec] {
        &self.specs
    }

    /// The spec if the request carries exactly one.
    pub fn single(&self) -> Option<&RangeSpec> {
        match self.specs.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

impl fmt::Display for ByteRangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.unit)?;
        for (i, spec) in self.specs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", spec)?;
        }
        Ok(())
    }
}

/// A parsed `Content-Range` response header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ByteRangeResponseFields")]
pub struct ByteRangeResponse {
    unit: String,
    start: Option<u64>,
    end: Option<u64>,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ByteRangeResponseFields {
    unit: String,
    start: Option<u64>,
    end: Option<u64>,
    size: Option<u64>,
}

impl TryFrom<ByteRangeResponseFields> for ByteRangeResponse {
    type Error = ConformError;

    fn try_from(fields: ByteRangeResponseFields) -> Result<Self> {
        Self::new(&fields.unit, fields.start, fields.end, fields.size)
    }
}

impl ByteRangeResponse {
    /// Builds a response value.
    ///
    /// `start` and `end` must be present together, `start <= end`, and at
    /// least one of `start` and `size` must be present.
    pub fn new(unit: &str, start: Option<u64>, end: Option<u64>, size: Option<u64>) -> Result<Self> {
        if !is_unit_token(unit) {
            return Err(ConformError::InvalidRangeUnit {
                unit: unit.to_string(),
            });
        }
        match (start, end) {
            (None, _) if size.is_none() => Err(invalid_content_range(
                "start and size cannot both be absent",
            )),
            (Some(_), None) | (None, Some(_)) => Err(invalid_content_range(
                "start and end must be present together",
            )),
            (Some(first), Some(last)) if last < first => Err(invalid_content_range(
                "last position precedes first position",
            )),
            _ => Ok(Self {
                unit: unit.to_string(),
                start,
                end,
                size,
            }),
        }
    }

    /// The `unit */size` form sent with a 416 response.
    pub fn unsatisfied(unit: &str, size: u64) -> Result<Self> {
        Self::new(unit, None, None, Some(size))
    }

    /// Parses a `Content-Range` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let (unit, rest) = header.split_once(' ')?;
        if let Some(size) = rest.strip_prefix("*/") {
            return Self::new(unit, None, None, Some(parse_pos(size)?)).ok();
        }
        let (span, length) = rest.split_once('/')?;
        let (first, last) = span.split_once('-')?;
        let size = if length == "*" {
            None
        } else {
            Some(parse_pos(length)?)
        };
        Self::new(unit, Some(parse_pos(first)?), Some(parse_pos(last)?), size).ok()
    }

    /// The range unit.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// First byte position, absent for the unsatisfied form.
    pub fn start(&self) -> Option<u64> {
        self.start
    }

    /// Last byte position, absent for the unsatisfied form.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Complete length, absent when the server sent `*`.
    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

impl fmt::Display for ByteRangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.unit)?;
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, "{}-{}", start, end)?,
            _ => f.write_str("*")?,
        }
        match self.size {
            Some(size) => write!(f, "/{}", size),
            None => f.write_str("/*"),
        }
    }
}

/// A concrete inclusive byte span inside an object. `start <= end` always
/// holds, so a span covers at least one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ResolvedSpanFields")]
pub struct ResolvedSpan {
    start: u64,
    end: u64,
}

#[derive(Deserialize)]
struct ResolvedSpanFields {
    start: u64,
    end: u64,
}

impl TryFrom<ResolvedSpanFields> for ResolvedSpan {
    type Error = ConformError;

    fn try_from(fields: ResolvedSpanFields) -> Result<Self> {
        Self::new(fields.start, fields.end)
    }
}

impl ResolvedSpan {
    /// Builds the inclusive span `start..=end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(ConformError::InvertedRangeSpec { start, end });
        }
        Ok(Self { start, end })
    }

    /// First byte offset.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes the span covers; this is the expected body length.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// Whether the span covers no bytes. Never true for a constructed span.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// The `Content-Range` a compliant server returns for this span. The size
    /// field is the full object size regardless of clamping.
    pub fn content_range(&self, unit: &str, object_size: u64) -> Result<ByteRangeResponse> {
        ByteRangeResponse::new(unit, Some(self.start), Some(self.end), Some(object_size))
    }

    /// The bytes of `data` covered by this span, if `data` is long enough.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        let start = usize::try_from(self.start).ok()?;
        let end = usize::try_from(self.end).ok()?;
        data.get(start..=end)
    }
}

/// Outcome of resolving a [`RangeSpec`] against an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// The span the server must return with status 206
    Satisfiable(ResolvedSpan),
    /// The server must answer 416 Range Not Satisfiable
    Unsatisfiable,
}

impl Resolution {
    /// The span, if satisfiable.
    pub fn span(&self) -> Option<ResolvedSpan> {
        match self {
            Resolution::Satisfiable(span) => Some(*span),
            Resolution::Unsatisfiable => None,
        }
    }
}

/// Resolves `spec` against an object of `object_size` bytes.
///
/// An end position past the object is clamped, never an error. A first
/// position at or past the object size is unsatisfiable, including
/// `start == object_size`.
pub fn resolve(spec: &RangeSpec, object_size: u64) -> Resolution {
    match spec.shape() {
        RangeShape::Suffix { len } => {
            if object_size == 0 || len == 0 {
                return Resolution::Unsatisfiable;
            }
            Resolution::Satisfiable(ResolvedSpan {
                start: object_size.saturating_sub(len),
                end: object_size - 1,
            })
        }
        RangeShape::From { start } => {
            if start >= object_size {
                return Resolution::Unsatisfiable;
            }
            Resolution::Satisfiable(ResolvedSpan {
                start,
                end: object_size - 1,
            })
        }
        RangeShape::Bounded { start, end } => {
            if start >= object_size {
                return Resolution::Unsatisfiable;
            }
            Resolution::Satisfiable(ResolvedSpan {
                start,
                end: end.min(object_size - 1),
            })
        }
    }
}

fn invalid_content_range(reason: &str) -> ConformError {
    ConformError::InvalidContentRange {
        reason: reason.to_string(),
    }
}

fn is_ows(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_unit_token(unit: &str) -> bool {
    !unit.is_empty()
        && unit
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'=' | b',' | b'/' | b'"'))
}

fn parse_pos(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_optional_pos(s: &str) -> Option<Option<u64>> {
    if s.is_empty() {
        Some(None)
    } else {
        parse_pos(s).map(Some)
    }
}
