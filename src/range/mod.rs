//! Byte-range header codec
//!
//! Handles the two textual range forms used by ranged S3 requests:
//! the request form `bytes=<start>-<end>` sent in the `Range` header, and
//! the response form `bytes <start>-<end>/<size>` returned in the
//! `Content-Range` header, where `*` may stand in for either side of the
//! slash.

use std::fmt;
use std::str::FromStr;

use crate::error::RangeError;

/// Unit of a byte-range specifier. Only `bytes` is supported; anything else
/// is rejected with [`RangeError::InvalidUnit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeUnit {
    /// The `bytes` unit
    #[default]
    Bytes,
}

impl fmt::Display for RangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeUnit::Bytes => f.write_str("bytes"),
        }
    }
}

impl FromStr for RangeUnit {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytes" => Ok(RangeUnit::Bytes),
            other => Err(RangeError::InvalidUnit(other.to_string())),
        }
    }
}

/// An inclusive byte range as requested from the server.
///
/// Formats as the `Range` request header value, e.g. `bytes=0-4999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// Range unit
    pub unit: RangeUnit,
    /// First byte offset, inclusive
    pub start: u64,
    /// Last byte offset, inclusive
    pub end: u64,
}

impl PartRange {
    /// Build a `bytes` range covering `start..=end`
    pub fn bytes(start: u64, end: u64) -> Self {
        Self {
            unit: RangeUnit::Bytes,
            start,
            end,
        }
    }
}

impl fmt::Display for PartRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}-{}", self.unit, self.start, self.end)
    }
}

impl FromStr for PartRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pieces = s.splitn(3, '=');
        let (unit, rest) = match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(unit), Some(rest), None) => (unit, rest),
            _ => return Err(RangeError::InvalidFormat),
        };
        let unit: RangeUnit = unit.parse()?;
        let (start, end) = parse_span(rest)?;
        Ok(Self { unit, start, end })
    }
}

/// A `Content-Range` response header.
///
/// `span` is `None` when the server sent `*` for the range portion, `size`
/// is `None` when the total size was `*` (unknown). When all pieces are
/// concrete the invariant `start <= end < size` is expected to hold; this
/// type does not enforce it since servers are the ones producing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Range unit
    pub unit: RangeUnit,
    /// `(start, end)` byte offsets, both inclusive; `None` for `*`
    pub span: Option<(u64, u64)>,
    /// Total object size; `None` for `*`
    pub size: Option<u64>,
}

impl ContentRange {
    /// Build a fully-known `bytes` content range
    pub fn bytes(start: u64, end: u64, size: u64) -> Self {
        Self {
            unit: RangeUnit::Bytes,
            span: Some((start, end)),
            size: Some(size),
        }
    }

    /// First byte offset of the span, if the server reported one
    pub fn start(&self) -> Option<u64> {
        self.span.map(|(start, _)| start)
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.unit)?;
        match self.span {
            Some((start, end)) => write!(f, "{}-{}", start, end)?,
            None => f.write_str("*")?,
        }
        match self.size {
            Some(size) => write!(f, "/{}", size),
            None => f.write_str("/*"),
        }
    }
}

impl FromStr for ContentRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let (unit, rest) = match (fields.next(), fields.next(), fields.next()) {
            (Some(unit), Some(rest), None) => (unit, rest),
            _ => return Err(RangeError::InvalidFormat),
        };
        let unit: RangeUnit = unit.parse()?;

        let mut pieces = rest.splitn(3, '/');
        let (span, size) = match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(span), Some(size), None) => (span, size),
            _ => return Err(RangeError::InvalidRange(rest.to_string())),
        };

        let size = if size == "*" {
            None
        } else {
            Some(parse_offset(size)?)
        };
        let span = if span == "*" {
            None
        } else {
            Some(parse_span(span)?)
        };

        Ok(Self { unit, span, size })
    }
}

fn parse_span(s: &str) -> Result<(u64, u64), RangeError> {
    let mut pieces = s.splitn(3, '-');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(start), Some(end), None) => Ok((parse_offset(start)?, parse_offset(end)?)),
        _ => Err(RangeError::InvalidRange(s.to_string())),
    }
}

fn parse_offset(s: &str) -> Result<u64, RangeError> {
    s.parse()
        .map_err(|_| RangeError::InvalidRange(s.to_string()))
}
