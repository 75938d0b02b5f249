//! Event stream identification, positions and expected-version semantics.
//!
//! A stream is addressed by a [`StreamId`]. Every event in a stream has a
//! [`Version`]: its 0-based position, assigned by the store. The *current
//! version* of a stream is the position of its last event, or `None` while the
//! stream is empty.
//!
//! Appends carry an [`ExpectedVersion`] that the store checks against the
//! current version before writing (optimistic concurrency).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Name of an append-only event stream.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty and whitespace-only names
/// - `From::from()` and `new()`: no validation (trusted input)
///
/// # Examples
///
/// ```
/// use balance_core::stream::StreamId;
///
/// let stream_id = StreamId::new("account-42");
/// assert_eq!(stream_id.as_str(), "account-42");
///
/// let parsed: StreamId = "account-7".parse().unwrap();
/// assert_eq!(parsed, StreamId::new("account-7"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `StreamId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Position of an event within its stream.
///
/// The first event of a stream sits at `Version(0)`, the next at `Version(1)`
/// and so on: positions are contiguous and never reused.
///
/// # Examples
///
/// ```
/// use balance_core::stream::Version;
///
/// let v0 = Version::FIRST;
/// assert_eq!(v0.next(), Version::new(1));
/// assert_eq!(Version::new(5).value(), 5);
/// assert_eq!(Version::new(5).previous(), Some(Version::new(4)));
/// assert_eq!(Version::FIRST.previous(), None);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Position of the first event in any stream.
    pub const FIRST: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the position as a plain integer.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next position (current + 1).
    ///
    /// Reaching `u64::MAX` events in one stream is not a practical concern.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the previous position, or `None` at the start of the stream.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// First position strictly after `after` (the start when `after` is `None`).
    ///
    /// This is where a catch-up subscription resumes from a checkpoint.
    ///
    /// ```
    /// use balance_core::stream::Version;
    ///
    /// assert_eq!(Version::resume_after(None), Version::FIRST);
    /// assert_eq!(Version::resume_after(Some(Version::new(2))), Version::new(3));
    /// ```
    #[must_use]
    pub const fn resume_after(after: Option<Self>) -> Self {
        match after {
            Some(v) => v.next(),
            None => Self::FIRST,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Concurrency expectation attached to an append.
///
/// # Examples
///
/// ```
/// use balance_core::stream::{ExpectedVersion, Version};
///
/// // Derived from an optional checkpoint position.
/// assert_eq!(ExpectedVersion::from(None), ExpectedVersion::NoStream);
/// assert_eq!(
///     ExpectedVersion::from(Some(Version::new(3))),
///     ExpectedVersion::Exact(Version::new(3)),
/// );
///
/// assert!(ExpectedVersion::Any.matches(Some(Version::new(9))));
/// assert!(ExpectedVersion::NoStream.matches(None));
/// assert!(!ExpectedVersion::Exact(Version::new(1)).matches(Some(Version::new(2))));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// No concurrency check.
    Any,
    /// The stream must not contain any event yet.
    NoStream,
    /// The last event of the stream must be at exactly this position.
    Exact(Version),
}

impl ExpectedVersion {
    /// Whether a stream whose current version is `current` satisfies this expectation.
    #[must_use]
    pub const fn matches(self, current: Option<Version>) -> bool {
        match (self, current) {
            (Self::Any, _) | (Self::NoStream, None) => true,
            (Self::Exact(expected), Some(actual)) => expected.0 == actual.0,
            _ => false,
        }
    }
}

impl From<Option<Version>> for ExpectedVersion {
    fn from(position: Option<Version>) -> Self {
        position.map_or(Self::NoStream, Self::Exact)
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::NoStream => write!(f, "no stream"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// Where a read starts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamCursor {
    /// First event of the stream.
    Start,
    /// Last event of the stream.
    End,
    /// A specific position.
    At(Version),
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_id_tests {
        use super::*;

        #[test]
        fn from_string() {
            let id = StreamId::from("account-123");
            assert_eq!(id.as_str(), "account-123");

            let id2 = StreamId::from("account-456".to_string());
            assert_eq!(id2.into_inner(), "account-456");
        }

        #[test]
        fn parse_blank_string_fails() {
            assert!("".parse::<StreamId>().is_err());
            assert!("   ".parse::<StreamId>().is_err());
        }

        #[test]
        fn display() {
            let id = StreamId::new("account-123");
            assert_eq!(format!("{id}"), "account-123");
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn previous_of_first_is_none() {
            assert_eq!(Version::FIRST.previous(), None);
            assert_eq!(Version::new(1).previous(), Some(Version::FIRST));
        }

        #[test]
        fn version_ordering() {
            assert!(Version::new(1) < Version::new(2));
            assert!(Version::new(3) > Version::FIRST);
        }

        #[test]
        fn version_from_u64() {
            let version = Version::from(42_u64);
            let num: u64 = version.into();
            assert_eq!(num, 42);
        }
    }

    mod expected_version_tests {
        use super::*;

        #[test]
        fn no_stream_rejects_existing_stream() {
            assert!(!ExpectedVersion::NoStream.matches(Some(Version::FIRST)));
        }

        #[test]
        fn exact_rejects_empty_stream() {
            assert!(!ExpectedVersion::Exact(Version::FIRST).matches(None));
        }

        #[test]
        fn exact_matches_same_position() {
            assert!(ExpectedVersion::Exact(Version::new(4)).matches(Some(Version::new(4))));
        }

        #[test]
        fn any_matches_empty_stream() {
            assert!(ExpectedVersion::Any.matches(None));
        }

        #[test]
        fn display() {
            assert_eq!(ExpectedVersion::Any.to_string(), "any");
            assert_eq!(ExpectedVersion::NoStream.to_string(), "no stream");
            assert_eq!(ExpectedVersion::Exact(Version::new(7)).to_string(), "7");
        }
    }
}
