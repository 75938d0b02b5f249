//! Event types and the amount payload codec.
//!
//! Events travel in two shapes:
//!
//! - [`EventData`]: an event about to be appended (no position yet)
//! - [`RecordedEvent`]: an event read back from the store, with the position
//!   the store assigned to it
//!
//! # Wire contract
//!
//! The payload of every balance event is a JSON object with an integer field
//! named `amount`:
//!
//! ```text
//! {"amount":100}
//! ```
//!
//! Decoding is deliberately lenient so that logs written by older clients stay
//! readable: the amount may also be a numeric string (`{"amount":"100"}`) or use
//! the unquoted-key form `{amount:100}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::stream::{StreamId, Version};

/// Errors raised while encoding or decoding an amount payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Payload bytes are not UTF-8.
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    /// Payload has no `amount` field.
    #[error("Payload has no amount field: {0}")]
    MissingAmount(String),

    /// The `amount` field is not an integer.
    #[error("Amount is not an integer: {0}")]
    InvalidAmount(String),

    /// Serialization failed.
    #[error("Failed to serialize payload: {0}")]
    Serialization(String),
}

/// The event types a balance stream understands.
///
/// The store accepts any type name; only these two fold into a balance.
/// Matching is case-insensitive.
///
/// ```
/// use balance_core::event::EventKind;
///
/// assert_eq!("credit".parse::<EventKind>(), Ok(EventKind::Credit));
/// assert_eq!(EventKind::Debit.as_str(), "DEBIT");
/// assert!("REFUND".parse::<EventKind>().is_err());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Adds the amount to the balance.
    Credit,
    /// Subtracts the amount from the balance.
    Debit,
}

impl EventKind {
    /// Canonical type name written to the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for event type names outside [`EventKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown Event Type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREDIT" => Ok(Self::Credit),
            "DEBIT" => Ok(Self::Debit),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

/// JSON body of a balance event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountPayload {
    /// Signed amount carried by the event.
    pub amount: i64,
}

impl AmountPayload {
    /// Create a payload for `amount`.
    #[must_use]
    pub const fn new(amount: i64) -> Self {
        Self { amount }
    }

    /// Encode as `{"amount":<int>}`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Serialization`] if JSON encoding fails.
    pub fn to_bytes(self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(&self).map_err(|e| PayloadError::Serialization(e.to_string()))
    }

    /// Decode a payload, accepting the lenient forms described in the module docs.
    ///
    /// ```
    /// use balance_core::event::AmountPayload;
    ///
    /// assert_eq!(AmountPayload::from_bytes(br#"{"amount":42}"#).unwrap().amount, 42);
    /// assert_eq!(AmountPayload::from_bytes(br#"{"amount":"-7"}"#).unwrap().amount, -7);
    /// assert_eq!(AmountPayload::from_bytes(b"{amount:15}").unwrap().amount, 15);
    /// assert!(AmountPayload::from_bytes(br#"{"amount":"ten"}"#).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the bytes are not UTF-8, carry no
    /// `amount` field, or the amount is not a 64-bit integer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(bytes).map_err(|_| PayloadError::InvalidUtf8)?;

        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => Self::from_json(&value, text),
            Err(_) => Self::from_unquoted(text),
        }
    }

    fn from_json(value: &serde_json::Value, text: &str) -> Result<Self, PayloadError> {
        let amount = value
            .get("amount")
            .ok_or_else(|| PayloadError::MissingAmount(text.to_string()))?;

        let parsed = match amount {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        parsed
            .map(Self::new)
            .ok_or_else(|| PayloadError::InvalidAmount(amount.to_string()))
    }

    // `{amount:100}`, as written by clients that skip key quoting.
    fn from_unquoted(text: &str) -> Result<Self, PayloadError> {
        let body = text
            .trim()
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| PayloadError::MissingAmount(text.to_string()))?;

        let (key, value) = body
            .split_once(':')
            .ok_or_else(|| PayloadError::MissingAmount(text.to_string()))?;

        if key.trim().trim_matches(|c| c == '"' || c == '\'') != "amount" {
            return Err(PayloadError::MissingAmount(text.to_string()));
        }

        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        value
            .parse()
            .map(Self::new)
            .map_err(|_| PayloadError::InvalidAmount(value.to_string()))
    }
}

/// An event ready to be appended to a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventData {
    /// Unique id of this event.
    pub event_id: Uuid,

    /// Event type name (e.g. `CREDIT`).
    pub event_type: String,

    /// Whether `data` is JSON.
    pub is_json: bool,

    /// Event body.
    pub data: Vec<u8>,

    /// Opaque metadata, carried through unchanged.
    pub metadata: Vec<u8>,
}

impl EventData {
    /// Create a new event with a fresh id.
    #[must_use]
    pub fn new(event_type: impl Into<String>, is_json: bool, data: Vec<u8>, metadata: Vec<u8>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            is_json,
            data,
            metadata,
        }
    }

    /// Build a CREDIT or DEBIT event carrying `amount`, with empty metadata.
    ///
    /// ```
    /// use balance_core::event::{EventData, EventKind};
    ///
    /// let event = EventData::balance(EventKind::Credit, 100).unwrap();
    /// assert_eq!(event.event_type, "CREDIT");
    /// assert_eq!(event.data, br#"{"amount":100}"#.to_vec());
    /// assert!(event.metadata.is_empty());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Serialization`] if the payload cannot be encoded.
    pub fn balance(kind: EventKind, amount: i64) -> Result<Self, PayloadError> {
        Ok(Self::new(
            kind.as_str(),
            true,
            AmountPayload::new(amount).to_bytes()?,
            Vec::new(),
        ))
    }

    /// Copy type, body, JSON flag and metadata of a recorded event under a fresh id.
    #[must_use]
    pub fn replay_of(event: &RecordedEvent) -> Self {
        Self::new(
            event.event_type.clone(),
            event.is_json,
            event.data.clone(),
            event.metadata.clone(),
        )
    }
}

/// An event as stored, with the position the store assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Stream the event belongs to.
    pub stream_id: StreamId,

    /// Position within the stream.
    pub position: Version,

    /// Unique id given at append time.
    pub event_id: Uuid,

    /// Event type name as appended.
    pub event_type: String,

    /// Whether `data` is JSON.
    pub is_json: bool,

    /// Event body.
    pub data: Vec<u8>,

    /// Opaque metadata.
    pub metadata: Vec<u8>,

    /// When the store accepted the event.
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Record `data` at `position` of `stream_id`.
    #[must_use]
    pub fn from_data(
        stream_id: StreamId,
        position: Version,
        data: EventData,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stream_id,
            position,
            event_id: data.event_id,
            event_type: data.event_type,
            is_json: data.is_json,
            data: data.data,
            metadata: data.metadata,
            recorded_at,
        }
    }

    /// Decode the amount payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if the body does not follow the wire contract.
    pub fn amount(&self) -> Result<i64, PayloadError> {
        AmountPayload::from_bytes(&self.data).map(|payload| payload.amount)
    }

    /// Event type as an [`EventKind`].
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventType`] for types other than CREDIT and DEBIT.
    pub fn kind(&self) -> Result<EventKind, UnknownEventType> {
        self.event_type.parse()
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {} {}",
            self.stream_id,
            self.position,
            self.event_type,
            String::from_utf8_lossy(&self.data)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests can unwrap
mod tests {
    use super::*;

    #[test]
    fn payload_encodes_as_documented() {
        let bytes = AmountPayload::new(-30).to_bytes().unwrap_or_default();
        assert_eq!(bytes, br#"{"amount":-30}"#.to_vec());
    }

    #[test]
    fn payload_without_amount_is_rejected() {
        let result = AmountPayload::from_bytes(br#"{"value":1}"#);
        assert!(matches!(result, Err(PayloadError::MissingAmount(_))));
    }

    #[test]
    fn payload_with_fractional_amount_is_rejected() {
        let result = AmountPayload::from_bytes(br#"{"amount":1.5}"#);
        assert!(matches!(result, Err(PayloadError::InvalidAmount(_))));
    }

    #[test]
    fn payload_with_garbage_is_rejected() {
        assert!(AmountPayload::from_bytes(b"not json").is_err());
        assert!(AmountPayload::from_bytes(b"{other:5}").is_err());
        assert_eq!(
            AmountPayload::from_bytes(&[0xff, 0xfe]),
            Err(PayloadError::InvalidUtf8)
        );
    }

    #[test]
    fn event_kind_parsing_ignores_case() {
        assert_eq!("Debit".parse::<EventKind>(), Ok(EventKind::Debit));
        assert_eq!("CREDIT".parse::<EventKind>(), Ok(EventKind::Credit));
    }

    #[test]
    fn unknown_event_type_display() {
        let error = "TRANSFER".parse::<EventKind>().unwrap_err();
        assert_eq!(error.to_string(), "Unknown Event Type: TRANSFER");
    }

    #[test]
    fn replay_keeps_body_and_metadata_but_not_id() {
        let original = RecordedEvent::from_data(
            StreamId::new("account"),
            Version::new(3),
            EventData::new("DEBIT", true, br#"{"amount":5}"#.to_vec(), b"meta".to_vec()),
            Utc::now(),
        );

        let replay = EventData::replay_of(&original);

        assert_eq!(replay.event_type, "DEBIT");
        assert_eq!(replay.data, original.data);
        assert_eq!(replay.metadata, b"meta".to_vec());
        assert!(replay.is_json);
        assert_ne!(replay.event_id, original.event_id);
    }

    #[test]
    fn recorded_event_display() {
        let event = RecordedEvent::from_data(
            StreamId::new("account"),
            Version::new(2),
            EventData::new("CREDIT", true, br#"{"amount":9}"#.to_vec(), Vec::new()),
            Utc::now(),
        );

        assert_eq!(event.to_string(), r#"account@2 CREDIT {"amount":9}"#);
    }
}
