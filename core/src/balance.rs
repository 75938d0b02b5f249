//! The balance fold.
//!
//! The balance is a pure left fold over the stream: it starts at 0, every
//! CREDIT adds its amount and every DEBIT subtracts it. Anything else is a
//! [`FoldError`] that the caller decides how to handle (the projection
//! reports it and moves on).

use thiserror::Error;

use crate::event::{EventKind, PayloadError, RecordedEvent, UnknownEventType};

/// Why an event could not be folded into the balance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    /// Event type is neither CREDIT nor DEBIT.
    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventType),

    /// Payload does not carry a usable amount.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Applying the amount would overflow the balance.
    #[error("Balance overflow: {balance} {kind} {amount}")]
    Overflow {
        /// Balance before the event.
        balance: i64,
        /// Event type.
        kind: EventKind,
        /// Amount carried by the event.
        amount: i64,
    },
}

/// Apply `amount` of `kind` to `balance`.
///
/// ```
/// use balance_core::balance::apply_amount;
/// use balance_core::event::EventKind;
///
/// assert_eq!(apply_amount(100, EventKind::Debit, 30), Ok(70));
/// assert_eq!(apply_amount(70, EventKind::Debit, -30), Ok(100));
/// assert!(apply_amount(i64::MAX, EventKind::Credit, 1).is_err());
/// ```
///
/// # Errors
///
/// Returns [`FoldError::Overflow`] instead of wrapping.
pub const fn apply_amount(balance: i64, kind: EventKind, amount: i64) -> Result<i64, FoldError> {
    let next = match kind {
        EventKind::Credit => balance.checked_add(amount),
        EventKind::Debit => balance.checked_sub(amount),
    };

    match next {
        Some(value) => Ok(value),
        None => Err(FoldError::Overflow {
            balance,
            kind,
            amount,
        }),
    }
}

/// Fold a single recorded event into `balance`.
///
/// # Errors
///
/// Returns [`FoldError`] for unknown event types, undecodable payloads and
/// overflow.
pub fn apply_event(balance: i64, event: &RecordedEvent) -> Result<i64, FoldError> {
    let kind = event.kind()?;
    let amount = event.amount()?;
    apply_amount(balance, kind, amount)
}

/// Fold a whole ordered sequence of events, starting from 0.
///
/// # Errors
///
/// Stops at the first event that cannot be folded.
pub fn fold_balance<'a, I>(events: I) -> Result<i64, FoldError>
where
    I: IntoIterator<Item = &'a RecordedEvent>,
{
    events
        .into_iter()
        .try_fold(0_i64, |balance, event| apply_event(balance, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;
    use crate::stream::{StreamId, Version};
    use chrono::Utc;
    use proptest::prelude::*;

    fn recorded(position: u64, event_type: &str, data: &[u8]) -> RecordedEvent {
        RecordedEvent::from_data(
            StreamId::new("account"),
            Version::new(position),
            EventData::new(event_type, true, data.to_vec(), Vec::new()),
            Utc::now(),
        )
    }

    fn balance_event(position: u64, kind: EventKind, amount: i64) -> RecordedEvent {
        let data = format!(r#"{{"amount":{amount}}}"#);
        recorded(position, kind.as_str(), data.as_bytes())
    }

    #[test]
    fn empty_stream_folds_to_zero() {
        assert_eq!(fold_balance(&[]), Ok(0));
    }

    #[test]
    fn credits_and_debits_fold_in_order() {
        let events = vec![
            balance_event(0, EventKind::Credit, 100),
            balance_event(1, EventKind::Debit, 30),
            balance_event(2, EventKind::Debit, -30),
        ];

        assert_eq!(fold_balance(&events), Ok(100));
    }

    #[test]
    fn balance_may_go_negative() {
        let events = vec![balance_event(0, EventKind::Debit, 25)];
        assert_eq!(fold_balance(&events), Ok(-25));
    }

    #[test]
    fn unknown_type_is_a_fold_error() {
        let event = recorded(0, "TRANSFER", br#"{"amount":1}"#);
        assert!(matches!(
            apply_event(0, &event),
            Err(FoldError::UnknownEventType(_))
        ));
    }

    #[test]
    fn lowercase_type_still_folds() {
        let event = recorded(0, "credit", br#"{"amount":12}"#);
        assert_eq!(apply_event(3, &event), Ok(15));
    }

    #[test]
    fn bad_payload_is_a_fold_error() {
        let event = recorded(0, "CREDIT", br#"{"amount":"lots"}"#);
        assert!(matches!(apply_event(0, &event), Err(FoldError::Payload(_))));
    }

    #[test]
    fn overflow_is_a_fold_error() {
        let event = balance_event(0, EventKind::Debit, 1);
        assert!(matches!(
            apply_event(i64::MIN, &event),
            Err(FoldError::Overflow { .. })
        ));
    }

    proptest! {
        #[test]
        fn fold_is_credits_minus_debits(entries in prop::collection::vec((any::<bool>(), -1_000_000_i64..1_000_000), 0..64)) {
            let events: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (is_credit, amount))| {
                    let kind = if *is_credit { EventKind::Credit } else { EventKind::Debit };
                    balance_event(i as u64, kind, *amount)
                })
                .collect();

            let credits: i64 = entries.iter().filter(|(c, _)| *c).map(|(_, a)| a).sum();
            let debits: i64 = entries.iter().filter(|(c, _)| !*c).map(|(_, a)| a).sum();

            prop_assert_eq!(fold_balance(&events), Ok(credits - debits));
        }
    }
}
