//! Presentation sink: where the core reports what the user should see.
//!
//! Calls are fire-and-forget. A sink never blocks the projection and never
//! reports failure back.

use crate::event::RecordedEvent;

/// Receiver of balance, error and listing updates.
pub trait PresentationSink: Send + Sync {
    /// Show the current balance.
    fn set_total(&self, value: i64);

    /// Show an error message.
    fn set_error(&self, message: &str);

    /// Show a listing of events.
    fn set_event_list(&self, events: &[RecordedEvent]);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn set_total(&self, _value: i64) {}

    fn set_error(&self, _message: &str) {}

    fn set_event_list(&self, _events: &[RecordedEvent]) {}
}
