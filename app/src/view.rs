//! Console rendering of the balance screen.

use balance_core::event::RecordedEvent;
use balance_core::sink::PresentationSink;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

const HELP: &str = "Commands: CREDIT <n> | DEBIT <n> | REPEAT <pos> | repeat | undo | list | rlist | clean | exit";

/// What the screen currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    /// Current balance.
    pub total: i64,
    /// Pending error message; shown once.
    pub error: Option<String>,
    /// Last requested listing.
    pub events: Vec<RecordedEvent>,
}

impl Screen {
    /// Render the screen as text.
    ///
    /// ```
    /// use account_balance::view::Screen;
    ///
    /// let screen = Screen { total: 70, error: Some("Unknown Command".into()), events: vec![] };
    /// let text = screen.render();
    /// assert!(text.contains("Balance: 70"));
    /// assert!(text.contains("Unknown Command"));
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("Balance: {}\n", self.total);

        if !self.events.is_empty() {
            out.push('\n');
            for event in &self.events {
                out.push_str(&format!(
                    "  {:>4}  {:<8} {}\n",
                    event.position.value(),
                    event.event_type,
                    String::from_utf8_lossy(&event.data)
                ));
            }
        }

        if let Some(error) = &self.error {
            out.push_str(&format!("\n! {error}\n"));
        }

        out.push_str(&format!("\n{HELP}\n> "));
        out
    }
}

/// Presentation sink that redraws the screen on every update.
pub struct ConsoleView {
    screen: Mutex<Screen>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleView {
    /// A view writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            screen: Mutex::new(Screen::default()),
            out: Mutex::new(out),
        }
    }

    /// A view writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Print the screen; a pending error is consumed.
    pub fn redraw(&self) {
        let text = {
            let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
            let text = screen.render();
            screen.error = None;
            text
        };

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Clear the terminal, then home the cursor.
        if let Err(e) = write!(out, "\x1b[2J\x1b[H{text}").and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "Failed to draw screen");
        }
    }

    fn update(&self, change: impl FnOnce(&mut Screen)) {
        {
            let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut *screen);
        }
        self.redraw();
    }
}

impl PresentationSink for ConsoleView {
    fn set_total(&self, value: i64) {
        self.update(|screen| screen.total = value);
    }

    fn set_error(&self, message: &str) {
        self.update(|screen| screen.error = Some(message.to_string()));
    }

    fn set_event_list(&self, events: &[RecordedEvent]) {
        self.update(|screen| screen.events = events.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn take(&self) -> String {
            let bytes = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    #[test]
    fn error_is_shown_once() {
        let buffer = SharedBuffer::default();
        let view = ConsoleView::new(Box::new(buffer.clone()));

        view.set_error("Event not found to undo");
        assert!(buffer.take().contains("! Event not found to undo"));

        view.set_total(5);
        let next = buffer.take();
        assert!(next.contains("Balance: 5"));
        assert!(!next.contains("Event not found to undo"));
    }

    #[test]
    fn render_without_events_or_error() {
        let screen = Screen {
            total: 70,
            error: None,
            events: Vec::new(),
        };
        assert_eq!(screen.render(), format!("Balance: 70\n\n{HELP}\n> "));
    }

    #[test]
    fn render_with_error() {
        let screen = Screen {
            total: 0,
            error: Some("Unknown Command".into()),
            events: Vec::new(),
        };
        assert_eq!(
            screen.render(),
            format!("Balance: 0\n\n! Unknown Command\n\n{HELP}\n> ")
        );
    }

    #[test]
    fn render_lists_events_by_position() {
        use balance_testing::helpers::{debit, recorded};

        let event = recorded(12, debit(30));
        let screen = Screen {
            total: -30,
            error: None,
            events: vec![event],
        };

        let text = screen.render();
        assert!(text.contains("Balance: -30"));
        assert!(text.contains("  12  DEBIT    {\"amount\":30}"));
    }
}
