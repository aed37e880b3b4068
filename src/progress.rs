//! Progress and log reporting towards the embedding UI.

use std::fmt;

/// Threshold above which progress units are downshifted so that consumers
/// working in `u32` keep headroom.
const DOWNSHIFT_LIMIT: u64 = 1 << 24;

/// Events emitted while a session operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A human-readable status line.
    Message(String),
    /// Completion state of the running operation, in bytes (or, for totals
    /// above 2^24, in 256-byte units).
    Progress {
        /// Units completed so far.
        done: u32,
        /// Units in the whole operation.
        total: u32,
    },
}

/// A thread-safe sink for [`ProgressEvent`]s.
///
/// The handler is called on whichever thread runs the session operation; a
/// GUI embedder is expected to post the event to its own event loop.
pub struct ProgressSink {
    handler: Box<dyn Fn(ProgressEvent) + Send + Sync>,
}

impl ProgressSink {
    /// Create a sink from a handler closure.
    pub fn new(handler: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// A sink that discards every event.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Emit a status line.
    pub fn log(&self, text: impl Into<String>) {
        (self.handler)(ProgressEvent::Message(text.into()));
    }

    /// Emit a progress update. Totals above 2^24 are downshifted by 8 bits
    /// together with `done` before emission.
    pub fn progress(&self, done: u64, total: u64) {
        let (done, total) = if total > DOWNSHIFT_LIMIT {
            (done >> 8, total >> 8)
        } else {
            (done, total)
        };
        (self.handler)(ProgressEvent::Progress {
            done: done as u32,
            total: total as u32,
        });
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink = ProgressSink::new(move |event| captured.lock().unwrap().push(event));
        (sink, events)
    }

    #[test]
    fn small_totals_pass_through() {
        let (sink, events) = collecting_sink();
        sink.progress(512, 1024);
        assert_eq!(
            events.lock().unwrap()[0],
            ProgressEvent::Progress {
                done: 512,
                total: 1024
            }
        );
    }

    #[test]
    fn large_totals_downshift_by_eight_bits() {
        let (sink, events) = collecting_sink();
        sink.progress(1 << 24, 1 << 25);
        assert_eq!(
            events.lock().unwrap()[0],
            ProgressEvent::Progress {
                done: 1 << 16,
                total: 1 << 17
            }
        );
    }
}
