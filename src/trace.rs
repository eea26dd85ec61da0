//! Trace sink collaborator.
//!
//! Models and engines send diagnostic lines to an optional [`TraceSink`].
//! The sink has no behavioral effect on the run: an absent sink simply
//! drops the lines.

use parking_lot::Mutex;

/// Receiver of diagnostic text, keyed by model URI.
pub trait TraceSink: Send + Sync {
    /// Records one line of trace output for `uri`.
    fn log_message(&self, uri: &str, text: &str);

    /// Releases the sink's resources. Called once when a run ends, whether
    /// it finished normally or aborted.
    fn close(&self) {}
}

/// Forwards trace lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn log_message(&self, uri: &str, text: &str) {
        tracing::info!(target: "devs_hioa::trace", model = uri, "{}", text);
    }
}

/// Keeps trace lines in memory, for tests and post-run inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(String, String)>>,
    closed: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded `(uri, text)` pair, in arrival order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.lines.lock().clone()
    }

    /// Recorded lines of one model.
    pub fn messages_of(&self, uri: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(u, _)| u == uri)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl TraceSink for MemorySink {
    fn log_message(&self, uri: &str, text: &str) {
        self.lines.lock().push((uri.to_string(), text.to_string()));
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log_message("a", "one");
        sink.log_message("b", "two");
        sink.log_message("a", "three");

        assert_eq!(sink.messages().len(), 3);
        assert_eq!(sink.messages_of("a"), vec!["one", "three"]);
        assert!(!sink.is_closed());
        sink.close();
        assert!(sink.is_closed());
    }

    #[test]
    fn test_tracing_sink_is_silent_without_subscriber() {
        TracingSink.log_message("fan", "hello");
        TracingSink.close();
    }
}
