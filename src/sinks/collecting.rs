use crate::engine::events::RunEvent;
use crate::engine::sink::EventSink;

/// An in-memory event sink used to collect run events
/// during a single execution.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Vec<RunEvent>,
}

impl CollectingEventSink {
    /// Create a new, empty collecting sink.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Borrow all collected events.
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Consume the sink and return the collected events.
    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&mut self, event: RunEvent) {
        tracing::trace!(run_id = %event.run_id, kind = ?event.kind, "run event");
        self.events.push(event);
    }
}
