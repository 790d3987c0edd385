use crate::engine::events::RunEvent;

pub trait EventSink: Send {
    fn emit(&mut self, event: RunEvent);
}

/// Sink that drops every event, for callers that only want the result.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: RunEvent) {}
}
