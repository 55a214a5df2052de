use super::pipeline::{Emitter, Filter};
use super::record::Event;
use crate::error::Error;

/// Logs every event at TRACE level and forwards it unchanged.
#[derive(Debug, Default)]
pub struct TracingFilter {
    label: Option<String>,
    depth: usize,
}

impl TracingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinguish this stage's output when several tracers are installed.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self { label: Some(label.into()), depth: 0 }
    }
}

impl Filter for TracingFilter {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error> {
        if matches!(event, Event::EndElement) {
            self.depth = self.depth.saturating_sub(1);
        }
        let indent = self.depth * 2;
        match event.location() {
            Some(loc) if !loc.is_unknown() => {
                tracing::trace!(label = ?self.label, depth = self.depth, location = %loc, "{:indent$}{event}", "")
            }
            _ => tracing::trace!(label = ?self.label, depth = self.depth, "{:indent$}{event}", ""),
        }
        if matches!(event, Event::StartElement { .. }) {
            self.depth += 1;
        }
        out.emit(event)
    }
}
