use crate::domain::event::OrchestratorEvent;
use crate::error::Result;
use std::io::Write;

/// Writes orchestrator events to any `Write` sink, one JSON object per line.
///
/// Each line is flushed immediately so a consumer tailing the output sees
/// transitions as they happen.
pub struct EventWriter<W: Write> {
    sink: W,
}

impl<W: Write> EventWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write_event(&mut self, event: &OrchestratorEvent) -> Result<()> {
        serde_json::to_writer(&mut self.sink, event)?;
        self.sink.write_all(b"\n")?;
        self.sink.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
