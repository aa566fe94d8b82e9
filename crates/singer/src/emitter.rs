//! Line-delimited message output.

use std::io::Write;

use crate::Message;

/// Destination for Singer messages.
///
/// The sync driver is generic over this trait so tests can capture messages
/// instead of writing to stdout.
pub trait MessageSink {
    fn emit(&mut self, message: &Message) -> anyhow::Result<()>;
}

/// Writes each message as one JSON line, flushed immediately so a downstream
/// consumer sees records as they are extracted.
pub struct JsonLinesEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the emitter and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MessageSink for JsonLinesEmitter<W> {
    fn emit(&mut self, message: &Message) -> anyhow::Result<()> {
        let line = serde_json::to_string(message)?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }
}
