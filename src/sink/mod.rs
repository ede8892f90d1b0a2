use std::io::Write;

use anyhow::{Context, Result};

use crate::record::OutputRecord;

/// Sink consumes finished records and delivers them downstream.
pub trait RecordSink {
    /// Deliver a single record. A failure here is fatal for the run.
    fn emit(&mut self, record: &OutputRecord) -> Result<()>;
}

/// Writes one JSON object per line to the wrapped writer.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to the process's stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &OutputRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record).context("serializing record")?;
        self.out.write_all(b"\n").context("writing record")?;
        Ok(())
    }
}
