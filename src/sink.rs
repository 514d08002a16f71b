//! Receive-side ADTS sink.
//!
//! Accepts raw AAC payloads and forwards them ADTS-framed to an inner
//! writer, the boundary to the external decoder. Oversized frames are a
//! recoverable condition: logged, counted, dropped.

use std::io::{self, Write};

use thiserror::Error;
use tracing::warn;

use crate::adts::{self, StreamParams};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("could not forward ADTS frame: {0}")]
    Io(#[from] io::Error),
}

pub struct AdtsSink<W> {
    params: StreamParams,
    writer: W,
    forwarded: u64,
    dropped: u64,
}

impl<W: Write> AdtsSink<W> {
    pub fn new(params: StreamParams, writer: W) -> Self {
        Self { params, writer, forwarded: 0, dropped: 0 }
    }

    /// Frame the payload with a 7-byte ADTS header and forward it. A
    /// payload that overflows the 13-bit ADTS length field is dropped and
    /// reported; only I/O failures propagate.
    pub fn push(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        let Some(header) = adts::adts_header(&self.params, payload.len()) else {
            self.dropped += 1;
            warn!(len = payload.len(), "frame size exceeds ADTS limit, dropped");
            return Ok(());
        };
        self.writer.write_all(&header)?;
        self.writer.write_all(payload)?;
        self.forwarded += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
