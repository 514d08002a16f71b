//! Frame header codec: five physical on-disk layouts, one canonical record.
//!
//! The firmware generation determines the header width (19, 22, 24, 26 or
//! 28 bytes); the width alone selects the layout, so no tag is carried.
//! All fields are little-endian and decoded field by field; the filler
//! words between live fields differ per layout and are never interpreted.

use bytes::Buf;

use crate::CaptureError;

/// Bit in `frame_type` marking an AAC audio frame.
const AAC_FLAG: u16 = 0x0100;

/// The physical header widths the codec understands.
pub const HEADER_WIDTHS: [usize; 5] = [19, 22, 24, 26, 28];

/// Canonical in-memory frame header, independent of the physical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Payload length in bytes, not counting the header itself
    pub len: u32,
    /// Running frame counter over all stream types
    pub counter: u32,
    /// Firmware timestamp
    pub time: u32,
    pub frame_type: u16,
    /// Per-stream frame counter, wraps at 2^16
    pub stream_counter: u16,
}

impl FrameHeader {
    /// Decode a raw header span whose length matches one of the known
    /// physical layouts. Any other length is a hard error: the width is
    /// fixed per model and selected before capture starts.
    pub fn decode(mut raw: &[u8]) -> Result<Self, CaptureError> {
        match raw.len() {
            19 => {
                let len = raw.get_u32_le();
                let counter = raw.get_u16_le() as u32;
                let frame_type = raw.get_u16_le();
                raw.advance(4);
                let time = raw.get_u32_le();
                let stream_counter = raw.get_u16_le();
                Ok(Self { len, counter, time, frame_type, stream_counter })
            }
            22 | 24 => {
                let len = raw.get_u32_le();
                let counter = raw.get_u32_le();
                raw.advance(4);
                let time = raw.get_u32_le();
                let frame_type = raw.get_u16_le();
                let stream_counter = raw.get_u16_le();
                Ok(Self { len, counter, time, frame_type, stream_counter })
            }
            26 | 28 => {
                let len = raw.get_u32_le();
                let counter = raw.get_u32_le();
                raw.advance(8);
                let time = raw.get_u32_le();
                let frame_type = raw.get_u16_le();
                let stream_counter = raw.get_u16_le();
                Ok(Self { len, counter, time, frame_type, stream_counter })
            }
            n => Err(CaptureError::HeaderWidth(n)),
        }
    }

    pub fn is_audio(&self) -> bool {
        self.frame_type & AAC_FLAG != 0
    }

    /// Re-encode into a physical layout with zeroed filler. Test fixture
    /// builder; the firmware is the only producer of real headers.
    #[cfg(test)]
    pub(crate) fn encode(&self, width: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(width);
        match width {
            19 => {
                out.extend_from_slice(&self.len.to_le_bytes());
                out.extend_from_slice(&(self.counter as u16).to_le_bytes());
                out.extend_from_slice(&self.frame_type.to_le_bytes());
                out.extend_from_slice(&[0; 4]);
                out.extend_from_slice(&self.time.to_le_bytes());
                out.extend_from_slice(&self.stream_counter.to_le_bytes());
                out.push(0);
            }
            22 | 24 | 26 | 28 => {
                out.extend_from_slice(&self.len.to_le_bytes());
                out.extend_from_slice(&self.counter.to_le_bytes());
                let fill = if width >= 26 { 8 } else { 4 };
                out.resize(out.len() + fill, 0);
                out.extend_from_slice(&self.time.to_le_bytes());
                out.extend_from_slice(&self.frame_type.to_le_bytes());
                out.extend_from_slice(&self.stream_counter.to_le_bytes());
                out.resize(width, 0);
            }
            other => panic!("unsupported header width {other}"),
        }
        debug_assert_eq!(out.len(), width);
        out
    }
}
