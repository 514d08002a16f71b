//! ADTS framing helpers: stream-parameter autodetection, the MPEG-4
//! sampling-frequency table, AudioSpecificConfig and header construction.

use once_cell::sync::OnceCell;

/// MPEG-4 sampling frequencies by 4-bit index. Indexes 13..=15 are
/// reserved and map to 0.
pub const SAMPLING_FREQUENCY_TABLE: [u32; 16] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0, 0,
    0,
];

/// Index used when a rate or index is reserved or unknown (16 kHz).
const FALLBACK_INDEX: u8 = 8;

/// ADTS header length without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// The ADTS frame-length field is 13 bits wide, header included.
const MAX_ADTS_FRAME_LEN: usize = 0x1FFF;

/// Detected (or configured) stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u8,
}

/// Inspect the leading bytes of an AAC payload for an ADTS header and
/// recover sample rate and channel count. Absent syncword means the frame
/// carries no header; detection is retried on the next accepted frame.
pub fn detect_params(payload: &[u8]) -> Option<StreamParams> {
    if payload.len() < 4 {
        return None;
    }
    if payload[0] != 0xFF || payload[1] & 0xF0 != 0xF0 {
        return None;
    }
    let index = (payload[2] & 0x3C) >> 2;
    let channels = ((payload[2] & 0x01) << 2) | ((payload[3] & 0xC0) >> 6);

    let mut sample_rate = SAMPLING_FREQUENCY_TABLE[index as usize];
    if sample_rate == 0 {
        // reserved index
        sample_rate = SAMPLING_FREQUENCY_TABLE[FALLBACK_INDEX as usize];
    }
    Some(StreamParams { sample_rate, channels })
}

/// Reverse lookup into the sampling-frequency table. Unknown rates fall
/// back to index 8, as the streaming side always has done.
pub fn sampling_frequency_index(sample_rate: u32) -> u8 {
    SAMPLING_FREQUENCY_TABLE
        .iter()
        .position(|&r| r == sample_rate && r != 0)
        .map(|i| i as u8)
        .unwrap_or(FALLBACK_INDEX)
}

fn channel_configuration(channels: u8) -> u8 {
    // 7.1 streams signal channel configuration 7
    if channels == 8 {
        7
    } else {
        channels
    }
}

/// Two-byte MPEG-4 AudioSpecificConfig (audio object type 2, AAC-LC) the
/// streaming engine advertises in its session description.
pub fn audio_specific_config(params: &StreamParams) -> [u8; 2] {
    let index = sampling_frequency_index(params.sample_rate);
    let channels = channel_configuration(params.channels);
    let object_type = 2u8;
    [
        (object_type << 3) | (index >> 1),
        (index << 7) | (channels << 3),
    ]
}

/// Build the 7-byte ADTS header (MPEG-4, no CRC) framing `payload_len`
/// bytes of AAC data. `None` when the total overflows the 13-bit frame
/// length field.
pub fn adts_header(params: &StreamParams, payload_len: usize) -> Option<[u8; ADTS_HEADER_LEN]> {
    let frame_len = payload_len + ADTS_HEADER_LEN;
    if frame_len > MAX_ADTS_FRAME_LEN {
        return None;
    }
    let index = sampling_frequency_index(params.sample_rate);
    let channels = channel_configuration(params.channels);
    Some([
        0xFF,
        0xF1,
        0x40 | ((index << 2) & 0x3C) | ((channels >> 2) & 0x03),
        ((channels << 6) & 0xC0) | ((frame_len >> 11) as u8 & 0x03),
        (frame_len >> 3) as u8,
        ((frame_len << 5) as u8 & 0xE0) | 0x1F,
        0xFC,
    ])
}

/// Write-once cell holding the stream parameters. Publication is the
/// readiness signal the external streaming engine gates on.
#[derive(Debug, Default)]
pub struct StreamInfo {
    cell: OnceCell<StreamParams>,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the parameters. Only the first call wins; returns whether
    /// this call was the one that published.
    pub fn publish(&self, params: StreamParams) -> bool {
        self.cell.set(params).is_ok()
    }

    pub fn get(&self) -> Option<StreamParams> {
        self.cell.get().copied()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}
