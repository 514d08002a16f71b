//! Capture state machine over the firmware frame buffer.
//!
//! A dedicated thread polls the writer cursors, walks newly appended
//! frame headers, validates them, and copies accepted audio frames into
//! the output ring. The writer is never blocked and never cooperates
//! beyond maintaining its cursors; every anomaly is handled locally by
//! retrying or resynchronizing.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::adts::{self, StreamInfo};
use crate::capture::frame::FrameHeader;
use crate::capture::model::Profile;
use crate::capture::region::InputRegion;
use crate::pipeline::FrameRingBuffer;

/// Headers walked in one poll before sync is assumed lost.
const MAX_WALK: usize = 10;

/// Sleep after a poll that accepted frames.
const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Sleep when nothing new arrived, after a resync or a short walk.
const IDLE_INTERVAL: Duration = Duration::from_millis(10);
/// Sleep when the writer was caught mid-update.
const TORN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one polling iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Writer cursors inconsistent; nothing can be trusted this round
    TornRead,
    /// Nothing new since the last poll
    NoNewData,
    /// Only one new header; it may still be mid-write
    Incomplete,
    /// Walk aborted, the unreadable span was discarded
    Resynced,
    /// This many frames were accepted
    Accepted(usize),
}

/// Shared counters for stream-health monitoring.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_accepted: AtomicU64,
    pub frames_lost: AtomicU64,
    pub audio_frames_lost: AtomicU64,
    pub resyncs: AtomicU64,
    pub oversize_drops: AtomicU64,
}

pub struct ShmCapture {
    region: InputRegion,
    header_len: usize,
    ring: Arc<FrameRingBuffer>,
    stream_info: Arc<StreamInfo>,
    stats: Arc<CaptureStats>,

    /// Confirmed end of the previous walk; the next walk starts here
    scan_base: usize,
    /// Overall frame counter, 32-bit wraparound
    last_counter: Option<u32>,
    /// Audio stream counter, 16-bit wraparound
    last_audio_counter: Option<u16>,
    scratch: Vec<u8>,
}

impl ShmCapture {
    pub fn new(
        region: InputRegion,
        profile: Profile,
        ring: Arc<FrameRingBuffer>,
        stream_info: Arc<StreamInfo>,
    ) -> Self {
        // First cursor snapshot seeds the scan base; the first poll
        // re-reads and cross-checks before trusting anything.
        let cursors = region.cursors();
        let start = region.position(cursors.start);
        let scan_base = region.advance(start, cursors.len as isize);
        debug!(scan_base, span = region.span(), "capture initialized");

        Self {
            region,
            header_len: profile.header_len,
            ring,
            stream_info,
            stats: Arc::new(CaptureStats::default()),
            scan_base,
            last_counter: None,
            last_audio_counter: None,
            scratch: Vec::new(),
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Re-read the writer cursors and recompute the claimed end of data.
    /// `None` when the redundant end cursor disagrees: the writer was
    /// caught mid-update and the snapshot cannot be trusted.
    fn claimed_end(&self) -> Option<usize> {
        let c = self.region.cursors();
        let start = self.region.position(c.start);
        let end = self.region.advance(start, c.len as isize);
        (end == self.region.position(c.end)).then_some(end)
    }

    /// One polling iteration: locate newly written frames, validate them,
    /// forward the accepted ones. Never blocks the writer.
    pub fn poll_once(&mut self) -> PollStatus {
        let Some(end) = self.claimed_end() else {
            debug!("writer cursors inconsistent, retrying");
            return PollStatus::TornRead;
        };
        if end == self.scan_base {
            return PollStatus::NoNewData;
        }

        // Walk headers from the confirmed end toward the claimed end.
        let mut walked: Vec<(FrameHeader, usize)> = Vec::with_capacity(MAX_WALK);
        let mut raw = [0u8; 28];
        let mut cur = self.scan_base;
        let mut synced = true;
        while cur != end {
            self.region.copy_to(cur, &mut raw[..self.header_len]);
            let Ok(header) = FrameHeader::decode(&raw[..self.header_len]) else {
                synced = false;
                break;
            };
            if header.len as usize > self.region.span() {
                warn!(len = header.len, "implausible frame length, resynchronizing");
                synced = false;
                break;
            }
            walked.push((header, cur));
            cur = self
                .region
                .advance(cur, (self.header_len + header.len as usize) as isize);
            if walked.len() == MAX_WALK && cur != end {
                warn!("sync lost after {MAX_WALK} headers, resynchronizing");
                synced = false;
                break;
            }
        }

        if !synced {
            // Discard the unreadable span and start clean next poll.
            self.scan_base = end;
            self.stats.resyncs.fetch_add(1, Ordering::Relaxed);
            return PollStatus::Resynced;
        }

        // The newest header may still be mid-write: hold it back and
        // accept the rest. A single header is not enough to decide.
        let Some((&(_, tail_pos), accepted)) = walked.split_last() else {
            return PollStatus::Incomplete;
        };
        if accepted.is_empty() {
            return PollStatus::Incomplete;
        }
        self.scan_base = tail_pos;

        for &(header, pos) in accepted {
            self.note_frame_gap(&header);
            if header.is_audio() {
                self.note_audio_gap(header.stream_counter);
                self.forward(header, pos);
            }
        }
        self.stats
            .frames_accepted
            .fetch_add(accepted.len() as u64, Ordering::Relaxed);
        PollStatus::Accepted(accepted.len())
    }

    /// Loss over the 32-bit overall counter. Only observable, never
    /// recoverable: the producer outran us.
    fn note_frame_gap(&mut self, header: &FrameHeader) {
        if let Some(last) = self.last_counter {
            let gap = header.counter.wrapping_sub(last);
            if gap > 1 {
                let lost = gap - 1;
                warn!(lost, counter = header.counter, "frame counter gap");
                self.stats.frames_lost.fetch_add(lost as u64, Ordering::Relaxed);
            }
        }
        self.last_counter = Some(header.counter);
    }

    /// Loss over the 16-bit audio stream counter, modulo 2^16.
    fn note_audio_gap(&mut self, stream_counter: u16) {
        if let Some(last) = self.last_audio_counter {
            let gap = stream_counter.wrapping_sub(last);
            if gap > 1 {
                let lost = gap - 1;
                warn!(lost, stream_counter, "audio frame counter gap");
                self.stats
                    .audio_frames_lost
                    .fetch_add(lost as u64, Ordering::Relaxed);
            }
        }
        self.last_audio_counter = Some(stream_counter);
    }

    fn forward(&mut self, header: FrameHeader, pos: usize) {
        let len = header.len as usize;
        let payload_pos = self.region.advance(pos, self.header_len as isize);

        if !self.stream_info.is_ready() {
            self.try_detect(payload_pos, len);
        }

        if len > self.ring.payload_capacity() {
            warn!(
                len,
                capacity = self.ring.payload_capacity(),
                "frame exceeds output ring capacity, dropped"
            );
            self.stats.oversize_drops.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.scratch.resize(len, 0);
        self.region.copy_to(payload_pos, &mut self.scratch);
        if let Err(err) = self.ring.push(&self.scratch, header.stream_counter) {
            warn!(%err, "output ring rejected frame");
            self.stats.oversize_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One-shot stream-parameter detection on the first audio payload
    /// that carries a syncword.
    fn try_detect(&mut self, payload_pos: usize, len: usize) {
        let mut head = [0u8; 4];
        if len < head.len() {
            return;
        }
        self.region.copy_to(payload_pos, &mut head);
        if let Some(params) = adts::detect_params(&head) {
            if self.stream_info.publish(params) {
                info!(
                    sample_rate = params.sample_rate,
                    channels = params.channels,
                    "detected AAC stream parameters"
                );
            }
        }
    }

    /// Poll until process exit. The only wait is a fixed short sleep per
    /// iteration, scaled to the outcome.
    pub fn run(mut self) {
        debug!("starting capture main loop");
        loop {
            let interval = match self.poll_once() {
                PollStatus::TornRead => TORN_INTERVAL,
                PollStatus::NoNewData | PollStatus::Incomplete | PollStatus::Resynced => {
                    IDLE_INTERVAL
                }
                PollStatus::Accepted(_) => POLL_INTERVAL,
            };
            thread::sleep(interval);
        }
    }

    /// Start the capture loop on its own named thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adts::StreamParams;
    use crate::pipeline::PAYLOAD_CAPACITY;

    const OFFSET: usize = 64;
    const SIZE: usize = 4096;
    const WIDTH: usize = 28;

    /// Stand-in for the firmware writer: appends frames to the region and
    /// maintains the three header cursors the way the camera does.
    struct Firmware {
        base: usize,
        end: usize,
    }

    impl Firmware {
        fn new(base: usize) -> Self {
            Self { base, end: base }
        }

        fn sync_cursors(&self, cap: &mut ShmCapture) {
            let span = cap.region.span();
            let start = (self.base % span) as u32;
            let len = (self.end - self.base) as u32;
            let end = (self.end % span) as u32;
            let buf = cap.region.bytes_mut();
            buf[16..20].copy_from_slice(&start.to_le_bytes());
            buf[4..8].copy_from_slice(&len.to_le_bytes());
            buf[12..16].copy_from_slice(&end.to_le_bytes());
        }

        fn append(&mut self, cap: &mut ShmCapture, header: FrameHeader, payload: &[u8]) {
            assert_eq!(header.len as usize, payload.len());
            let raw = header.encode(WIDTH);
            let offset = cap.region.offset();
            let span = cap.region.span();
            let buf = cap.region.bytes_mut();
            for (i, &b) in raw.iter().chain(payload).enumerate() {
                buf[offset + (self.end + i) % span] = b;
            }
            self.end += raw.len() + payload.len();
            self.sync_cursors(cap);
        }
    }

    fn audio_frame(counter: u32, stream_counter: u16, len: usize) -> (FrameHeader, Vec<u8>) {
        let mut payload = vec![0u8; len];
        if len >= 4 {
            payload[..4].copy_from_slice(&[0xFF, 0xF1, 0x54, 0xC0]);
        }
        let header = FrameHeader {
            len: len as u32,
            counter,
            time: 1000 + counter,
            frame_type: 0x0100,
            stream_counter,
        };
        (header, payload)
    }

    fn new_capture(size: usize, base: usize) -> (ShmCapture, Firmware) {
        let region = InputRegion::anon(size, OFFSET);
        let ring = Arc::new(FrameRingBuffer::new());
        let info = Arc::new(StreamInfo::new());
        let mut cap = ShmCapture::new(
            region,
            Profile { offset: OFFSET, header_len: WIDTH },
            ring,
            info,
        );
        let fw = Firmware::new(base);
        fw.sync_cursors(&mut cap);
        // pick up the firmware's starting position
        cap.scan_base = cap.region.position((base % cap.region.span()) as u32);
        (cap, fw)
    }

    #[test]
    fn empty_buffer_reports_no_new_data() {
        let (mut cap, _fw) = new_capture(SIZE, 0);
        assert_eq!(cap.poll_once(), PollStatus::NoNewData);
    }

    #[test]
    fn newest_header_is_held_back() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for c in 1..=3u32 {
            let (h, p) = audio_frame(c, c as u16, 40);
            fw.append(&mut cap, h, &p);
        }
        assert_eq!(cap.poll_once(), PollStatus::Accepted(2));

        let f1 = cap.ring.pop().unwrap();
        let f2 = cap.ring.pop().unwrap();
        assert_eq!((f1.counter, f2.counter), (1, 2));
        assert!(cap.ring.pop().is_none());

        // the held-back frame is accepted once a successor appears
        let (h, p) = audio_frame(4, 4, 40);
        fw.append(&mut cap, h, &p);
        assert_eq!(cap.poll_once(), PollStatus::Accepted(1));
        assert_eq!(cap.ring.pop().unwrap().counter, 3);
    }

    #[test]
    fn single_header_is_insufficient() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        let (h, p) = audio_frame(1, 1, 32);
        fw.append(&mut cap, h, &p);
        assert_eq!(cap.poll_once(), PollStatus::Incomplete);
        // no progress: the same poll repeats until more data arrives
        assert_eq!(cap.poll_once(), PollStatus::Incomplete);
        assert!(cap.ring.pop().is_none());
    }

    #[test]
    fn counter_gap_is_reported_once() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for (i, c) in [5u32, 6, 7, 9, 10].into_iter().enumerate() {
            let (h, p) = audio_frame(c, i as u16 + 1, 24);
            fw.append(&mut cap, h, &p);
        }
        // tail frame so all five above are accepted
        let (h, p) = audio_frame(11, 6, 24);
        fw.append(&mut cap, h, &p);

        assert_eq!(cap.poll_once(), PollStatus::Accepted(5));
        let stats = cap.stats();
        assert_eq!(stats.frames_lost.load(Ordering::Relaxed), 1);
        assert_eq!(stats.frames_accepted.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn audio_counter_gap_uses_16_bit_arithmetic() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        // wraps 65534 -> 65535 -> 0 -> 1 without loss, then skips two
        for (i, sc) in [65534u16, 65535, 0, 1, 4].into_iter().enumerate() {
            let (h, p) = audio_frame(i as u32 + 1, sc, 24);
            fw.append(&mut cap, h, &p);
        }
        let (h, p) = audio_frame(6, 5, 24);
        fw.append(&mut cap, h, &p);

        assert_eq!(cap.poll_once(), PollStatus::Accepted(5));
        let stats = cap.stats();
        assert_eq!(stats.audio_frames_lost.load(Ordering::Relaxed), 2);
        assert_eq!(stats.frames_lost.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn ten_unterminated_headers_force_resync() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for c in 1..=11u32 {
            let (h, p) = audio_frame(c, c as u16, 8);
            fw.append(&mut cap, h, &p);
        }
        assert_eq!(cap.poll_once(), PollStatus::Resynced);
        assert!(cap.ring.pop().is_none());
        assert_eq!(cap.stats().resyncs.load(Ordering::Relaxed), 1);

        // the unreadable span was discarded: next poll starts clean at
        // the claimed end
        assert_eq!(cap.poll_once(), PollStatus::NoNewData);
        let (h, p) = audio_frame(12, 12, 8);
        fw.append(&mut cap, h, &p);
        assert_eq!(cap.poll_once(), PollStatus::Incomplete);
    }

    #[test]
    fn implausible_length_forces_resync() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        let span = cap.region.span();
        let bad = FrameHeader {
            len: span as u32 + 1,
            counter: 1,
            time: 0,
            frame_type: 0x0100,
            stream_counter: 1,
        };
        // payload bytes are irrelevant, the length check fires first
        let raw = bad.encode(WIDTH);
        let offset = cap.region.offset();
        let buf = cap.region.bytes_mut();
        buf[offset..offset + WIDTH].copy_from_slice(&raw);
        fw.end += WIDTH + 16;
        fw.sync_cursors(&mut cap);

        assert_eq!(cap.poll_once(), PollStatus::Resynced);
        assert_eq!(cap.poll_once(), PollStatus::NoNewData);
    }

    #[test]
    fn torn_cursors_leave_state_untouched() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for c in 1..=3u32 {
            let (h, p) = audio_frame(c, c as u16, 16);
            fw.append(&mut cap, h, &p);
        }
        // corrupt the redundant end cursor mid-write
        let before = cap.scan_base;
        cap.region.bytes_mut()[12..16].copy_from_slice(&9999u32.to_le_bytes());
        assert_eq!(cap.poll_once(), PollStatus::TornRead);
        assert_eq!(cap.scan_base, before);
        assert!(cap.ring.pop().is_none());

        // once the writer settles, the poll proceeds normally
        fw.sync_cursors(&mut cap);
        assert_eq!(cap.poll_once(), PollStatus::Accepted(2));
    }

    #[test]
    fn non_audio_frames_advance_counters_but_are_not_forwarded() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for c in 1..=3u32 {
            let (mut h, p) = audio_frame(c, c as u16, 16);
            h.frame_type = 0x0001; // video
            fw.append(&mut cap, h, &p);
        }
        assert_eq!(cap.poll_once(), PollStatus::Accepted(2));
        assert!(cap.ring.pop().is_none());
        assert_eq!(cap.stats().frames_accepted.load(Ordering::Relaxed), 2);
        assert_eq!(cap.last_counter, Some(2));
    }

    #[test]
    fn first_audio_frame_publishes_stream_parameters() {
        let (mut cap, mut fw) = new_capture(SIZE, 0);
        for c in 1..=2u32 {
            let (h, p) = audio_frame(c, c as u16, 32);
            fw.append(&mut cap, h, &p);
        }
        assert!(!cap.stream_info.is_ready());
        assert_eq!(cap.poll_once(), PollStatus::Accepted(1));
        assert_eq!(
            cap.stream_info.get(),
            Some(StreamParams { sample_rate: 32000, channels: 3 })
        );
    }

    #[test]
    fn oversize_frame_is_dropped_but_the_batch_continues() {
        // region large enough to hold a frame the output ring cannot
        let size = OFFSET + 2 * PAYLOAD_CAPACITY;
        let (mut cap, mut fw) = new_capture(size, 0);

        let (h, p) = audio_frame(1, 1, PAYLOAD_CAPACITY + 1);
        fw.append(&mut cap, h, &p);
        let (h, p) = audio_frame(2, 2, 16);
        fw.append(&mut cap, h, &p);
        let (h, p) = audio_frame(3, 3, 16);
        fw.append(&mut cap, h, &p);

        assert_eq!(cap.poll_once(), PollStatus::Accepted(2));
        assert_eq!(cap.stats().oversize_drops.load(Ordering::Relaxed), 1);
        // only the frame that fit landed
        let f = cap.ring.pop().unwrap();
        assert_eq!(f.counter, 2);
        assert!(cap.ring.pop().is_none());
    }

    #[test]
    fn frames_wrapping_the_ring_boundary_come_out_intact() {
        let span = SIZE - OFFSET;
        let (mut cap, mut fw) = new_capture(SIZE, span - 50);
        for c in 1..=3u32 {
            let (h, mut p) = audio_frame(c, c as u16, 60);
            p[4..].fill(c as u8);
            fw.append(&mut cap, h, &p);
        }
        assert_eq!(cap.poll_once(), PollStatus::Accepted(2));
        for c in 1..=2u16 {
            let f = cap.ring.pop().unwrap();
            assert_eq!(f.counter, c);
            assert_eq!(f.payload.len(), 60);
            assert!(f.payload[4..].iter().all(|&b| b == c as u8));
        }
    }
}
