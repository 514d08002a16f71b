pub mod ringbuf;

pub use ringbuf::{FrameRingBuffer, OutputFrame, OversizeFrame, FRAME_SLOTS, PAYLOAD_CAPACITY};
