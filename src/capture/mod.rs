pub mod frame;
pub mod model;
pub mod region;
pub mod shm;

pub use frame::FrameHeader;
pub use model::{Model, Profile};
pub use region::InputRegion;
pub use shm::{CaptureStats, PollStatus, ShmCapture};
