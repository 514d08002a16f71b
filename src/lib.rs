//! Audio frame capture from a camera's shared-memory frame buffer.
//!
//! The firmware appends AAC frames to a memory-mapped circular buffer with
//! no synchronization beyond a few header cursors. The capture thread walks
//! newly written frame headers, validates them, and copies accepted audio
//! frames into a mutex-guarded output ring that an external streaming
//! engine drains on its own schedule.

pub mod adts;
pub mod capture;
pub mod pipeline;
pub mod sink;
pub mod utils;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::model::Model;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera model, selects payload offset and frame header width
    pub model: Model,
    /// Override for the frame buffer file path (normally derived from the
    /// model's SoC family)
    pub buffer_path: Option<PathBuf>,
}

/// Stream parameters known in advance. When both fields are set the
/// autodetector is skipped and the stream is ready immediately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// Fatal setup errors. Everything the capture loop hits at runtime is
/// handled locally by retrying or resynchronizing and never surfaces here.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not open frame buffer {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("could not map frame buffer {path:?}: {source}")]
    Map { path: PathBuf, source: io::Error },

    #[error("could not probe frame buffer {path:?}: {source}")]
    Probe { path: PathBuf, source: io::Error },

    #[error("frame buffer {0:?} is smaller than the payload offset")]
    RegionTooSmall(PathBuf),

    #[error("unsupported frame header width {0}")]
    HeaderWidth(usize),
}
