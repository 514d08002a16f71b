use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::capture::model::{Model, SocFamily};
use crate::CaptureError;

// Located frame buffer info
#[derive(Debug, Clone)]
pub struct FoundBuffer {
    pub path: PathBuf,
    pub size: usize,
}

/// Resolve the frame buffer file for a model and probe its usable size.
pub fn locate_buffer(model: Model, override_path: Option<&Path>) -> Result<FoundBuffer, CaptureError> {
    let path: PathBuf = match override_path {
        Some(p) => p.into(),
        None => model.family().buffer_file().into(),
    };

    let meta = fs::metadata(&path)
        .map_err(|source| CaptureError::Probe { path: path.clone(), source })?;
    let mut size = meta.len() as usize;

    // MStar firmware keeps two trailing bytes outside the ring
    if model.family() == SocFamily::MStar {
        size = size.saturating_sub(2);
    }

    info!(path = %path.display(), size, model = %model, "located frame buffer");
    Ok(FoundBuffer { path, size })
}
