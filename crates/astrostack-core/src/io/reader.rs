use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::Result;
use crate::frame::{FrameData, FrameReader, InputFrame};

use super::image_io::load_image;
use super::ser::SerReader;

/// Whether `path` names a SER video.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ser"))
}

/// Reads stills through `image` and video frames through memory-mapped SER
/// readers, keeping each video open after its first frame is read.
#[derive(Default)]
pub struct FileFrameReader {
    videos: Mutex<HashMap<PathBuf, Arc<SerReader>>>,
}

impl FileFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn video(&self, path: &Path) -> Result<Arc<SerReader>> {
        let mut videos = self.videos.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reader) = videos.get(path) {
            return Ok(Arc::clone(reader));
        }
        debug!(path = %path.display(), "Opening video");
        let reader = Arc::new(SerReader::open(path)?);
        videos.insert(path.to_path_buf(), Arc::clone(&reader));
        Ok(reader)
    }
}

impl FrameReader for FileFrameReader {
    fn read_frame(&self, frame: &InputFrame) -> Result<FrameData> {
        if frame.is_video_frame() || is_video_file(frame.path()) {
            let index = frame.frame_number.max(0) as usize;
            self.video(frame.path())?.read_frame(index)
        } else {
            load_image(frame.path())
        }
    }
}

/// Expand input paths into frames: one per still image, one per frame of
/// each SER video.
pub fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<InputFrame>> {
    let mut frames = Vec::new();
    for path in paths {
        if is_video_file(path) {
            let count = SerReader::open(path)?.frame_count();
            frames.extend((0..count).map(|i| InputFrame::video(path.clone(), i as i32)));
        } else {
            frames.push(InputFrame::still(path.clone()));
        }
    }
    Ok(frames)
}
