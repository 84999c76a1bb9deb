//! Frame sources: anything that can hand out decoded BGR frames in
//! order. The ffmpeg-backed reader implements this for files; tests and
//! the stream ingestor use the in-memory variant.

use argus_model::{Frame, VideoMetadata};

use crate::error::Result;

/// Container-level facts a source knows before decoding.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub duration: f64,
    pub codec: String,
}

impl SourceInfo {
    pub fn to_metadata(&self, path: &str) -> VideoMetadata {
        VideoMetadata {
            path: path.to_string(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            frame_count: self.frame_count,
            duration: self.duration,
            codec: self.codec.clone(),
        }
    }
}

/// Pull-based sequence of decoded frames.
pub trait FrameSource {
    fn info(&self) -> &SourceInfo;

    /// The next decoded frame with its index, or `None` at end of
    /// stream.
    fn next_frame(&mut self) -> Result<Option<(u64, Frame)>>;

    /// Restart from the first frame. Used when a sampling strategy needs
    /// a second pass.
    fn rewind(&mut self) -> Result<()>;
}

/// A frame source over an in-memory frame list.
pub struct MemorySource {
    info: SourceInfo,
    frames: Vec<Frame>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        let frame_count = frames.len() as u64;
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        MemorySource {
            info: SourceInfo {
                width,
                height,
                fps,
                frame_count,
                duration,
                codec: "raw".to_string(),
            },
            frames,
            cursor: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<(u64, Frame)>> {
        if self.cursor >= self.frames.len() {
            return Ok(None);
        }
        let index = self.cursor as u64;
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((index, frame)))
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
