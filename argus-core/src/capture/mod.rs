//! FFmpeg-backed frame acquisition: file readers and live-stream
//! capture, both decoding to interleaved BGR24.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use tracing::{debug, info};

use argus_model::{Frame, StreamKind};

use crate::error::{EngineError, Result};
use crate::pipeline::source::{FrameSource, SourceInfo};

static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the FFmpeg libraries once per process.
pub fn ensure_ffmpeg() -> Result<()> {
    let outcome = FFMPEG_INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| e.to_string()).inspect(|_| {
            info!("FFmpeg initialized");
        })
    });
    outcome
        .clone()
        .map_err(|message| EngineError::Stream(format!("ffmpeg init failed: {message}")))
}

/// Demux + decode + scale state shared by file and stream inputs.
struct Decoder {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    decoded: ffmpeg::util::frame::video::Video,
    scaled: ffmpeg::util::frame::video::Video,
    eof_sent: bool,
}

impl Decoder {
    fn from_input(input: ffmpeg::format::context::Input) -> Result<Self> {
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| EngineError::InvalidInput("no video stream found".to_string()))?;
        let stream_index = stream.index();

        let codec_ctx =
            ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(EngineError::InvalidInput(
                "video stream reports zero dimensions".to_string(),
            ));
        }

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )?;

        Ok(Decoder {
            input,
            stream_index,
            decoder,
            scaler,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            scaled: ffmpeg::util::frame::video::Video::empty(),
            eof_sent: false,
        })
    }

    fn source_info(&self) -> SourceInfo {
        let stream = self
            .input
            .stream(self.stream_index)
            .expect("stream index from open");
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let duration = if self.input.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            self.input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };
        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            (duration * fps).round().max(0.0) as u64
        };
        let codec = self
            .decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_default();

        SourceInfo {
            width: self.decoder.width(),
            height: self.decoder.height(),
            fps,
            frame_count,
            duration,
            codec,
        }
    }

    /// Decode the next frame as an owned BGR buffer.
    fn next_bgr(&mut self) -> Result<Option<Frame>> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return Ok(Some(self.convert()?));
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        debug!("send_packet failed: {e}");
                    }
                }
                None => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn convert(&mut self) -> Result<Frame> {
        self.scaler.run(&self.decoded, &mut self.scaled)?;
        let width = self.scaled.width();
        let height = self.scaled.height();
        let stride = self.scaled.stride(0);
        let row_bytes = width as usize * 3;
        let data = self.scaled.data(0);

        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            buffer.extend_from_slice(&data[start..start + row_bytes]);
        }
        Frame::from_bgr(width, height, buffer).map_err(Into::into)
    }
}

/// File-backed frame source.
pub struct VideoReader {
    path: PathBuf,
    info: SourceInfo,
    decoder: Decoder,
    next_index: u64,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_ffmpeg()?;
        if !path.exists() {
            return Err(EngineError::NotFound(format!(
                "video file not found: {}",
                path.display()
            )));
        }
        let input = ffmpeg::format::input(&path)?;
        let decoder = Decoder::from_input(input)?;
        let info = decoder.source_info();
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "opened video"
        );
        Ok(VideoReader {
            path: path.to_path_buf(),
            info,
            decoder,
            next_index: 0,
        })
    }
}

impl FrameSource for VideoReader {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<(u64, Frame)>> {
        match self.decoder.next_bgr()? {
            Some(frame) => {
                let index = self.next_index;
                self.next_index += 1;
                Ok(Some((index, frame)))
            }
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        let reopened = VideoReader::open(&self.path)?;
        *self = reopened;
        Ok(())
    }
}

/// Live-stream capture. RTSP connects over TCP unless the caller already
/// pinned a transport, and demuxer buffering is kept minimal to bound
/// latency.
pub struct StreamCapture {
    decoder: Decoder,
    info: SourceInfo,
    next_index: u64,
}

impl StreamCapture {
    pub fn open(url: &str, kind: StreamKind) -> Result<Self> {
        ensure_ffmpeg()?;
        let mut options = ffmpeg::Dictionary::new();
        options.set("fflags", "nobuffer");
        if kind == StreamKind::Rtsp && !url.contains("rtsp_transport") {
            options.set("rtsp_transport", "tcp");
        }

        let input = ffmpeg::format::input_with_dictionary(&url, options)
            .map_err(|e| EngineError::Stream(format!("failed to open {url}: {e}")))?;
        let decoder = Decoder::from_input(input)?;
        let info = decoder.source_info();
        debug!(url, width = info.width, height = info.height, "stream connected");
        Ok(StreamCapture {
            decoder,
            info,
            next_index: 0,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Blocking read of the next frame. `Err` means the connection is
    /// gone; `Ok(None)` means the stream signalled end-of-stream.
    pub fn read_frame(&mut self) -> Result<Option<(u64, Frame)>> {
        match self.decoder.next_bgr()? {
            Some(frame) => {
                let index = self.next_index;
                self.next_index += 1;
                Ok(Some((index, frame)))
            }
            None => Ok(None),
        }
    }
}
