use std::collections::BTreeMap;
use std::path::Path;

use crate::detection::Detection;
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::Frame;

/// Sequential supplier of decoded frames.
pub trait FrameSource {
    /// `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;

    /// Total frames, when the container reports it. Used for progress only.
    fn frame_count_hint(&self) -> Option<usize> {
        None
    }
}

/// Pre-computed detections, one line per frame:
///
/// ```text
/// 0: [{"x": 10.0, "y": 12.5, "w": 6.0, "h": 6.0, "p": 0.91}]
/// 1: []
/// ```
///
/// Blank lines and lines starting with `#` are skipped. Frame indexes must be
/// unique; a missing index is a dropped frame.
#[derive(Debug, Clone, Default)]
pub struct DetectionLog {
    frames: BTreeMap<usize, Vec<Detection>>,
}

impl DetectionLog {
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut frames = BTreeMap::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = |reason: String| Error::DetectionLog {
                line: lineno + 1,
                reason,
            };

            let (idx, vector) = line
                .split_once(':')
                .ok_or_else(|| malformed("expected `<frame>: <detections>`".into()))?;

            let idx: usize = idx
                .trim()
                .parse()
                .map_err(|e| malformed(format!("bad frame index: {}", e)))?;

            let dets: Vec<Detection> = serde_json::from_str(vector.trim())
                .map_err(|e| malformed(format!("bad detections: {}", e)))?;

            if frames.insert(idx, dets).is_some() {
                return Err(malformed(format!("duplicate frame {}", idx)));
            }
        }

        Ok(Self { frames })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", path.display(), e)))?;

        Self::parse(&text)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn insert(&mut self, frame: usize, detections: Vec<Detection>) {
        self.frames.insert(frame, detections);
    }

    /// Frames without pixels, one per logged frame index.
    pub fn frame_source(&self, frame_rate: f64) -> LogFrames {
        LogFrames {
            indexes: self.frames.keys().copied().collect::<Vec<_>>().into_iter(),
            total: self.frames.len(),
            frame_rate,
        }
    }
}

impl Detector for DetectionLog {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

pub struct LogFrames {
    indexes: std::vec::IntoIter<usize>,
    total: usize,
    frame_rate: f64,
}

impl FrameSource for LogFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        Ok(self
            .indexes
            .next()
            .map(|idx| Frame::empty(idx, self.frame_rate)))
    }

    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

#[cfg(feature = "video")]
pub use video::VideoSource;

#[cfg(feature = "video")]
mod video {
    use super::FrameSource;
    use crate::error::Error;
    use crate::frame::Frame;

    use ndarray::Array3;
    use opencv::{core::Mat, prelude::*, videoio};
    use std::path::Path;
    use std::time::Duration;

    /// OpenCV backed video decoder.
    pub struct VideoSource {
        cap: videoio::VideoCapture,
        index: usize,
        fps: f64,
        total: Option<usize>,
    }

    impl VideoSource {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
            let path = path.as_ref();
            let name = path
                .to_str()
                .ok_or_else(|| Error::SourceUnavailable(path.display().to_string()))?;

            let cap = videoio::VideoCapture::from_file(name, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                return Err(Error::SourceUnavailable(name.to_string()));
            }

            let fps = cap.get(videoio::CAP_PROP_FPS)?;
            let total = cap.get(videoio::CAP_PROP_FRAME_COUNT)?;

            Ok(Self {
                cap,
                index: 0,
                fps,
                total: (total > 0.0).then_some(total as usize),
            })
        }

        /// Frame rate reported by the container, if any.
        pub fn frame_rate(&self) -> Option<f64> {
            (self.fps > 0.0).then_some(self.fps)
        }
    }

    impl FrameSource for VideoSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
            let mut mat = Mat::default();
            if !self.cap.read(&mut mat)? || mat.empty() {
                return Ok(None);
            }

            let mat = if mat.is_continuous() { mat } else { mat.try_clone()? };
            let (rows, cols, channels) = (mat.rows() as usize, mat.cols() as usize, mat.channels() as usize);
            let pixels = Array3::from_shape_vec((rows, cols, channels), mat.data_bytes()?.to_vec())
                .map_err(|e| Error::Source(e.to_string()))?;

            let timestamp = if self.fps > 0.0 {
                Duration::from_secs_f64(self.index as f64 / self.fps)
            } else {
                Duration::ZERO
            };

            let frame = Frame::new(self.index, timestamp, pixels);
            self.index += 1;

            Ok(Some(frame))
        }

        fn frame_count_hint(&self) -> Option<usize> {
            self.total
        }
    }
}
