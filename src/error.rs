use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "video")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("cannot open video source `{0}`")]
    SourceUnavailable(String),

    #[error("frame source failed: {0}")]
    Source(String),

    #[error("video contains no frames")]
    EmptyVideo,

    #[error("detector failed on frame {frame}: {reason}")]
    Detector { frame: usize, reason: String },

    #[error("unexpected model output: {0}")]
    ModelOutput(String),

    #[error("frame {got} arrived after frame {last}; frames must be strictly increasing")]
    FrameOrder { last: usize, got: usize },

    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed detection log at line {line}: {reason}")]
    DetectionLog { line: usize, reason: String },
}
