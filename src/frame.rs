use ndarray::Array3;
use std::time::Duration;

/// One decoded video frame. Pixels are laid out as (height, width, channels).
pub struct Frame {
    pub index: usize,
    pub timestamp: Duration,
    pub dims: (u32, u32),
    pub pixels: Array3<u8>,
}

impl Frame {
    pub fn new(index: usize, timestamp: Duration, pixels: Array3<u8>) -> Self {
        let shape = pixels.shape();
        let dims = (shape[1] as u32, shape[0] as u32);

        Self {
            index,
            timestamp,
            dims,
            pixels,
        }
    }

    /// A frame without raster data, used when detections come from elsewhere.
    pub fn empty(index: usize, frame_rate: f64) -> Self {
        let timestamp = if frame_rate > 0.0 {
            Duration::from_secs_f64(index as f64 / frame_rate)
        } else {
            Duration::ZERO
        };

        Self {
            index,
            timestamp,
            dims: (0, 0),
            pixels: Array3::zeros((0, 0, 0)),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims.0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims.1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}
