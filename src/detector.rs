use crate::detection::{ClassLabel, Detection};
use crate::error::Error;
use crate::frame::Frame;

use ndarray::prelude::*;

/// Per-frame object detection capability.
///
/// Implementations must be shareable across threads: the pipeline runs
/// detection for a batch of frames in parallel.
pub trait Detector: Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error>;
}

impl<F> Detector for F
where
    F: Fn(&Frame) -> Result<Vec<Detection>, Error> + Sync,
{
    #[inline]
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        self(frame)
    }
}

/// Inference engine behind a [`YoloDetector`].
///
/// Owns preprocessing (resize, crop, normalization) and the model session;
/// returns the raw `[batch, predictions, 4 + classes]` output for a frame.
pub trait InferenceBackend: Sync {
    /// Model input `(width, height)` in pixels.
    fn input_size(&self) -> (usize, usize);

    fn infer(&self, frame: &Frame) -> Result<Array3<f32>, Error>;
}

/// Detector over a YOLO-style model: backend inference followed by
/// [`OutputDecoder`] post-processing.
pub struct YoloDetector<B> {
    backend: B,
    decoder: OutputDecoder,
    with_crop: bool,
}

impl<B: InferenceBackend> YoloDetector<B> {
    /// `with_crop` tells the decoder the backend fed a centered crop of the
    /// frame instead of the whole, stretched frame.
    pub fn new(backend: B, config: OutputDecoderConfig, with_crop: bool) -> Self {
        Self {
            backend,
            decoder: OutputDecoder::new(config),
            with_crop,
        }
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        let output = self.backend.infer(frame)?;
        let (in_w, in_h) = self.backend.input_size();

        let mut batches = self.decoder.decode(
            output.view(),
            in_w,
            in_h,
            frame.width(),
            frame.height(),
            self.with_crop,
        )?;

        match batches.len() {
            1 => Ok(batches.pop().unwrap_or_default()),
            n => Err(Error::ModelOutput(format!(
                "expected a single batch per frame, got {}",
                n
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputDecoderConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Raw model class indexes to keep.
    pub classes: Vec<usize>,
    /// Boxes covering more than this fraction of the frame are dropped.
    pub max_box_fraction: f32,
}

impl OutputDecoderConfig {
    pub fn new(confidence_threshold: f32, classes: Vec<usize>) -> Self {
        Self {
            confidence_threshold,
            iou_threshold: 0.45,
            classes,
            max_box_fraction: 0.25,
        }
    }
}

/// Decodes YOLO-style model output into detections.
///
/// Expects `[batch, predictions, 4 + classes]` with normalized
/// `(center_x, center_y, width, height)` followed by class scores.
pub struct OutputDecoder {
    config: OutputDecoderConfig,
}

impl OutputDecoder {
    pub fn new(config: OutputDecoderConfig) -> Self {
        Self { config }
    }

    /// `in_w`/`in_h` are the model input dimensions; with `with_crop` the
    /// input is assumed to be a centered crop of the frame with the model's
    /// aspect ratio.
    pub fn decode(
        &self,
        view: ArrayView3<'_, f32>,
        in_w: usize,
        in_h: usize,
        frame_width: u32,
        frame_height: u32,
        with_crop: bool,
    ) -> Result<Vec<Vec<Detection>>, Error> {
        let shape = view.shape();
        let (nbatches, npreds, pred_size) = (shape[0], shape[1], shape[2]);

        if pred_size < 5 {
            return Err(Error::ModelOutput(format!(
                "prediction rows have {} values, expected at least 5",
                pred_size
            )));
        }
        if in_w == 0 || in_h == 0 {
            return Err(Error::ModelOutput("model input has a zero dimension".into()));
        }

        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let (ox, oy, ow, oh) = if with_crop {
            let in_a = in_h as f32 / in_w as f32;
            let frame_a = fh / fw;

            if in_a > frame_a {
                let w = fh / in_a;
                ((fw - w) / 2.0, 0.0, w, fh)
            } else {
                let h = fw * in_a;
                (0.0, (fh - h) / 2.0, fw, h)
            }
        } else {
            (0.0, 0.0, fw, fh)
        };

        let max_area = fw * fh * self.config.max_box_fraction;
        let mut results = Vec::with_capacity(nbatches);

        for batch in 0..nbatches {
            // grouped by class index for per-class suppression
            let mut bboxes: Vec<Vec<Detection>> = (0..pred_size - 4).map(|_| vec![]).collect();

            for index in 0..npreds {
                let row = view.slice(s![batch, index, ..]);

                let x = ox + row[0] * ow;
                let y = oy + row[1] * oh;
                let w = row[2] * ow;
                let h = row[3] * oh;

                let mut class_index = None;
                let mut confidence = 0.0;

                for (idx, val) in row.iter().skip(4).copied().enumerate() {
                    if val > confidence {
                        class_index = Some(idx);
                        confidence = val;
                    }
                }

                let Some(class_index) = class_index else {
                    continue;
                };

                if confidence <= self.config.confidence_threshold
                    || !self.config.classes.contains(&class_index)
                    || w * h > max_area
                {
                    continue;
                }

                let Some(class) = ClassLabel::from_index(class_index) else {
                    continue;
                };

                bboxes[class_index].push(Detection {
                    x,
                    y,
                    w,
                    h,
                    confidence,
                    class,
                });
            }

            let mut kept = Vec::new();
            for dets in bboxes.iter_mut().filter(|d| !d.is_empty()) {
                kept.extend(self.non_maximum_suppression(dets));
            }

            results.push(kept);
        }

        Ok(results)
    }

    fn non_maximum_suppression(&self, dets: &mut [Detection]) -> Vec<Detection> {
        dets.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut suppressed = vec![false; dets.len()];
        let mut kept = Vec::new();

        for idx in 0..dets.len() {
            if suppressed[idx] {
                continue;
            }

            kept.push(dets[idx]);

            for other in idx + 1..dets.len() {
                if !suppressed[other] && dets[idx].iou(&dets[other]) > self.config.iou_threshold {
                    suppressed[other] = true;
                }
            }
        }

        kept
    }
}
