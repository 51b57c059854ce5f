use std::sync::mpsc;
use std::time::Duration;

use casa::detector::OutputDecoderConfig;
use ndarray::Array3;

use casa::{
    run_analysis, AnalysisConfig, AnalysisOutcome, CalibrationSettings, CancellationToken,
    ChannelProgress, Detection, DetectionLog, Error, Frame, FrameSource, Interpretation,
    InferenceBackend, NoProgress, Progress, Report, YoloDetector,
};

/// Emits `total` pixel-less frames, optionally in a scrambled order.
struct SyntheticSource {
    order: Vec<usize>,
    next: usize,
    fps: f64,
}

impl SyntheticSource {
    fn new(total: usize, fps: f64) -> Self {
        Self {
            order: (0..total).collect(),
            next: 0,
            fps,
        }
    }

    fn with_order(order: Vec<usize>, fps: f64) -> Self {
        Self { order, next: 0, fps }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let frame = self.order.get(self.next).map(|&idx| Frame::empty(idx, self.fps));
        self.next += 1;

        Ok(frame)
    }

    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.order.len())
    }
}

fn det(x: f32, y: f32) -> Detection {
    Detection::new(x, y, 4.0, 4.0, 0.9)
}

fn straight_swimmer(frame: &Frame) -> Result<Vec<Detection>, Error> {
    Ok(vec![det(20.0 + 2.0 * frame.index as f32, 100.0)])
}

fn calibration() -> CalibrationSettings {
    CalibrationSettings::new(0.5, 25.0)
}

fn completed(outcome: AnalysisOutcome) -> Report {
    match outcome {
        AnalysisOutcome::Completed(report) => report,
        AnalysisOutcome::Cancelled => panic!("run was cancelled"),
    }
}

fn close(a: Option<f64>, b: f64) -> bool {
    a.map(|a| (a - b).abs() < 1e-9).unwrap_or(false)
}

#[test]
fn straight_track_at_25_fps() {
    let mut config = AnalysisConfig::default();
    config.motility.progressive_vsl_um_s = 20.0;

    let outcome = run_analysis(
        SyntheticSource::new(100, 25.0),
        straight_swimmer,
        calibration(),
        config.clone(),
        NoProgress,
        &CancellationToken::new(),
    )
    .unwrap();
    let report = completed(outcome);

    assert_eq!(report.frames_processed, 100);
    assert_eq!(report.metrics.total_count, 1);
    assert_eq!(report.metrics.tracked_count, 1);

    let k = &report.tracks[0].kinematics;
    // 99 steps of 1 µm over (99 - 0) / 25 s
    assert!(close(k.elapsed_s, 3.96));
    assert!(close(k.vcl, 25.0));
    assert!(close(k.vsl, 25.0));
    assert!(close(k.vap, 25.0));
    assert!(close(k.lin, 1.0));
    assert!(close(k.str, 1.0));
    assert!(close(k.wob, 1.0));

    // a single cell in the default field is far below the count limit
    assert_eq!(report.metrics.progressive_motility, 100.0);
    assert_eq!(report.interpretation, Interpretation::Oligospermia);

    // a small enough sample volume brings the count into range
    config.motility.sample_volume_ul = 5.0e-5;
    let report = completed(
        run_analysis(
            SyntheticSource::new(100, 25.0),
            straight_swimmer,
            calibration(),
            config,
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );
    assert!(report.metrics.concentration.unwrap() >= 15.0);
    assert_eq!(report.interpretation, Interpretation::Normal);
}

#[test]
fn no_detections_yield_azoospermia() {
    let report = completed(
        run_analysis(
            SyntheticSource::new(60, 25.0),
            |_: &Frame| Ok::<_, Error>(Vec::new()),
            calibration(),
            AnalysisConfig::default(),
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    assert_eq!(report.metrics.total_count, 0);
    assert_eq!(report.metrics.progressive_motility, 0.0);
    assert_eq!(report.metrics.non_progressive_motility, 0.0);
    assert_eq!(report.metrics.immotile_percent, 0.0);
    assert_eq!(report.metrics.total_motility, 0.0);
    assert_eq!(report.interpretation, Interpretation::Azoospermia);
    assert!(report.insufficient_data);
    assert!(report.notes.contains("No cells"));
}

#[test]
fn empty_video_is_an_input_error() {
    let result = run_analysis(
        SyntheticSource::new(0, 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        NoProgress,
        &CancellationToken::new(),
    );

    assert!(matches!(result, Err(Error::EmptyVideo)));
}

#[test]
fn invalid_calibration_is_rejected_before_start() {
    let result = run_analysis(
        SyntheticSource::new(10, 25.0),
        straight_swimmer,
        CalibrationSettings::new(0.5, 0.0),
        AnalysisConfig::default(),
        NoProgress,
        &CancellationToken::new(),
    );

    assert!(matches!(result, Err(Error::InvalidCalibration(_))));
}

#[test]
fn cancellation_at_frame_10() {
    let cancel = CancellationToken::new();
    let mut calls = 0;

    let outcome = run_analysis(
        SyntheticSource::new(100, 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        |p: Progress| {
            calls += 1;
            if p.frames_processed == 10 {
                cancel.cancel();
            }
        },
        &cancel,
    )
    .unwrap();

    assert_eq!(outcome, AnalysisOutcome::Cancelled);
    assert!(outcome.report().is_none());
    assert_eq!(calls, 10);
}

#[test]
fn cancellation_on_the_last_frame() {
    let cancel = CancellationToken::new();

    let outcome = run_analysis(
        SyntheticSource::new(20, 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        |p: Progress| {
            if p.frames_processed == 20 {
                cancel.cancel();
            }
        },
        &cancel,
    )
    .unwrap();

    assert_eq!(outcome, AnalysisOutcome::Cancelled);
}

#[test]
fn cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_analysis(
        SyntheticSource::new(100, 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        NoProgress,
        &cancel,
    )
    .unwrap();

    assert!(outcome.is_cancelled());
}

#[test]
fn detector_failure_fails_the_run() {
    let result = run_analysis(
        SyntheticSource::new(40, 25.0),
        |frame: &Frame| {
            if frame.index == 21 {
                Err(Error::Source("inference backend unavailable".into()))
            } else {
                straight_swimmer(frame)
            }
        },
        calibration(),
        AnalysisConfig::default(),
        NoProgress,
        &CancellationToken::new(),
    );

    match result {
        Err(Error::Detector { frame, reason }) => {
            assert_eq!(frame, 21);
            assert!(reason.contains("inference backend unavailable"));
        }
        other => panic!("unexpected {:?}", other.map(|o| o.is_cancelled())),
    }
}

#[test]
fn out_of_order_frames_are_rejected() {
    let result = run_analysis(
        SyntheticSource::with_order(vec![0, 1, 2, 5, 4], 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        NoProgress,
        &CancellationToken::new(),
    );

    assert!(matches!(result, Err(Error::FrameOrder { last: 5, got: 4 })));
}

#[test]
fn occlusion_keeps_identity_through_pipeline() {
    // object hidden for frames 30..34, max_misses - 1 with the defaults
    let report = completed(
        run_analysis(
            SyntheticSource::new(80, 25.0),
            |frame: &Frame| {
                if (30..34).contains(&frame.index) {
                    Ok(Vec::new())
                } else {
                    straight_swimmer(frame)
                }
            },
            calibration(),
            AnalysisConfig::default(),
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    assert_eq!(report.metrics.total_count, 1);
    assert_eq!(report.tracks[0].start_frame, 0);
    assert_eq!(report.tracks[0].end_frame, 79);
    assert_eq!(report.tracks[0].points, 76);
}

/// Progressive, non-progressive and immotile cells in one field.
fn mixed_population(frame: &Frame) -> Result<Vec<Detection>, Error> {
    let f = frame.index as f32;
    let wiggle = (f * std::f32::consts::TAU / 6.0).sin() * 3.0;

    Ok(vec![
        det(20.0 + 3.0 * f, 40.0),
        det(40.0 + 0.3 * f, 120.0 + wiggle),
        det(300.0, 200.0),
    ])
}

#[test]
fn mixed_population_percentages() {
    let report = completed(
        run_analysis(
            SyntheticSource::new(100, 25.0),
            mixed_population,
            calibration(),
            AnalysisConfig::default(),
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    let m = &report.metrics;
    assert_eq!(m.total_count, 3);
    assert_eq!(m.tracked_count, 3);

    let third = 100.0 / 3.0;
    assert!((m.progressive_motility - third).abs() < 1e-9);
    assert!((m.non_progressive_motility - third).abs() < 1e-9);
    assert!((m.immotile_percent - third).abs() < 1e-9);
    assert!((m.total_motility - 2.0 * third).abs() < 1e-9);

    // one progressive cell in three clears the motility limit
    assert_eq!(report.interpretation, Interpretation::Oligospermia);
}

#[test]
fn repeated_runs_are_identical() {
    let run = || {
        completed(
            run_analysis(
                SyntheticSource::new(120, 30.0),
                mixed_population,
                CalibrationSettings::new(0.4, 30.0),
                AnalysisConfig::default(),
                NoProgress,
                &CancellationToken::new(),
            )
            .unwrap(),
        )
    };

    let (a, b) = (run(), run());
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn progress_reaches_completion() {
    let (tx, rx) = mpsc::channel();

    let outcome = run_analysis(
        SyntheticSource::new(30, 25.0),
        straight_swimmer,
        calibration(),
        AnalysisConfig::default(),
        ChannelProgress(tx),
        &CancellationToken::new(),
    )
    .unwrap();
    assert!(outcome.report().is_some());

    let updates: Vec<Progress> = rx.iter().collect();
    assert_eq!(updates.len(), 30);
    assert!(updates.windows(2).all(|w| w[0].frames_processed < w[1].frames_processed));
    assert_eq!(updates.last().unwrap().percent, Some(100.0));
}

#[test]
fn replayed_detection_log() {
    let mut text = String::new();
    for f in 0..50 {
        let line = serde_json::to_string(&vec![det(10.0 + 3.0 * f as f32, 50.0)]).unwrap();
        text.push_str(&format!("{}: {}\n", f, line));
    }

    let log = DetectionLog::parse(&text).unwrap();
    let report = completed(
        run_analysis(
            log.frame_source(25.0),
            log,
            calibration(),
            AnalysisConfig::default(),
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    assert_eq!(report.frames_processed, 50);
    assert_eq!(report.metrics.total_count, 1);
    assert!(close(report.tracks[0].kinematics.vsl, 37.5));
}

#[test]
fn frame_summary_is_bounded() {
    let mut config = AnalysisConfig::default();
    config.report.max_frame_buckets = 16;

    let report = completed(
        run_analysis(
            SyntheticSource::new(500, 25.0),
            straight_swimmer,
            calibration(),
            config,
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    assert!(report.frame_summary.len() <= 16);
    assert_eq!(report.frame_summary.iter().map(|b| b.frames).sum::<usize>(), 500);
}

/// 160x120 single-channel frames with real rasters.
struct RasterSource {
    next: usize,
    total: usize,
}

impl FrameSource for RasterSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.next == self.total {
            return Ok(None);
        }

        let idx = self.next;
        self.next += 1;
        let timestamp = Duration::from_secs_f64(idx as f64 / 25.0);

        Ok(Some(Frame::new(idx, timestamp, Array3::zeros((120, 160, 1)))))
    }
}

/// Model output for one cell crossing the field at 2 px per frame.
struct SwimmerModel;

impl InferenceBackend for SwimmerModel {
    fn input_size(&self) -> (usize, usize) {
        (160, 120)
    }

    fn infer(&self, frame: &Frame) -> Result<Array3<f32>, Error> {
        let cx = (20.0 + 2.0 * frame.index as f32) / 160.0;
        let row = vec![cx, 0.5, 0.03, 0.04, 0.85, 0.05, 0.02];

        Array3::from_shape_vec((1, 1, 7), row).map_err(|e| Error::ModelOutput(e.to_string()))
    }
}

#[test]
fn model_backed_detector_drives_the_pipeline() {
    let detector = YoloDetector::new(SwimmerModel, OutputDecoderConfig::new(0.3, vec![0]), false);

    let report = completed(
        run_analysis(
            RasterSource { next: 0, total: 50 },
            detector,
            calibration(),
            AnalysisConfig::default(),
            NoProgress,
            &CancellationToken::new(),
        )
        .unwrap(),
    );

    assert_eq!(report.frames_processed, 50);
    assert_eq!(report.metrics.total_count, 1);
    assert_eq!(report.tracks[0].points, 50);
    // 2 px/frame at 0.5 µm/px and 25 fps
    let vsl = report.tracks[0].kinematics.vsl.unwrap();
    assert!((vsl - 25.0).abs() < 1e-3);
}
