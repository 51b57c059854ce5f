use crate::config::{AssociationMetric, CalibrationSettings, TrackerConfig};
use crate::error::Error;
use crate::track::{Track, TrackState};
use crate::Detection;

use munkres::{solve_assignment, WeightMatrix};
use nalgebra as na;
use tracing::{debug, warn};

/// Cost of padding cells in the square assignment matrix.
const PADDING_COST: f64 = 1.0e9;
/// Cost of pairs rejected by the gate; always above any threshold.
const GATED_COST: f64 = 1.0e6;

/// Multi-object tracker over per-frame detection sets.
///
/// Tracks live in an arena indexed by their id; `active` holds the arena
/// indexes of every track that is not terminated, in ascending order.
pub struct Tracker {
    config: TrackerConfig,
    microns_per_pixel: f64,
    tracks: Vec<Track>,
    active: Vec<usize>,
    last_frame: Option<usize>,
    confirmed_count: usize,
}

impl Tracker {
    pub fn new(config: TrackerConfig, calibration: &CalibrationSettings) -> Self {
        Self {
            config,
            microns_per_pixel: calibration.microns_per_pixel,
            tracks: Vec::with_capacity(64),
            active: Vec::with_capacity(64),
            last_frame: None,
            confirmed_count: 0,
        }
    }

    pub fn update(&mut self, frame: usize, detections: &[Detection]) -> Result<(), Error> {
        if let Some(last) = self.last_frame {
            if frame <= last {
                return Err(Error::FrameOrder { last, got: frame });
            }
        }
        self.last_frame = Some(frame);

        let dets: Vec<usize> = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.confidence >= self.config.min_confidence
                    && self.config.tracked_classes.contains(&d.class)
            })
            .map(|(idx, _)| idx)
            .collect();

        if dets.is_empty() && self.active.is_empty() {
            return Ok(());
        }

        // tracks that ran out of misses over dropped frames
        let max_misses = self.config.max_misses as usize;
        for &idx in &self.active {
            let t = &mut self.tracks[idx];
            if frame - t.end_frame() - 1 >= max_misses {
                t.misses = (frame - t.end_frame() - 1) as u32;
                t.state = TrackState::Terminated;
                debug!(track = t.id, frame, "track terminated after frame gap");
            }
        }
        self.active.retain(|&idx| self.tracks[idx].is_active());

        let (established, tentative): (Vec<usize>, Vec<usize>) = self
            .active
            .iter()
            .partition(|&&idx| self.tracks[idx].state != TrackState::Tentative);

        let (mut matched, dets_missed) = self.assignment(frame, detections, &established, &dets);
        let (tentative_matched, dets_missed) =
            self.assignment(frame, detections, &tentative, &dets_missed);
        matched.extend(tentative_matched);

        for &(ti, di) in &matched {
            self.hit(ti, frame, &detections[di]);
        }

        for &idx in &self.active {
            if matched.iter().any(|&(ti, _)| ti == idx) {
                continue;
            }

            let t = &mut self.tracks[idx];
            t.misses = (frame - t.end_frame()) as u32;
            t.hits = 0;

            t.state = match t.state {
                TrackState::Tentative => TrackState::Terminated,
                _ if t.misses >= self.config.max_misses => {
                    debug!(track = t.id, frame, points = t.len(), "track terminated");
                    TrackState::Terminated
                }
                _ => TrackState::Lost,
            };
        }
        self.active.retain(|&idx| self.tracks[idx].is_active());

        for di in dets_missed {
            self.spawn(frame, &detections[di]);
        }

        Ok(())
    }

    /// Ends the stream: every remaining track is terminated.
    pub fn finish(&mut self) {
        for &idx in &self.active {
            self.tracks[idx].state = TrackState::Terminated;
        }
        self.active.clear();
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&Track> {
        self.tracks.get(id as usize)
    }

    pub fn active(&self) -> impl Iterator<Item = &Track> {
        self.active.iter().map(move |&idx| &self.tracks[idx])
    }

    /// Terminated tracks that were confirmed at some point.
    pub fn finalized(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_finalized())
    }

    /// Hands the finalized tracks over, consuming the tracker.
    pub fn into_finalized(self) -> Vec<Track> {
        self.tracks.into_iter().filter(|t| t.is_finalized()).collect()
    }

    /// Number of tracks ever confirmed.
    #[inline]
    pub fn confirmed_count(&self) -> usize {
        self.confirmed_count
    }

    #[inline]
    pub fn last_frame(&self) -> Option<usize> {
        self.last_frame
    }

    fn spawn(&mut self, frame: usize, det: &Detection) {
        let id = self.tracks.len() as u32;
        let mut track = Track::new(id, frame, det, self.config.history_len);

        if self.config.min_hits <= 1 {
            track.state = TrackState::Confirmed;
            track.confirmed = true;
            self.confirmed_count += 1;
        }

        self.active.push(self.tracks.len());
        self.tracks.push(track);
    }

    fn hit(&mut self, idx: usize, frame: usize, det: &Detection) {
        let min_hits = self.config.min_hits;
        let t = &mut self.tracks[idx];
        t.hit(frame, det);

        match t.state {
            TrackState::Tentative if t.hits >= min_hits => {
                t.state = TrackState::Confirmed;
                t.confirmed = true;
                self.confirmed_count += 1;
                debug!(track = t.id, frame, "track confirmed");
            }
            TrackState::Lost => {
                t.state = TrackState::Confirmed;
            }
            _ => (),
        }
    }

    fn cost(&self, frame: usize, track: &Track, det: &Detection) -> f64 {
        let pred = track.predict(frame);

        match self.config.metric {
            AssociationMetric::Distance => {
                na::distance(&pred, &na::Point2::new(det.x as f64, det.y as f64))
                    * self.microns_per_pixel
            }
            AssociationMetric::Iou => {
                let moved = track.last_detection.centered_at(pred.x as f32, pred.y as f32);
                let iou = moved.iou(det) as f64;

                // disjoint boxes never associate, whatever the gate
                if iou > 0.0 {
                    1.0 - iou
                } else {
                    f64::INFINITY
                }
            }
        }
    }

    /// Minimum-cost matching of `objs` (arena indexes) against `dets`
    /// (indexes into `detections`). Returns matched `(track, detection)`
    /// pairs and the detections left unmatched.
    fn assignment(
        &self,
        frame: usize,
        detections: &[Detection],
        objs: &[usize],
        dets: &[usize],
    ) -> (Vec<(usize, usize)>, Vec<usize>) {
        if objs.is_empty() || dets.is_empty() {
            return (Vec::new(), dets.to_vec());
        }

        let gate = self.config.gating_threshold;
        let n = objs.len().max(dets.len());
        let mut costs = vec![PADDING_COST; n * n];

        for (r, &ti) in objs.iter().enumerate() {
            for (c, &di) in dets.iter().enumerate() {
                let cost = self.cost(frame, &self.tracks[ti], &detections[di]);
                costs[r * n + c] = if cost.is_finite() && cost <= gate {
                    cost
                } else {
                    GATED_COST
                };
            }
        }

        let mut weights = WeightMatrix::from_row_vec(n, costs.clone());
        let pairs: Vec<(usize, usize)> = match solve_assignment(&mut weights) {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.row < objs.len() && p.column < dets.len())
                .filter(|p| costs[p.row * n + p.column] <= gate)
                .map(|p| (p.row, p.column))
                .collect(),
            Err(err) => {
                warn!(?err, frame, "assignment could not be solved, falling back to greedy");
                greedy_assignment(&costs, n, objs.len(), dets.len(), gate)
            }
        };

        let missed = dets
            .iter()
            .enumerate()
            .filter(|(c, _)| !pairs.iter().any(|&(_, pc)| pc == *c))
            .map(|(_, &di)| di)
            .collect();

        let matched = pairs.into_iter().map(|(r, c)| (objs[r], dets[c])).collect();

        (matched, missed)
    }
}

/// Cheapest-first matching used when the Hungarian solver fails.
fn greedy_assignment(
    costs: &[f64],
    n: usize,
    rows: usize,
    cols: usize,
    gate: f64,
) -> Vec<(usize, usize)> {
    let mut cells: Vec<(f64, usize, usize)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| (costs[r * n + c], r, c))
        .filter(|(cost, _, _)| *cost <= gate)
        .collect();

    cells.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut used_rows = vec![false; rows];
    let mut used_cols = vec![false; cols];
    let mut pairs = Vec::new();

    for (_, r, c) in cells {
        if !used_rows[r] && !used_cols[c] {
            used_rows[r] = true;
            used_cols[c] = true;
            pairs.push((r, c));
        }
    }

    pairs
}
