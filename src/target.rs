use std::fmt;

use nalgebra as na;
use opencv::{core::Mat, prelude::*};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::consensus;
use crate::error::Error;
use crate::features::FeatureSampler;
use crate::flow::MotionEstimator;
use crate::frame::Frame;
use crate::kalman::KalmanSmoother;
use crate::settings::Settings;
use crate::track::TrackSnapshot;

/// Lock state of a single tracked target.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Standby,
    Locked,
    Lost,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Standby => write!(f, "STANDBY"),
            TargetStatus::Locked => write!(f, "LOCKED"),
            TargetStatus::Lost => write!(f, "LOST"),
        }
    }
}

/// Tuned thresholds of the per-target pipeline. The values are empirical, so
/// every one of them is a field rather than a constant.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrackerConfig {
    pub max_features: i32,
    pub quality_level: f64,
    pub min_feature_distance: f64,
    pub min_region: i32,

    /// Strictly more surviving points than this are required to hold a lock.
    pub min_consensus_points: usize,

    /// Survivor counts below this trigger a feature refresh on the new box.
    pub refresh_threshold: usize,

    pub mad_gate: f32,
    pub scale_band: (f32, f32),
    pub scale_alpha: f32,

    /// Final display-smoothing factor applied on top of the Kalman output.
    pub ema_alpha: f32,

    /// Consecutive prediction-only frames tolerated before the lock is
    /// declared lost. Zero fails on the first miss.
    pub grace_frames: u32,

    pub flow_window: i32,
    pub pyramid_levels: i32,
    pub flow_iterations: i32,
    pub flow_epsilon: f64,

    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_features: 150,
            quality_level: 0.01,
            min_feature_distance: 7.0,
            min_region: 10,
            min_consensus_points: 5,
            refresh_threshold: 40,
            mad_gate: 5.0,
            scale_band: (0.9, 1.1),
            scale_alpha: 0.05,
            ema_alpha: 0.3,
            grace_frames: 8,
            flow_window: 15,
            pyramid_levels: 2,
            flow_iterations: 20,
            flow_epsilon: 0.01,
            process_noise: 0.01,
            measurement_noise: 10.0,
        }
    }
}

/// One tracked region of interest.
///
/// Created STANDBY, locked by `init`, stepped by `update`, and removed by the
/// roster once it reports LOST. The target is the only mutator of its own box
/// and status.
pub struct TrackedTarget {
    id: u32,
    status: TargetStatus,
    bbox: Option<BBox>,
    points: Vec<na::Point2<f32>>,
    base_spread: f32,
    kalman: Option<KalmanSmoother>,
    settings: Settings,
    config: TrackerConfig,
    sampler: FeatureSampler,
    flow: MotionEstimator,
    prev_gray: Option<Mat>,
    coast_frames: u32,
}

impl TrackedTarget {
    pub fn new(id: u32, config: TrackerConfig, settings: Settings) -> Result<Self, Error> {
        let sampler = FeatureSampler::new(
            config.max_features,
            config.quality_level,
            config.min_feature_distance,
            config.min_region,
        );
        let flow = MotionEstimator::new(
            config.flow_window,
            config.pyramid_levels,
            config.flow_iterations,
            config.flow_epsilon,
        )?;

        Ok(Self {
            id,
            status: TargetStatus::Standby,
            bbox: None,
            points: Vec::new(),
            base_spread: 1.0,
            kalman: None,
            settings,
            config,
            sampler,
            flow,
            prev_gray: None,
            coast_frames: 0,
        })
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn status(&self) -> TargetStatus {
        self.status
    }

    #[inline]
    pub fn bbox(&self) -> Option<BBox> {
        self.bbox
    }

    #[inline]
    pub fn points(&self) -> &[na::Point2<f32>] {
        &self.points
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            status: self.status,
            bbox: self.bbox,
            points: self.points.clone(),
        }
    }

    pub(crate) fn mark_lost(&mut self) {
        self.status = TargetStatus::Lost;
    }

    /// Locks onto the seed box if it holds enough texture to track. A seed
    /// that clamps away or yields too few corners leaves the target in
    /// STANDBY and reports `false`.
    pub fn init(&mut self, frame: &Frame, seed: BBox) -> Result<bool, Error> {
        let mut gray = frame.gray().clone();
        let (fw, fh) = frame.dims();
        let clamped = BBox::from(seed.clamped_to(fw, fh));

        let points = self.sampler.sample(&mut gray, &clamped, &self.settings)?;
        if points.len() <= self.config.min_consensus_points {
            return Ok(false);
        }

        let centroid = consensus::centroid(&points);
        self.base_spread = consensus::point_spread(&points, &centroid);
        self.kalman = Some(KalmanSmoother::new(
            &clamped,
            self.config.process_noise,
            self.config.measurement_noise,
        ));
        self.points = points;
        self.bbox = Some(clamped);
        self.prev_gray = Some(gray);
        self.coast_frames = 0;
        self.status = TargetStatus::Locked;

        Ok(true)
    }

    /// One tracking step. Transient misses are absorbed here: the box coasts
    /// on the Kalman prediction until the grace window runs out.
    pub fn update(&mut self, frame: &Frame, dt: f32) -> Result<(), Error> {
        if self.status != TargetStatus::Locked {
            return Ok(());
        }

        let predicted = match self.kalman.as_mut() {
            Some(kalman) => kalman.predict(dt),
            None => return Ok(()),
        };

        let mut gray = frame.gray().clone();

        let tracked: Vec<(na::Point2<f32>, na::Point2<f32>)> = match self.prev_gray.as_ref() {
            Some(prev) => self
                .flow
                .estimate(prev, &gray, &self.points)?
                .into_iter()
                .filter(|p| p.valid)
                .map(|p| (p.prev, p.curr))
                .collect(),
            None => Vec::new(),
        };

        match consensus::displacement_consensus(&tracked, self.config.mad_gate) {
            Some(c) if c.survivors.len() > self.config.min_consensus_points => {
                self.coast_frames = 0;

                let current = self.bbox.unwrap_or(predicted);
                let scale = consensus::damped_scale(
                    c.spread,
                    self.base_spread,
                    self.config.scale_band,
                    self.config.scale_alpha,
                );
                self.base_spread = c.spread;

                let measured = BBox::from_center(c.centroid, current.w * scale, current.h * scale);
                let corrected = self
                    .kalman
                    .as_mut()
                    .and_then(|k| k.correct(&measured))
                    .unwrap_or(predicted);
                let smoothed = current.lerp(&corrected, self.config.ema_alpha);
                self.bbox = Some(smoothed);

                if c.survivors.len() < self.config.refresh_threshold {
                    self.refresh_points(&mut gray, &smoothed, c.survivors);
                } else {
                    self.points = c.survivors;
                }
            }
            _ => {
                self.coast_frames += 1;
                self.bbox = Some(predicted);

                if self.coast_frames >= self.config.grace_frames {
                    log::debug!(
                        "target {} lost after {} coasted frames",
                        self.id,
                        self.coast_frames
                    );
                    self.status = TargetStatus::Lost;
                }
            }
        }

        self.prev_gray = Some(gray);
        Ok(())
    }

    /// Replenishes the feature set from the current box. A refresh that finds
    /// too few corners, or a box that clamps away, keeps the survivors: a
    /// momentary miss, not a failure.
    fn refresh_points(&mut self, gray: &mut Mat, bbox: &BBox, survivors: Vec<na::Point2<f32>>) {
        let refreshed = self
            .sampler
            .sample(gray, bbox, &self.settings)
            .unwrap_or_default();

        if refreshed.len() > self.config.min_consensus_points {
            let centroid = consensus::centroid(&refreshed);
            self.base_spread = consensus::point_spread(&refreshed, &centroid);
            self.points = refreshed;
        } else {
            self.points = survivors;
        }
    }
}

#[cfg(test)]
mod tests {
    use opencv::{core, imgproc};

    use super::*;

    fn textured_frame(patches: &[(i32, i32)]) -> Frame {
        let mut mat = Mat::zeros(240, 320, core::CV_8UC3)
            .unwrap()
            .to_mat()
            .unwrap();

        for &(px, py) in patches {
            for gy in 0..5 {
                for gx in 0..5 {
                    imgproc::rectangle(
                        &mut mat,
                        core::Rect::new(px + gx * 8, py + gy * 8, 3, 3),
                        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
                        imgproc::FILLED,
                        imgproc::LINE_8,
                        0,
                    )
                    .unwrap();
                }
            }
        }

        Frame::new(mat).unwrap()
    }

    fn locked_target(frame: &Frame, config: TrackerConfig) -> TrackedTarget {
        let mut target = TrackedTarget::new(1, config, Settings::default()).unwrap();
        assert!(target.init(frame, BBox::new(30.0, 30.0, 60.0, 60.0)).unwrap());
        target
    }

    #[test]
    fn init_locks_on_textured_seed() {
        let frame = textured_frame(&[(40, 40)]);
        let target = locked_target(&frame, TrackerConfig::default());

        assert_eq!(target.status(), TargetStatus::Locked);
        assert!(target.points().len() > 5);
        assert!(target.bbox().is_some());
    }

    #[test]
    fn init_rejects_seed_outside_frame() {
        let frame = textured_frame(&[(40, 40)]);
        let mut target = TrackedTarget::new(1, TrackerConfig::default(), Settings::default()).unwrap();

        let locked = target
            .init(&frame, BBox::new(500.0, 500.0, 80.0, 80.0))
            .unwrap();

        assert!(!locked);
        assert_eq!(target.status(), TargetStatus::Standby);
    }

    #[test]
    fn init_rejects_tiny_seed() {
        let frame = textured_frame(&[(40, 40)]);
        let mut target = TrackedTarget::new(1, TrackerConfig::default(), Settings::default()).unwrap();

        let locked = target.init(&frame, BBox::new(40.0, 40.0, 6.0, 6.0)).unwrap();

        assert!(!locked);
        assert_eq!(target.status(), TargetStatus::Standby);
    }

    #[test]
    fn static_scene_keeps_lock() {
        let frame = textured_frame(&[(40, 40)]);
        let mut target = locked_target(&frame, TrackerConfig::default());

        for _ in 0..5 {
            target.update(&frame, 1.0).unwrap();
            assert_eq!(target.status(), TargetStatus::Locked);
        }
    }

    #[test]
    fn one_starved_frame_coasts_on_prediction() {
        let frame = textured_frame(&[(40, 40)]);
        // an unreachable survivor floor forces the fallback path every frame
        let config = TrackerConfig {
            min_consensus_points: 10_000,
            grace_frames: 8,
            ..TrackerConfig::default()
        };
        let mut target = TrackedTarget::new(1, TrackerConfig::default(), Settings::default()).unwrap();
        assert!(target.init(&frame, BBox::new(30.0, 30.0, 60.0, 60.0)).unwrap());
        target.config = config;

        target.update(&frame, 1.0).unwrap();

        assert_eq!(target.status(), TargetStatus::Locked);
        assert!(target.bbox().is_some());
    }

    #[test]
    fn exhausted_grace_window_loses_lock() {
        let frame = textured_frame(&[(40, 40)]);
        let mut target = locked_target(&frame, TrackerConfig::default());
        target.config.min_consensus_points = 10_000;
        target.config.grace_frames = 4;

        for _ in 0..3 {
            target.update(&frame, 1.0).unwrap();
            assert_eq!(target.status(), TargetStatus::Locked);
        }

        target.update(&frame, 1.0).unwrap();
        assert_eq!(target.status(), TargetStatus::Lost);
    }

    #[test]
    fn zero_grace_fails_immediately() {
        let frame = textured_frame(&[(40, 40)]);
        let mut target = locked_target(&frame, TrackerConfig::default());
        target.config.min_consensus_points = 10_000;
        target.config.grace_frames = 0;

        target.update(&frame, 1.0).unwrap();

        assert_eq!(target.status(), TargetStatus::Lost);
    }
}
