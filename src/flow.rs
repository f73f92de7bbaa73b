use nalgebra as na;
use opencv::{
    core::{self, Mat, Point2f, Size, TermCriteria},
    prelude::*,
    video,
};

use crate::error::Error;

/// One tracked point as reported by the flow pass.
#[derive(Debug, Clone, Copy)]
pub struct FlowPoint {
    pub prev: na::Point2<f32>,
    pub curr: na::Point2<f32>,
    pub valid: bool,
}

/// Pyramidal sparse optical flow between consecutive grayscale frames.
pub struct MotionEstimator {
    win_size: Size,
    max_level: i32,
    criteria: TermCriteria,
}

impl MotionEstimator {
    pub fn new(window: i32, max_level: i32, iterations: i32, epsilon: f64) -> Result<Self, Error> {
        Ok(Self {
            win_size: Size::new(window, window),
            max_level,
            criteria: TermCriteria::new(
                core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
                iterations,
                epsilon,
            )?,
        })
    }

    /// Per-point displacement estimate. Points the flow could not follow come
    /// back with `valid == false` and must not feed the consensus.
    pub fn estimate(
        &self,
        prev_gray: &Mat,
        gray: &Mat,
        points: &[na::Point2<f32>],
    ) -> Result<Vec<FlowPoint>, Error> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let seed: Vec<Point2f> = points.iter().map(|p| Point2f::new(p.x, p.y)).collect();
        let prev_pts = Mat::from_slice(&seed)?;

        let mut next_pts = Mat::default();
        let mut status = Mat::default();
        let mut err = Mat::default();

        video::calc_optical_flow_pyr_lk(
            prev_gray,
            gray,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            self.win_size,
            self.max_level,
            self.criteria,
            0,
            1e-4,
        )?;

        let mut flow = Vec::with_capacity(points.len());
        for (i, prev) in points.iter().enumerate() {
            let curr = next_pts.at::<Point2f>(i as i32)?;
            let valid = *status.at::<u8>(i as i32)? == 1;

            flow.push(FlowPoint {
                prev: *prev,
                curr: na::Point2::new(curr.x, curr.y),
                valid,
            });
        }

        Ok(flow)
    }
}
