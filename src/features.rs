use nalgebra as na;
use opencv::{
    core::{self, Mat, Point2f, Scalar},
    imgproc,
    prelude::*,
};

use crate::bbox::BBox;
use crate::enhance::{LevelsEnhancer, RegionEnhancer};
use crate::error::Error;
use crate::settings::Settings;

/// Samples high-texture corner points inside a box region, after running the
/// region through the enhancement transform.
pub struct FeatureSampler {
    max_features: i32,
    quality_level: f64,
    min_distance: f64,
    min_region: i32,
    enhancer: Box<dyn RegionEnhancer>,
}

impl FeatureSampler {
    pub fn new(max_features: i32, quality_level: f64, min_distance: f64, min_region: i32) -> Self {
        Self {
            max_features,
            quality_level,
            min_distance,
            min_region,
            enhancer: Box::new(LevelsEnhancer::new()),
        }
    }

    pub fn with_enhancer(mut self, enhancer: Box<dyn RegionEnhancer>) -> Self {
        self.enhancer = enhancer;
        self
    }

    /// Returns the sampled points, or the empty set when the clamped region
    /// is too small to track. The region is enhanced in place so the stored
    /// grayscale matches what the detector saw.
    pub fn sample(
        &mut self,
        gray: &mut Mat,
        region: &BBox,
        settings: &Settings,
    ) -> Result<Vec<na::Point2<f32>>, Error> {
        let rect = region.clamped_to(gray.cols(), gray.rows());
        if rect.width <= self.min_region || rect.height <= self.min_region {
            return Ok(Vec::new());
        }

        self.enhancer.enhance(gray, rect, settings)?;

        let mut mask = Mat::zeros(gray.rows(), gray.cols(), core::CV_8UC1)?.to_mat()?;
        imgproc::rectangle(
            &mut mask,
            rect,
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;

        let mut corners = Mat::default();
        imgproc::good_features_to_track(
            gray,
            &mut corners,
            self.max_features,
            self.quality_level,
            self.min_distance,
            &mask,
            3,
            false,
            0.04,
        )?;

        let mut points = Vec::with_capacity(corners.rows() as usize);
        for i in 0..corners.rows() {
            let p = corners.at::<Point2f>(i)?;
            points.push(na::Point2::new(p.x, p.y));
        }

        Ok(points)
    }
}
