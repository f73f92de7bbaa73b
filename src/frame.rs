use opencv::{core::Mat, imgproc, prelude::*};

use crate::error::Error;

/// One captured video frame. The grayscale view is converted once here and
/// shared by the radar scan and every target update within the tick.
pub struct Frame {
    color: Mat,
    gray: Mat,
}

impl Frame {
    pub fn new(color: Mat) -> Result<Self, Error> {
        let mut gray = Mat::default();
        imgproc::cvt_color(&color, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        Ok(Self { color, gray })
    }

    #[inline]
    pub fn color(&self) -> &Mat {
        &self.color
    }

    #[inline]
    pub fn gray(&self) -> &Mat {
        &self.gray
    }

    #[inline]
    pub fn dims(&self) -> (i32, i32) {
        (self.gray.cols(), self.gray.rows())
    }
}
