use opencv::{
    core::{Mat, Rect, Size},
    imgproc,
    prelude::*,
    types::PtrOfCLAHE,
};

use crate::error::Error;
use crate::settings::{LevelMode, Settings};

/// Pre-sampling region transform. Implementations must be deterministic in
/// (region pixels, settings) and preserve the region shape; everything else
/// about the algorithm is up to the host.
pub trait RegionEnhancer {
    fn enhance(&mut self, gray: &mut Mat, region: Rect, settings: &Settings) -> Result<(), Error>;
}

/// Default enhancer: a global contrast/exposure gain, one of four level
/// shaping modes, then the intensity gate.
pub struct LevelsEnhancer {
    clahe: Option<PtrOfCLAHE>,
}

impl LevelsEnhancer {
    pub fn new() -> Self {
        Self {
            clahe: imgproc::create_clahe(2.0, Size::new(8, 8)).ok(),
        }
    }

    fn adaptive(&mut self, src: &Mat, dst: &mut Mat) -> Result<(), Error> {
        if let Some(clahe) = self.clahe.as_mut() {
            clahe.apply(src, dst)?;
        } else {
            imgproc::equalize_hist(src, dst)?;
        }

        Ok(())
    }
}

impl Default for LevelsEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionEnhancer for LevelsEnhancer {
    fn enhance(&mut self, gray: &mut Mat, region: Rect, settings: &Settings) -> Result<(), Error> {
        if region.width <= 0 || region.height <= 0 {
            return Ok(());
        }

        let mut view = Mat::roi(gray, region)?;
        let mut work = view.try_clone()?;

        if settings.contrast != 1.0 || settings.exposure != 0.0 {
            let src = work.try_clone()?;
            src.convert_to(
                &mut work,
                -1,
                settings.contrast as f64,
                settings.exposure as f64,
            )?;
        }

        match settings.mode {
            LevelMode::Slice => {
                let width = settings.level_width.max(1.0) as f64;
                let alpha = 255.0 / width;
                let beta = -(settings.level_center as f64 - width / 2.0) * alpha;
                let src = work.try_clone()?;
                src.convert_to(&mut work, -1, alpha, beta)?;
            }
            LevelMode::Sky => {
                let src = work.try_clone()?;
                imgproc::threshold(
                    &src,
                    &mut work,
                    settings.level_center as f64,
                    255.0,
                    imgproc::THRESH_BINARY,
                )?;
            }
            // chroma isolation needs a color plane; on a grayscale view it
            // degrades to the adaptive path
            LevelMode::Auto | LevelMode::Chroma => {
                let src = work.try_clone()?;
                self.adaptive(&src, &mut work)?;
            }
        }

        if settings.intensity_gate < 255 {
            let src = work.try_clone()?;
            imgproc::threshold(
                &src,
                &mut work,
                settings.intensity_gate as f64,
                255.0,
                imgproc::THRESH_TOZERO,
            )?;
        }

        work.copy_to(&mut view)?;
        Ok(())
    }
}
