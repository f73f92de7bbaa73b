use nalgebra as na;
use opencv::core::Rect;
use serde_derive::{Deserialize, Serialize};

/// Left-top-width-height box in frame pixel coordinates
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    #[inline]
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn from_center(center: na::Point2<f32>, w: f32, h: f32) -> Self {
        Self::new(center.x - w / 2.0, center.y - h / 2.0, w, h)
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    #[inline]
    pub fn center_distance(&self, other: &BBox) -> f32 {
        na::distance(&self.center(), &other.center())
    }

    /// Intersection with a frame of the given dimensions, floored to the
    /// pixel grid. Width/height come out non-positive when the box lies
    /// outside the frame.
    pub fn clamped_to(&self, frame_width: i32, frame_height: i32) -> Rect {
        let x = (self.x.floor() as i32).clamp(0, frame_width);
        let y = (self.y.floor() as i32).clamp(0, frame_height);
        let w = (self.w.floor() as i32).min(frame_width - x);
        let h = (self.h.floor() as i32).min(frame_height - y);

        Rect::new(x, y, w, h)
    }

    #[inline]
    pub fn lerp(&self, target: &BBox, alpha: f32) -> BBox {
        let keep = 1.0 - alpha;

        BBox::new(
            self.x * keep + target.x * alpha,
            self.y * keep + target.y * alpha,
            self.w * keep + target.w * alpha,
            self.h * keep + target.h * alpha,
        )
    }
}

impl From<Rect> for BBox {
    #[inline]
    fn from(r: Rect) -> Self {
        Self::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }
}

impl From<&BBox> for Rect {
    #[inline]
    fn from(b: &BBox) -> Self {
        Rect::new(
            b.x.floor() as i32,
            b.y.floor() as i32,
            b.w.floor() as i32,
            b.h.floor() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_interior_box() {
        let rect = BBox::new(10.0, 20.0, 50.0, 40.0).clamped_to(320, 240);

        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10, 20, 50, 40));
    }

    #[test]
    fn clamp_cuts_overhang() {
        let rect = BBox::new(300.0, -10.0, 50.0, 40.0).clamped_to(320, 240);

        assert_eq!(rect.x, 300);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 20);
    }

    #[test]
    fn clamp_outside_is_degenerate() {
        let rect = BBox::new(400.0, 300.0, 50.0, 40.0).clamped_to(320, 240);

        assert!(rect.width <= 0 || rect.height <= 0);
    }

    #[test]
    fn lerp_blends_toward_target() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(10.0, 10.0, 100.0, 100.0);
        let m = a.lerp(&b, 0.3);

        assert!((m.x - 3.0).abs() < 1e-5);
        assert!((m.y - 3.0).abs() < 1e-5);
        assert!((m.w - 100.0).abs() < 1e-5);
    }
}
