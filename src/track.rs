use nalgebra as na;

use crate::bbox::BBox;
use crate::target::TargetStatus;

/// Per-tick view of one target, handed to the external renderer. No box
/// while the target is still STANDBY.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub id: u32,
    pub status: TargetStatus,
    pub bbox: Option<BBox>,
    pub points: Vec<na::Point2<f32>>,
}
