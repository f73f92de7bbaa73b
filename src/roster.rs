use crate::bbox::BBox;
use crate::error::Error;
use crate::frame::Frame;
use crate::settings::Settings;
use crate::target::{TargetStatus, TrackedTarget, TrackerConfig};
use crate::track::TrackSnapshot;

/// Bounded arena of live targets.
///
/// The roster is the sole authority for adding and removing targets; manual
/// selection and radar promotion both come through `spawn`, and LOST targets
/// leave through `cull`.
pub struct TargetRoster {
    targets: Vec<TrackedTarget>,
    capacity: usize,
    active: usize,
    next_id: u32,
    config: TrackerConfig,
}

impl TargetRoster {
    pub fn new(capacity: usize, config: TrackerConfig) -> Self {
        Self {
            targets: Vec::with_capacity(capacity),
            capacity,
            active: 0,
            next_id: 1,
            config,
        }
    }

    /// Locks a new target onto the seed box. Returns the new target id, or
    /// `None` when the roster is full or the seed holds too little texture.
    /// The new target copies its calibration from the current active one and
    /// becomes active itself.
    pub fn spawn(&mut self, frame: &Frame, seed: BBox) -> Result<Option<u32>, Error> {
        if self.targets.len() >= self.capacity {
            return Ok(None);
        }

        let settings = self
            .active()
            .map(|t| *t.settings())
            .unwrap_or_else(Settings::default);

        let id = self.next_id;
        let mut target = TrackedTarget::new(id, self.config.clone(), settings)?;
        if !target.init(frame, seed)? {
            return Ok(None);
        }

        log::debug!("target {} locked on {:?}", id, target.bbox());
        self.next_id += 1;
        self.targets.push(target);
        self.active = self.targets.len() - 1;

        Ok(Some(id))
    }

    /// Steps every live target. A vision failure inside one target marks that
    /// target LOST and the tick carries on; one bad frame never halts the
    /// system.
    pub fn update(&mut self, frame: &Frame, dt: f32) {
        for target in &mut self.targets {
            if let Err(err) = target.update(frame, dt) {
                log::warn!("target {} update failed, dropping: {}", target.id(), err);
                target.mark_lost();
            }
        }
    }

    /// Drops LOST targets, keeping the active index inside bounds.
    pub fn cull(&mut self) {
        let before = self.targets.len();
        self.targets.retain(|t| t.status() != TargetStatus::Lost);

        if self.targets.len() != before {
            log::debug!("culled {} lost targets", before - self.targets.len());
        }

        if self.active >= self.targets.len() {
            self.active = self.targets.len().saturating_sub(1);
        }
    }

    /// Moves the active cursor, wrapping at either end.
    pub fn cycle_active(&mut self, direction: i32) {
        if self.targets.is_empty() {
            return;
        }

        let len = self.targets.len() as i32;
        self.active = (self.active as i32 + direction).rem_euclid(len) as usize;
    }

    pub fn active(&self) -> Option<&TrackedTarget> {
        self.targets.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut TrackedTarget> {
        self.targets.get_mut(self.active)
    }

    /// Binding point for calibration controls.
    pub fn active_settings_mut(&mut self) -> Option<&mut Settings> {
        self.active_mut().map(|t| t.settings_mut())
    }

    pub fn active_id(&self) -> Option<u32> {
        self.active().map(|t| t.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedTarget> {
        self.targets.iter()
    }

    pub fn locked_boxes(&self) -> impl Iterator<Item = BBox> + '_ {
        self.targets
            .iter()
            .filter(|t| t.status() == TargetStatus::Locked)
            .filter_map(|t| t.bbox())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.targets.iter().map(|t| t.snapshot()).collect()
    }
}
