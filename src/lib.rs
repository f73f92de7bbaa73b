pub mod bbox;
pub mod consensus;
pub mod enhance;
pub mod error;
pub mod features;
pub mod flow;
pub mod frame;
pub mod kalman;
pub mod radar;
pub mod roster;
pub mod settings;
pub mod target;

mod track;

pub use bbox::BBox;
pub use error::Error;
pub use frame::Frame;
pub use radar::{RadarAcquisition, RadarConfig};
pub use roster::TargetRoster;
pub use settings::{LevelMode, Settings};
pub use target::{TargetStatus, TrackedTarget, TrackerConfig};
pub use track::TrackSnapshot;

/// Frame-driven tracking core: radar acquisition feeding a bounded roster of
/// flow-tracked targets, one synchronous tick per rendered frame.
pub struct FlowTracker {
    roster: TargetRoster,
    radar: RadarAcquisition,
    radar_enabled: bool,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default(), RadarConfig::default(), 5)
    }

    pub fn with_config(tracker: TrackerConfig, radar: RadarConfig, capacity: usize) -> Self {
        Self {
            roster: TargetRoster::new(capacity, tracker),
            radar: RadarAcquisition::new(radar),
            radar_enabled: false,
        }
    }

    /// Manual seed selection; besides radar promotion, the only way a target
    /// enters LOCKED.
    pub fn select(&mut self, frame: &Frame, seed: BBox) -> Result<Option<u32>, Error> {
        self.roster.spawn(frame, seed)
    }

    /// One tick: radar sweep, promotion spawns, per-target updates, cull.
    /// Returns the per-target output for rendering.
    pub fn tick(&mut self, frame: &Frame, dt: f32) -> Result<Vec<TrackSnapshot>, Error> {
        if self.radar_enabled {
            let promotions = self.radar.scan(frame, &self.roster)?;
            for seed in promotions {
                self.roster.spawn(frame, seed)?;
            }
        }

        self.roster.update(frame, dt);
        self.roster.cull();

        Ok(self.roster.snapshots())
    }

    /// Arming the radar starts from a clean contact map; disarming drops it.
    pub fn set_radar_enabled(&mut self, enabled: bool) {
        if self.radar_enabled != enabled {
            self.radar.reset();
        }
        self.radar_enabled = enabled;
    }

    #[inline]
    pub fn radar_enabled(&self) -> bool {
        self.radar_enabled
    }

    #[inline]
    pub fn radar(&self) -> &RadarAcquisition {
        &self.radar
    }

    #[inline]
    pub fn radar_mut(&mut self) -> &mut RadarAcquisition {
        &mut self.radar
    }

    #[inline]
    pub fn roster(&self) -> &TargetRoster {
        &self.roster
    }

    #[inline]
    pub fn roster_mut(&mut self) -> &mut TargetRoster {
        &mut self.roster
    }
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}
