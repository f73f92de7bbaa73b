use std::collections::HashMap;

use opencv::{
    core::{self, Mat, Point},
    imgproc,
    prelude::*,
};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::error::Error;
use crate::frame::Frame;
use crate::roster::TargetRoster;

/// Tuning of the motion-differencing acquisition sweep.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RadarConfig {
    /// Pixel intensity delta that counts as motion.
    pub diff_threshold: f64,

    pub kernel_size: i32,
    pub dilate_iterations: i32,

    /// Sensitivity floor: blobs under this contour area are noise.
    pub min_area: f64,

    /// Blob-to-contact centroid gate, in pixels.
    pub match_gate: f32,

    /// Consecutive matched scans before a contact is promoted.
    pub stable_frames: u32,

    /// A contact this close to an already locked target is dropped instead
    /// of promoted.
    pub dedup_gate: f32,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 20.0,
            kernel_size: 5,
            dilate_iterations: 2,
            min_area: 200.0,
            match_gate: 60.0,
            stable_frames: 5,
            dedup_gate: 60.0,
        }
    }
}

/// A moving region extracted from the motion mask.
#[derive(Debug, Clone, Copy)]
pub struct MotionBlob {
    pub bbox: BBox,
    pub area: f64,
}

/// A provisional detection being watched for stability.
#[derive(Debug, Clone, Copy)]
pub struct RadarContact {
    pub key: u32,
    pub candidate: BBox,
    pub stable_frames: u32,
}

/// Motion-based auto-acquisition.
///
/// Watches consecutive frames for moving blobs, keeps provisional contacts
/// alive while they stay put from scan to scan, and hands stable ones to the
/// caller as spawn requests. The contact map is owned here; the roster is
/// only ever read.
pub struct RadarAcquisition {
    config: RadarConfig,
    prev_gray: Option<Mat>,
    contacts: HashMap<u32, RadarContact>,
    next_key: u32,
}

impl RadarAcquisition {
    pub fn new(config: RadarConfig) -> Self {
        Self {
            config,
            prev_gray: None,
            contacts: HashMap::new(),
            next_key: 1,
        }
    }

    /// Runtime sensitivity control; larger floors mean fewer contacts.
    pub fn set_min_area(&mut self, min_area: f64) {
        self.config.min_area = min_area;
    }

    #[inline]
    pub fn min_area(&self) -> f64 {
        self.config.min_area
    }

    /// Provisional contacts, for display between scans.
    pub fn contacts(&self) -> impl Iterator<Item = &RadarContact> {
        self.contacts.values()
    }

    /// Drops all provisional state, including the reference frame.
    pub fn reset(&mut self) {
        self.prev_gray = None;
        self.contacts.clear();
    }

    /// One sweep over the frame. Returns the seed boxes of contacts that
    /// crossed the stability window; the caller owns the actual spawn.
    pub fn scan(&mut self, frame: &Frame, roster: &TargetRoster) -> Result<Vec<BBox>, Error> {
        let gray = frame.gray().clone();

        let promotions = if let Some(prev) = self.prev_gray.as_ref() {
            if prev.size()? == gray.size()? {
                let blobs = self.motion_blobs(prev, &gray)?;
                self.track_contacts(&blobs, roster)
            } else {
                // dimension change invalidates every contact position
                self.contacts.clear();
                Vec::new()
            }
        } else {
            Vec::new()
        };

        self.prev_gray = Some(gray);
        Ok(promotions)
    }

    /// Differences the two frames into a binary motion mask, merges the
    /// fragments, and reads off the blobs above the sensitivity floor,
    /// largest first.
    fn motion_blobs(&self, prev: &Mat, gray: &Mat) -> Result<Vec<MotionBlob>, Error> {
        let mut diff = Mat::default();
        core::absdiff(prev, gray, &mut diff)?;

        let mut mask = Mat::default();
        imgproc::threshold(
            &diff,
            &mut mask,
            self.config.diff_threshold,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            core::Size::new(self.config.kernel_size, self.config.kernel_size),
            Point::new(-1, -1),
        )?;
        let mut dilated = Mat::default();
        imgproc::dilate(
            &mask,
            &mut dilated,
            &kernel,
            Point::new(-1, -1),
            self.config.dilate_iterations,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let mut contours: core::Vector<core::Vector<Point>> = core::Vector::new();
        imgproc::find_contours(
            &dilated,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut blobs = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area > self.config.min_area {
                blobs.push(MotionBlob {
                    bbox: BBox::from(imgproc::bounding_rect(&contour)?),
                    area,
                });
            }
        }

        blobs.sort_by(|a, b| b.area.partial_cmp(&a.area).unwrap_or(std::cmp::Ordering::Equal));
        Ok(blobs)
    }

    /// Matches blobs against the contact map and advances stability counters.
    /// Contacts unmatched in this scan are pruned: stability has to be
    /// contiguous.
    fn track_contacts(&mut self, blobs: &[MotionBlob], roster: &TargetRoster) -> Vec<BBox> {
        let mut promotions = Vec::new();
        let mut matched: Vec<u32> = Vec::new();

        for blob in blobs.iter().take(roster.capacity()) {
            let nearest = self
                .contacts
                .values()
                .filter(|c| !matched.contains(&c.key))
                .map(|c| (c.key, c.candidate.center_distance(&blob.bbox)))
                .filter(|&(_, dist)| dist < self.config.match_gate)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(key, _)| key);

            let key = match nearest {
                Some(key) => key,
                None => {
                    let key = self.next_key;
                    self.next_key += 1;
                    self.contacts.insert(
                        key,
                        RadarContact {
                            key,
                            candidate: blob.bbox,
                            stable_frames: 0,
                        },
                    );
                    key
                }
            };

            matched.push(key);

            if let Some(contact) = self.contacts.get_mut(&key) {
                contact.stable_frames += 1;
                contact.candidate = blob.bbox;

                if contact.stable_frames >= self.config.stable_frames {
                    let occupied = roster
                        .locked_boxes()
                        .any(|b| b.center_distance(&blob.bbox) < self.config.dedup_gate);

                    if occupied {
                        log::debug!("contact {} dropped, location already locked", key);
                    } else {
                        log::debug!("contact {} stable, requesting lock", key);
                        promotions.push(blob.bbox);
                    }

                    self.contacts.remove(&key);
                }
            }
        }

        self.contacts.retain(|key, _| matched.contains(key));
        promotions
    }
}

#[cfg(test)]
mod tests {
    use crate::target::TrackerConfig;

    use super::*;

    fn blob(x: f32, y: f32) -> MotionBlob {
        MotionBlob {
            bbox: BBox::new(x, y, 30.0, 30.0),
            area: 900.0,
        }
    }

    fn radar() -> RadarAcquisition {
        RadarAcquisition::new(RadarConfig::default())
    }

    fn empty_roster() -> TargetRoster {
        TargetRoster::new(5, TrackerConfig::default())
    }

    #[test]
    fn stable_contact_promotes_exactly_once() {
        let mut radar = radar();
        let roster = empty_roster();

        for scan in 1..=4 {
            let promoted = radar.track_contacts(&[blob(100.0, 100.0)], &roster);
            assert!(promoted.is_empty(), "promoted early on scan {}", scan);
        }

        let promoted = radar.track_contacts(&[blob(100.0, 100.0)], &roster);
        assert_eq!(promoted.len(), 1);
        assert_eq!(radar.contacts().count(), 0);

        // the same blob starts a fresh stability window afterwards
        let promoted = radar.track_contacts(&[blob(100.0, 100.0)], &roster);
        assert!(promoted.is_empty());
        assert_eq!(radar.contacts().count(), 1);
    }

    #[test]
    fn missed_scan_forfeits_stability() {
        let mut radar = radar();
        let roster = empty_roster();

        for _ in 0..4 {
            radar.track_contacts(&[blob(100.0, 100.0)], &roster);
        }

        // one empty sweep prunes the contact entirely
        radar.track_contacts(&[], &roster);
        assert_eq!(radar.contacts().count(), 0);

        for _ in 0..4 {
            let promoted = radar.track_contacts(&[blob(100.0, 100.0)], &roster);
            assert!(promoted.is_empty());
        }
    }

    #[test]
    fn drifting_blob_keeps_its_contact() {
        let mut radar = radar();
        let roster = empty_roster();

        for step in 0..4 {
            radar.track_contacts(&[blob(100.0 + step as f32 * 20.0, 100.0)], &roster);
            assert_eq!(radar.contacts().count(), 1);
        }

        let promoted = radar.track_contacts(&[blob(180.0, 100.0)], &roster);
        assert_eq!(promoted.len(), 1);
    }

    #[test]
    fn distant_blob_opens_a_second_contact() {
        let mut radar = radar();
        let roster = empty_roster();

        radar.track_contacts(&[blob(100.0, 100.0)], &roster);
        radar.track_contacts(&[blob(100.0, 100.0), blob(400.0, 100.0)], &roster);

        assert_eq!(radar.contacts().count(), 2);
    }

    #[test]
    fn contact_cap_follows_roster_capacity() {
        let mut radar = radar();
        let roster = TargetRoster::new(2, TrackerConfig::default());

        let blobs: Vec<MotionBlob> = (0..4).map(|i| blob(100.0 + i as f32 * 200.0, 50.0)).collect();
        radar.track_contacts(&blobs, &roster);

        assert_eq!(radar.contacts().count(), 2);
    }

    #[test]
    fn reset_clears_contacts() {
        let mut radar = radar();
        let roster = empty_roster();

        radar.track_contacts(&[blob(100.0, 100.0)], &roster);
        radar.reset();

        assert_eq!(radar.contacts().count(), 0);
    }

    #[test]
    fn promotion_next_to_locked_target_is_discarded() {
        let mut radar = radar();
        let mut roster = empty_roster();

        let frame = {
            let mut mat = Mat::zeros(240, 320, core::CV_8UC3).unwrap().to_mat().unwrap();
            for gy in 0..6 {
                for gx in 0..6 {
                    imgproc::rectangle(
                        &mut mat,
                        core::Rect::new(100 + gx * 8, 100 + gy * 8, 3, 3),
                        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
                        imgproc::FILLED,
                        imgproc::LINE_8,
                        0,
                    )
                    .unwrap();
                }
            }
            Frame::new(mat).unwrap()
        };

        roster
            .spawn(&frame, BBox::new(95.0, 95.0, 60.0, 60.0))
            .unwrap()
            .unwrap();

        for _ in 0..5 {
            let promoted = radar.track_contacts(&[blob(110.0, 110.0)], &roster);
            assert!(promoted.is_empty());
        }

        // the contact was consumed by the dedup gate, not left pending
        assert_eq!(radar.contacts().count(), 0);
    }
}
