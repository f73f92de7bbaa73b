use nalgebra as na;

/// Fewer valid points than this skips statistical rejection entirely.
const MIN_POPULATION: usize = 6;

/// Floor keeping the rejection gate meaningful when most deviations are zero.
const MAD_FLOOR: f32 = 0.1;

/// Outlier-filtered agreement of a target's feature points on one frame of
/// motion.
#[derive(Debug, Clone)]
pub struct Consensus {
    pub centroid: na::Point2<f32>,
    pub survivors: Vec<na::Point2<f32>>,
    pub spread: f32,
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

fn mad(values: &[f32], center: f32) -> f32 {
    let devs: Vec<f32> = values.iter().map(|v| (v - center).abs()).collect();
    median(&devs).max(MAD_FLOOR)
}

/// Rejects gross displacement outliers and returns the surviving new
/// positions with their centroid and spread. `None` when nothing survived the
/// flow pass.
///
/// The gate is deliberately permissive: only displacements `mad_gate` MADs
/// away from the per-axis median are dropped, so the anchor never jumps when
/// a borderline point flips in or out.
pub fn displacement_consensus(
    tracked: &[(na::Point2<f32>, na::Point2<f32>)],
    mad_gate: f32,
) -> Option<Consensus> {
    if tracked.is_empty() {
        return None;
    }

    let survivors: Vec<na::Point2<f32>> = if tracked.len() < MIN_POPULATION {
        tracked.iter().map(|(_, new)| *new).collect()
    } else {
        let dxs: Vec<f32> = tracked.iter().map(|(old, new)| new.x - old.x).collect();
        let dys: Vec<f32> = tracked.iter().map(|(old, new)| new.y - old.y).collect();

        let median_dx = median(&dxs);
        let median_dy = median(&dys);
        let mad_dx = mad(&dxs, median_dx);
        let mad_dy = mad(&dys, median_dy);

        let mut kept = Vec::with_capacity(tracked.len());
        for ((_, new), (dx, dy)) in tracked.iter().zip(dxs.iter().zip(dys.iter())) {
            if (*dx - median_dx).abs() < mad_gate * mad_dx
                && (*dy - median_dy).abs() < mad_gate * mad_dy
            {
                kept.push(*new);
            }
        }

        kept
    };

    if survivors.is_empty() {
        return None;
    }

    let centroid = centroid(&survivors);
    let spread = point_spread(&survivors, &centroid);

    Some(Consensus {
        centroid,
        survivors,
        spread,
    })
}

pub fn centroid(points: &[na::Point2<f32>]) -> na::Point2<f32> {
    let n = points.len() as f32;
    let sum = points
        .iter()
        .fold(na::Vector2::zeros(), |acc, p| acc + p.coords);

    na::Point2::from(sum / n)
}

/// Average distance of the points from their centroid, a cheap scale proxy.
pub fn point_spread(points: &[na::Point2<f32>], centroid: &na::Point2<f32>) -> f32 {
    let n = points.len() as f32;

    points
        .iter()
        .map(|p| na::distance(p, centroid))
        .sum::<f32>()
        / n
}

/// Per-frame size ratio: clamped to the band, then blended toward 1.0 so the
/// box never pulses on spread jitter.
pub fn damped_scale(spread: f32, base_spread: f32, band: (f32, f32), alpha: f32) -> f32 {
    if base_spread <= f32::EPSILON {
        return 1.0;
    }

    let ratio = (spread / base_spread).clamp(band.0, band.1);

    (1.0 - alpha) + ratio * alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(x: f32, y: f32, dx: f32, dy: f32) -> (na::Point2<f32>, na::Point2<f32>) {
        (
            na::Point2::new(x, y),
            na::Point2::new(x + dx, y + dy),
        )
    }

    #[test]
    fn gross_outlier_is_rejected() {
        let mut tracked: Vec<_> = (0..8)
            .map(|i| pair(i as f32 * 10.0, 0.0, 2.0 + i as f32 * 0.01, 1.0))
            .collect();
        tracked.push(pair(80.0, 0.0, 50.0, -30.0));

        let c = displacement_consensus(&tracked, 5.0).unwrap();

        assert_eq!(c.survivors.len(), 8);
        assert!(!c.survivors.iter().any(|p| (p.x - 130.0).abs() < 1.0));
    }

    #[test]
    fn outlier_does_not_drag_centroid() {
        let clean: Vec<_> = (0..9)
            .map(|i| pair(i as f32 * 10.0, 5.0, 2.0, 2.0))
            .collect();
        let mut dirty = clean.clone();
        dirty.push(pair(200.0, 200.0, 60.0, 60.0));

        let a = displacement_consensus(&clean, 5.0).unwrap();
        let b = displacement_consensus(&dirty, 5.0).unwrap();

        assert!(na::distance(&a.centroid, &b.centroid) < 1e-4);
    }

    #[test]
    fn small_population_keeps_everything() {
        let tracked = vec![
            pair(0.0, 0.0, 1.0, 0.0),
            pair(10.0, 0.0, 2.0, 0.0),
            pair(20.0, 0.0, 100.0, 0.0),
        ];

        let c = displacement_consensus(&tracked, 5.0).unwrap();

        assert_eq!(c.survivors.len(), 3);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(displacement_consensus(&[], 5.0).is_none());
    }

    #[test]
    fn scale_is_clamped_on_both_sides() {
        let band = (0.9, 1.1);

        let shrink = damped_scale(1.0, 10.0, band, 1.0);
        let grow = damped_scale(10.0, 1.0, band, 1.0);

        assert!((shrink - 0.9).abs() < 1e-6);
        assert!((grow - 1.1).abs() < 1e-6);
    }

    #[test]
    fn scale_blends_toward_unity() {
        let s = damped_scale(11.0, 10.0, (0.9, 1.1), 0.05);

        assert!((s - (0.95 + 1.1 * 0.05)).abs() < 1e-6);
        assert!(s > 1.0 && s < 1.01);
    }

    #[test]
    fn spread_of_symmetric_square() {
        let points = vec![
            na::Point2::new(-1.0, 0.0),
            na::Point2::new(1.0, 0.0),
            na::Point2::new(0.0, -1.0),
            na::Point2::new(0.0, 1.0),
        ];
        let c = centroid(&points);

        assert!(na::distance(&c, &na::Point2::origin()) < 1e-6);
        assert!((point_spread(&points, &c) - 1.0).abs() < 1e-6);
    }
}
