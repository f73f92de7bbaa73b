use nalgebra as na;

use crate::bbox::BBox;

type State = na::SVector<f32, 8>;
type StateCov = na::SMatrix<f32, 8, 8>;

/// Constant-velocity smoother over `[x, y, w, h, vx, vy, vw, vh]`.
///
/// Measurement noise is deliberately large relative to process noise: the
/// filter damps jittery flow measurements rather than following them tightly.
#[derive(Debug, Clone)]
pub struct KalmanSmoother {
    state: State,
    covariance: StateCov,
    process_noise: f32,
    measurement_noise: f32,
}

impl KalmanSmoother {
    pub fn new(seed: &BBox, process_noise: f32, measurement_noise: f32) -> Self {
        let mut state = State::zeros();
        state[0] = seed.x;
        state[1] = seed.y;
        state[2] = seed.w;
        state[3] = seed.h;

        Self {
            state,
            covariance: StateCov::identity(),
            process_noise,
            measurement_noise,
        }
    }

    fn observation() -> na::SMatrix<f32, 4, 8> {
        na::SMatrix::from_fn(|r, c| if r == c { 1.0 } else { 0.0 })
    }

    /// Advance the state by `dt` and return the predicted box. Process noise
    /// grows linearly with the elapsed step.
    pub fn predict(&mut self, dt: f32) -> BBox {
        let mut transition = StateCov::identity();
        for i in 0..4 {
            transition[(i, i + 4)] = dt;
        }

        self.state = transition * self.state;
        self.covariance = transition * self.covariance * transition.transpose()
            + StateCov::identity() * (self.process_noise * dt);

        self.state_box()
    }

    /// Standard linear correction with a measured box. Returns the corrected
    /// box, or `None` when the innovation covariance cannot be inverted, in
    /// which case the prediction stands for this frame.
    pub fn correct(&mut self, measured: &BBox) -> Option<BBox> {
        let h = Self::observation();
        let z = na::Vector4::new(measured.x, measured.y, measured.w, measured.h);

        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose()
            + na::SMatrix::<f32, 4, 4>::identity() * self.measurement_noise;
        let s_inv = s.try_inverse()?;
        let gain = self.covariance * h.transpose() * s_inv;

        self.state += gain * innovation;
        self.covariance = (StateCov::identity() - gain * h) * self.covariance;

        Some(self.state_box())
    }

    /// Current box estimate. Size is floored so a coasting box never
    /// degenerates to zero area.
    pub fn state_box(&self) -> BBox {
        BBox::new(
            self.state[0],
            self.state[1],
            self.state[2].max(1.0),
            self.state[3].max(1.0),
        )
    }

    #[inline]
    pub fn velocity(&self) -> na::Vector2<f32> {
        na::Vector2::new(self.state[4], self.state[5])
    }
}
