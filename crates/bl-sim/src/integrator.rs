//! Fixed-step RK4 for the plant ODE.

use crate::error::SimResult;

/// `x' = f(t, x)` over a state that supports `a + k * b`.
pub trait OdeModel {
    type State: Clone;

    fn derivative(&self, t: f64, x: &Self::State) -> SimResult<Self::State>;

    /// `a + k * b`
    fn axpy(&self, a: &Self::State, k: f64, b: &Self::State) -> Self::State;
}

/// One classical Runge-Kutta step of `dt` from `(t, x)`.
pub fn rk4_step<M: OdeModel>(model: &M, t: f64, x: &M::State, dt: f64) -> SimResult<M::State> {
    let half = 0.5 * dt;
    let k1 = model.derivative(t, x)?;
    let k2 = model.derivative(t + half, &model.axpy(x, half, &k1))?;
    let k3 = model.derivative(t + half, &model.axpy(x, half, &k2))?;
    let k4 = model.derivative(t + dt, &model.axpy(x, dt, &k3))?;

    let sixth = dt / 6.0;
    let x = model.axpy(x, sixth, &k1);
    let x = model.axpy(&x, 2.0 * sixth, &k2);
    let x = model.axpy(&x, 2.0 * sixth, &k3);
    Ok(model.axpy(&x, sixth, &k4))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x' = -x
    struct Decay;

    impl OdeModel for Decay {
        type State = f64;

        fn derivative(&self, _t: f64, x: &f64) -> SimResult<f64> {
            Ok(-x)
        }

        fn axpy(&self, a: &f64, k: f64, b: &f64) -> f64 {
            a + k * b
        }
    }

    #[test]
    fn tracks_exponential_decay() {
        let mut x = 1.0;
        for n in 0..100 {
            x = rk4_step(&Decay, n as f64 * 0.01, &x, 0.01).unwrap();
        }
        assert!((x - (-1.0f64).exp()).abs() < 1e-9);
    }
}
