//! Differentiable reward functions
mod features;
mod linear;
mod vinit;

pub use features::{FnFeatures, OneHotFeatures, StateFeatures};
pub use linear::{LinearStateActionRf, LinearStateRf};
pub use vinit::{ConstantVInit, DifferentiableVInit, LeafValuesFromRf, LinearDiffRfVInit};

use ndarray::Array1;

/// A parametric reward function that can report its gradient with respect to its parameters.
///
/// Cloning a reward function produces an independent copy with its own parameter vector.
pub trait DifferentiableRf<S, A> {
    /// The reward of a transition.
    fn reward(&self, state: &S, action: &A, next_state: &S) -> f64;

    /// Gradient of [`DifferentiableRf::reward`] with respect to the parameters.
    ///
    /// Has length [`DifferentiableRf::num_parameters`].
    fn gradient(&self, state: &S, action: &A, next_state: &S) -> Array1<f64>;

    /// The current parameter vector.
    fn parameters(&self) -> &Array1<f64>;

    /// Mutable access to the parameter vector.
    ///
    /// Planner results computed with the old parameters are stale after any change.
    fn parameters_mut(&mut self) -> &mut Array1<f64>;

    /// Dimension of the parameter vector.
    fn num_parameters(&self) -> usize {
        self.parameters().len()
    }
}

impl<S, A, R: DifferentiableRf<S, A> + ?Sized> DifferentiableRf<S, A> for Box<R> {
    fn reward(&self, state: &S, action: &A, next_state: &S) -> f64 {
        R::reward(self, state, action, next_state)
    }
    fn gradient(&self, state: &S, action: &A, next_state: &S) -> Array1<f64> {
        R::gradient(self, state, action, next_state)
    }
    fn parameters(&self) -> &Array1<f64> {
        R::parameters(self)
    }
    fn parameters_mut(&mut self) -> &mut Array1<f64> {
        R::parameters_mut(self)
    }
    fn num_parameters(&self) -> usize {
        R::num_parameters(self)
    }
}
