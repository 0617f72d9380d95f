//! Differentiable value initialization for search tree leaves
use super::{DifferentiableRf, StateFeatures};
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value estimates for states at which a planner stops expanding, with gradients.
///
/// Leaf values are decoupled from the reward function so that they can act as shaping values.
/// They are evaluated against the planner's reward function `R`
/// because some initializers read (and are learned through) its parameter vector.
pub trait DifferentiableVInit<S, A, R: ?Sized> {
    /// Leaf value of a state.
    fn value(&self, reward_fn: &R, state: &S) -> f64;

    /// Gradient of [`DifferentiableVInit::value`] with respect to the reward parameters.
    fn value_gradient(&self, reward_fn: &R, state: &S) -> Array1<f64>;

    /// Leaf Q-value of a state-action pair.
    fn q_value(&self, reward_fn: &R, state: &S, _action: &A) -> f64 {
        self.value(reward_fn, state)
    }

    /// Gradient of [`DifferentiableVInit::q_value`] with respect to the reward parameters.
    fn q_gradient(&self, reward_fn: &R, state: &S, _action: &A) -> Array1<f64> {
        self.value_gradient(reward_fn, state)
    }
}

/// The same value for every state; independent of the reward parameters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantVInit(pub f64);

impl<S, A, R> DifferentiableVInit<S, A, R> for ConstantVInit
where
    R: DifferentiableRf<S, A> + ?Sized,
{
    fn value(&self, _: &R, _: &S) -> f64 {
        self.0
    }

    fn value_gradient(&self, reward_fn: &R, _: &S) -> Array1<f64> {
        Array1::zeros(reward_fn.num_parameters())
    }
}

/// Linear state reward function that also parameterizes linear leaf values.
///
/// The parameter vector is `[reward parameters | leaf value parameters]`:
/// * `r(s, a, s') = θ_r · φ(s')`
///     (or `φ(s)`, see [`LinearDiffRfVInit::with_current_state_features`])
/// * `v_leaf(s) = θ_v · ψ(s)`
///
/// Pair with [`LeafValuesFromRf`] as the leaf initializer of a planner so that
/// the leaf values are learned together with the reward.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDiffRfVInit<F, G> {
    reward_features: F,
    value_features: G,
    parameters: Array1<f64>,
    next_state_features: bool,
}

impl<F, G> LinearDiffRfVInit<F, G>
where
    F: StateFeatures,
    G: StateFeatures<State = F::State>,
{
    /// Create with all parameters set to zero.
    pub fn new(reward_features: F, value_features: G) -> Self {
        let dim = reward_features.num_features() + value_features.num_features();
        Self {
            reward_features,
            value_features,
            parameters: Array1::zeros(dim),
            next_state_features: true,
        }
    }

    /// Compute reward features from the state in which the action is taken.
    #[must_use]
    pub fn with_current_state_features(mut self) -> Self {
        self.next_state_features = false;
        self
    }

    /// Number of leading parameters that belong to the reward function.
    pub fn num_reward_parameters(&self) -> usize {
        self.reward_features.num_features()
    }

    /// Leaf value of a state.
    pub fn leaf_value(&self, state: &F::State) -> f64 {
        self.value_features
            .features(state)
            .dot(&self.parameters.slice(s![self.num_reward_parameters()..]))
    }

    /// Gradient of the leaf value with respect to all parameters.
    pub fn leaf_value_gradient(&self, state: &F::State) -> Array1<f64> {
        let mut gradient = Array1::zeros(self.parameters.len());
        gradient
            .slice_mut(s![self.num_reward_parameters()..])
            .assign(&self.value_features.features(state));
        gradient
    }

    fn reward_features(&self, state: &F::State, next_state: &F::State) -> Array1<f64> {
        if self.next_state_features {
            self.reward_features.features(next_state)
        } else {
            self.reward_features.features(state)
        }
    }
}

impl<A, F, G> DifferentiableRf<F::State, A> for LinearDiffRfVInit<F, G>
where
    F: StateFeatures,
    G: StateFeatures<State = F::State>,
{
    fn reward(&self, state: &F::State, _action: &A, next_state: &F::State) -> f64 {
        self.reward_features(state, next_state)
            .dot(&self.parameters.slice(s![..self.num_reward_parameters()]))
    }

    fn gradient(&self, state: &F::State, _action: &A, next_state: &F::State) -> Array1<f64> {
        let mut gradient = Array1::zeros(self.parameters.len());
        gradient
            .slice_mut(s![..self.num_reward_parameters()])
            .assign(&self.reward_features(state, next_state));
        gradient
    }

    fn parameters(&self) -> &Array1<f64> {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Array1<f64> {
        &mut self.parameters
    }
}

impl<F, G> fmt::Display for LinearDiffRfVInit<F, G> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LinearDiffRfVInit({})", self.parameters)
    }
}

/// Leaf values read from a [`LinearDiffRfVInit`] reward function.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafValuesFromRf;

impl<A, F, G> DifferentiableVInit<F::State, A, LinearDiffRfVInit<F, G>> for LeafValuesFromRf
where
    F: StateFeatures,
    G: StateFeatures<State = F::State>,
{
    fn value(&self, reward_fn: &LinearDiffRfVInit<F, G>, state: &F::State) -> f64 {
        reward_fn.leaf_value(state)
    }

    fn value_gradient(&self, reward_fn: &LinearDiffRfVInit<F, G>, state: &F::State) -> Array1<f64> {
        reward_fn.leaf_value_gradient(state)
    }
}
