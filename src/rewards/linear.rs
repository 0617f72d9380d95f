//! Reward functions that are linear in their parameters
use super::{DifferentiableRf, StateFeatures};
use ndarray::{s, Array1};
use std::fmt;

/// Reward linear in the features of a single state: `r(s, a, s') = θ · φ(s')`.
///
/// By default the features are those of the next state `s'`;
/// see [`LinearStateRf::with_current_state_features`] to use `s` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearStateRf<F> {
    features: F,
    parameters: Array1<f64>,
    next_state_features: bool,
}

impl<F> LinearStateRf<F> {
    /// Create a reward function with all parameters set to zero.
    pub fn new(features: F) -> Self
    where
        F: StateFeatures,
    {
        let parameters = Array1::zeros(features.num_features());
        Self {
            features,
            parameters,
            next_state_features: true,
        }
    }

    /// Compute features from the state in which the action is taken.
    #[must_use]
    pub const fn with_current_state_features(mut self) -> Self {
        self.next_state_features = false;
        self
    }

    /// Replace the parameter vector.
    ///
    /// # Panics
    /// If the length differs from the number of features.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Array1<f64>) -> Self {
        assert_eq!(parameters.len(), self.parameters.len());
        self.parameters = parameters;
        self
    }

    const fn feature_state<'a, S>(&self, state: &'a S, next_state: &'a S) -> &'a S {
        if self.next_state_features {
            next_state
        } else {
            state
        }
    }
}

impl<A, F: StateFeatures> DifferentiableRf<F::State, A> for LinearStateRf<F> {
    fn reward(&self, state: &F::State, _action: &A, next_state: &F::State) -> f64 {
        self.features
            .features(self.feature_state(state, next_state))
            .dot(&self.parameters)
    }

    fn gradient(&self, state: &F::State, _action: &A, next_state: &F::State) -> Array1<f64> {
        self.features.features(self.feature_state(state, next_state))
    }

    fn parameters(&self) -> &Array1<f64> {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Array1<f64> {
        &mut self.parameters
    }
}

impl<F> fmt::Display for LinearStateRf<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LinearStateRf({})", self.parameters)
    }
}

/// Reward linear in state features with a separate parameter block per action.
///
/// `r(s, a, s') = θ_a · φ(s)` where `θ_a` is the block of parameters belonging to action `a`.
/// Actions that are not in the action list have zero reward and zero gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearStateActionRf<F, A> {
    features: F,
    actions: Vec<A>,
    num_state_features: usize,
    parameters: Array1<f64>,
}

impl<F, A> LinearStateActionRf<F, A> {
    /// Create a reward function with all parameters set to zero.
    pub fn new(features: F, actions: Vec<A>) -> Self
    where
        F: StateFeatures,
    {
        let num_state_features = features.num_features();
        let parameters = Array1::zeros(num_state_features * actions.len());
        Self {
            features,
            actions,
            num_state_features,
            parameters,
        }
    }

    /// Add an action with its own (zero-initialized) parameter block.
    pub fn add_action(&mut self, action: A) {
        self.actions.push(action);
        let mut parameters = Array1::zeros(self.num_state_features * self.actions.len());
        parameters
            .slice_mut(s![..self.parameters.len()])
            .assign(&self.parameters);
        self.parameters = parameters;
    }

    fn block(&self, action: &A) -> Option<usize>
    where
        A: PartialEq,
    {
        self.actions
            .iter()
            .position(|a| a == action)
            .map(|i| i * self.num_state_features)
    }
}

impl<A, F> DifferentiableRf<F::State, A> for LinearStateActionRf<F, A>
where
    A: PartialEq,
    F: StateFeatures,
{
    fn reward(&self, state: &F::State, action: &A, _next_state: &F::State) -> f64 {
        match self.block(action) {
            Some(start) => self.features.features(state).dot(
                &self
                    .parameters
                    .slice(s![start..start + self.num_state_features]),
            ),
            None => 0.0,
        }
    }

    fn gradient(&self, state: &F::State, action: &A, _next_state: &F::State) -> Array1<f64> {
        let mut gradient = Array1::zeros(self.parameters.len());
        if let Some(start) = self.block(action) {
            gradient
                .slice_mut(s![start..start + self.num_state_features])
                .assign(&self.features.features(state));
        }
        gradient
    }

    fn parameters(&self) -> &Array1<f64> {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Array1<f64> {
        &mut self.parameters
    }
}
