//! Differentiable planners
//!
//! Planners compute Boltzmann Q-values along with their gradients with respect to the parameters
//! of a [`DifferentiableRf`].
pub mod boltzmann;
pub mod dp;
mod sparse;
#[cfg(test)]
pub mod testing;
mod vi;

pub use sparse::{
    ResultRetention, SearchCache, SparseSampling, SparseSamplingConfig, TransitionSampling,
};
pub use vi::{DifferentiableVi, DifferentiableViConfig};

use crate::envs::Mdp;
use crate::rewards::DifferentiableRf;
use ndarray::Array1;
use std::fmt::Debug;
use thiserror::Error;

/// Q-value of an action along with its gradient with respect to the reward parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QEstimate<A> {
    pub action: A,
    pub q: f64,
    pub gradient: Array1<f64>,
}

impl<A> QEstimate<A> {
    pub const fn new(action: A, q: f64, gradient: Array1<f64>) -> Self {
        Self {
            action,
            q,
            gradient,
        }
    }
}

/// Error from a differentiable planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error(
        "cannot run value iteration until the reachable states have been found; \
        call plan_from_state, perform_reachability_from or add_state_to_state_space first"
    )]
    ReachabilityNotPerformed,
    #[error("action {action} is not available in state {state}")]
    UnknownAction { state: String, action: String },
}

impl PlanningError {
    pub(crate) fn unknown_action<S: Debug, A: Debug>(state: &S, action: &A) -> Self {
        Self::UnknownAction {
            state: format!("{:?}", state),
            action: format!("{:?}", action),
        }
    }
}

/// A planner that provides Boltzmann Q-values and their reward parameter gradients.
///
/// The planner owns its reward function.
/// Cached results become stale as soon as the reward parameters change;
/// call [`QGradientPlanner::reset_solver`] before planning again.
pub trait QGradientPlanner {
    type State: Clone + Eq + std::hash::Hash + Debug;
    type Action: Clone + PartialEq + Debug;
    type Reward: DifferentiableRf<Self::State, Self::Action>;

    /// Plan from a state so that Q-values are available for it.
    ///
    /// Does nothing if results for the state are already available.
    fn plan_from_state(&mut self, state: &Self::State) -> Result<(), PlanningError>;

    /// Q-value and Q-value gradient of every action available in `state`.
    ///
    /// The order matches [`Mdp::actions`].
    /// May plan from `state` if no results are available.
    fn q_estimates(
        &mut self,
        state: &Self::State,
    ) -> Result<Vec<QEstimate<Self::Action>>, PlanningError>;

    /// Gradient of the (soft) state value with respect to the reward parameters.
    fn value_gradient(&mut self, state: &Self::State) -> Result<Array1<f64>, PlanningError>;

    /// Clear all planning results.
    fn reset_solver(&mut self);

    /// The Boltzmann inverse temperature used in backups.
    fn boltzmann_beta(&self) -> f64;

    /// Set the Boltzmann inverse temperature used in backups.
    ///
    /// Larger values make the backup closer to a hard max.
    fn set_boltzmann_beta(&mut self, beta: f64);

    fn reward_function(&self) -> &Self::Reward;

    /// Mutable access to the reward function.
    ///
    /// Results must be reset after changing the reward parameters.
    fn reward_function_mut(&mut self) -> &mut Self::Reward;

    /// Q-values of every action available in `state`.
    fn q_values(&mut self, state: &Self::State) -> Result<Vec<(Self::Action, f64)>, PlanningError> {
        Ok(self
            .q_estimates(state)?
            .into_iter()
            .map(|e| (e.action, e.q))
            .collect())
    }

    /// Q-value of one action.
    fn q_value(
        &mut self,
        state: &Self::State,
        action: &Self::Action,
    ) -> Result<f64, PlanningError> {
        Ok(find_estimate(self.q_estimates(state)?, state, action)?.q)
    }

    /// Q-value gradients of every action available in `state`.
    fn q_gradients(
        &mut self,
        state: &Self::State,
    ) -> Result<Vec<(Self::Action, Array1<f64>)>, PlanningError> {
        Ok(self
            .q_estimates(state)?
            .into_iter()
            .map(|e| (e.action, e.gradient))
            .collect())
    }

    /// Q-value gradient of one action.
    fn q_gradient(
        &mut self,
        state: &Self::State,
        action: &Self::Action,
    ) -> Result<Array1<f64>, PlanningError> {
        Ok(find_estimate(self.q_estimates(state)?, state, action)?.gradient)
    }
}

fn find_estimate<S: Debug, A: PartialEq + Debug>(
    estimates: Vec<QEstimate<A>>,
    state: &S,
    action: &A,
) -> Result<QEstimate<A>, PlanningError> {
    estimates
        .into_iter()
        .find(|e| &e.action == action)
        .ok_or_else(|| PlanningError::unknown_action(state, action))
}

/// Build a planner for a domain and reward function.
///
/// Used to create one planner per reward function when several are learned at once.
pub trait BuildPlanner<M: Mdp, R> {
    type Planner: QGradientPlanner<State = M::State, Action = M::Action, Reward = R>;

    /// Build a planner instance.
    ///
    /// # Args
    /// * `domain` - The domain to plan in.
    /// * `reward_fn` - The reward function, owned by the planner.
    /// * `boltzmann_beta` - Boltzmann inverse temperature of the backups.
    /// * `seed` - Seed for any pseudo-randomness used by the planner.
    fn build_planner(&self, domain: M, reward_fn: R, boltzmann_beta: f64, seed: u64)
        -> Self::Planner;
}
