//! Maximum-likelihood inverse reinforcement learning
//!
//! Fits the parameters of a [`DifferentiableRf`](crate::DifferentiableRf) so that the
//! Boltzmann policy of a differentiable planner maximizes the likelihood of demonstrated
//! trajectories.
mod em;
mod mlirl;
mod request;

pub use em::{MultipleIntentionsMlirl, MultipleIntentionsRequest};
pub use mlirl::{
    log_likelihood, log_likelihood_gradient, log_likelihood_of_trajectory, log_policy_gradient,
    log_probability, perform_irl, IrlReport, Mlirl, MlirlConfig,
};
pub use request::MlirlRequest;

use crate::logging::LogError;
use crate::planning::PlanningError;
use thiserror::Error;

/// Error running inverse reinforcement learning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrlError {
    #[error("got {weights} episode weights for {episodes} episodes")]
    WeightCountMismatch { weights: usize, episodes: usize },
    #[error("the number of clusters must be at least 1, got {0}")]
    InvalidClusterCount(usize),
    #[error("planning error")]
    Planning(#[from] PlanningError),
    #[error("logging error")]
    Log(#[from] LogError),
}
