//! Differentiable planning and maximum-likelihood inverse reinforcement learning.
//!
//! Planners in [`planning`] compute a Boltzmann ("soft") value function together with its
//! gradient with respect to the parameters of a [`DifferentiableRf`].
//! The optimizers in [`irl`] use those gradients to fit reward parameters to expert
//! trajectories, optionally as a mixture of several reward intentions.
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::for_kv_map)] // part of warn(clippy::all), specifically style?
#![warn(clippy::missing_const_for_fn)] // has some false positives
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)] // also triggered by macro expansions
pub mod envs;
mod error;
pub mod irl;
pub mod logging;
pub mod planning;
pub mod rewards;
pub mod simulation;
pub mod utils;

pub use envs::{Mdp, Transition};
pub use error::Error;
pub use irl::{
    IrlError, Mlirl, MlirlConfig, MlirlRequest, MultipleIntentionsMlirl, MultipleIntentionsRequest,
};
pub use planning::{
    BuildPlanner, DifferentiableVi, DifferentiableViConfig, PlanningError, QEstimate,
    QGradientPlanner, SparseSampling, SparseSamplingConfig,
};
pub use rewards::DifferentiableRf;
pub use simulation::Episode;

/// Pseudo-random number generator used throughout the crate.
///
/// Always constructed from an explicit seed so that runs are reproducible.
pub type Prng = rand_chacha::ChaCha8Rng;
