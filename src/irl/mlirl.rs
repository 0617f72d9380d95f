use super::{IrlError, MlirlRequest};
use crate::logging::{Event, Logger};
use crate::planning::{boltzmann, dp, PlanningError, QGradientPlanner};
use crate::rewards::DifferentiableRf;
use crate::simulation::Episode;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Configuration of maximum-likelihood IRL gradient ascent.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlirlConfig {
    /// Gradient ascent step size.
    pub learning_rate: f64,
    /// Stop once the log-likelihood changes by less than this in one step.
    pub max_likelihood_change: f64,
    /// Maximum number of gradient steps. Unbounded if `None`.
    pub max_steps: Option<usize>,
}

impl Default for MlirlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_likelihood_change: 0.01,
            max_steps: None,
        }
    }
}

/// Summary of a maximum-likelihood IRL run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IrlReport {
    /// Number of gradient steps taken.
    pub steps: usize,
    /// Log-likelihood before the first step and after each step.
    pub log_likelihoods: Vec<f64>,
}

impl IrlReport {
    pub fn initial_log_likelihood(&self) -> Option<f64> {
        self.log_likelihoods.first().copied()
    }

    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihoods.last().copied()
    }
}

/// Q-values, Q-gradients and the index of `action` at `state`.
fn action_q_arrays<P: QGradientPlanner>(
    planner: &mut P,
    state: &P::State,
    action: &P::Action,
) -> Result<(Vec<f64>, ndarray::Array2<f64>, usize), PlanningError> {
    let estimates = planner.q_estimates(state)?;
    let index = estimates
        .iter()
        .position(|e| &e.action == action)
        .ok_or_else(|| PlanningError::unknown_action(state, action))?;
    let (qs, q_gradients) = dp::q_arrays(&estimates, planner.reward_function().num_parameters());
    Ok((qs, q_gradients, index))
}

/// Log probability of taking `action` in `state` under the planner's Boltzmann policy.
///
/// # Errors
/// If the action is not available in the state.
pub fn log_probability<P: QGradientPlanner>(
    planner: &mut P,
    state: &P::State,
    action: &P::Action,
) -> Result<f64, PlanningError> {
    let (qs, _, index) = action_q_arrays(planner, state, action)?;
    Ok(boltzmann::log_probability(&qs, planner.boltzmann_beta(), index))
}

/// Gradient of the log probability of taking `action` in `state` under the Boltzmann policy.
///
/// # Errors
/// If the action is not available in the state.
pub fn log_policy_gradient<P: QGradientPlanner>(
    planner: &mut P,
    state: &P::State,
    action: &P::Action,
) -> Result<Array1<f64>, PlanningError> {
    let (qs, q_gradients, index) = action_q_arrays(planner, state, action)?;
    let beta = planner.boltzmann_beta();
    let probabilities = boltzmann::probabilities(&qs, beta);
    Ok(boltzmann::log_policy_gradient(
        beta,
        &probabilities,
        q_gradients.view(),
        index,
    ))
}

/// Weighted log-likelihood of one trajectory: `weight Σ_t log π(a_t | s_t)`.
pub fn log_likelihood_of_trajectory<P: QGradientPlanner>(
    planner: &mut P,
    episode: &Episode<P::State, P::Action>,
    weight: f64,
) -> Result<f64, PlanningError> {
    let mut total = 0.0;
    for (state, action) in episode.iter() {
        total += log_probability(planner, state, action)?;
    }
    Ok(weight * total)
}

/// Weighted log-likelihood of all the request's episodes.
///
/// Plans from every visited state that has no planning results.
pub fn log_likelihood<P: QGradientPlanner>(
    request: &mut MlirlRequest<P>,
) -> Result<f64, PlanningError> {
    let episodes = request.shared_episodes();
    let mut total = 0.0;
    for (i, episode) in episodes.iter().enumerate() {
        let weight = request.episode_weight(i);
        total += log_likelihood_of_trajectory(request.planner_mut(), episode, weight)?;
    }
    Ok(total)
}

/// Gradient of [`log_likelihood`] with respect to the reward parameters.
pub fn log_likelihood_gradient<P: QGradientPlanner>(
    request: &mut MlirlRequest<P>,
) -> Result<Array1<f64>, PlanningError> {
    let episodes = request.shared_episodes();
    let mut gradient = Array1::zeros(request.reward_function().num_parameters());
    for (i, episode) in episodes.iter().enumerate() {
        let weight = request.episode_weight(i);
        for (state, action) in episode.iter() {
            let step_gradient = log_policy_gradient(request.planner_mut(), state, action)?;
            gradient.scaled_add(weight, &step_gradient);
        }
    }
    Ok(gradient)
}

/// Run gradient ascent on the log-likelihood of the request's episodes.
///
/// Updates the reward parameters owned by the request's planner in place.
/// Stops once the change in log-likelihood is smaller than `config.max_likelihood_change`
/// or after `config.max_steps` steps.
///
/// # Errors
/// If an episode takes an action that the planner does not list for its state,
/// or if the request or logging is invalid.
pub fn perform_irl<P: QGradientPlanner>(
    request: &mut MlirlRequest<P>,
    config: &MlirlConfig,
    logger: &mut dyn Logger,
) -> Result<IrlReport, IrlError> {
    request.validate()?;
    request.planner_mut().reset_solver();
    let mut likelihood = log_likelihood(request)?;
    let mut report = IrlReport {
        steps: 0,
        log_likelihoods: vec![likelihood],
    };

    while config.max_steps.map_or(true, |max| report.steps < max) {
        let gradient = log_likelihood_gradient(request)?;
        let max_parameter_change = config.learning_rate
            * gradient.iter().fold(0.0, |max: f64, g| max.max(g.abs()));
        request
            .planner_mut()
            .reward_function_mut()
            .parameters_mut()
            .scaled_add(config.learning_rate, &gradient);

        request.planner_mut().reset_solver();
        let new_likelihood = log_likelihood(request)?;
        let likelihood_change = new_likelihood - likelihood;
        likelihood = new_likelihood;
        report.steps += 1;
        report.log_likelihoods.push(likelihood);

        logger.log(Event::GradientStep, "log_likelihood", likelihood.into())?;
        logger.log(Event::GradientStep, "likelihood_change", likelihood_change.into())?;
        logger.log(
            Event::GradientStep,
            "max_parameter_change",
            max_parameter_change.into(),
        )?;
        logger.done(Event::GradientStep);

        if likelihood_change.abs() < config.max_likelihood_change {
            break;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let steps = report.steps as f64;
    logger.log(Event::IrlRun, "steps", steps.into())?;
    logger.log(Event::IrlRun, "log_likelihood", likelihood.into())?;
    logger.done(Event::IrlRun);
    Ok(report)
}

/// Maximum-likelihood inverse reinforcement learning (MLIRL).
///
/// Finds reward parameters under which the planner's Boltzmann policy best explains
/// the demonstrated trajectories, by gradient ascent on their log-likelihood.
///
/// Babes-Vroman et al. "Apprenticeship Learning About Multiple Intentions". ICML 2011.
#[derive(Debug)]
pub struct Mlirl<P: QGradientPlanner> {
    request: MlirlRequest<P>,
    config: MlirlConfig,
}

impl<P: QGradientPlanner> Mlirl<P> {
    /// # Errors
    /// If the request is invalid.
    pub fn new(request: MlirlRequest<P>, config: MlirlConfig) -> Result<Self, IrlError> {
        request.validate()?;
        Ok(Self { request, config })
    }

    /// Run gradient ascent. See [`perform_irl`].
    pub fn perform_irl(&mut self, logger: &mut dyn Logger) -> Result<IrlReport, IrlError> {
        perform_irl(&mut self.request, &self.config, logger)
    }

    pub fn log_likelihood(&mut self) -> Result<f64, PlanningError> {
        log_likelihood(&mut self.request)
    }

    pub fn log_likelihood_gradient(&mut self) -> Result<Array1<f64>, PlanningError> {
        log_likelihood_gradient(&mut self.request)
    }

    pub const fn request(&self) -> &MlirlRequest<P> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut MlirlRequest<P> {
        &mut self.request
    }

    pub fn into_request(self) -> MlirlRequest<P> {
        self.request
    }

    pub const fn config(&self) -> &MlirlConfig {
        &self.config
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.config.learning_rate = learning_rate;
    }

    pub fn set_max_likelihood_change(&mut self, max_likelihood_change: f64) {
        self.config.max_likelihood_change = max_likelihood_change;
    }

    pub fn set_max_steps(&mut self, max_steps: Option<usize>) {
        self.config.max_steps = max_steps;
    }

    /// The learned reward function.
    pub fn reward_function(&self) -> &P::Reward {
        self.request.reward_function()
    }
}
