use super::mlirl::{self, MlirlConfig};
use super::{IrlError, MlirlRequest};
use crate::envs::Mdp;
use crate::logging::{Event, Logger};
use crate::planning::{boltzmann, BuildPlanner, PlanningError, QGradientPlanner};
use crate::rewards::DifferentiableRf;
use crate::simulation::Episode;
use crate::Prng;
use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use std::fmt;
use std::rc::Rc;

/// A multiple intentions IRL problem: demonstrations generated by several unknown reward functions.
pub struct MultipleIntentionsRequest<M: Mdp, R, B> {
    pub domain: M,
    pub episodes: Rc<[Episode<M::State, M::Action>]>,
    /// Prototype of the reward function of each cluster.
    ///
    /// Each cluster gets its own copy with randomly initialized parameters.
    pub reward_fn: R,
    /// Number of clusters (intentions). At least 1.
    pub num_clusters: usize,
    /// Inverse temperature of the experts' Boltzmann policies.
    pub boltzmann_beta: f64,
    /// Builds the planner of each cluster.
    pub planner_builder: B,
    /// Seed for the cluster initialization and the cluster planners.
    pub seed: u64,
}

impl<M: Mdp, R, B> MultipleIntentionsRequest<M, R, B> {
    /// Create a request with `boltzmann_beta = 1` and seed 0.
    pub fn new<E>(
        domain: M,
        episodes: E,
        reward_fn: R,
        num_clusters: usize,
        planner_builder: B,
    ) -> Self
    where
        E: Into<Rc<[Episode<M::State, M::Action>]>>,
    {
        Self {
            domain,
            episodes: episodes.into(),
            reward_fn,
            num_clusters,
            boltzmann_beta: 1.0,
            planner_builder,
            seed: 0,
        }
    }

    #[must_use]
    pub const fn with_boltzmann_beta(mut self, boltzmann_beta: f64) -> Self {
        self.boltzmann_beta = boltzmann_beta;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// # Errors
    /// If there are no clusters.
    pub const fn validate(&self) -> Result<(), IrlError> {
        if self.num_clusters == 0 {
            return Err(IrlError::InvalidClusterCount(self.num_clusters));
        }
        Ok(())
    }
}

/// Multiple intentions IRL by expectation-maximization over MLIRL.
///
/// Each cluster has its own reward function and planner.
/// The E-step computes the probability of each trajectory belonging to each cluster;
/// the M-step runs MLIRL for each cluster with trajectories weighted by those probabilities.
///
/// Babes-Vroman et al. "Apprenticeship Learning About Multiple Intentions". ICML 2011.
pub struct MultipleIntentionsMlirl<P: QGradientPlanner> {
    clusters: Vec<MlirlRequest<P>>,
    priors: Vec<f64>,
    episodes: Rc<[Episode<P::State, P::Action>]>,
    config: MlirlConfig,
    num_em_iterations: usize,
}

impl<P> fmt::Debug for MultipleIntentionsMlirl<P>
where
    P: QGradientPlanner + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MultipleIntentionsMlirl")
            .field("clusters", &self.clusters)
            .field("priors", &self.priors)
            .field("config", &self.config)
            .field("num_em_iterations", &self.num_em_iterations)
            .finish()
    }
}

impl<P: QGradientPlanner> MultipleIntentionsMlirl<P> {
    /// Initialize the clusters.
    ///
    /// Cluster reward parameters are drawn uniformly from `[-1, 1]` and the priors are uniform.
    ///
    /// # Args
    /// * `request` - The problem definition.
    /// * `config` - Configuration of the MLIRL run in each M-step.
    /// * `num_em_iterations` - Number of EM iterations performed by `perform_irl`.
    ///
    /// # Errors
    /// If the request is invalid.
    pub fn new<M, R, B>(
        request: MultipleIntentionsRequest<M, R, B>,
        config: MlirlConfig,
        num_em_iterations: usize,
    ) -> Result<Self, IrlError>
    where
        M: Mdp<State = P::State, Action = P::Action> + Clone,
        R: DifferentiableRf<P::State, P::Action> + Clone,
        B: BuildPlanner<M, R, Planner = P>,
        P: QGradientPlanner<Reward = R>,
    {
        request.validate()?;
        let mut rng = Prng::seed_from_u64(request.seed);
        let initial_parameters = Uniform::new_inclusive(-1.0, 1.0);

        let k = request.num_clusters;
        let clusters = (0..k)
            .map(|_| {
                let mut reward_fn = request.reward_fn.clone();
                reward_fn
                    .parameters_mut()
                    .mapv_inplace(|_| initial_parameters.sample(&mut rng));
                let planner = request.planner_builder.build_planner(
                    request.domain.clone(),
                    reward_fn,
                    request.boltzmann_beta,
                    rng.gen(),
                );
                MlirlRequest::new(
                    planner,
                    Rc::clone(&request.episodes),
                    request.boltzmann_beta,
                )
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let priors = vec![1.0 / k as f64; k];
        Ok(Self {
            clusters,
            priors,
            episodes: request.episodes,
            config,
            num_em_iterations,
        })
    }

    /// Run expectation-maximization.
    ///
    /// # Returns
    /// The mixture log-likelihood of the episodes at the start of each iteration.
    pub fn perform_irl(&mut self, logger: &mut dyn Logger) -> Result<Vec<f64>, IrlError> {
        let mut history = Vec::with_capacity(self.num_em_iterations);
        for _ in 0..self.num_em_iterations {
            let (responsibilities, mixture_log_likelihood) = self.expectation()?;
            if !self.episodes.is_empty() {
                if let Some(priors) = responsibilities.mean_axis(Axis(1)) {
                    self.priors = priors.to_vec();
                }
            }

            for (cluster, weights) in self
                .clusters
                .iter_mut()
                .zip(responsibilities.outer_iter())
            {
                cluster.set_episode_weights(weights.to_vec())?;
                mlirl::perform_irl(cluster, &self.config, logger)?;
            }

            let max_prior = self.priors.iter().copied().fold(0.0, f64::max);
            logger.log(
                Event::EmIteration,
                "mixture_log_likelihood",
                mixture_log_likelihood.into(),
            )?;
            logger.log(Event::EmIteration, "max_prior", max_prior.into())?;
            logger.done(Event::EmIteration);
            history.push(mixture_log_likelihood);
        }
        Ok(history)
    }

    /// Probability of each cluster given a trajectory.
    pub fn cluster_probabilities(
        &mut self,
        episode: &Episode<P::State, P::Action>,
    ) -> Result<Vec<f64>, PlanningError> {
        let log_joint = self.log_joint(episode)?;
        Ok(boltzmann::probabilities(&log_joint, 1.0))
    }

    /// Reward function of each cluster.
    pub fn cluster_reward_functions(&self) -> Vec<&P::Reward> {
        self.clusters
            .iter()
            .map(MlirlRequest::reward_function)
            .collect()
    }

    /// Prior probability of each cluster.
    pub fn cluster_priors(&self) -> &[f64] {
        &self.priors
    }

    pub fn clusters(&self) -> &[MlirlRequest<P>] {
        &self.clusters
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub const fn config(&self) -> &MlirlConfig {
        &self.config
    }

    pub fn set_num_em_iterations(&mut self, num_em_iterations: usize) {
        self.num_em_iterations = num_em_iterations;
    }

    /// `log(prior_i) + log p(episode | cluster i)` for each cluster.
    fn log_joint(
        &mut self,
        episode: &Episode<P::State, P::Action>,
    ) -> Result<Vec<f64>, PlanningError> {
        self.clusters
            .iter_mut()
            .zip(&self.priors)
            .map(|(cluster, prior)| -> Result<f64, PlanningError> {
                let likelihood =
                    mlirl::log_likelihood_of_trajectory(cluster.planner_mut(), episode, 1.0)?;
                Ok(prior.ln() + likelihood)
            })
            .collect()
    }

    /// Cluster responsibilities `[num_clusters, num_episodes]` and the mixture log-likelihood.
    fn expectation(&mut self) -> Result<(Array2<f64>, f64), PlanningError> {
        let episodes = Rc::clone(&self.episodes);
        let mut responsibilities = Array2::zeros((self.clusters.len(), episodes.len()));
        let mut mixture_log_likelihood = 0.0;
        for (episode, mut column) in episodes
            .iter()
            .zip(responsibilities.axis_iter_mut(Axis(1)))
        {
            let log_joint = self.log_joint(episode)?;
            mixture_log_likelihood += log_sum_exp(&log_joint);
            for (r, p) in column.iter_mut().zip(boltzmann::probabilities(&log_joint, 1.0)) {
                *r = p;
            }
        }
        Ok((responsibilities, mixture_log_likelihood))
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = boltzmann::max_beta_scaled(values, 1.0);
    boltzmann::log_sum(values, max, 1.0)
}
