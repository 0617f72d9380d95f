//! Differentiable sparse sampling
use super::dp;
use super::{BuildPlanner, PlanningError, QEstimate, QGradientPlanner};
use crate::envs::Mdp;
use crate::rewards::{ConstantVInit, DifferentiableRf, DifferentiableVInit};
use crate::utils::stats::OnlineMean;
use crate::Prng;
use ndarray::Array1;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// How the successor states of a search tree node are generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionSampling {
    /// Enumerate the full transition distribution and take the exact expectation.
    Exact,
    /// Sample this many successors per action and average.
    ///
    /// With 0 samples every node is a leaf whose Q-values come from the leaf value initializer.
    Sampled(usize),
}

impl Default for TransitionSampling {
    fn default() -> Self {
        Self::Exact
    }
}

/// Whether search tree results are kept between planning calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultRetention {
    /// Keep the tree until the solver is reset.
    Keep,
    /// Clear the tree after each call to `plan_from_state`.
    ///
    /// Keeps memory bounded when planning from many states,
    /// and stays correct if the reward parameters or the dynamics change between calls.
    ForgetAfterPlanning,
}

impl Default for ResultRetention {
    fn default() -> Self {
        Self::Keep
    }
}

/// Configuration of [`SparseSampling`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseSamplingConfig<V = ConstantVInit> {
    /// Tree height at the root. Nodes at height 0 are leaves.
    pub horizon: usize,
    pub sampling: TransitionSampling,
    /// Shrink the sample count with depth as `⌊c γ^(2 depth)⌋`, at least 1.
    ///
    /// Has no effect on [`TransitionSampling::Exact`].
    pub variable_sample_count: bool,
    pub retention: ResultRetention,
    /// Value initialization of leaf nodes.
    pub leaf_values: V,
}

impl Default for SparseSamplingConfig {
    fn default() -> Self {
        Self {
            horizon: 5,
            sampling: TransitionSampling::default(),
            variable_sample_count: false,
            retention: ResultRetention::default(),
            leaf_values: ConstantVInit::default(),
        }
    }
}

impl<V> SparseSamplingConfig<V> {
    /// Transition sampling at a tree node of the given height.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sampling_at_height(&self, height: usize, discount_factor: f64) -> TransitionSampling {
        match self.sampling {
            TransitionSampling::Sampled(c) if self.variable_sample_count => {
                let depth = self.horizon.saturating_sub(height);
                let count = (c as f64 * discount_factor.powf(2.0 * depth as f64)) as usize;
                TransitionSampling::Sampled(count.max(1))
            }
            sampling => sampling,
        }
    }
}

impl<M, R, V> BuildPlanner<M, R> for SparseSamplingConfig<V>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
    V: DifferentiableVInit<M::State, M::Action, R> + Clone,
{
    type Planner = SparseSampling<M, R, V>;

    fn build_planner(
        &self,
        domain: M,
        reward_fn: R,
        boltzmann_beta: f64,
        seed: u64,
    ) -> Self::Planner {
        SparseSampling::new(
            domain,
            reward_fn,
            boltzmann_beta,
            self.clone(),
            Prng::seed_from_u64(seed),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StateNode {
    value: f64,
    gradient: Array1<f64>,
    closed: bool,
}

impl StateNode {
    fn open(num_parameters: usize) -> Self {
        Self {
            value: 0.0,
            gradient: Array1::zeros(num_parameters),
            closed: false,
        }
    }
}

/// Memoized search tree of a [`SparseSampling`] planner.
///
/// Nodes are keyed by state and height.
/// The Q estimates of planning roots are stored separately.
#[derive(Debug, Clone)]
pub struct SearchCache<S, A> {
    nodes: HashMap<(S, usize), StateNode>,
    roots: HashMap<S, Vec<QEstimate<A>>>,
}

impl<S, A> Default for SearchCache<S, A> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: HashMap::new(),
        }
    }
}

impl<S: Eq + Hash, A> SearchCache<S, A> {
    /// Discard all tree nodes and root estimates.
    ///
    /// Required after the reward parameters or the dynamics change.
    pub fn invalidate(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    /// Number of tree nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether root estimates are stored for a state.
    pub fn contains_root(&self, state: &S) -> bool {
        self.roots.contains_key(state)
    }
}

/// Differentiable sparse sampling planner.
///
/// Depth-limited tree search that estimates Boltzmann Q-values and their reward parameter
/// gradients either from the full transition distribution or from sampled successors.
/// Memory and time are independent of the size of the state space.
/// Leaves are valued by a [`DifferentiableVInit`].
pub struct SparseSampling<M: Mdp, R, V = ConstantVInit> {
    domain: M,
    reward_fn: R,
    boltzmann_beta: f64,
    config: SparseSamplingConfig<V>,
    cache: SearchCache<M::State, M::Action>,
    rng: Prng,
    num_value_estimates: usize,
}

impl<M, R, V> fmt::Debug for SparseSampling<M, R, V>
where
    M: Mdp + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SparseSampling")
            .field("domain", &self.domain)
            .field("boltzmann_beta", &self.boltzmann_beta)
            .field("config", &self.config)
            .field("num_nodes", &self.cache.num_nodes())
            .field("num_value_estimates", &self.num_value_estimates)
            .finish()
    }
}

impl<M, R, V> SparseSampling<M, R, V>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
    V: DifferentiableVInit<M::State, M::Action, R>,
{
    pub fn new(
        domain: M,
        reward_fn: R,
        boltzmann_beta: f64,
        config: SparseSamplingConfig<V>,
        rng: Prng,
    ) -> Self {
        Self {
            domain,
            reward_fn,
            boltzmann_beta,
            config,
            cache: SearchCache::default(),
            rng,
            num_value_estimates: 0,
        }
    }

    pub const fn domain(&self) -> &M {
        &self.domain
    }

    pub const fn config(&self) -> &SparseSamplingConfig<V> {
        &self.config
    }

    pub fn set_horizon(&mut self, horizon: usize) {
        self.config.horizon = horizon;
    }

    pub fn set_sampling(&mut self, sampling: TransitionSampling) {
        self.config.sampling = sampling;
    }

    pub fn set_variable_sample_count(&mut self, variable_sample_count: bool) {
        self.config.variable_sample_count = variable_sample_count;
    }

    /// Set the result retention. Switching to forgetting clears the tree immediately.
    pub fn set_retention(&mut self, retention: ResultRetention) {
        self.config.retention = retention;
        if retention == ResultRetention::ForgetAfterPlanning {
            self.cache.nodes.clear();
        }
    }

    pub fn set_leaf_values(&mut self, leaf_values: V) {
        self.config.leaf_values = leaf_values;
    }

    pub const fn cache(&self) -> &SearchCache<M::State, M::Action> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SearchCache<M::State, M::Action> {
        &mut self.cache
    }

    /// Total number of non-terminal node value estimates since the last reset.
    pub const fn num_value_estimates(&self) -> usize {
        self.num_value_estimates
    }

    /// Boltzmann value of a state from its root Q estimates. Plans if necessary.
    pub fn value(&mut self, state: &M::State) -> Result<f64, PlanningError> {
        if self.domain.is_terminal(state) {
            return Ok(0.0);
        }
        let qs: Vec<f64> = self.q_estimates(state)?.iter().map(|e| e.q).collect();
        Ok(dp::soft_backup(&qs, self.boltzmann_beta))
    }

    /// Value and value gradient of the tree node for `state` at `height`.
    fn estimate_v(&mut self, state: &M::State, height: usize) -> (f64, Array1<f64>) {
        let num_parameters = self.reward_fn.num_parameters();
        let node = self
            .cache
            .nodes
            .entry((state.clone(), height))
            .or_insert_with(|| StateNode::open(num_parameters));
        if node.closed {
            return (node.value, node.gradient.clone());
        }

        let (value, gradient) = if self.domain.is_terminal(state) {
            (0.0, Array1::zeros(num_parameters))
        } else {
            let estimates = self.estimate_qs(state, height);
            self.num_value_estimates += 1;
            dp::soft_state_backup(&estimates, self.boltzmann_beta, num_parameters)
        };

        let node = StateNode {
            value,
            gradient: gradient.clone(),
            closed: true,
        };
        self.cache.nodes.insert((state.clone(), height), node);
        (value, gradient)
    }

    /// Q estimates of every action of `state` at the given tree height.
    fn estimate_qs(&mut self, state: &M::State, height: usize) -> Vec<QEstimate<M::Action>> {
        let sampling = self
            .config
            .sampling_at_height(height, self.domain.discount_factor());
        self.domain
            .actions(state)
            .into_iter()
            .map(|action| match sampling {
                _ if height == 0 => self.leaf_q_estimate(state, action),
                TransitionSampling::Sampled(0) => self.leaf_q_estimate(state, action),
                TransitionSampling::Sampled(count) => {
                    self.sampled_q_estimate(state, action, height, count)
                }
                TransitionSampling::Exact => self.exact_q_estimate(state, action, height),
            })
            .collect()
    }

    fn leaf_q_estimate(&self, state: &M::State, action: M::Action) -> QEstimate<M::Action> {
        let leaf_values = &self.config.leaf_values;
        let q = leaf_values.q_value(&self.reward_fn, state, &action);
        let gradient = leaf_values.q_gradient(&self.reward_fn, state, &action);
        QEstimate::new(action, q, gradient)
    }

    #[allow(clippy::cast_precision_loss)]
    fn sampled_q_estimate(
        &mut self,
        state: &M::State,
        action: M::Action,
        height: usize,
        count: usize,
    ) -> QEstimate<M::Action> {
        let discount_factor = self.domain.discount_factor();
        let mut q = OnlineMean::default();
        let mut gradient = Array1::zeros(self.reward_fn.num_parameters());
        for _ in 0..count {
            let next_state = self.domain.sample_successor(state, &action, &mut self.rng);
            let reward = self.reward_fn.reward(state, &action, &next_state);
            let (value, value_gradient) = self.estimate_v(&next_state, height - 1);
            q.push(reward + discount_factor * value);
            gradient += &self.reward_fn.gradient(state, &action, &next_state);
            gradient.scaled_add(discount_factor, &value_gradient);
        }
        gradient /= count as f64;
        QEstimate::new(action, q.mean(), gradient)
    }

    fn exact_q_estimate(
        &mut self,
        state: &M::State,
        action: M::Action,
        height: usize,
    ) -> QEstimate<M::Action> {
        let discount_factor = self.domain.discount_factor();
        let mut q = 0.0;
        let mut gradient = Array1::zeros(self.reward_fn.num_parameters());
        for t in self.domain.transitions(state, &action) {
            let reward = self.reward_fn.reward(state, &action, &t.successor);
            let (value, value_gradient) = self.estimate_v(&t.successor, height - 1);
            q += t.probability * (reward + discount_factor * value);
            gradient.scaled_add(
                t.probability,
                &self.reward_fn.gradient(state, &action, &t.successor),
            );
            gradient.scaled_add(t.probability * discount_factor, &value_gradient);
        }
        QEstimate::new(action, q, gradient)
    }
}

impl<M, R, V> QGradientPlanner for SparseSampling<M, R, V>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
    V: DifferentiableVInit<M::State, M::Action, R>,
{
    type State = M::State;
    type Action = M::Action;
    type Reward = R;

    fn plan_from_state(&mut self, state: &M::State) -> Result<(), PlanningError> {
        let forget = self.config.retention == ResultRetention::ForgetAfterPlanning;
        if forget {
            self.cache.roots.clear();
        }
        if self.cache.contains_root(state) {
            return Ok(());
        }

        let estimates = self.estimate_qs(state, self.config.horizon);
        self.cache.roots.insert(state.clone(), estimates);

        if forget {
            self.cache.nodes.clear();
        }
        Ok(())
    }

    fn q_estimates(
        &mut self,
        state: &M::State,
    ) -> Result<Vec<QEstimate<M::Action>>, PlanningError> {
        if !self.cache.contains_root(state) {
            self.plan_from_state(state)?;
        }
        Ok(self.cache.roots.get(state).cloned().unwrap_or_default())
    }

    fn value_gradient(&mut self, state: &M::State) -> Result<Array1<f64>, PlanningError> {
        let num_parameters = self.reward_fn.num_parameters();
        if self.domain.is_terminal(state) {
            return Ok(Array1::zeros(num_parameters));
        }
        let estimates = self.q_estimates(state)?;
        Ok(dp::soft_state_backup(&estimates, self.boltzmann_beta, num_parameters).1)
    }

    fn reset_solver(&mut self) {
        self.cache.invalidate();
        self.num_value_estimates = 0;
    }

    fn boltzmann_beta(&self) -> f64 {
        self.boltzmann_beta
    }

    fn set_boltzmann_beta(&mut self, beta: f64) {
        self.boltzmann_beta = beta;
    }

    fn reward_function(&self) -> &R {
        &self.reward_fn
    }

    fn reward_function_mut(&mut self) -> &mut R {
        &mut self.reward_fn
    }
}
