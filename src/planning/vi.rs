//! Differentiable value iteration
use super::dp::{self, ValueTable};
use super::{BuildPlanner, PlanningError, QEstimate, QGradientPlanner};
use crate::envs::{Mdp, Transition};
use crate::rewards::DifferentiableRf;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Configuration of [`DifferentiableVi`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentiableViConfig {
    /// Stop once the largest value change in a sweep is smaller than this.
    pub max_delta: f64,
    /// Maximum number of sweeps over the state space.
    pub max_iterations: usize,
    /// Do not expand the reachability search from terminal states.
    pub prune_at_terminal_states: bool,
}

impl Default for DifferentiableViConfig {
    fn default() -> Self {
        Self {
            max_delta: 0.01,
            max_iterations: 500,
            prune_at_terminal_states: false,
        }
    }
}

impl<M, R> BuildPlanner<M, R> for DifferentiableViConfig
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
{
    type Planner = DifferentiableVi<M, R>;

    fn build_planner(
        &self,
        domain: M,
        reward_fn: R,
        boltzmann_beta: f64,
        _seed: u64,
    ) -> Self::Planner {
        DifferentiableVi::new(domain, reward_fn, boltzmann_beta, *self)
    }
}

/// Value iteration with the Boltzmann backup operator over the reachable state space.
///
/// Computes the soft value function and its gradient with respect to the parameters of a
/// [`DifferentiableRf`] as a fixed point of sweeps over every state reachable from the
/// planning start states.
pub struct DifferentiableVi<M: Mdp, R> {
    domain: M,
    reward_fn: R,
    boltzmann_beta: f64,
    config: DifferentiableViConfig,

    table: ValueTable<M::State>,
    /// Indexed state space in discovery order.
    states: Vec<M::State>,
    indexed: HashSet<M::State>,
    /// Cached action transitions of expanded states.
    transition_dynamics: HashMap<M::State, Vec<(M::Action, Vec<Transition<M::State>>)>>,
    found_reachable_states: bool,
    last_num_passes: usize,
}

impl<M, R> fmt::Debug for DifferentiableVi<M, R>
where
    M: Mdp + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DifferentiableVi")
            .field("domain", &self.domain)
            .field("boltzmann_beta", &self.boltzmann_beta)
            .field("config", &self.config)
            .field("num_states", &self.states.len())
            .finish()
    }
}

impl<M, R> DifferentiableVi<M, R>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
{
    pub fn new(
        domain: M,
        reward_fn: R,
        boltzmann_beta: f64,
        config: DifferentiableViConfig,
    ) -> Self {
        let table = ValueTable::new(reward_fn.num_parameters());
        Self {
            domain,
            reward_fn,
            boltzmann_beta,
            config,
            table,
            states: Vec::new(),
            indexed: HashSet::new(),
            transition_dynamics: HashMap::new(),
            found_reachable_states: false,
            last_num_passes: 0,
        }
    }

    pub const fn domain(&self) -> &M {
        &self.domain
    }

    pub const fn config(&self) -> &DifferentiableViConfig {
        &self.config
    }

    /// Set whether the reachability search stops expanding at terminal states.
    pub fn set_prune_at_terminal_states(&mut self, prune: bool) {
        self.config.prune_at_terminal_states = prune;
    }

    /// Number of states in the indexed state space.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Number of sweeps performed by the most recent run of value iteration.
    pub const fn last_num_passes(&self) -> usize {
        self.last_num_passes
    }

    /// The soft value of a state; 0 if it has not been backed up.
    pub fn value(&self, state: &M::State) -> f64 {
        self.table.value(state)
    }

    /// Add a state to the state space over which value iteration sweeps.
    ///
    /// Counts as a reachability analysis.
    pub fn add_state_to_state_space(&mut self, state: M::State) {
        self.index_state(state);
        self.found_reachable_states = true;
    }

    /// Add several states to the state space over which value iteration sweeps.
    pub fn add_states_to_state_space<I: IntoIterator<Item = M::State>>(&mut self, states: I) {
        for state in states {
            self.add_state_to_state_space(state);
        }
    }

    /// Forget the reachable states and their cached transition dynamics.
    ///
    /// The values are kept. Since `plan_from_state` returns early for any state that
    /// already has a value, previously solved states are not replanned; call
    /// [`reset_solver`](QGradientPlanner::reset_solver) after the dynamics change, or
    /// [`run_vi`](Self::run_vi) after re-adding the states, to update them.
    pub fn recompute_reachable_states(&mut self) {
        self.found_reachable_states = false;
        self.states.clear();
        self.indexed.clear();
        self.transition_dynamics.clear();
    }

    /// Breadth-first search over all transitions to find the states reachable from `state`.
    ///
    /// The transition dynamics of every expanded state are cached.
    ///
    /// # Returns
    /// `false` if `state` had already been expanded by a previous search, `true` otherwise.
    pub fn perform_reachability_from(&mut self, state: &M::State) -> bool {
        if self.transition_dynamics.contains_key(state) {
            self.found_reachable_states = true;
            return false;
        }

        let mut open = VecDeque::new();
        let mut opened = HashSet::new();
        open.push_back(state.clone());
        opened.insert(state.clone());

        while let Some(state) = open.pop_front() {
            self.index_state(state.clone());
            if self.config.prune_at_terminal_states && self.domain.is_terminal(&state) {
                continue;
            }
            for (_, transitions) in self.action_transitions(&state) {
                for t in transitions {
                    if !opened.contains(&t.successor)
                        && !self.transition_dynamics.contains_key(&t.successor)
                    {
                        opened.insert(t.successor.clone());
                        open.push_back(t.successor.clone());
                    }
                }
            }
        }

        self.found_reachable_states = true;
        true
    }

    /// Run value iteration sweeps until the value change is below `max_delta`
    /// or `max_iterations` sweeps have been performed.
    ///
    /// Stopping at the iteration limit is not an error; the result is a best-effort estimate.
    ///
    /// # Returns
    /// The number of sweeps performed.
    ///
    /// # Errors
    /// If no reachability analysis has been performed.
    pub fn run_vi(&mut self) -> Result<usize, PlanningError> {
        if !self.found_reachable_states {
            return Err(PlanningError::ReachabilityNotPerformed);
        }

        let mut passes = 0;
        while passes < self.config.max_iterations {
            passes += 1;
            let mut delta: f64 = 0.0;
            for i in 0..self.states.len() {
                let state = self.states[i].clone();
                let (value, gradient) = self.backup(&state);
                let old_value = self.table.insert(state, value, gradient).unwrap_or(0.0);
                delta = delta.max((value - old_value).abs());
            }
            if delta < self.config.max_delta {
                break;
            }
        }
        self.last_num_passes = passes;
        Ok(passes)
    }

    /// Soft value and value gradient backup of a single state.
    fn backup(&mut self, state: &M::State) -> (f64, Array1<f64>) {
        if self.domain.is_terminal(state) {
            return (0.0, Array1::zeros(self.reward_fn.num_parameters()));
        }
        let estimates = self.state_q_estimates(state);
        dp::soft_state_backup(
            &estimates,
            self.boltzmann_beta,
            self.reward_fn.num_parameters(),
        )
    }

    /// Q estimates from the current value table without planning.
    fn state_q_estimates(&mut self, state: &M::State) -> Vec<QEstimate<M::Action>> {
        self.cache_transitions(state);
        let discount_factor = self.domain.discount_factor();
        self.transition_dynamics[state]
            .iter()
            .map(|(action, transitions)| {
                let (q, gradient) = dp::q_backup(
                    &self.reward_fn,
                    &self.table,
                    discount_factor,
                    state,
                    action,
                    transitions,
                );
                QEstimate::new(action.clone(), q, gradient)
            })
            .collect()
    }

    fn action_transitions(
        &mut self,
        state: &M::State,
    ) -> Vec<(M::Action, Vec<Transition<M::State>>)> {
        self.cache_transitions(state);
        self.transition_dynamics[state].clone()
    }

    fn cache_transitions(&mut self, state: &M::State) {
        if !self.transition_dynamics.contains_key(state) {
            let dynamics = self
                .domain
                .actions(state)
                .into_iter()
                .map(|action| {
                    let transitions = self.domain.transitions(state, &action);
                    (action, transitions)
                })
                .collect();
            self.transition_dynamics.insert(state.clone(), dynamics);
        }
    }

    fn index_state(&mut self, state: M::State) {
        if self.indexed.insert(state.clone()) {
            self.states.push(state);
        }
    }
}

impl<M, R> QGradientPlanner for DifferentiableVi<M, R>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
{
    type State = M::State;
    type Action = M::Action;
    type Reward = R;

    fn plan_from_state(&mut self, state: &M::State) -> Result<(), PlanningError> {
        if self.table.contains(state) {
            return Ok(());
        }
        self.perform_reachability_from(state);
        self.run_vi()?;
        Ok(())
    }

    fn q_estimates(
        &mut self,
        state: &M::State,
    ) -> Result<Vec<QEstimate<M::Action>>, PlanningError> {
        self.plan_from_state(state)?;
        Ok(self.state_q_estimates(state))
    }

    fn value_gradient(&mut self, state: &M::State) -> Result<Array1<f64>, PlanningError> {
        Ok(self.table.gradient(state).to_owned())
    }

    fn reset_solver(&mut self) {
        self.table.reset(self.reward_fn.num_parameters());
        self.recompute_reachable_states();
        self.last_num_passes = 0;
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

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::envs::testing::three_state_stochastic;
    use crate::envs::{Chain, TabularMdp};
    use crate::rewards::{LinearStateRf, OneHotFeatures};
    use ndarray::{array, Array2};

    fn tight_config() -> DifferentiableViConfig {
        DifferentiableViConfig {
            max_delta: 1e-12,
            max_iterations: 10_000,
            prune_at_terminal_states: false,
        }
    }

    #[test]
    fn single_action_backup_is_bellman_backup() {
        // 0 -> 1 -> 2 (terminal)
        let mdp = TabularMdp::deterministic(&array![[1], [2], [2]], vec![false, false, true], 0.9)
            .unwrap();
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.0, 1.0, 3.0]);
        let mut planner = DifferentiableVi::new(mdp, rf, 0.5, tight_config());
        planner.plan_from_state(&0).unwrap();

        assert_eq!(planner.value(&2), 0.0);
        assert!((planner.value(&1) - 3.0).abs() < 1e-12);
        assert!((planner.value(&0) - (1.0 + 0.9 * 3.0)).abs() < 1e-12);
        let gradient = planner.value_gradient(&0).unwrap();
        assert!((gradient - array![0.0, 1.0, 0.9]).iter().all(|x| x.abs() < 1e-12));
    }

    #[test]
    fn run_vi_requires_reachability() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3));
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.0, tight_config());
        assert_eq!(planner.run_vi(), Err(PlanningError::ReachabilityNotPerformed));
        planner.add_state_to_state_space(0);
        assert!(planner.run_vi().is_ok());
    }

    #[test]
    fn reachability_finds_all_states() {
        let rf = LinearStateRf::new(OneHotFeatures::new(6));
        let mut planner = DifferentiableVi::new(Chain::new(6, 0.9, 0.0), rf, 1.0, tight_config());
        assert!(planner.perform_reachability_from(&2));
        assert_eq!(planner.num_states(), 6);
        assert!(!planner.perform_reachability_from(&2));
    }

    #[test]
    fn reachability_prunes_terminal_states() {
        // 0 -> 1 (terminal) -> 2
        let successors: Array2<usize> = array![[1], [2], [2]];
        let terminal = vec![false, true, false];
        let rf = LinearStateRf::new(OneHotFeatures::new(3));
        let mdp = TabularMdp::deterministic(&successors, terminal.clone(), 0.9).unwrap();
        let mut planner = DifferentiableVi::new(mdp, rf.clone(), 1.0, tight_config());
        planner.perform_reachability_from(&0);
        assert_eq!(planner.num_states(), 3);

        let mdp = TabularMdp::deterministic(&successors, terminal, 0.9).unwrap();
        let mut planner = DifferentiableVi::new(mdp, rf, 1.0, tight_config());
        planner.set_prune_at_terminal_states(true);
        planner.perform_reachability_from(&0);
        assert_eq!(planner.num_states(), 2);
    }

    #[test]
    fn plan_is_idempotent() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.5, -1.0, 2.0]);
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 2.0, tight_config());
        planner.plan_from_state(&0).unwrap();
        let first = planner.q_values(&0).unwrap();
        let passes = planner.last_num_passes();
        assert!(passes > 1);

        planner.plan_from_state(&0).unwrap();
        let second = planner.q_values(&0).unwrap();
        assert_eq!(first, second);
        assert_eq!(planner.last_num_passes(), passes);
    }

    #[test]
    fn iteration_limit_is_silent() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![1.0, 1.0, 1.0]);
        let config = DifferentiableViConfig {
            max_delta: 0.0,
            max_iterations: 3,
            prune_at_terminal_states: false,
        };
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.0, config);
        planner.plan_from_state(&0).unwrap();
        assert_eq!(planner.last_num_passes(), 3);
    }

    #[test]
    fn reset_clears_results() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![1.0, 0.0, 0.0]);
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.0, tight_config());
        planner.plan_from_state(&0).unwrap();
        let before = planner.value(&0);
        assert!(before > 0.0);

        DifferentiableRf::<usize, usize>::parameters_mut(planner.reward_function_mut())[0] = 2.0;
        planner.reset_solver();
        assert_eq!(planner.value(&0), 0.0);
        assert_eq!(planner.num_states(), 0);
        planner.plan_from_state(&0).unwrap();
        assert!(planner.value(&0) > before);
    }

    #[test]
    fn recompute_reachable_states_keeps_values() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![1.0, 0.0, 0.0]);
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.0, tight_config());
        planner.plan_from_state(&0).unwrap();
        let value = planner.value(&0);

        planner.recompute_reachable_states();
        assert_eq!(planner.num_states(), 0);
        assert_eq!(planner.value(&0), value);
        // Solved states are not replanned
        planner.plan_from_state(&0).unwrap();
        assert_eq!(planner.num_states(), 0);
        assert_eq!(planner.run_vi(), Err(PlanningError::ReachabilityNotPerformed));

        assert!(planner.perform_reachability_from(&0));
        planner.run_vi().unwrap();
        assert!((planner.value(&0) - value).abs() < 1e-9);
    }

    #[test]
    fn large_beta_matches_hard_value_iteration() {
        let mdp = three_state_stochastic();
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.2, 1.0, -0.5]);
        let hard = testing::hard_value_iteration(&mdp, &rf, &0, 1e-12);
        let mut planner = DifferentiableVi::new(mdp, rf, 500.0, tight_config());
        planner.plan_from_state(&0).unwrap();
        for (state, value) in hard {
            assert!((planner.value(&state) - value).abs() < 1e-3);
        }
    }

    #[test]
    fn value_gradient_finite_difference() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.3, -0.2, 0.7]);
        let planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.5, tight_config());
        testing::check_value_gradient(planner, &0, 1e-6);
    }

    #[test]
    fn q_gradient_finite_difference() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.3, -0.2, 0.7]);
        let planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.5, tight_config());
        testing::check_q_gradients(planner, &0, 1e-6);
    }

    #[test]
    fn unknown_action_is_an_error() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3));
        let mut planner = DifferentiableVi::new(three_state_stochastic(), rf, 1.0, tight_config());
        assert!(matches!(
            planner.q_value(&0, &5),
            Err(PlanningError::UnknownAction { .. })
        ));
    }
}
