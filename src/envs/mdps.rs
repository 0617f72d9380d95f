//! Generic Markov Decision Processes
use super::{Mdp, Transition};
use crate::Prng;
use ndarray::{Array2, Axis};
use rand::distributions::{Distribution, WeightedError};
use rand_distr::{Dirichlet, WeightedAliasIndex};
use thiserror::Error;

/// An MDP with the transition function stored in a lookup table.
///
/// Given state index `s` and action index `a`,
/// `transitions[s, a]` lists the successor state indices with their probabilities.
/// Every action is available in every state.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    transitions: Array2<Vec<Transition<usize>>>,
    samplers: Array2<WeightedAliasIndex<f64>>,
    terminal: Vec<bool>,
    discount_factor: f64,
}

/// Error building a tabular MDP.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildMdpError {
    #[error("invalid successor distribution for state {state} action {action}")]
    InvalidDistribution {
        state: usize,
        action: usize,
        #[source]
        source: WeightedError,
    },
    #[error("successor state {successor} is out of range for {num_states} states")]
    SuccessorOutOfRange { successor: usize, num_states: usize },
    #[error("expected {expected} terminal flags, got {actual}")]
    TerminalFlagCount { expected: usize, actual: usize },
    #[error("invalid dirichlet prior (alpha = {alpha}, size = {size})")]
    InvalidDirichletPrior { alpha: f64, size: usize },
}

impl TabularMdp {
    /// Create a tabular MDP.
    ///
    /// # Args
    /// * `transitions` - Successor distributions indexed by `[state, action]`.
    /// * `terminal` - Whether each state is terminal. One entry per state.
    /// * `discount_factor` - Discount factor in `[0, 1]`.
    pub fn new(
        transitions: Array2<Vec<Transition<usize>>>,
        terminal: Vec<bool>,
        discount_factor: f64,
    ) -> Result<Self, BuildMdpError> {
        let num_states = transitions.len_of(Axis(0));
        if terminal.len() != num_states {
            return Err(BuildMdpError::TerminalFlagCount {
                expected: num_states,
                actual: terminal.len(),
            });
        }

        let mut samplers = Vec::with_capacity(transitions.len());
        for ((state, action), successors) in transitions.indexed_iter() {
            if let Some(t) = successors.iter().find(|t| t.successor >= num_states) {
                return Err(BuildMdpError::SuccessorOutOfRange {
                    successor: t.successor,
                    num_states,
                });
            }
            let weights = successors.iter().map(|t| t.probability).collect();
            let sampler = WeightedAliasIndex::new(weights).map_err(|source| {
                BuildMdpError::InvalidDistribution {
                    state,
                    action,
                    source,
                }
            })?;
            samplers.push(sampler);
        }
        let samplers = Array2::from_shape_vec(transitions.raw_dim(), samplers)
            .expect("one sampler per transition entry");

        Ok(Self {
            transitions,
            samplers,
            terminal,
            discount_factor,
        })
    }

    /// Create a deterministic tabular MDP from a table of successor state indices.
    pub fn deterministic(
        successors: &Array2<usize>,
        terminal: Vec<bool>,
        discount_factor: f64,
    ) -> Result<Self, BuildMdpError> {
        let transitions = successors.mapv(|s| vec![Transition::new(s, 1.0)]);
        Self::new(transitions, terminal, discount_factor)
    }

    /// Random MDP with Dirichlet sampled transition probabilities.
    ///
    /// Each state-action pair has a categorical successor state distribution sampled from
    /// a symmetric Dirichlet prior with concentration `alpha`.
    /// No state is terminal.
    pub fn random_dirichlet(
        num_states: usize,
        num_actions: usize,
        alpha: f64,
        discount_factor: f64,
        rng: &mut Prng,
    ) -> Result<Self, BuildMdpError> {
        let prior = Dirichlet::new_with_size(alpha, num_states).map_err(|_| {
            BuildMdpError::InvalidDirichletPrior {
                alpha,
                size: num_states,
            }
        })?;
        let transitions = Array2::from_shape_simple_fn((num_states, num_actions), || {
            prior
                .sample(rng)
                .into_iter()
                .enumerate()
                .filter(|(_, p)| *p > 0.0)
                .map(|(s, p)| Transition::new(s, p))
                .collect()
        });
        Self::new(transitions, vec![false; num_states], discount_factor)
    }

    pub fn num_states(&self) -> usize {
        self.transitions.len_of(Axis(0))
    }

    pub fn num_actions(&self) -> usize {
        self.transitions.len_of(Axis(1))
    }
}

impl Mdp for TabularMdp {
    type State = usize;
    type Action = usize;

    fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    fn actions(&self, _state: &Self::State) -> Vec<Self::Action> {
        (0..self.num_actions()).collect()
    }

    fn transitions(&self, state: &Self::State, action: &Self::Action) -> Vec<Transition<usize>> {
        self.transitions[(*state, *action)].clone()
    }

    fn sample_successor(
        &self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut Prng,
    ) -> usize {
        let index = self.samplers[(*state, *action)].sample(rng);
        self.transitions[(*state, *action)][index].successor
    }

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.terminal[*state]
    }
}
