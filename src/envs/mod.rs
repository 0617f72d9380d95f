//! Markov decision process domains
mod chain;
mod mdps;
#[cfg(test)]
pub mod testing;

pub use chain::{Chain, Move};
pub use mdps::{BuildMdpError, TabularMdp};

use crate::Prng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// A possible successor state along with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition<S> {
    pub successor: S,
    pub probability: f64,
}

impl<S> Transition<S> {
    pub const fn new(successor: S, probability: f64) -> Self {
        Self {
            successor,
            probability,
        }
    }
}

/// A Markov decision process with a known transition model.
///
/// The reward function is not part of the domain;
/// planners pair a domain with a separate [`DifferentiableRf`](crate::DifferentiableRf).
pub trait Mdp {
    /// Environment state.
    ///
    /// Equality and hashing must respect state identity:
    /// planners use states as keys of their value tables.
    type State: Clone + Eq + Hash + Debug;

    /// A fully specified action.
    type Action: Clone + PartialEq + Debug;

    /// A discount factor applied to future rewards.
    ///
    /// A value between `0` and `1`, inclusive.
    fn discount_factor(&self) -> f64;

    /// The actions that may be taken from a state.
    fn actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// The successor state distribution of taking an action in a state.
    ///
    /// Only successors with non-zero probability need to be listed.
    /// The probabilities must sum to 1.
    fn transitions(&self, state: &Self::State, action: &Self::Action)
        -> Vec<Transition<Self::State>>;

    /// Sample a successor state.
    ///
    /// The default implementation samples from [`Mdp::transitions`].
    /// Domains with large or continuous transition supports should override this.
    fn sample_successor(
        &self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut Prng,
    ) -> Self::State {
        let mut transitions = self.transitions(state, action);
        let index = WeightedIndex::new(transitions.iter().map(|t| t.probability))
            .map(|dist| dist.sample(rng))
            .unwrap_or(0);
        transitions.swap_remove(index).successor
    }

    /// Whether the state is terminal.
    ///
    /// Terminal states have value 0.
    fn is_terminal(&self, state: &Self::State) -> bool;
}

impl<M: Mdp + ?Sized> Mdp for &M {
    type State = M::State;
    type Action = M::Action;

    fn discount_factor(&self) -> f64 {
        M::discount_factor(self)
    }
    fn actions(&self, state: &Self::State) -> Vec<Self::Action> {
        M::actions(self, state)
    }
    fn transitions(
        &self,
        state: &Self::State,
        action: &Self::Action,
    ) -> Vec<Transition<Self::State>> {
        M::transitions(self, state, action)
    }
    fn sample_successor(
        &self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut Prng,
    ) -> Self::State {
        M::sample_successor(self, state, action, rng)
    }
    fn is_terminal(&self, state: &Self::State) -> bool {
        M::is_terminal(self, state)
    }
}
