//! Chain environment
use super::{Mdp, Transition};
use serde::{Deserialize, Serialize};

/// Chain Environment
///
/// Consists of n states in a line with 2 actions.
/// * Action `Left` moves one state towards the start (a self-transition in the first state).
/// * Action `Right` moves one state towards the end (a self-transition in the last state).
/// * Every action has a `slip_probability` chance of "slipping" and taking the opposite action.
///
/// There are no terminal states.
/// Rewards are supplied separately, typically as a function of state features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub size: usize,
    pub discount_factor: f64,
    pub slip_probability: f64,
}

impl Chain {
    pub const fn new(size: usize, discount_factor: f64, slip_probability: f64) -> Self {
        Self {
            size,
            discount_factor,
            slip_probability,
        }
    }

    /// The state reached by a move that does not slip.
    pub const fn step(&self, state: usize, action: Move) -> usize {
        match action {
            Move::Left => state.saturating_sub(1),
            Move::Right => {
                if state + 1 >= self.size {
                    state
                } else {
                    state + 1
                }
            }
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            size: 5,
            discount_factor: 0.95,
            slip_probability: 0.2,
        }
    }
}

impl Mdp for Chain {
    type State = usize;
    type Action = Move;

    fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    fn actions(&self, _state: &Self::State) -> Vec<Self::Action> {
        vec![Move::Left, Move::Right]
    }

    fn transitions(&self, state: &Self::State, action: &Self::Action) -> Vec<Transition<usize>> {
        let intended = self.step(*state, *action);
        let slipped = self.step(*state, action.swap());
        if intended == slipped || self.slip_probability <= 0.0 {
            return vec![Transition::new(intended, 1.0)];
        }
        vec![
            Transition::new(intended, 1.0 - self.slip_probability),
            Transition::new(slipped, self.slip_probability),
        ]
    }

    fn is_terminal(&self, _state: &Self::State) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Left,
    Right,
}

impl Move {
    pub const fn swap(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}
