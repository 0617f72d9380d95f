//! Domain testing utilities
use super::{Mdp, TabularMdp, Transition};
use crate::Prng;
use ndarray::Array2;
use rand::SeedableRng;

/// Check that every action's successor distribution is valid and that sampling agrees with it.
///
/// Visits the states reachable from `initial_state` breadth first (up to 100 states).
pub fn check_transitions<M: Mdp>(mdp: &M, initial_state: M::State) {
    let mut rng = Prng::seed_from_u64(0);
    let mut open = vec![initial_state];
    let mut seen = open.clone();
    while let Some(state) = open.pop() {
        for action in mdp.actions(&state) {
            let transitions = mdp.transitions(&state, &action);
            assert!(!transitions.is_empty());
            let total: f64 = transitions.iter().map(|t| t.probability).sum();
            assert!((total - 1.0).abs() < 1e-8, "probabilities sum to {}", total);
            assert!(transitions.iter().all(|t| t.probability >= 0.0));

            let sampled = mdp.sample_successor(&state, &action, &mut rng);
            assert!(transitions.iter().any(|t| t.successor == sampled));

            for t in transitions {
                if seen.len() < 100 && !seen.contains(&t.successor) {
                    seen.push(t.successor.clone());
                    open.push(t.successor);
                }
            }
        }
    }
}

/// A two-state MDP with an absorbing terminal state.
///
/// State 0 has two actions that both lead to the terminal state 1.
pub fn two_state_terminal() -> TabularMdp {
    let transitions = Array2::from_elem((2, 2), vec![Transition::new(1, 1.0)]);
    TabularMdp::new(transitions, vec![false, true], 0.9).unwrap()
}

/// A small stochastic three-state MDP with two actions and no terminal states.
pub fn three_state_stochastic() -> TabularMdp {
    let transitions = Array2::from_shape_fn((3, 2), |(s, a)| match (s, a) {
        (0, 0) => vec![Transition::new(1, 0.8), Transition::new(0, 0.2)],
        (0, 1) => vec![Transition::new(2, 0.6), Transition::new(0, 0.4)],
        (1, 0) => vec![Transition::new(2, 1.0)],
        (1, 1) => vec![Transition::new(0, 0.5), Transition::new(1, 0.5)],
        (2, 0) => vec![Transition::new(2, 0.9), Transition::new(1, 0.1)],
        _ => vec![Transition::new(0, 1.0)],
    });
    TabularMdp::new(transitions, vec![false; 3], 0.8).unwrap()
}
