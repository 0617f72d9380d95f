//! Demonstration trajectories
mod episode;

pub use episode::Episode;

use crate::envs::Mdp;
use crate::planning::{boltzmann, PlanningError, QGradientPlanner};
use crate::Prng;
use rand::distributions::{Distribution, WeightedIndex};

/// Roll out a policy in a domain.
///
/// Stops after `max_steps` actions, at a terminal state, or at a state with no actions.
/// The state in which the rollout stops is recorded as the final state.
///
/// # Args
/// * `mdp` - The domain.
/// * `initial_state` - The state in which the episode starts.
/// * `policy` - Selects an action in a state. Only called with states that have actions.
/// * `max_steps` - Maximum episode length.
/// * `rng` - Random number generator used for successor sampling and passed to the policy.
pub fn rollout<M, P>(
    mdp: &M,
    initial_state: M::State,
    mut policy: P,
    max_steps: usize,
    rng: &mut Prng,
) -> Episode<M::State, M::Action>
where
    M: Mdp + ?Sized,
    P: FnMut(&M::State, &mut Prng) -> M::Action,
{
    let mut episode = Episode::new();
    let mut state = initial_state;
    for _ in 0..max_steps {
        if mdp.is_terminal(&state) || mdp.actions(&state).is_empty() {
            break;
        }
        let action = policy(&state, rng);
        let next_state = mdp.sample_successor(&state, &action, rng);
        episode.push(state, action);
        state = next_state;
    }
    episode.set_final_state(state);
    episode
}

/// Sample an action from the Boltzmann policy of a planner's Q-values.
///
/// Returns `None` if the state has no actions.
pub fn sample_boltzmann_action<P: QGradientPlanner>(
    planner: &mut P,
    state: &P::State,
    rng: &mut Prng,
) -> Result<Option<P::Action>, PlanningError> {
    let mut q_values = planner.q_values(state)?;
    let qs: Vec<f64> = q_values.iter().map(|(_, q)| *q).collect();
    let probabilities = boltzmann::probabilities(&qs, planner.boltzmann_beta());
    let index = match WeightedIndex::new(probabilities) {
        Ok(distribution) => distribution.sample(rng),
        Err(_) => return Ok(None),
    };
    Ok(Some(q_values.swap_remove(index).0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{Chain, Move};
    use crate::planning::{DifferentiableVi, DifferentiableViConfig};
    use crate::rewards::{LinearStateRf, OneHotFeatures};
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn rollout_stops_at_max_steps() {
        let chain = Chain::new(4, 0.9, 0.0);
        let mut rng = Prng::seed_from_u64(0);
        let episode = rollout(&chain, 0, |_, _| Move::Right, 5, &mut rng);
        assert_eq!(episode.len(), 5);
        assert_eq!(episode.states(), vec![&0, &1, &2, &3, &3]);
        assert_eq!(episode.final_state(), Some(&3));
    }

    #[test]
    fn rollout_stops_at_terminal() {
        let mdp = crate::envs::testing::two_state_terminal();
        let mut rng = Prng::seed_from_u64(0);
        let episode = rollout(&mdp, 0, |_, _| 1, 10, &mut rng);
        assert_eq!(episode.len(), 1);
        assert_eq!(episode.final_state(), Some(&1));
    }

    #[test]
    fn boltzmann_action_prefers_high_q() {
        let rf = LinearStateRf::new(OneHotFeatures::new(3)).with_parameters(array![0.0, 0.0, 1.0]);
        let mut planner = DifferentiableVi::new(
            Chain::new(3, 0.9, 0.0),
            rf,
            20.0,
            DifferentiableViConfig::default(),
        );
        let mut rng = Prng::seed_from_u64(3);
        for _ in 0..10 {
            let action = sample_boltzmann_action(&mut planner, &1, &mut rng).unwrap();
            assert_eq!(action, Some(Move::Right));
        }
    }
}
