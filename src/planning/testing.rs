//! Planner testing utilities
use super::{dp, QGradientPlanner};
use crate::envs::Mdp;
use crate::rewards::DifferentiableRf;
use ndarray::Array1;
use std::collections::{HashMap, VecDeque};

/// Hard max Bellman value iteration over the states reachable from `initial_state`.
pub fn hard_value_iteration<M, R>(
    mdp: &M,
    reward_fn: &R,
    initial_state: &M::State,
    tolerance: f64,
) -> HashMap<M::State, f64>
where
    M: Mdp,
    R: DifferentiableRf<M::State, M::Action>,
{
    let mut values = HashMap::new();
    let mut open = VecDeque::from(vec![initial_state.clone()]);
    values.insert(initial_state.clone(), 0.0);
    while let Some(state) = open.pop_front() {
        for action in mdp.actions(&state) {
            for t in mdp.transitions(&state, &action) {
                if !values.contains_key(&t.successor) {
                    values.insert(t.successor.clone(), 0.0);
                    open.push_back(t.successor);
                }
            }
        }
    }

    let states: Vec<_> = values.keys().cloned().collect();
    let gamma = mdp.discount_factor();
    loop {
        let mut delta: f64 = 0.0;
        for state in &states {
            let value = if mdp.is_terminal(state) {
                0.0
            } else {
                mdp.actions(state)
                    .iter()
                    .map(|action| {
                        mdp.transitions(state, action)
                            .iter()
                            .map(|t| {
                                t.probability
                                    * (reward_fn.reward(state, action, &t.successor)
                                        + gamma * values[&t.successor])
                            })
                            .sum::<f64>()
                    })
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let old = values.insert(state.clone(), value).unwrap_or(0.0);
            delta = delta.max((value - old).abs());
        }
        if delta < tolerance {
            return values;
        }
    }
}

/// Boltzmann value of a non-terminal state computed from the planner's Q-values.
pub fn soft_value<P: QGradientPlanner>(planner: &mut P, state: &P::State) -> f64 {
    let qs: Vec<f64> = planner
        .q_values(state)
        .unwrap()
        .into_iter()
        .map(|(_, q)| q)
        .collect();
    dp::soft_backup(&qs, planner.boltzmann_beta())
}

/// Central finite difference of `f` with respect to each reward parameter of the planner.
///
/// The planner is reset before every evaluation and the parameters are restored afterwards.
fn finite_difference<P, F>(planner: &mut P, mut f: F) -> Vec<Array1<f64>>
where
    P: QGradientPlanner,
    F: FnMut(&mut P) -> Vec<f64>,
{
    let eps = 1e-5;
    let num_parameters = planner.reward_function().num_parameters();
    let mut columns = Vec::new();
    for j in 0..num_parameters {
        planner.reward_function_mut().parameters_mut()[j] += eps;
        planner.reset_solver();
        let plus = f(planner);
        planner.reward_function_mut().parameters_mut()[j] -= 2.0 * eps;
        planner.reset_solver();
        let minus = f(planner);
        planner.reward_function_mut().parameters_mut()[j] += eps;
        planner.reset_solver();
        columns.push(
            plus.iter()
                .zip(&minus)
                .map(|(p, m)| (p - m) / (2.0 * eps))
                .collect::<Array1<f64>>(),
        );
    }
    // Transpose to one gradient per output
    let num_outputs = columns.first().map_or(0, Array1::len);
    (0..num_outputs)
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect()
}

fn assert_gradients_close(actual: &Array1<f64>, expected: &Array1<f64>, tolerance: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a - e).abs() <= tolerance,
            "gradient {} != finite difference {}",
            actual,
            expected
        );
    }
}

/// Check the planner's value gradient at `state` against finite differences.
pub fn check_value_gradient<P: QGradientPlanner>(mut planner: P, state: &P::State, tolerance: f64) {
    planner.plan_from_state(state).unwrap();
    let gradient = planner.value_gradient(state).unwrap();
    let expected = finite_difference(&mut planner, |p| vec![soft_value(p, state)]);
    assert_gradients_close(&gradient, &expected[0], tolerance);
}

/// Check the planner's Q-value gradients at `state` against finite differences.
pub fn check_q_gradients<P: QGradientPlanner>(mut planner: P, state: &P::State, tolerance: f64) {
    let gradients = planner.q_gradients(state).unwrap();
    let expected = finite_difference(&mut planner, |p| {
        p.q_values(state)
            .unwrap()
            .into_iter()
            .map(|(_, q)| q)
            .collect()
    });
    assert_eq!(gradients.len(), expected.len());
    for ((_, gradient), expected) in gradients.iter().zip(&expected) {
        assert_gradients_close(gradient, expected, tolerance);
    }
}
