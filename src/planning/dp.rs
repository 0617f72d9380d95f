//! Differentiable dynamic programming
//!
//! The soft (Boltzmann) Bellman backup and its gradient,
//! shared by the value iteration and sparse sampling planners.
use super::boltzmann;
use super::QEstimate;
use crate::envs::Transition;
use crate::rewards::DifferentiableRf;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashMap;
use std::hash::Hash;

/// State values and value gradients.
///
/// States that have not been backed up have value 0 and a zero gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable<S: Eq + Hash> {
    values: HashMap<S, f64>,
    gradients: HashMap<S, Array1<f64>>,
    zero: Array1<f64>,
}

impl<S: Eq + Hash> ValueTable<S> {
    /// Create an empty table for gradients of length `num_parameters`.
    pub fn new(num_parameters: usize) -> Self {
        Self {
            values: HashMap::new(),
            gradients: HashMap::new(),
            zero: Array1::zeros(num_parameters),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.zero.len()
    }

    /// The stored value of a state or 0.
    pub fn value(&self, state: &S) -> f64 {
        self.values.get(state).copied().unwrap_or(0.0)
    }

    /// The stored value gradient of a state or the zero vector.
    pub fn gradient(&self, state: &S) -> ArrayView1<f64> {
        self.gradients.get(state).unwrap_or(&self.zero).view()
    }

    /// Whether the state has been backed up.
    pub fn contains(&self, state: &S) -> bool {
        self.values.contains_key(state)
    }

    /// Store the value and value gradient of a state.
    ///
    /// Returns the previously stored value, if any.
    pub fn insert(&mut self, state: S, value: f64, gradient: Array1<f64>) -> Option<f64>
    where
        S: Clone,
    {
        debug_assert_eq!(gradient.len(), self.zero.len());
        self.gradients.insert(state.clone(), gradient);
        self.values.insert(state, value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove all entries and set the gradient length.
    pub fn reset(&mut self, num_parameters: usize) {
        self.values.clear();
        self.gradients.clear();
        if self.zero.len() != num_parameters {
            self.zero = Array1::zeros(num_parameters);
        }
    }
}

/// Soft Bellman backup: the Boltzmann-weighted mean of the Q-values.
///
/// `V(s) = Σ_a π(a|s) Q(s, a)`. Returns 0 if there are no Q-values.
pub fn soft_backup(qs: &[f64], beta: f64) -> f64 {
    if qs.is_empty() {
        return 0.0;
    }
    boltzmann::probabilities(qs, beta)
        .into_iter()
        .zip(qs)
        .map(|(p, q)| p * q)
        .sum()
}

/// Gradient of the soft Bellman backup.
///
/// `∇V(s) = Σ_a [π(a|s) ∇Q(s, a) + Q(s, a) ∇π(a|s)]`
///
/// Since `Σ_a ∇π(a|s) = 0`, the second term is evaluated with `Q(s, a) - V(s)`
/// in place of `Q(s, a)`.
///
/// # Args
/// * `qs` - Q-value of each action.
/// * `q_gradients` - Q-value gradient of each action. Shape `[num_actions, num_parameters]`.
/// * `beta` - Boltzmann inverse temperature.
pub fn value_gradient_backup(
    qs: &[f64],
    q_gradients: ArrayView2<f64>,
    beta: f64,
) -> Array1<f64> {
    if qs.is_empty() {
        return Array1::zeros(q_gradients.len_of(Axis(1)));
    }
    let probs = boltzmann::probabilities(qs, beta);
    let value: f64 = probs.iter().zip(qs).map(|(p, q)| p * q).sum();
    let expected_q_gradient = boltzmann::expected_q_gradient(&probs, q_gradients);
    let mut gradient = expected_q_gradient.clone();
    for ((prob, q), q_gradient) in probs.iter().zip(qs).zip(q_gradients.outer_iter()) {
        // q * ∇π = q * β π (∇q - E[∇q])
        let scale = beta * prob * (q - value);
        gradient.scaled_add(scale, &q_gradient);
        gradient.scaled_add(-scale, &expected_q_gradient);
    }
    gradient
}

/// Split Q estimates into a Q-value vector and a `[num_actions, num_parameters]` gradient matrix.
pub fn q_arrays<A>(estimates: &[QEstimate<A>], num_parameters: usize) -> (Vec<f64>, Array2<f64>) {
    let qs = estimates.iter().map(|e| e.q).collect();
    let mut q_gradients = Array2::zeros((estimates.len(), num_parameters));
    for (mut row, estimate) in q_gradients.outer_iter_mut().zip(estimates) {
        row.assign(&estimate.gradient);
    }
    (qs, q_gradients)
}

/// Soft value and value gradient of a state from its action Q estimates.
pub fn soft_state_backup<A>(
    estimates: &[QEstimate<A>],
    beta: f64,
    num_parameters: usize,
) -> (f64, Array1<f64>) {
    let (qs, q_gradients) = q_arrays(estimates, num_parameters);
    (
        soft_backup(&qs, beta),
        value_gradient_backup(&qs, q_gradients.view(), beta),
    )
}

/// Bellman expectation of the Q-value of one action.
///
/// `Q(s, a) = Σ_s' P(s'|s, a) [R(s, a, s') + γ V(s')]`
///
/// Successor values are read from `table`; successors that have not been backed up
/// contribute `V = 0`.
pub fn q_value<S, A, R>(
    reward_fn: &R,
    table: &ValueTable<S>,
    discount_factor: f64,
    state: &S,
    action: &A,
    transitions: &[Transition<S>],
) -> f64
where
    S: Eq + Hash,
    R: DifferentiableRf<S, A> + ?Sized,
{
    transitions
        .iter()
        .map(|t| {
            let reward = reward_fn.reward(state, action, &t.successor);
            t.probability * (reward + discount_factor * table.value(&t.successor))
        })
        .sum()
}

/// Gradient of the Q-value of one action.
///
/// `∇Q(s, a) = Σ_s' P(s'|s, a) [∇R(s, a, s') + γ ∇V(s')]`
///
/// Successors that have not been backed up contribute `∇V = 0`.
pub fn q_gradient<S, A, R>(
    reward_fn: &R,
    table: &ValueTable<S>,
    discount_factor: f64,
    state: &S,
    action: &A,
    transitions: &[Transition<S>],
) -> Array1<f64>
where
    S: Eq + Hash,
    R: DifferentiableRf<S, A> + ?Sized,
{
    let mut gradient = Array1::zeros(table.num_parameters());
    for t in transitions {
        gradient.scaled_add(
            t.probability,
            &reward_fn.gradient(state, action, &t.successor),
        );
        gradient.scaled_add(
            t.probability * discount_factor,
            &table.gradient(&t.successor),
        );
    }
    gradient
}

/// The Q-value of one action and its gradient. See [`q_value`] and [`q_gradient`].
pub fn q_backup<S, A, R>(
    reward_fn: &R,
    table: &ValueTable<S>,
    discount_factor: f64,
    state: &S,
    action: &A,
    transitions: &[Transition<S>],
) -> (f64, Array1<f64>)
where
    S: Eq + Hash,
    R: DifferentiableRf<S, A> + ?Sized,
{
    (
        q_value(reward_fn, table, discount_factor, state, action, transitions),
        q_gradient(reward_fn, table, discount_factor, state, action, transitions),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::{LinearStateRf, OneHotFeatures};
    use ndarray::array;

    #[test]
    fn missing_gradient_is_zero() {
        let table: ValueTable<usize> = ValueTable::new(3);
        assert_eq!(table.value(&7), 0.0);
        assert_eq!(table.gradient(&7), array![0.0, 0.0, 0.0]);
        assert!(!table.contains(&7));
    }

    #[test]
    fn insert_and_reset() {
        let mut table = ValueTable::new(2);
        assert_eq!(table.insert(1, 0.5, array![1.0, 2.0]), None);
        assert_eq!(table.insert(1, 0.7, array![1.0, 3.0]), Some(0.5));
        assert_eq!(table.value(&1), 0.7);
        assert_eq!(table.gradient(&1), array![1.0, 3.0]);
        table.reset(4);
        assert!(table.is_empty());
        assert_eq!(table.gradient(&1).len(), 4);
    }

    #[test]
    fn single_action_backup_is_q() {
        assert_eq!(soft_backup(&[3.5], 0.1), 3.5);
        let gradient = value_gradient_backup(&[3.5], array![[1.0, -2.0]].view(), 0.1);
        assert_eq!(gradient, array![1.0, -2.0]);
    }

    #[test]
    fn empty_backup_is_zero() {
        assert_eq!(soft_backup(&[], 1.0), 0.0);
        let gradient = value_gradient_backup(&[], Array2::<f64>::zeros((0, 2)).view(), 1.0);
        assert_eq!(gradient, array![0.0, 0.0]);
    }

    #[test]
    fn soft_backup_between_mean_and_max() {
        let qs = [1.0, 2.0, 4.0];
        let v = soft_backup(&qs, 1.0);
        assert!(v > 7.0 / 3.0);
        assert!(v < 4.0);
        assert!((soft_backup(&qs, 1e3) - 4.0).abs() < 1e-9);
    }

    /// The value gradient matches finite differences when Q-values are linear in the parameters.
    #[test]
    fn value_gradient_finite_difference() {
        let features = array![[1.0, 0.5], [-0.5, 1.0], [0.0, 0.2]];
        let theta = array![0.3, 0.9];
        let beta = 2.0;
        let eps = 1e-6;
        let value_at = |theta: &Array1<f64>| soft_backup(&features.dot(theta).to_vec(), beta);

        let qs = features.dot(&theta).to_vec();
        let gradient = value_gradient_backup(&qs, features.view(), beta);
        for j in 0..2 {
            let mut plus = theta.clone();
            plus[j] += eps;
            let mut minus = theta.clone();
            minus[j] -= eps;
            let estimate = (value_at(&plus) - value_at(&minus)) / (2.0 * eps);
            assert!((gradient[j] - estimate).abs() < 1e-7);
        }
    }

    #[test]
    fn q_backup_expectation() {
        let rf = LinearStateRf::new(OneHotFeatures::new(2)).with_parameters(array![1.0, -1.0]);
        let mut table = ValueTable::new(2);
        table.insert(1, 10.0, array![0.5, 0.5]);
        let transitions = [Transition::new(0, 0.25), Transition::new(1, 0.75)];
        let (q, gradient) = q_backup(&rf, &table, 0.5, &0, &(), &transitions);
        // 0.25 * (1 + 0) + 0.75 * (-1 + 0.5 * 10)
        assert!((q - 3.25).abs() < 1e-12);
        // 0.25 * [1, 0] + 0.75 * ([0, 1] + 0.5 * [0.5, 0.5])
        assert!((gradient[0] - 0.4375).abs() < 1e-12);
        assert!((gradient[1] - 0.9375).abs() < 1e-12);
    }

    #[test]
    fn unvisited_successor_contributes_reward_only() {
        let rf = LinearStateRf::new(OneHotFeatures::new(2)).with_parameters(array![2.0, 3.0]);
        let table = ValueTable::new(2);
        let transitions = [Transition::new(1, 1.0)];
        assert_eq!(q_value(&rf, &table, 0.9, &0, &(), &transitions), 3.0);
        assert_eq!(
            q_gradient(&rf, &table, 0.9, &0, &(), &transitions),
            array![0.0, 1.0]
        );
    }

    #[test]
    fn backup_of_equal_large_values_is_convex() {
        let qs = [1e15, 1e15];
        assert_eq!(soft_backup(&qs, 1.0), 1e15);
        let gradient = value_gradient_backup(&qs, array![[1.0, 0.0], [0.0, 1.0]].view(), 1.0);
        assert!((gradient[0] - 0.5).abs() < 1e-12);
        assert!((gradient[1] - 0.5).abs() < 1e-12);
    }
}
