//! Boltzmann policy math
//!
//! Numerically stable softmax, log-sum-exp and the softmax policy gradient identity.
//! All functions take `beta`, the inverse temperature: the policy over Q-values `q` is
//! `π(a_i) = exp(β q_i) / Σ_j exp(β q_j)`.
//! The larger `beta`, the closer the policy is to greedy.
//!
//! Exponentials are always shifted by `max_i(β q_i)` before summing so that large `β` or large
//! Q-values cannot overflow.
use ndarray::{Array1, ArrayView2, Axis};

/// The maximum Q-value multiplied by `beta`.
///
/// Returns negative infinity for an empty slice.
pub fn max_beta_scaled(qs: &[f64], beta: f64) -> f64 {
    qs.iter()
        .map(|q| beta * q)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Exponentiated Q-values shifted by `max_beta_scaled`: `exp(β q_i - max_j β q_j)`.
///
/// The largest weight is 1 so the weights sum to a value in `[1, n]`.
pub fn shifted_weights(qs: &[f64], max_beta_scaled: f64, beta: f64) -> Vec<f64> {
    qs.iter()
        .map(|q| (beta * q - max_beta_scaled).exp())
        .collect()
}

/// Log of the summed exponentiated Q-values, `log Σ_i exp(β q_i)`.
///
/// # Args
/// * `qs` - Q-values.
/// * `max_beta_scaled` - The value of [`max_beta_scaled`] for `qs` and `beta`.
/// * `beta` - Inverse temperature.
pub fn log_sum(qs: &[f64], max_beta_scaled: f64, beta: f64) -> f64 {
    let exp_sum: f64 = shifted_weights(qs, max_beta_scaled, beta).iter().sum();
    max_beta_scaled + exp_sum.ln()
}

/// Boltzmann action probabilities.
///
/// Normalizes the shifted weights directly so the result sums to 1
/// even when `β q` is too large for `log_sum` to resolve `ln n`.
pub fn probabilities(qs: &[f64], beta: f64) -> Vec<f64> {
    let max = max_beta_scaled(qs, beta);
    let mut weights = shifted_weights(qs, max, beta);
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Log probability of action `index` under the Boltzmann policy.
pub fn log_probability(qs: &[f64], beta: f64, index: usize) -> f64 {
    let max = max_beta_scaled(qs, beta);
    let exp_sum: f64 = shifted_weights(qs, max, beta).iter().sum();
    (beta * qs[index] - max) - exp_sum.ln()
}

/// Policy-weighted mean of the Q-value gradients, `Σ_j π(a_j) ∇q_j`.
///
/// # Args
/// * `probabilities` - Boltzmann probability of each action.
/// * `q_gradients` - Q-value gradient of each action. Shape `[num_actions, num_parameters]`.
pub fn expected_q_gradient(probabilities: &[f64], q_gradients: ArrayView2<f64>) -> Array1<f64> {
    let mut mean = Array1::zeros(q_gradients.len_of(Axis(1)));
    for (prob, q_gradient) in probabilities.iter().zip(q_gradients.outer_iter()) {
        mean.scaled_add(*prob, &q_gradient);
    }
    mean
}

/// Gradient of the Boltzmann policy probability of action `index`.
///
/// Computes `∂π(a_i)/∂θ = β π(a_i) (∇q_i - Σ_j π(a_j) ∇q_j)`.
///
/// # Args
/// * `beta` - Inverse temperature.
/// * `probabilities` - Boltzmann probability of each action, from [`probabilities`].
/// * `q_gradients` - Q-value gradient of each action. Shape `[num_actions, num_parameters]`.
/// * `index` - Index of the action whose probability is differentiated.
pub fn policy_gradient(
    beta: f64,
    probabilities: &[f64],
    q_gradients: ArrayView2<f64>,
    index: usize,
) -> Array1<f64> {
    let mut gradient = log_policy_gradient(beta, probabilities, q_gradients, index);
    gradient *= probabilities[index];
    gradient
}

/// Gradient of the log Boltzmann policy probability of action `index`.
///
/// Computes `∂log π(a_i)/∂θ = β (∇q_i - Σ_j π(a_j) ∇q_j)` directly.
/// Equal to `policy_gradient(..) / π(a_i)` but remains finite when `π(a_i)` underflows.
///
/// Arguments are the same as for [`policy_gradient`].
pub fn log_policy_gradient(
    beta: f64,
    probabilities: &[f64],
    q_gradients: ArrayView2<f64>,
    index: usize,
) -> Array1<f64> {
    let mut gradient = q_gradients.index_axis(Axis(0), index).to_owned();
    gradient -= &expected_q_gradient(probabilities, q_gradients);
    gradient *= beta;
    gradient
}
