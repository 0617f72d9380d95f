use super::IrlError;
use crate::planning::QGradientPlanner;
use crate::simulation::Episode;
use std::fmt;
use std::rc::Rc;

/// A maximum-likelihood IRL problem: a planner and the demonstrations to explain.
///
/// The planner owns the reward function whose parameters are learned.
/// Episodes are shared (not copied) between requests.
pub struct MlirlRequest<P: QGradientPlanner> {
    planner: P,
    episodes: Rc<[Episode<P::State, P::Action>]>,
    /// Optional per-episode weights. All weights are 1 if unset.
    weights: Option<Vec<f64>>,
}

impl<P> fmt::Debug for MlirlRequest<P>
where
    P: QGradientPlanner + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MlirlRequest")
            .field("planner", &self.planner)
            .field("num_episodes", &self.episodes.len())
            .field("weights", &self.weights)
            .finish()
    }
}

impl<P: QGradientPlanner> MlirlRequest<P> {
    /// Create a request with unit episode weights.
    ///
    /// # Args
    /// * `planner` - Differentiable planner owning the reward function to learn.
    /// * `episodes` - Expert demonstrations.
    /// * `boltzmann_beta` - Inverse temperature of the expert's Boltzmann policy.
    ///     Set on the planner.
    pub fn new<E>(mut planner: P, episodes: E, boltzmann_beta: f64) -> Self
    where
        E: Into<Rc<[Episode<P::State, P::Action>]>>,
    {
        planner.set_boltzmann_beta(boltzmann_beta);
        Self {
            planner,
            episodes: episodes.into(),
            weights: None,
        }
    }

    /// Set per-episode weights.
    ///
    /// # Errors
    /// If the number of weights differs from the number of episodes.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, IrlError> {
        self.set_episode_weights(weights)?;
        Ok(self)
    }

    /// Set per-episode weights.
    ///
    /// # Errors
    /// If the number of weights differs from the number of episodes.
    /// The weights are unchanged on error.
    pub fn set_episode_weights(&mut self, weights: Vec<f64>) -> Result<(), IrlError> {
        check_weight_count(weights.len(), self.episodes.len())?;
        self.weights = Some(weights);
        Ok(())
    }

    /// Reset all episode weights to 1.
    pub fn clear_episode_weights(&mut self) {
        self.weights = None;
    }

    /// Weight of the episode at `index`.
    pub fn episode_weight(&self, index: usize) -> f64 {
        self.weights
            .as_ref()
            .and_then(|w| w.get(index).copied())
            .unwrap_or(1.0)
    }

    /// Check that the request is consistent.
    ///
    /// # Errors
    /// If there are weights and their number differs from the number of episodes.
    pub fn validate(&self) -> Result<(), IrlError> {
        match &self.weights {
            Some(weights) => check_weight_count(weights.len(), self.episodes.len()),
            None => Ok(()),
        }
    }

    pub fn episodes(&self) -> &[Episode<P::State, P::Action>] {
        &self.episodes
    }

    /// Shared handle to the episodes.
    pub fn shared_episodes(&self) -> Rc<[Episode<P::State, P::Action>]> {
        Rc::clone(&self.episodes)
    }

    /// Episodes paired with their weights.
    pub fn weighted_episodes(&self) -> impl Iterator<Item = (&Episode<P::State, P::Action>, f64)> {
        self.episodes
            .iter()
            .enumerate()
            .map(move |(i, episode)| (episode, self.episode_weight(i)))
    }

    pub const fn planner(&self) -> &P {
        &self.planner
    }

    /// Mutable access to the planner.
    pub fn planner_mut(&mut self) -> &mut P {
        &mut self.planner
    }

    pub fn into_planner(self) -> P {
        self.planner
    }

    pub fn reward_function(&self) -> &P::Reward {
        self.planner.reward_function()
    }

    pub fn boltzmann_beta(&self) -> f64 {
        self.planner.boltzmann_beta()
    }

    /// Set the expert's Boltzmann inverse temperature on the planner.
    pub fn set_boltzmann_beta(&mut self, beta: f64) {
        self.planner.set_boltzmann_beta(beta);
    }
}

const fn check_weight_count(weights: usize, episodes: usize) -> Result<(), IrlError> {
    if weights == episodes {
        Ok(())
    } else {
        Err(IrlError::WeightCountMismatch { weights, episodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::testing::two_state_terminal;
    use crate::planning::{DifferentiableVi, DifferentiableViConfig};
    use crate::envs::TabularMdp;
    use crate::rewards::{LinearStateRf, OneHotFeatures};

    type Planner = DifferentiableVi<TabularMdp, LinearStateRf<OneHotFeatures>>;

    fn request() -> MlirlRequest<Planner> {
        let planner = DifferentiableVi::new(
            two_state_terminal(),
            LinearStateRf::new(OneHotFeatures::new(2)),
            1.0,
            DifferentiableViConfig::default(),
        );
        let episodes: Vec<_> = (0..3)
            .map(|_| Episode::from_iter(vec![(0, 1)]).with_final_state(1))
            .collect();
        MlirlRequest::new(planner, episodes, 2.5)
    }

    #[test]
    fn beta_is_set_on_planner() {
        let mut request = request();
        assert_eq!(request.planner().boltzmann_beta(), 2.5);
        request.set_boltzmann_beta(4.0);
        assert_eq!(request.planner().boltzmann_beta(), 4.0);
    }

    #[test]
    fn default_weights_are_one() {
        let request = request();
        assert!(request.validate().is_ok());
        assert!(request.weighted_episodes().all(|(_, w)| w == 1.0));
    }

    #[test]
    fn weight_count_mismatch() {
        let result = request().with_weights(vec![1.0, 0.5]);
        assert_eq!(
            result.err(),
            Some(IrlError::WeightCountMismatch {
                weights: 2,
                episodes: 3
            })
        );
    }

    #[test]
    fn set_and_clear_weights() {
        let mut request = request();
        request.set_episode_weights(vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(request.episode_weight(1), 0.2);
        request.clear_episode_weights();
        assert_eq!(request.episode_weight(1), 1.0);
    }

    #[test]
    fn episodes_are_shared() {
        let request = request();
        let shared = request.shared_episodes();
        assert_eq!(Rc::strong_count(&shared), 2);
        assert_eq!(shared.len(), 3);
    }
}
