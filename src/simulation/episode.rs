use serde::{Deserialize, Serialize};
use std::iter::FromIterator;

/// A demonstrated trajectory: the sequence of visited states and the action taken in each.
///
/// The state reached after the last action is optional since it carries no action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode<S, A> {
    steps: Vec<(S, A)>,
    final_state: Option<S>,
}

impl<S, A> Default for Episode<S, A> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            final_state: None,
        }
    }
}

impl<S, A> Episode<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state and the action taken in it.
    pub fn push(&mut self, state: S, action: A) {
        self.steps.push((state, action));
    }

    /// Set the state reached after the last action.
    pub fn set_final_state(&mut self, state: S) {
        self.final_state = Some(state);
    }

    #[must_use]
    pub fn with_final_state(mut self, state: S) -> Self {
        self.set_final_state(state);
        self
    }

    /// Number of state-action pairs.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate over the state-action pairs.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&S, &A)> {
        self.steps.iter().map(|(s, a)| (s, a))
    }

    /// The states in which actions were taken.
    pub fn states(&self) -> Vec<&S> {
        self.steps.iter().map(|(s, _)| s).collect()
    }

    pub fn actions(&self) -> Vec<&A> {
        self.steps.iter().map(|(_, a)| a).collect()
    }

    pub const fn final_state(&self) -> Option<&S> {
        self.final_state.as_ref()
    }
}

impl<S, A> FromIterator<(S, A)> for Episode<S, A> {
    fn from_iter<I: IntoIterator<Item = (S, A)>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
            final_state: None,
        }
    }
}

impl<S, A> Extend<(S, A)> for Episode<S, A> {
    fn extend<I: IntoIterator<Item = (S, A)>>(&mut self, iter: I) {
        self.steps.extend(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_pairs() {
        let episode: Episode<u8, char> = vec![(0, 'a'), (1, 'b')].into_iter().collect();
        assert_eq!(episode.len(), 2);
        assert_eq!(episode.final_state(), None);
        let pairs: Vec<_> = episode.iter().collect();
        assert_eq!(pairs, vec![(&0, &'a'), (&1, &'b')]);
        assert_eq!(episode.actions(), vec![&'a', &'b']);
    }

    #[test]
    fn push_and_final_state() {
        let mut episode = Episode::new();
        assert!(episode.is_empty());
        episode.push("s0", 1);
        let episode = episode.with_final_state("s1");
        assert_eq!(episode.states(), vec![&"s0"]);
        assert_eq!(episode.final_state(), Some(&"s1"));
    }

    #[test]
    fn serde_round_trip() {
        let episode = Episode::from_iter(vec![(1_usize, true), (2, false)]).with_final_state(3);
        let json = serde_json::to_string(&episode).unwrap();
        let parsed: Episode<usize, bool> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, episode);
    }
}
