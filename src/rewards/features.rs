//! State feature vectors
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Maps states to fixed-length real feature vectors.
pub trait StateFeatures {
    type State;

    /// Length of every feature vector.
    fn num_features(&self) -> usize;

    /// The feature vector of a state.
    fn features(&self, state: &Self::State) -> Array1<f64>;
}

/// One-hot encoding of index states `0 .. size`.
///
/// States outside the range have the all-zero feature vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OneHotFeatures {
    pub size: usize,
}

impl OneHotFeatures {
    pub const fn new(size: usize) -> Self {
        Self { size }
    }
}

impl StateFeatures for OneHotFeatures {
    type State = usize;

    fn num_features(&self) -> usize {
        self.size
    }

    fn features(&self, state: &usize) -> Array1<f64> {
        let mut features = Array1::zeros(self.size);
        if let Some(x) = features.get_mut(*state) {
            *x = 1.0;
        }
        features
    }
}

/// Features of `S` computed by a closure.
pub struct FnFeatures<F, S> {
    function: F,
    num_features: usize,
    state_type: PhantomData<fn(&S)>,
}

impl<F, S> FnFeatures<F, S>
where
    F: Fn(&S) -> Array1<f64>,
{
    /// Wrap a closure producing feature vectors of length `num_features`.
    pub const fn new(function: F, num_features: usize) -> Self {
        Self {
            function,
            num_features,
            state_type: PhantomData,
        }
    }
}

impl<F: Clone, S> Clone for FnFeatures<F, S> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            num_features: self.num_features,
            state_type: PhantomData,
        }
    }
}

impl<F, S> fmt::Debug for FnFeatures<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FnFeatures")
            .field("num_features", &self.num_features)
            .finish()
    }
}

impl<F, S> StateFeatures for FnFeatures<F, S>
where
    F: Fn(&S) -> Array1<f64>,
{
    type State = S;

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn features(&self, state: &S) -> Array1<f64> {
        let features = (self.function)(state);
        debug_assert_eq!(features.len(), self.num_features);
        features
    }
}

impl<T: StateFeatures + ?Sized> StateFeatures for &T {
    type State = T::State;

    fn num_features(&self) -> usize {
        T::num_features(self)
    }
    fn features(&self, state: &Self::State) -> Array1<f64> {
        T::features(self, state)
    }
}
