//! Online statistics
use num_traits::{Float, Zero};
use std::iter::{Extend, FromIterator};

fn count_as<T: Float>(count: u64) -> T {
    T::from(count).unwrap_or_else(T::infinity)
}

/// Online mean calculation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OnlineMean<T> {
    mean: T,
    count: u64,
}

impl<T: Zero> Default for OnlineMean<T> {
    fn default() -> Self {
        Self {
            mean: T::zero(),
            count: 0,
        }
    }
}

impl<T: Copy> OnlineMean<T> {
    /// The mean of all accumulated values. Zero if there are none.
    pub const fn mean(&self) -> T {
        self.mean
    }
}

impl<T> OnlineMean<T> {
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl<T: Float> OnlineMean<T> {
    /// Add a new value to the calculation.
    pub fn push(&mut self, value: T) {
        self.count += 1;
        self.mean = self.mean + (value - self.mean) / count_as(self.count);
    }
}

impl<T: Float> Extend<T> for OnlineMean<T> {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        for value in iter {
            self.push(value)
        }
    }
}

impl<T: Float> FromIterator<T> for OnlineMean<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut s = Self::default();
        s.extend(iter);
        s
    }
}

/// Online mean and variance calculation using Welford's Algorithm
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OnlineMeanVariance<T> {
    mean: T,
    squared_residual_sum: T,
    count: u64,
}

impl<T: Zero> Default for OnlineMeanVariance<T> {
    fn default() -> Self {
        Self {
            mean: T::zero(),
            squared_residual_sum: T::zero(),
            count: 0,
        }
    }
}

impl<T: Copy> OnlineMeanVariance<T> {
    /// The mean of all accumulated values.
    pub const fn mean(&self) -> T {
        self.mean
    }
}

impl<T> OnlineMeanVariance<T> {
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl<T: Float> OnlineMeanVariance<T> {
    /// The (population) variance of all accumulated values. NaN if there are none.
    pub fn variance(&self) -> T {
        self.squared_residual_sum / count_as(self.count)
    }

    /// Add a new value to the calculation.
    pub fn push(&mut self, value: T) {
        let residual_pre = value - self.mean;
        self.count += 1;
        self.mean = self.mean + residual_pre / count_as(self.count);
        let residual_post = value - self.mean;
        self.squared_residual_sum = self.squared_residual_sum + residual_pre * residual_post;
    }
}

impl<T: Float> Extend<T> for OnlineMeanVariance<T> {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        for value in iter {
            self.push(value)
        }
    }
}

impl<T: Float> FromIterator<T> for OnlineMeanVariance<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut s = Self::default();
        s.extend(iter);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_f64() {
        let stats: OnlineMean<f64> = [1.0, 2.0, 3.0, 6.0].into_iter().collect();
        assert!((stats.mean() - 3.0).abs() < 1e-12);
        assert_eq!(stats.count(), 4);
    }

    #[test]
    fn empty_mean_is_zero() {
        let stats: OnlineMean<f32> = OnlineMean::default();
        assert_eq!(stats.mean(), 0.0);
    }

    #[test]
    fn collect_f64() {
        let stats: OnlineMeanVariance<f64> = [1.0, 2.0, 3.0, 4.0].into_iter().collect();
        assert!((stats.mean() - 2.5).abs() < 1e-8);
        assert!((stats.variance() - 1.25).abs() < 1e-8);
    }

    #[test]
    fn empty_variance_is_nan() {
        let stats: OnlineMeanVariance<f64> = OnlineMeanVariance::default();
        assert!(stats.variance().is_nan());
    }
}
