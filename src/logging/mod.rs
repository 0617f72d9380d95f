//! Logging statistics from optimization runs
pub mod cli;
#[cfg(test)]
pub mod testing;

pub use cli::CLILogger;

use enum_map::Enum;
use std::borrow::Cow;
use std::convert::From;
use thiserror::Error;

/// Optimization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum Event {
    /// One gradient ascent step of maximum-likelihood IRL.
    GradientStep,
    /// A complete maximum-likelihood IRL run.
    IrlRun,
    /// One expectation-maximization iteration over all clusters.
    EmIteration,
}

/// A value that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Loggable {
    /// Nothing. No data to log.
    /// Logging Nothing data may still produce a placeholder entry for the name.
    Nothing,
    /// A scalar value. Aggregate by taking means.
    Scalar(f64),
    /// A message string. Aggregate by counting occurrences.
    Message(Cow<'static, str>),
}

impl From<f64> for Loggable {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for Loggable {
    fn from(value: f32) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<&'static str> for Loggable {
    fn from(message: &'static str) -> Self {
        Self::Message(message.into())
    }
}

impl From<String> for Loggable {
    fn from(message: String) -> Self {
        Self::Message(message.into())
    }
}

/// Log statistics from an optimization run.
pub trait Logger {
    /// Log a value.
    ///
    /// # Args
    /// * `event` - The event associated with this value.
    /// * `name` - The name that identifies this value.
    /// * `value` - The value to log.
    ///
    /// # Returns
    /// May return an error if the logged value is structurally incompatible
    /// with previous values logged under the same name.
    fn log(&mut self, event: Event, name: &str, value: Loggable) -> Result<(), LogError>;

    /// Mark the end of an event.
    fn done(&mut self, event: Event);
}

/// Logger that does nothing
impl Logger for () {
    fn log(&mut self, _: Event, _: &str, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }

    fn done(&mut self, _: Event) {}
}

impl<T: Logger + ?Sized> Logger for &mut T {
    fn log(&mut self, event: Event, name: &str, value: Loggable) -> Result<(), LogError> {
        T::log(self, event, name, value)
    }

    fn done(&mut self, event: Event) {
        T::done(self, event)
    }
}

/// A logged value is incompatible with earlier values of the same name.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("\"{name}\": incompatible value {value:?}, expected {expected}")]
pub struct LogError {
    name: String,
    value: Loggable,
    expected: String,
}

impl LogError {
    pub fn new(name: &str, value: Loggable, expected: String) -> Self {
        Self {
            name: name.into(),
            value,
            expected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
