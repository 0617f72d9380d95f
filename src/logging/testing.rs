//! Logging testing utilities
use super::{Event, LogError, Loggable, Logger};

/// Logger that records every logged value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingLogger {
    pub entries: Vec<(Event, String, Loggable)>,
    pub done: Vec<Event>,
}

impl RecordingLogger {
    /// Scalar values logged under a name, in order.
    pub fn scalars(&self, name: &str) -> Vec<f64> {
        self.entries
            .iter()
            .filter(|(_, n, _)| n == name)
            .filter_map(|(_, _, value)| match value {
                Loggable::Scalar(x) => Some(*x),
                _ => None,
            })
            .collect()
    }

    /// Number of times an event was marked done.
    pub fn count(&self, event: Event) -> usize {
        self.done.iter().filter(|e| **e == event).count()
    }
}

impl Logger for RecordingLogger {
    fn log(&mut self, event: Event, name: &str, value: Loggable) -> Result<(), LogError> {
        self.entries.push((event, name.into(), value));
        Ok(())
    }

    fn done(&mut self, event: Event) {
        self.done.push(event);
    }
}
