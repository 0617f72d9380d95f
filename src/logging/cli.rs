//! Command-line logger
use super::{Event, LogError, Loggable, Logger};
use crate::utils::stats::OnlineMeanVariance;
use enum_map::{enum_map, EnumMap};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Logger that writes periodic summaries of optimization progress.
///
/// A summary covers the events completed since the previous summary.
/// Scalars are shown by their latest value along with their mean over the period.
/// Messages are shown with their number of occurrences.
pub struct CLILogger<W: Write = io::Stdout> {
    out: W,
    events: EnumMap<Event, EventSummary>,

    display_period: Duration,
    last_display_time: Instant,
}

impl CLILogger {
    /// Logger that writes to stdout at most once per `display_period`.
    pub fn new(display_period: Duration) -> Self {
        Self::with_writer(io::stdout(), display_period)
    }
}

impl<W: Write> CLILogger<W> {
    /// Logger that writes to `out` at most once per `display_period`.
    pub fn with_writer(out: W, display_period: Duration) -> Self {
        Self {
            out,
            events: enum_map! { _ => EventSummary::default() },
            display_period,
            last_display_time: Instant::now(),
        }
    }

    pub const fn writer(&self) -> &W {
        &self.out
    }

    /// Write the summary of every event completed since the last display.
    ///
    /// # Errors
    /// If writing fails. Summaries not yet written are kept.
    pub fn display(&mut self) -> io::Result<()> {
        for (event, summary) in self.events.iter_mut() {
            if summary.completed == summary.displayed {
                continue;
            }
            writeln!(
                self.out,
                "==== {:?} {} - {} ====",
                event,
                summary.displayed,
                summary.completed - 1
            )?;
            for (name, entry) in &summary.entries {
                if !entry.is_empty() {
                    writeln!(self.out, "{}: {}", name, entry)?;
                }
            }
            summary.start_period();
        }
        self.out.flush()?;
        self.last_display_time = Instant::now();
        Ok(())
    }
}

impl<W: Write> Logger for CLILogger<W> {
    fn log(&mut self, event: Event, name: &str, value: Loggable) -> Result<(), LogError> {
        let entries = &mut self.events[event].entries;
        if let Some(entry) = entries.get_mut(name) {
            entry
                .push(value)
                .map_err(|(value, expected)| LogError::new(name, value, expected.into()))
        } else {
            entries.insert(name.into(), Entry::new(value));
            Ok(())
        }
    }

    fn done(&mut self, event: Event) {
        self.events[event].completed += 1;
        if self.last_display_time.elapsed() >= self.display_period {
            // A failed write leaves the summary pending for the next display.
            let _ = self.display();
        }
    }
}

impl<W: Write> Drop for CLILogger<W> {
    fn drop(&mut self) {
        let _ = self.display();
    }
}

#[derive(Debug, Default)]
struct EventSummary {
    /// Number of times the event has completed
    completed: u64,
    /// Value of `completed` at the last display
    displayed: u64,
    entries: BTreeMap<String, Entry>,
}

impl EventSummary {
    fn start_period(&mut self) {
        self.displayed = self.completed;
        for entry in self.entries.values_mut() {
            entry.clear();
        }
    }
}

/// Summary of the values logged under one name.
#[derive(Debug)]
enum Entry {
    Nothing,
    Scalar {
        stats: OnlineMeanVariance<f64>,
        last: f64,
    },
    Messages(BTreeMap<Cow<'static, str>, usize>),
}

impl Entry {
    fn new(value: Loggable) -> Self {
        match value {
            Loggable::Nothing => Self::Nothing,
            Loggable::Scalar(x) => {
                let mut stats = OnlineMeanVariance::default();
                stats.push(x);
                Self::Scalar { stats, last: x }
            }
            Loggable::Message(message) => {
                let mut counts = BTreeMap::new();
                counts.insert(message, 1);
                Self::Messages(counts)
            }
        }
    }

    /// Add a value of the same kind as the entry.
    ///
    /// Returns `Err((value, expected_kind))` otherwise.
    fn push(&mut self, value: Loggable) -> Result<(), (Loggable, &'static str)> {
        match (&mut *self, value) {
            (Self::Nothing, Loggable::Nothing) => {}
            (Self::Scalar { stats, last }, Loggable::Scalar(x)) => {
                stats.push(x);
                *last = x;
            }
            (Self::Messages(counts), Loggable::Message(message)) => {
                *counts.entry(message).or_insert(0) += 1;
            }
            (entry, value) => return Err((value, entry.kind())),
        }
        Ok(())
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::Scalar { .. } => "Scalar",
            Self::Messages(_) => "Message",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Nothing => true,
            Self::Scalar { stats, .. } => stats.count() == 0,
            Self::Messages(counts) => counts.is_empty(),
        }
    }

    /// Clear the period statistics. The latest scalar is kept.
    fn clear(&mut self) {
        match self {
            Self::Nothing => {}
            Self::Scalar { stats, .. } => *stats = OnlineMeanVariance::default(),
            Self::Messages(counts) => counts.clear(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nothing => Ok(()),
            Self::Scalar { stats, last } => {
                if stats.count() > 1 {
                    write!(
                        f,
                        "{} (mean {}, std {:.3}, n {})",
                        last,
                        stats.mean(),
                        stats.variance().sqrt(),
                        stats.count()
                    )
                } else {
                    write!(f, "{}", last)
                }
            }
            Self::Messages(counts) => {
                if counts.len() == 1 {
                    for (message, count) in counts {
                        write!(f, "[x{}] {}", count, message)?;
                    }
                } else {
                    for (message, count) in counts {
                        write!(f, "\n\t[x{}] {}", count, message)?;
                    }
                }
                Ok(())
            }
        }
    }
}
