use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::error::ProgressError;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The algorithm (or other unit) doing the reporting.
    pub source: String,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    /// Completed fraction in `[0, 1]`. An empty run counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f64 / self.total as f64
        }
    }
}

/// Receives progress events, e.g. a GUI progress bar or a log.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Simple in-memory collector for progress events.
#[derive(Default)]
pub struct MemoryProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressSink for MemoryProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Writes every event to the `info` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        log::info!(
            "{}: [{}/{}] {}",
            event.source,
            event.current,
            event.total,
            event.message
        );
    }
}

/// Forwards events to several sinks in order.
#[derive(Default, Clone)]
pub struct FanOut {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanOut {
    fn on_progress(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.on_progress(event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Idle,
    Running,
    Finished,
}

/// Counts progress from 0 to `total` across one execution and forwards each step.
///
/// The count never decreases and can only be reset between executions.
pub struct ProgressReporter {
    source: String,
    total: usize,
    current: usize,
    phase: ProgressPhase,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            source: String::new(),
            total,
            current: 0,
            phase: ProgressPhase::Idle,
            sink: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_sink(mut self, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    /// Advances by one and emits `(current, total, message)`.
    pub fn report(&mut self, message: impl Into<String>) -> Result<ProgressEvent, ProgressError> {
        if self.current >= self.total {
            return Err(ProgressError::Overflow { total: self.total });
        }

        self.current += 1;
        self.phase = if self.current == self.total {
            ProgressPhase::Finished
        } else {
            ProgressPhase::Running
        };

        let event = ProgressEvent {
            source: self.source.clone(),
            current: self.current,
            total: self.total,
            message: message.into(),
        };
        if let Some(sink) = &self.sink {
            sink.on_progress(&event);
        }
        Ok(event)
    }

    /// Marks the current execution as over, whether or not every step reported.
    pub fn finish(&mut self) {
        self.phase = ProgressPhase::Finished;
    }

    /// Starts over with a new total. Illegal while a run is in progress.
    pub fn reset(&mut self, total: usize) -> Result<(), ProgressError> {
        if self.phase == ProgressPhase::Running {
            return Err(ProgressError::ResetWhileRunning {
                current: self.current,
                total: self.total,
            });
        }
        self.total = total;
        self.current = 0;
        self.phase = ProgressPhase::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_up_to_total_then_overflow() {
        let sink = Arc::new(MemoryProgress::new());
        let mut reporter = ProgressReporter::new(3)
            .with_source("Rebin")
            .with_sink(Some(sink.clone()));

        for i in 1..=3 {
            let event = reporter.report(format!("step {i}")).unwrap();
            assert_eq!(event.current, i);
            assert_eq!(event.total, 3);
        }
        assert_eq!(reporter.phase(), ProgressPhase::Finished);
        assert_eq!(
            reporter.report("one too many"),
            Err(ProgressError::Overflow { total: 3 })
        );

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].message, "step 3");
        assert_eq!(events[0].source, "Rebin");
    }

    #[test]
    fn test_reset_only_between_runs() {
        let mut reporter = ProgressReporter::new(2);
        reporter.report("first").unwrap();
        assert_eq!(
            reporter.reset(5),
            Err(ProgressError::ResetWhileRunning { current: 1, total: 2 })
        );

        reporter.finish();
        reporter.reset(5).unwrap();
        assert_eq!(reporter.current(), 0);
        assert_eq!(reporter.total(), 5);
        assert_eq!(reporter.phase(), ProgressPhase::Idle);
    }

    #[test]
    fn test_zero_total_overflows_immediately() {
        let mut reporter = ProgressReporter::new(0);
        assert!(reporter.report("anything").is_err());
        assert!(reporter.reset(1).is_ok());
    }

    #[test]
    fn test_fan_out_and_fraction() {
        let a = Arc::new(MemoryProgress::new());
        let b = Arc::new(MemoryProgress::new());
        let fan = FanOut::new(vec![a.clone(), b.clone(), Arc::new(LogProgress)]);
        let mut reporter = ProgressReporter::new(4).with_sink(Some(Arc::new(fan)));

        let event = reporter.report("quarter").unwrap();
        assert_eq!(event.fraction(), 0.25);
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events(), a.events());
    }
}
