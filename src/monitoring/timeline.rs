//! Run Timeline
//!
//! Tracks step start/end times for one workflow run and renders a
//! summary with a bar per step. Steps are keyed by their index, since the
//! same module id may run more than once.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step started executing
    Started,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
}

/// A single event in the run timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Position of the step in the workflow
    pub step_index: usize,
    /// Module executed by the step
    pub module_id: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Timing of one step, derived from its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    pub module_id: String,
    /// Offset from the start of the run
    pub started: Duration,
    pub duration: Duration,
    pub failed: bool,
}

/// Tracks the execution timeline of a workflow run.
#[derive(Debug, Clone)]
pub struct RunTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl RunTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step_index: usize, module_id: &str, event_type: EventType) {
        self.events.push(TimelineEvent {
            step_index,
            module_id: module_id.to_string(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Wall-clock time the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Timing per finished step, ordered by step index.
    ///
    /// Steps that started but never finished are left out.
    pub fn step_timings(&self) -> BTreeMap<usize, StepTiming> {
        let mut starts: BTreeMap<usize, Duration> = BTreeMap::new();
        let mut timings = BTreeMap::new();

        for event in &self.events {
            let offset = event.timestamp.duration_since(self.start_time);

            match event.event_type {
                EventType::Started => {
                    starts.insert(event.step_index, offset);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&event.step_index) {
                        timings.insert(
                            event.step_index,
                            StepTiming {
                                module_id: event.module_id.clone(),
                                started: *start,
                                duration: offset.saturating_sub(*start),
                                failed: event.event_type == EventType::Failed,
                            },
                        );
                    }
                }
            }
        }

        timings
    }

    /// Renders a text summary with one bar per step.
    pub fn summary(&self) -> String {
        let mut output = format!(
            "\nRun Timeline (started {}):\n\n",
            self.started_at.to_rfc3339()
        );

        let total_ms = self.elapsed().as_millis().max(1);

        // Scale to 40 characters width
        let scale = 40.0 / total_ms as f64;

        for (index, timing) in self.step_timings() {
            let start_pos = (timing.started.as_millis() as f64 * scale) as usize;
            let width = (timing.duration.as_millis() as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "{:>3} {:28} |{:40}| {} ms{}\n",
                index,
                truncate(&timing.module_id, 28),
                bar,
                timing.duration.as_millis(),
                if timing.failed { " FAILED" } else { "" }
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", self.elapsed().as_millis()));
        output
    }
}

impl Default for RunTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a string to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = RunTimeline::new();
        assert!(timeline.events().is_empty());
        assert!(timeline.step_timings().is_empty());
    }

    #[test]
    fn test_step_timings() {
        let mut timeline = RunTimeline::new();
        timeline.add_event(0, "input__core_extract__v1", EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event(0, "input__core_extract__v1", EventType::Completed);

        let timings = timeline.step_timings();
        let step = timings.get(&0).unwrap();
        assert_eq!(step.module_id, "input__core_extract__v1");
        assert!(step.duration >= Duration::from_millis(20));
        assert!(!step.failed);
    }

    #[test]
    fn test_repeated_module_tracked_per_index() {
        let mut timeline = RunTimeline::new();
        timeline.add_event(0, "m1", EventType::Started);
        timeline.add_event(0, "m1", EventType::Completed);
        timeline.add_event(1, "m1", EventType::Started);
        timeline.add_event(1, "m1", EventType::Failed);

        let timings = timeline.step_timings();
        assert_eq!(timings.len(), 2);
        assert!(!timings[&0].failed);
        assert!(timings[&1].failed);
    }

    #[test]
    fn test_unfinished_step_is_omitted() {
        let mut timeline = RunTimeline::new();
        timeline.add_event(0, "m1", EventType::Started);
        assert!(timeline.step_timings().is_empty());
    }

    #[test]
    fn test_summary_lists_steps() {
        let mut timeline = RunTimeline::new();
        timeline.add_event(0, "step_one", EventType::Started);
        thread::sleep(Duration::from_millis(10));
        timeline.add_event(0, "step_one", EventType::Completed);
        timeline.add_event(1, "step_two", EventType::Started);
        timeline.add_event(1, "step_two", EventType::Failed);

        let summary = timeline.summary();
        assert!(summary.contains("Run Timeline"));
        assert!(summary.contains("step_one"));
        assert!(summary.contains("step_two"));
        assert!(summary.contains("FAILED"));
        assert!(summary.contains("Total:"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("example_generator__positive", 10), "example...");
    }
}
