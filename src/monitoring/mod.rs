//! Run Monitoring
//!
//! Records step timings during workflow runs.
//!
//! # Components
//!
//! - [`RunTimeline`]: step start/end timing and a text summary

pub mod timeline;

pub use timeline::{EventType, RunTimeline, StepTiming, TimelineEvent};
