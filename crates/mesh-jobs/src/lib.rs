//! The job engine (C4): owns jobs, their plans, group-by-group execution,
//! task fan-out, and reduction (spec §4.4).

pub mod dispatch;
pub mod engine;

pub use dispatch::{TaskDispatcher, TaskOutcome};
pub use engine::{JobEngine, JobSummary, JobView};
