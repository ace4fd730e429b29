//! # DOTS Output
//!
//! Run summaries: elapsed time, live workers, API call counters with their
//! rates, and the performance aggregate. [`SummaryWriter`] journals one on a
//! fixed cadence and a final one when the run stops.

pub mod report;
pub mod summary;

pub use report::{format_elapsed, ReportKind, SummaryReport};
pub use summary::SummaryWriter;
