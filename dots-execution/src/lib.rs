//! Load generation for DOTS
//!
//! The [`LoadController`] decides when to open another database connection
//! and hand it to the [`WorkerPool`], where a [`Workload`] runs against it
//! until termination. [`RunSession`] wires the controller, the performance
//! sampler and the summary writer into one run.

pub mod connection;
pub mod controller;
pub mod error;
pub mod generator;
pub mod pool;
pub mod session;
pub mod workload;
pub mod workloads;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use connection::{Backend, Connection, ConnectionFactory, SqlValue, SqlxConnectionFactory, Statement};
pub use controller::{ControllerReport, ControllerState, ControllerTiming, LoadController, SpawnPolicy};
pub use error::{DbError, ExecutionError};
pub use generator::DataGenerator;
pub use pool::WorkerPool;
pub use session::{RunReport, RunSession};
pub use workload::{prepare_schema, WorkerContext, Workload, WorkloadOutcome, WorkloadRegistry};
