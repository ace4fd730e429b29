//! Host performance sampling for DOTS
//!
//! A line-oriented request/response protocol connects the load harness
//! ([`PerfSampler`]) to a companion process on the database host
//! ([`PerfRelay`]). Samples are folded into interval and all-time
//! statistics ([`PerfAggregate`]) that the summary writer renders.

pub mod aggregate;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod sampler;
pub mod transport;

// Re-export main types
pub use aggregate::{MetricStats, PerfAggregate};
pub use error::PerfError;
pub use protocol::{InitReply, MetricLayout, PerfRequest, PerfSample, PROTOCOL_VERSION};
pub use relay::{CounterSource, PerfRelay, SystemCounters};
pub use sampler::{PerfMonitor, PerfSampler, SamplerExit};
pub use transport::LineTransport;
