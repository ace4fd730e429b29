//! Built-in workloads

mod auction;
mod basic;
mod metadata;
mod procedure;

pub use auction::AuctionWorkload;
pub use basic::BasicWorkload;
pub use metadata::MetadataWorkload;
pub use procedure::ProcedureWorkload;
