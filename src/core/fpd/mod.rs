pub mod eids;
pub mod processor;

pub use processor::ResolvedFpd;
