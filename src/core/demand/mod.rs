pub mod client;
pub mod encoding;

pub use client::BidderClient;
