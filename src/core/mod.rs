pub mod adapters;
pub mod auction;
pub mod demand;
pub mod events;
pub mod fpd;
pub mod idr;
pub mod observability;
pub mod ortb;
pub mod pipeline;
