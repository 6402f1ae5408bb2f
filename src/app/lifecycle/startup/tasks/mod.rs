pub mod adapters_load;
pub mod auction_pipeline;
pub mod config_load;
pub mod dynamic_load;
pub mod idr_init;
pub mod observability;
pub mod recorder_start;
pub mod start_server;
