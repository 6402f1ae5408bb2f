pub mod flush_recorder;
pub mod stop_server;
