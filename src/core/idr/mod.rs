pub mod breaker;
pub mod client;
pub mod model;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use client::{IdrClient, IdrError};
pub use model::{IdrDecision, SelectResponse};
