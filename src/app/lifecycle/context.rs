use crate::app::config::{FpdConfig, NexusConfig};
use crate::app::pipeline::auction::AuctionContext;
use crate::app::server::Server;
use crate::core::adapters::BidderRegistry;
use crate::core::adapters::dynamic::DynamicRegistry;
use crate::core::events::EventRecorder;
use crate::core::idr::IdrClient;
use crate::core::pipeline::Pipeline;
use anyhow::Error;
use std::sync::{Arc, OnceLock};

/// Shared slots the startup tasks fill in order, and shutdown
/// tasks drain. Everything is set exactly once
#[derive(Default)]
pub struct StartupContext {
    /// Local config options
    pub config: OnceLock<NexusConfig>,

    /// Static bidder registry, read-only after load
    pub registry: OnceLock<Arc<BidderRegistry>>,
    /// Dynamic bidder registry with its refresh loop, when enabled
    pub dynamic_registry: OnceLock<Arc<DynamicRegistry>>,

    /// Selector client plus breaker, when IDR is enabled
    pub idr_client: OnceLock<Arc<IdrClient>>,
    /// FPD flags fetched from the selector's config document,
    /// overriding the local ones when present
    pub remote_fpd: OnceLock<FpdConfig>,

    /// Outcome event recorder, when event recording is enabled
    pub event_recorder: OnceLock<Arc<EventRecorder>>,

    /// The pipeline which defines the tasks a bid request flows
    /// through for handling
    pub auction_pipeline: OnceLock<Arc<Pipeline<AuctionContext, Error>>>,
    /// The web server
    pub server: OnceLock<Server>,
}
