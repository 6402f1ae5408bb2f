use crate::core::adapters::AdapterSpec;
use crate::core::auction::AuctionType;
use config::Config;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the http server
    pub bind: String,
    /// Inbound json payloads above this limit get a 413
    pub max_payload_bytes: usize,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_payload_bytes: 1024 * 1024,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct AuctionConfig {
    /// Fallback deadline when the request carries no tmax. The
    /// effective deadline is min(tmax, default_timeout)
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Upper bound on the bidder set after selection, 0 = no cap
    pub max_bidders: usize,
    /// Every outbound request is normalized to this currency and
    /// responses in any other currency are dropped
    pub default_currency: String,
    pub auction_type: AuctionType,
    /// Second price increment over the runner-up bid
    pub price_increment: f64,
    /// Bids below this CPM are rejected outright
    pub min_bid_price: f64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(500),
            max_bidders: 0,
            default_currency: "USD".to_string(),
            auction_type: AuctionType::FirstPrice,
            price_increment: 0.01,
            min_bid_price: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct IdrConfig {
    pub enabled: bool,
    pub service_url: String,
    /// Budget for one selector call, a small fraction of the
    /// auction deadline
    #[serde(with = "humantime_serde")]
    pub per_call_timeout: Duration,
    /// Consecutive failures before the breaker trips open
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing again
    pub success_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for IdrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_url: "http://127.0.0.1:9100".to_string(),
            per_call_timeout: Duration::from_millis(50),
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,
    /// Bounded buffer size, enqueues beyond it are dropped
    pub buffer_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Grace period for the shutdown flush
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 10_000,
            flush_interval: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct DynamicBiddersConfig {
    pub enabled: bool,
    /// File holding the dynamic bidder declarations
    pub path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub refresh_period: Duration,
}

impl Default for DynamicBiddersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("dynamic_bidders.json"),
            refresh_period: Duration::from_secs(60),
        }
    }
}

/// First party data pipeline toggles. Category flags gate
/// extraction only, a disabled category simply contributes nothing
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct FpdConfig {
    pub enabled: bool,
    /// Gates site and app contextual data
    pub site_enabled: bool,
    pub user_enabled: bool,
    pub imp_enabled: bool,
    /// Gates request level additions from ext.prebid.data
    pub global_enabled: bool,
    /// Gates per bidder overrides from ext.prebid.bidderconfig
    pub bidderconfig_enabled: bool,
    /// Gates nesting content data under the site/app fragment
    pub content_enabled: bool,
    pub eids_enabled: bool,
    /// EID sources allowed through the filter
    pub eid_sources: Vec<String>,
}

impl Default for FpdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            site_enabled: true,
            user_enabled: true,
            imp_enabled: true,
            global_enabled: true,
            bidderconfig_enabled: true,
            content_enabled: true,
            eids_enabled: false,
            eid_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for FileRotation {
    fn default() -> Self {
        FileRotation::Daily
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSink {
    /// Whether spans should be exported to this sink
    pub spans: bool,
    /// The kind of observability sink
    pub dest: LogType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogType {
    Stdout {
        #[serde(default = "default_logtype_color")]
        color: bool,
        #[serde(default)]
        json: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        json: bool,
        #[serde(default)]
        rotation: FileRotation,
    },
}

fn default_logtype_color() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub span_sample_rate: f32,
    #[serde(default)]
    pub sinks: Vec<LogSink>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            span_sample_rate: 0.01,
            sinks: vec![LogSink {
                spans: true,
                dest: LogType::Stdout {
                    color: true,
                    json: false,
                },
            }],
        }
    }
}

impl LoggingConfig {
    /// Validates the logging configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sinks.is_empty() {
            anyhow::bail!("At least one logging sink must be configured");
        }

        self.level.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                self.level
            )
        })?;

        if !(0.0..=1.0).contains(&self.span_sample_rate) {
            anyhow::bail!(
                "span_sample_rate must be between 0.0 and 1.0, got {}",
                self.span_sample_rate
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[serde(default)]
pub struct NexusConfig {
    pub server: ServerConfig,
    pub auction: AuctionConfig,
    pub idr: IdrConfig,
    pub events: EventsConfig,
    pub dynamic_bidders: DynamicBiddersConfig,
    pub fpd: FpdConfig,
    /// Static bidder declarations registered at startup
    pub bidders: Vec<AdapterSpec>,
    pub logging: LoggingConfig,
}

impl NexusConfig {
    pub fn load(path: &PathBuf) -> Result<NexusConfig, anyhow::Error> {
        let cfg = Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?;

        let parsed: NexusConfig = cfg.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.auction.default_timeout.is_zero() {
            anyhow::bail!("auction.default_timeout must be positive");
        }

        if self.auction.default_currency.len() != 3 {
            anyhow::bail!(
                "auction.default_currency must be an ISO-4217 code, got '{}'",
                self.auction.default_currency
            );
        }

        if self.auction.price_increment < 0.0 {
            anyhow::bail!("auction.price_increment can not be negative");
        }

        if self.idr.enabled && self.idr.service_url.is_empty() {
            anyhow::bail!("idr.service_url required when idr is enabled");
        }

        if self.events.enabled && self.events.buffer_size == 0 {
            anyhow::bail!("events.buffer_size must be positive when events are enabled");
        }

        if self.events.enabled && self.events.flush_interval.is_zero() {
            anyhow::bail!("events.flush_interval must be positive when events are enabled");
        }

        if self.dynamic_bidders.enabled && self.dynamic_bidders.refresh_period.is_zero() {
            anyhow::bail!("dynamic_bidders.refresh_period must be positive when enabled");
        }

        self.logging.validate()
    }
}
