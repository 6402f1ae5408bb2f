use crate::core::idr::breaker::{BreakerConfig, CircuitBreaker};
use crate::core::idr::model::{ModeToggle, SelectRequest, SelectResponse};
use crate::core::ortb::BidRequest;
use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Response, redirect, retry};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Hard cap on selector response bodies, a malformed or hostile
/// reply can not balloon memory past this
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Failure modes of a selector call. The orchestrator treats every
/// variant as fail-open, these exist for recording and breaker
/// accounting only
#[derive(Debug)]
pub enum IdrError {
    /// Breaker is open, the call never touched the network
    CircuitOpen,
    Transport(String),
    Protocol { status: u16 },
    Parse(String),
    BodyTooLarge,
}

impl fmt::Display for IdrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdrError::CircuitOpen => write!(f, "circuit breaker open"),
            IdrError::Transport(msg) => write!(f, "transport error: {}", msg),
            IdrError::Protocol { status } => write!(f, "unexpected status {}", status),
            IdrError::Parse(msg) => write!(f, "parse error: {}", msg),
            IdrError::BodyTooLarge => write!(f, "response body exceeded {} bytes", MAX_BODY_BYTES),
        }
    }
}

impl std::error::Error for IdrError {}

/// Client for the Intelligent Demand Router selector service.
///
/// Every remote call runs under the per-call timeout and the
/// circuit breaker. Callers decide what a failure means, for the
/// auction path it always means fail open with the full bidder set.
pub struct IdrClient {
    http: Client,
    base_url: String,
    per_call_timeout: Duration,
    breaker: CircuitBreaker,
}

impl IdrClient {
    pub fn new(
        service_url: &str,
        per_call_timeout: Duration,
        breaker_cfg: BreakerConfig,
    ) -> Result<Self, anyhow::Error> {
        let http = Client::builder()
            .user_agent("nexus-idr")
            .connect_timeout(per_call_timeout)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(20)))
            .tcp_nodelay(true)
            .retry(retry::never())
            .referer(false)
            .redirect(redirect::Policy::none())
            .timeout(per_call_timeout)
            .hickory_dns(true)
            .build()
            .map_err(anyhow::Error::from)?;

        Ok(IdrClient {
            http,
            base_url: service_url.trim_end_matches('/').to_string(),
            per_call_timeout,
            breaker: CircuitBreaker::new(breaker_cfg),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Drain the body up to the hard cap, erroring instead of
    /// buffering an oversized reply
    async fn read_body_limited(res: Response) -> Result<Bytes, IdrError> {
        let mut body = BytesMut::new();
        let mut res = res;

        while let Some(chunk) = res
            .chunk()
            .await
            .map_err(|e| IdrError::Transport(e.to_string()))?
        {
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                return Err(IdrError::BodyTooLarge);
            }

            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }

    async fn execute_json(&self, builder: reqwest::RequestBuilder) -> Result<Bytes, IdrError> {
        let res = builder
            .timeout(self.per_call_timeout)
            .send()
            .await
            .map_err(|e| IdrError::Transport(e.to_string()))?;

        let status = res.status().as_u16();
        if status != 200 {
            return Err(IdrError::Protocol { status });
        }

        Self::read_body_limited(res).await
    }

    /// Run one call under the breaker, recording the outcome
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, IdrError>>,
    ) -> Result<T, IdrError> {
        if !self.breaker.try_acquire() {
            return Err(IdrError::CircuitOpen);
        }

        match call.await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    /// Ask the selector to down-select the bidder set for a request
    pub async fn select(
        &self,
        req: &BidRequest,
        available_bidders: &[String],
    ) -> Result<SelectResponse, IdrError> {
        let body = SelectRequest {
            request: req,
            available_bidders,
        };

        self.guarded(async {
            let bytes = self
                .execute_json(self.http.post(self.url("/api/select")).json(&body))
                .await?;

            let parsed: SelectResponse =
                serde_json::from_slice(&bytes).map_err(|e| IdrError::Parse(e.to_string()))?;

            debug!(
                "IDR selected {} of {} bidders in {}ms",
                parsed.selected_bidders.len(),
                available_bidders.len(),
                parsed.processing_time_ms
            );

            Ok(parsed)
        })
        .await
    }

    /// Fetch the selector's opaque configuration document
    pub async fn fetch_config(&self) -> Result<Value, IdrError> {
        self.guarded(async {
            let bytes = self
                .execute_json(self.http.get(self.url("/api/config")))
                .await?;

            serde_json::from_slice(&bytes).map_err(|e| IdrError::Parse(e.to_string()))
        })
        .await
    }

    /// Toggle the remote service's bypass or shadow mode
    pub async fn set_mode(&self, mode: &str, enabled: bool) -> Result<(), IdrError> {
        let path = format!("/api/mode/{}", mode);

        self.guarded(async {
            self.execute_json(
                self.http
                    .post(self.url(&path))
                    .json(&ModeToggle { enabled }),
            )
            .await?;

            Ok(())
        })
        .await
    }

    /// Push a batch of per-bidder outcome events
    pub async fn post_events<T: Serialize>(&self, events: &[T]) -> Result<(), IdrError> {
        self.guarded(async {
            self.execute_json(
                self.http
                    .post(self.url("/api/events"))
                    .json(&serde_json::json!({ "events": events })),
            )
            .await?;

            Ok(())
        })
        .await
    }

    /// Liveness probe of the remote service
    pub async fn health(&self) -> Result<(), anyhow::Error> {
        let res = self
            .http
            .get(self.url("/health"))
            .timeout(self.per_call_timeout)
            .send()
            .await?;

        if res.status().as_u16() != 200 {
            return Err(anyhow!("IDR health returned {}", res.status()));
        }

        Ok(())
    }
}
