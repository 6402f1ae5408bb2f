use crate::core::adapters::adapter::{
    BidderError, Header, HttpMethod, RequestData, ResponseData,
};
use bytes::BytesMut;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, redirect, retry};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Hard cap on bidder response bodies
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared outbound http client for bidder callouts.
///
/// One pooled client across all auctions amortizes connection
/// establishment, per-host idle caps keep one slow exchange from
/// exhausting sockets. Every call carries an explicit per-request
/// timeout derived from the remaining auction deadline.
pub struct BidderClient {
    client: OnceLock<Client>,
}

impl BidderClient {
    fn init_client() -> Result<Client, anyhow::Error> {
        Client::builder()
            .user_agent("nexus-exchange")
            .connect_timeout(Duration::from_secs(1))
            .pool_max_idle_per_host(128)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(20)))
            .retry(retry::never())
            .referer(false)
            .redirect(redirect::Policy::none())
            .tcp_nodelay(true)
            .deflate(true)
            .gzip(true)
            .hickory_dns(true)
            .http2_adaptive_window(true)
            .build()
            .map_err(anyhow::Error::from)
    }

    /// Create a new bidder client, eagerly building the underlying
    /// http client to afford graceful failure on startup
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(BidderClient {
            client: OnceLock::from(Self::init_client()?),
        })
    }

    /// Issue one adapter-built call bounded by `timeout`.
    ///
    /// # Behavior
    /// A completed http exchange is Ok regardless of status code,
    /// the adapter decides what a 400 or 503 means. Errors are
    /// returned only for transport failures and the timeout
    pub async fn execute(
        &self,
        bidder_code: &str,
        data: &RequestData,
        timeout: Duration,
    ) -> Result<ResponseData, BidderError> {
        let client = self.client.get().expect("Client should never be missing");

        let mut headers = HeaderMap::new();
        for header in &data.headers {
            let key = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|e| BidderError::Adapter(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| BidderError::Adapter(format!("invalid header value: {}", e)))?;

            headers.insert(key, value);
        }

        let builder = match data.method {
            HttpMethod::Post => client.post(&data.url),
            HttpMethod::Get => client.get(&data.url),
        };

        let res = builder
            .headers(headers)
            .body(data.body.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BidderError::TimedOut
                } else {
                    BidderError::Transport(format!("{} call failed: {}", bidder_code, e))
                }
            })?;

        let status = res.status().as_u16();

        let response_headers: Vec<Header> = res
            .headers()
            .iter()
            .filter_map(|(key, value)| {
                value.to_str().ok().map(|v| Header::new(key.as_str(), v))
            })
            .collect();

        debug!("Bidder {} responded {}", bidder_code, status);

        let mut body = BytesMut::new();
        let mut res = res;

        while let Some(chunk) = res.chunk().await.map_err(|e| {
            if e.is_timeout() {
                BidderError::TimedOut
            } else {
                BidderError::Transport(format!("{} body read failed: {}", bidder_code, e))
            }
        })? {
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                return Err(BidderError::Transport(format!(
                    "{} response exceeded {} bytes",
                    bidder_code, MAX_BODY_BYTES
                )));
            }

            body.extend_from_slice(&chunk);
        }

        Ok(ResponseData {
            status,
            body: body.freeze(),
            headers: response_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = BidderClient::new().unwrap();

        let data = RequestData {
            method: HttpMethod::Post,
            url: "http://127.0.0.1:1/rtb".to_string(),
            headers: vec![Header::new("content-type", "application/json")],
            body: b"{}".to_vec(),
            timeout: None,
        };

        let result = client
            .execute("acme", &data, Duration::from_millis(200))
            .await;

        assert!(matches!(
            result,
            Err(BidderError::Transport(_)) | Err(BidderError::TimedOut)
        ));
    }

    #[tokio::test]
    async fn test_invalid_header_rejected_before_send() {
        let client = BidderClient::new().unwrap();

        let data = RequestData {
            method: HttpMethod::Post,
            url: "http://127.0.0.1:1/rtb".to_string(),
            headers: vec![Header::new("bad header name", "x")],
            body: Vec::new(),
            timeout: None,
        };

        let result = client
            .execute("acme", &data, Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(BidderError::Adapter(_))));
    }
}
