use crate::core::adapters::adapter::Header;
use crate::core::ortb::{BidRequest, BidResponse};
use anyhow::anyhow;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

pub struct EncodedRequest {
    pub headers: Vec<Header>,
    pub data: Vec<u8>,
}

/// Encodes outbound bid request bodies and assigns the headers
/// required for the chosen encoding
pub struct RequestEncoder;

impl RequestEncoder {
    fn compress(data: Vec<u8>) -> Result<Vec<u8>, anyhow::Error> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(1024), Compression::fast());
        encoder.write_all(&data)?;

        Ok(encoder.finish()?)
    }

    /// Encode the request as json, gzipped when the bidder opts in
    pub fn encode(req: &BidRequest, gzip: bool) -> Result<EncodedRequest, anyhow::Error> {
        let mut headers = vec![Header::new("content-type", "application/json")];

        let mut data = serde_json::to_vec(req)?;

        if gzip {
            headers.push(Header::new("content-encoding", "gzip"));
            data = Self::compress(data)?;
        }

        Ok(EncodedRequest { headers, data })
    }
}

pub struct ResponseDecoder;

impl ResponseDecoder {
    pub fn decode(data: &Bytes) -> Result<BidResponse, anyhow::Error> {
        serde_json::from_slice(data.as_ref())
            .map_err(|e| anyhow!("Failed decoding json response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ortb::request::BidRequestBuilder;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_plain_json_encoding() {
        let req = BidRequestBuilder::default().id("r1").build().unwrap();
        let encoded = RequestEncoder::encode(&req, false).unwrap();

        assert_eq!(encoded.headers.len(), 1);
        assert_eq!(encoded.headers[0].key, "content-type");
        assert_eq!(encoded.data, br#"{"id":"r1"}"#);
    }

    #[test]
    fn test_gzip_encoding_round_trips() {
        let req = BidRequestBuilder::default().id("r2").build().unwrap();
        let encoded = RequestEncoder::encode(&req, true).unwrap();

        assert!(
            encoded
                .headers
                .iter()
                .any(|h| h.key == "content-encoding" && h.value == "gzip")
        );

        let mut decoder = GzDecoder::new(encoded.data.as_slice());
        let mut inflated = String::new();
        decoder.read_to_string(&mut inflated).unwrap();

        assert_eq!(inflated, r#"{"id":"r2"}"#);
    }
}
