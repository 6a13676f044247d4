//! # Exchange Client
//!
//! Requests headers from one server peer. Each call opens a fresh stream,
//! writes a single request, reads the expected number of response frames and
//! closes the stream. No retries at this layer.

use async_trait::async_trait;
use quantum_telemetry::{
    metric_inc, time_histogram, HEADER_CLIENT_REQUESTS, HEADER_CLIENT_REQUEST_DURATION,
    HEADER_EXCHANGE_BYTES,
};
use shared_types::{short_hash, Hash, PeerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::ExchangeConfig;
use crate::domain::{ExchangeError, ExtendedHeader, RequestError};
use crate::ports::{HeaderExchange, Host, PeerStream};
use crate::wire::{CodecError, ExtendedHeaderRequest, HeaderResponse, MessageCodec};

/// Client half of the header exchange.
pub struct ExchangeClient {
    host: Arc<dyn Host>,
    server: PeerId,
    config: ExchangeConfig,
    codec: MessageCodec,
    stopped: AtomicBool,
}

impl ExchangeClient {
    /// Client dialing `server` through `host`.
    pub fn new(host: Arc<dyn Host>, server: PeerId, config: ExchangeConfig) -> Self {
        let codec = MessageCodec::new(config.max_message_size);
        Self {
            host,
            server,
            config,
            codec,
            stopped: AtomicBool::new(false),
        }
    }

    /// Peer this client requests from.
    pub fn server_peer(&self) -> PeerId {
        self.server
    }

    /// Refuse all further requests.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!(server = %self.server, "Header exchange client stopped");
        }
    }

    /// Whether [`ExchangeClient::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Run one request with the configured deadline and record its outcome.
    async fn execute(
        &self,
        operation: &'static str,
        request: ExtendedHeaderRequest,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError> {
        if self.is_stopped() {
            return Err(ExchangeError::Stopped);
        }
        let expected = request
            .mode(self.config.max_headers_per_request)?
            .expected_responses();

        let _timer = time_histogram!(HEADER_CLIENT_REQUEST_DURATION, &[operation]);
        let started = Instant::now();
        let deadline = self.config.request_timeout();
        let round_trip = self.round_trip(&request, expected);
        let result = match tokio::time::timeout(deadline, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(deadline)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metric_inc!(HEADER_CLIENT_REQUESTS, &[operation, outcome]);

        match &result {
            Ok(headers) => debug!(
                server = %self.server,
                operation,
                received = headers.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "header request completed"
            ),
            Err(e) => debug!(server = %self.server, operation, error = %e, "header request failed"),
        }
        result
    }

    async fn round_trip(
        &self,
        request: &ExtendedHeaderRequest,
        expected: u64,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError> {
        let mut stream = self
            .host
            .new_stream(self.server, &self.config.protocol_id)
            .await?;

        let sent = self
            .codec
            .write(&mut stream, request)
            .await
            .map_err(|e| ExchangeError::Io(e.to_string()))?;
        HEADER_EXCHANGE_BYTES
            .with_label_values(&["sent"])
            .inc_by(sent as f64);

        let headers = self.read_responses(&mut stream, expected).await?;
        // Best effort: the server closes its side after the last frame.
        let _ = stream.shutdown().await;
        Ok(headers)
    }

    async fn read_responses(
        &self,
        stream: &mut PeerStream,
        expected: u64,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError> {
        let capacity = expected.min(self.config.max_headers_per_request) as usize;
        let mut headers = Vec::with_capacity(capacity);

        while (headers.len() as u64) < expected {
            let (response, read) = match self.codec.read::<_, HeaderResponse>(stream).await {
                Ok(frame) => frame,
                Err(CodecError::Closed) => {
                    return Err(ExchangeError::IncompleteResponse {
                        expected,
                        received: headers.len() as u64,
                    })
                }
                Err(CodecError::Io(e)) => return Err(ExchangeError::Io(e.to_string())),
                Err(e) => return Err(ExchangeError::MalformedResponse(e.to_string())),
            };
            HEADER_EXCHANGE_BYTES
                .with_label_values(&["received"])
                .inc_by(read as f64);

            match response {
                HeaderResponse::NotFound => return Err(ExchangeError::NotFound),
                HeaderResponse::Found(msg) => {
                    let header = ExtendedHeader::from_wire(msg)
                        .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;
                    headers.push(header);
                }
            }
        }
        Ok(headers)
    }

    fn single(mut headers: Vec<ExtendedHeader>) -> Result<ExtendedHeader, ExchangeError> {
        match headers.pop() {
            Some(header) if headers.is_empty() => Ok(header),
            _ => Err(ExchangeError::MalformedResponse(
                "expected exactly one header".into(),
            )),
        }
    }

    fn check_range(&self, from: u64, amount: u64) -> Result<(), RequestError> {
        if from == 0 {
            return Err(RequestError::ZeroHeight);
        }
        ExtendedHeaderRequest::by_height(from, amount)
            .mode(self.config.max_headers_per_request)
            .map(|_| ())
    }
}

#[async_trait]
impl HeaderExchange for ExchangeClient {
    async fn request_head(&self) -> Result<ExtendedHeader, ExchangeError> {
        let headers = self
            .execute("request_head", ExtendedHeaderRequest::head())
            .await?;
        Self::single(headers)
    }

    async fn request_header(&self, height: u64) -> Result<ExtendedHeader, ExchangeError> {
        self.check_range(height, 1)?;
        let headers = self
            .execute("request_header", ExtendedHeaderRequest::by_height(height, 1))
            .await?;
        let header = Self::single(headers)?;
        if header.height() != height {
            return Err(ExchangeError::MalformedResponse(format!(
                "requested height {height}, received {}",
                header.height()
            )));
        }
        Ok(header)
    }

    async fn request_headers(
        &self,
        from: u64,
        amount: u64,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError> {
        self.check_range(from, amount)?;
        let headers = self
            .execute(
                "request_headers",
                ExtendedHeaderRequest::by_height(from, amount),
            )
            .await?;

        for (expected, header) in (from..).zip(&headers) {
            if header.height() != expected {
                return Err(ExchangeError::MalformedResponse(format!(
                    "expected height {expected} in range, received {}",
                    header.height()
                )));
            }
        }
        Ok(headers)
    }

    async fn request_by_hash(&self, hash: &Hash) -> Result<ExtendedHeader, ExchangeError> {
        let headers = self
            .execute("request_by_hash", ExtendedHeaderRequest::by_hash(hash))
            .await?;
        let header = Self::single(headers)?;
        if header.hash() != *hash {
            return Err(ExchangeError::MalformedResponse(format!(
                "requested hash {}, received {}",
                short_hash(hash),
                short_hash(&header.hash())
            )));
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockHost, MockNetwork};
    use crate::test_utils::TestSuite;
    use crate::wire::ExtendedHeaderMsg;

    const PROTOCOL: &str = "/header-ex/v0.0.1";

    /// Serve every stream with `frames`, ignoring the request.
    fn scripted_server(host: &MockHost, frames: Vec<HeaderResponse>) {
        host.set_stream_handler(
            PROTOCOL,
            Arc::new(move |mut stream: PeerStream| {
                let frames = frames.clone();
                tokio::spawn(async move {
                    let codec = MessageCodec::new(1 << 20);
                    let _ = codec.read::<_, ExtendedHeaderRequest>(&mut stream).await;
                    for frame in &frames {
                        if codec.write(&mut stream, frame).await.is_err() {
                            return;
                        }
                    }
                });
            }),
        );
    }

    fn client_for(frames: Vec<HeaderResponse>) -> ExchangeClient {
        let (_net, hosts) = MockNetwork::full_mesh(2);
        scripted_server(&hosts[1], frames);
        let server = hosts[1].peer_id();
        let host: Arc<dyn Host> = hosts[0].clone();
        ExchangeClient::new(host, server, ExchangeConfig::for_testing())
    }

    fn found(header: &ExtendedHeader) -> HeaderResponse {
        HeaderResponse::Found(header.to_wire())
    }

    #[tokio::test]
    async fn test_wrong_height_is_malformed() {
        let mut suite = TestSuite::new(1);
        let headers = suite.gen_extended_headers(2);
        let client = client_for(vec![found(&headers[0])]);

        let err = client.request_header(2).await.unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_wrong_hash_is_malformed() {
        let mut suite = TestSuite::new(1);
        let headers = suite.gen_extended_headers(2);
        let client = client_for(vec![found(&headers[0])]);

        let err = client.request_by_hash(&headers[1].hash()).await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_short_range_is_incomplete() {
        let mut suite = TestSuite::new(1);
        let headers = suite.gen_extended_headers(3);
        let client = client_for(headers[..2].iter().map(found).collect());

        let err = client.request_headers(1, 3).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::IncompleteResponse {
                expected: 3,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_range_is_malformed() {
        let mut suite = TestSuite::new(1);
        let headers = suite.gen_extended_headers(2);
        let client = client_for(vec![found(&headers[1]), found(&headers[0])]);

        let err = client.request_headers(1, 2).await.unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_undecodable_header_is_malformed() {
        let client = client_for(vec![HeaderResponse::Found(ExtendedHeaderMsg::default())]);
        let err = client.request_head().await.unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_not_found_frame() {
        let client = client_for(vec![HeaderResponse::NotFound]);
        let err = client.request_by_hash(&[4u8; 32]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_validation_skips_network() {
        let client = client_for(vec![]);
        assert!(matches!(
            client.request_header(0).await,
            Err(ExchangeError::InvalidRequest(RequestError::ZeroHeight))
        ));
        assert!(matches!(
            client.request_headers(1, 0).await,
            Err(ExchangeError::InvalidRequest(RequestError::ZeroAmount))
        ));
        assert!(matches!(
            client.request_headers(1, 65).await,
            Err(ExchangeError::InvalidRequest(
                RequestError::AmountTooLarge { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_stopped_client_refuses() {
        let client = client_for(vec![HeaderResponse::NotFound]);
        client.stop();
        assert!(matches!(
            client.request_head().await,
            Err(ExchangeError::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        let (_net, hosts) = MockNetwork::full_mesh(2);
        let (held_tx, mut held_rx) = tokio::sync::mpsc::unbounded_channel();
        hosts[1].set_stream_handler(
            PROTOCOL,
            Arc::new(move |stream: PeerStream| {
                // keep the stream open without answering
                let _ = held_tx.send(stream);
            }),
        );
        let host: Arc<dyn Host> = hosts[0].clone();
        let client = ExchangeClient::new(host, hosts[1].peer_id(), ExchangeConfig::for_testing());

        let err = client.request_head().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Timeout(_)));
        assert!(held_rx.recv().await.is_some());
    }
}
