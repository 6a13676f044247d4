//! # Exchange Server
//!
//! Answers header requests from the local store. One task per inbound
//! stream, bounded by a semaphore; streams over the limit are closed
//! without a response.
//!
//! Store lookups that find nothing are answered with
//! [`HeaderResponse::NotFound`]. Any other store failure closes the stream
//! without a response so the remote observes an incomplete reply.

use parking_lot::Mutex;
use quantum_telemetry::{
    log_peer_event, metric_inc, HEADER_EXCHANGE_BYTES, HEADER_SERVER_REQUESTS,
    HEADER_SERVER_STREAMS_IN_FLIGHT, HEADER_SERVER_STREAMS_REJECTED, SUBSYSTEM_ERRORS,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};

use crate::config::{ExchangeConfig, MAX_CONCURRENT_STREAMS_LIMIT};
use crate::domain::{ExchangeError, ExtendedHeader, LifecycleState, RequestMode, StoreError};
use crate::ports::{HeaderStore, Host, PeerStream};
use crate::wire::{CodecError, ExtendedHeaderRequest, HeaderResponse, MessageCodec};

#[derive(Debug, Error)]
enum ServeError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("write: {0}")]
    Codec(#[from] CodecError),
}

/// Tracks one served stream in the in-flight gauge.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        HEADER_SERVER_STREAMS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        HEADER_SERVER_STREAMS_IN_FLIGHT.dec();
    }
}

/// State shared between the server and its stream tasks.
struct Responder {
    store: Arc<dyn HeaderStore>,
    codec: MessageCodec,
    config: ExchangeConfig,
}

impl Responder {
    async fn serve(&self, mut stream: PeerStream) {
        let peer = stream.remote_peer();

        let read = tokio::time::timeout(
            self.config.read_timeout(),
            self.codec.read::<_, ExtendedHeaderRequest>(&mut stream),
        )
        .await;
        let request = match read {
            Ok(Ok((request, bytes))) => {
                HEADER_EXCHANGE_BYTES
                    .with_label_values(&["received"])
                    .inc_by(bytes as f64);
                request
            }
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "failed to read header request");
                record("unknown", "malformed");
                return;
            }
            Err(_) => {
                warn!(
                    %peer,
                    timeout_ms = self.config.read_timeout_ms,
                    "header request read timed out"
                );
                record("unknown", "timeout");
                return;
            }
        };

        let mode = match request.mode(self.config.max_headers_per_request) {
            Ok(mode) => mode,
            Err(e) => {
                warn!(%peer, error = %e, "rejecting invalid header request");
                record("unknown", "invalid");
                return;
            }
        };
        debug!(
            %peer,
            mode = mode.label(),
            height = request.height,
            amount = request.amount,
            "serving header request"
        );

        match self.respond(&mut stream, mode).await {
            Ok(outcome) => record(mode.label(), outcome),
            Err(ServeError::Store(e)) => {
                error!(%peer, mode = mode.label(), error = %e, "header store lookup failed");
                metric_inc!(SUBSYSTEM_ERRORS, &["qc-18", "store"]);
                record(mode.label(), "store_error");
            }
            Err(ServeError::Codec(e)) => {
                warn!(%peer, mode = mode.label(), error = %e, "failed to write header response");
                metric_inc!(SUBSYSTEM_ERRORS, &["qc-18", "io"]);
                record(mode.label(), "io_error");
            }
        }
        let _ = stream.shutdown().await;
    }

    async fn respond(
        &self,
        stream: &mut PeerStream,
        mode: RequestMode,
    ) -> Result<&'static str, ServeError> {
        let headers = match self.resolve(mode).await {
            Ok(headers) => headers,
            Err(StoreError::NotFound | StoreError::Empty) => {
                self.send(stream, &HeaderResponse::NotFound).await?;
                return Ok("not_found");
            }
            Err(e) => return Err(e.into()),
        };

        for header in &headers {
            self.send(stream, &HeaderResponse::Found(header.to_wire()))
                .await?;
        }
        Ok("found")
    }

    async fn resolve(&self, mode: RequestMode) -> Result<Vec<ExtendedHeader>, StoreError> {
        match mode {
            RequestMode::Head => Ok(vec![self.store.head().await?]),
            RequestMode::Hash(hash) => Ok(vec![self.store.get(&hash).await?]),
            RequestMode::Height { from, amount: 1 } => {
                Ok(vec![self.store.get_by_height(from).await?])
            }
            RequestMode::Height { from, amount } => {
                // overflow already rejected when resolving the mode
                self.store
                    .get_range_by_height(from, from.saturating_add(amount))
                    .await
            }
        }
    }

    async fn send(
        &self,
        stream: &mut PeerStream,
        response: &HeaderResponse,
    ) -> Result<(), CodecError> {
        let written = self.codec.write(stream, response).await?;
        HEADER_EXCHANGE_BYTES
            .with_label_values(&["sent"])
            .inc_by(written as f64);
        Ok(())
    }
}

fn record(mode: &str, outcome: &str) {
    metric_inc!(HEADER_SERVER_REQUESTS, &[mode, outcome]);
}

/// Outcome of trying to take a stream slot.
enum Admission {
    Granted(OwnedSemaphorePermit),
    Full,
    ShuttingDown,
}

fn admit(permits: &Arc<Semaphore>) -> Admission {
    match permits.clone().try_acquire_owned() {
        Ok(permit) => Admission::Granted(permit),
        Err(TryAcquireError::NoPermits) => Admission::Full,
        Err(TryAcquireError::Closed) => Admission::ShuttingDown,
    }
}

/// Server half of the header exchange.
pub struct ExchangeServer {
    host: Arc<dyn Host>,
    responder: Arc<Responder>,
    permits: Arc<Semaphore>,
    state: Mutex<LifecycleState>,
}

impl ExchangeServer {
    /// Server answering from `store` on `host`.
    ///
    /// `max_concurrent_streams` is clamped to `1..=MAX_CONCURRENT_STREAMS_LIMIT`.
    pub fn new(
        host: Arc<dyn Host>,
        store: Arc<dyn HeaderStore>,
        mut config: ExchangeConfig,
    ) -> Self {
        config.max_concurrent_streams = config
            .max_concurrent_streams
            .clamp(1, MAX_CONCURRENT_STREAMS_LIMIT);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_streams));
        let codec = MessageCodec::new(config.max_message_size);
        Self {
            host,
            responder: Arc::new(Responder {
                store,
                codec,
                config,
            }),
            permits,
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Register the stream handler. Idempotent while running.
    pub fn start(&self) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Stopped => return Err(ExchangeError::Stopped),
            LifecycleState::Created => {}
        }

        let responder = self.responder.clone();
        let permits = self.permits.clone();
        self.host.set_stream_handler(
            &self.responder.config.protocol_id,
            Arc::new(move |stream: PeerStream| {
                let permit = match admit(&permits) {
                    Admission::Granted(permit) => permit,
                    Admission::Full => {
                        metric_inc!(HEADER_SERVER_STREAMS_REJECTED);
                        log_peer_event!(
                            warn,
                            "qc-18",
                            "stream limit reached, closing inbound stream",
                            stream.remote_peer()
                        );
                        return;
                    }
                    Admission::ShuttingDown => {
                        log_peer_event!(
                            debug,
                            "qc-18",
                            "server shutting down, closing inbound stream",
                            stream.remote_peer()
                        );
                        return;
                    }
                };
                let responder = responder.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _in_flight = InFlight::enter();
                    responder.serve(stream).await;
                });
            }),
        );

        *state = LifecycleState::Running;
        info!(
            peer = %self.host.peer_id(),
            protocol = %self.responder.config.protocol_id,
            max_streams = self.responder.config.max_concurrent_streams,
            "Header exchange server started"
        );
        Ok(())
    }

    /// Unregister the handler and wait up to the grace period for in-flight
    /// streams to finish.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Stopped {
                return;
            }
            *state = LifecycleState::Stopped;
        }
        self.host
            .remove_stream_handler(&self.responder.config.protocol_id);

        // clamped in `new`, always fits
        let total = self.responder.config.max_concurrent_streams;
        let all = u32::try_from(total).unwrap_or(u32::MAX);
        let grace = self.responder.config.shutdown_grace();
        match tokio::time::timeout(grace, self.permits.acquire_many(all)).await {
            Ok(_) => {}
            Err(_) => warn!(
                in_flight = total.saturating_sub(self.permits.available_permits()),
                grace_ms = grace.as_millis() as u64,
                "Header exchange server stopped with streams still in flight"
            ),
        }
        self.permits.close();
        info!(peer = %self.host.peer_id(), "Header exchange server stopped");
    }

    /// Streams currently being served.
    pub fn in_flight(&self) -> usize {
        if self.permits.is_closed() {
            return 0;
        }
        self.responder
            .config
            .max_concurrent_streams
            .saturating_sub(self.permits.available_permits())
    }
}
