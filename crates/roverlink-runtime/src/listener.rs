//! [`Bridge`] – the mission TCP listener.
//!
//! Owns the listening socket and the [`Translator`] (and through it the
//! action client). Connections are served strictly one at a time:
//!
//! ```text
//! accept → read frame → decode → validate → dispatch → await result → close
//! ```
//!
//! and only then is the next connection accepted. Goals therefore reach the
//! action server in the order their connections were read. Nothing is ever
//! written back to the ground station.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use roverlink_middleware::framing::DEFAULT_MAX_PAYLOAD_BYTES;
use roverlink_middleware::{ActionClient, FrameEnd, Framing, read_frame};
use roverlink_types::BridgeError;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::translator::{ConnectionOutcome, DispatchTimeouts, Translator};

/// Default TCP port for mission traffic.
pub const DEFAULT_PORT: u16 = 5005;

/// Runtime settings for a [`Bridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub listen_addr: SocketAddr,
    pub framing: Framing,
    pub max_payload_bytes: usize,
    pub timeouts: DispatchTimeouts,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            framing: Framing::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            timeouts: DispatchTimeouts::default(),
        }
    }
}

/// TCP-to-action bridge instance.
///
/// # Example
///
/// ```rust,no_run
/// use roverlink_middleware::SimActionClient;
/// use roverlink_runtime::{Bridge, BridgeConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
///     let bridge = Bridge::bind(&BridgeConfig::default(), SimActionClient::new("/mission"))
///         .await
///         .expect("bind failed");
///     bridge.run(stop_rx).await.expect("bridge failed");
/// }
/// ```
pub struct Bridge<C> {
    listener: TcpListener,
    framing: Framing,
    max_payload_bytes: usize,
    translator: Translator<C>,
}

impl<C: ActionClient> Bridge<C> {
    /// Bind the mission listener and take ownership of `client`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the socket cannot be bound. This is
    /// the only fatal bridge error.
    pub async fn bind(config: &BridgeConfig, client: C) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: config.listen_addr.to_string(),
                source,
            })?;
        info!(
            addr = %config.listen_addr,
            framing = %config.framing,
            action = %client.action_name(),
            "mission bridge listening"
        );
        Ok(Self {
            listener,
            framing: config.framing,
            max_payload_bytes: config.max_payload_bytes,
            translator: Translator::new(client, config.timeouts),
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until `shutdown` flips to `true`.
    ///
    /// A shutdown arriving while a mission is in flight abandons that
    /// mission; the action server is not told.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), BridgeError> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "accept error");
                        continue;
                    }
                },
            };

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    warn!(peer = %peer, "shutdown requested; abandoning in-flight mission");
                    break;
                }
                _ = self.serve_connection(stream, peer) => {}
            }
        }

        info!("mission bridge stopped");
        Ok(())
    }

    /// Read, translate and dispatch a single connection, then close it.
    pub async fn serve_connection(
        &mut self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> ConnectionOutcome {
        let span = info_span!("connection", conn_id = %Uuid::new_v4(), peer = %peer);

        async move {
            info!("connection accepted");

            let outcome = match read_frame(&mut stream, self.framing, self.max_payload_bytes).await {
                Ok(frame) => {
                    if let FrameEnd::ReadError(e) = &frame.end {
                        warn!(
                            error = %e,
                            received = frame.bytes.len(),
                            "connection dropped before the payload ended"
                        );
                    }
                    self.translator.handle(&frame.bytes).await
                }
                Err(e) => {
                    error!(error = %e, "discarding payload");
                    ConnectionOutcome::FramingFailed(e.to_string())
                }
            };

            let _ = stream.shutdown().await;
            info!(outcome = outcome.label(), "connection closed");
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Resolve once the shutdown flag is `true`. Never resolves if the sender is
/// gone without having requested shutdown.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
