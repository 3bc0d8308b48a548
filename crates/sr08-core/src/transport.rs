//! The transport seam.
//!
//! The actual BLE driver lives in the host application (a vendor SDK turns
//! MAC-address connect requests into a physical link and raw command bytes
//! into structured JSON notifications). This module defines the trait the
//! engine consumes and the events the driver must deliver.
//!
//! All requests are fire-and-forget: `connect` returns once the request is
//! accepted, not once the link is up. Link results and command replies both
//! arrive later on the event stream, any time, any order, and often
//! unsolicited: the ring pushes plenty of traffic no one asked for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

/// State of the link to the ring.
///
/// Written only by the [`crate::supervisor::ConnectionSupervisor`]; everyone
/// else observes it through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link.
    Disconnected,
    /// A connect request is in flight.
    Connecting,
    /// Link is up and commands can be sent.
    Connected,
}

/// Events delivered asynchronously by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A structured notification, tagged with the raw command key that
    /// logically caused it (`"GET77"`, `"GET,77"`, ...).
    Notification {
        key: String,
        payload: serde_json::Value,
    },
    /// The physical link changed state.
    Link(ConnectionState),
    /// The ring refused an operation because its battery is critically low.
    LowBattery,
}

/// Receiver half of the transport event stream.
pub type TransportEvents = broadcast::Receiver<TransportEvent>;

/// The command interface of the ring's BLE driver.
///
/// Implemented by the host application's driver bridge, and by
/// [`crate::mock::MockTransport`] for tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Request a connection to the peer with the given MAC address.
    ///
    /// Success means the request was accepted; the link result arrives
    /// later as [`TransportEvent::Link`].
    async fn connect(&self, peer: &str) -> Result<()>;

    /// Request a disconnect from the peer.
    async fn disconnect(&self, peer: &str) -> Result<()>;

    /// Dispatch a command. No acknowledgement is returned here; if the
    /// firmware replies at all, the reply arrives as a notification.
    async fn send(&self, command: &str) -> Result<()>;

    /// Subscribe to the event stream. Every subscriber sees every event.
    fn subscribe(&self) -> TransportEvents;
}
