//! `Remotebird` API Functions
//!
//! This module provides the public API functions for driving the AVRCP
//! profile task. Requests are fire-and-forget: each function queues a request
//! for the processor and returns once it is queued. The outcome arrives later
//! as an [`AvrcpEvent`] read with [`next_event`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use remotebird::{AvrcpEvent, api, constants::{features, version}, sdp::{ConfigRequest, RoleDetails}};
//!
//! # async fn example() {
//! // Advertise a category 1 target and accept one incoming connection
//! api::configure(ConfigRequest {
//!     target: Some(RoleDetails::new(version::V1_4, features::CATEGORY_1)),
//!     ..ConfigRequest::default()
//! })
//! .await;
//! api::activate(1).await;
//!
//! loop {
//!     match api::next_event().await {
//!         AvrcpEvent::ConnectIndication { connection_id, .. } => {
//!             // Remote controller connected
//!             let _ = connection_id;
//!         }
//!         AvrcpEvent::FrameIndication { frame, .. } => {
//!             // Hand the AV/C command to the target role
//!             let _ = frame;
//!         }
//!         _ => {}
//!     }
//! }
//! # }
//! ```

use crate::{
    AvrcpEvent, BluetoothAddress, EVENT_CHANNEL, REQUEST_CHANNEL, Request,
    avctp::Frame,
    channel::ChannelKind,
    cm::SecurityLevel,
    connection::ConnectionId,
    constants::MAX_CONNECTIONS,
    error::{AvrcpError, FrameError},
    sdp::ConfigRequest,
    with_avrcp,
};
use heapless::Vec;

/// Replace the local service records.
///
/// Answered by [`AvrcpEvent::ConfigConfirm`].
pub async fn configure(config: ConfigRequest) {
    REQUEST_CHANNEL.send(Request::Config(config)).await;
}

/// Start accepting up to `max_incoming` incoming connections.
///
/// Answered by [`AvrcpEvent::ActivateConfirm`].
pub async fn activate(max_incoming: u8) {
    REQUEST_CHANNEL
        .send(Request::Activate { max_incoming })
        .await;
}

/// Stop accepting incoming connections.
///
/// Answered by [`AvrcpEvent::DeactivateConfirm`].
pub async fn deactivate() {
    REQUEST_CHANNEL.send(Request::Deactivate).await;
}

/// Connect to a remote device.
///
/// Answered by [`AvrcpEvent::ConnectConfirm`].
pub async fn connect(address: BluetoothAddress) {
    REQUEST_CHANNEL.send(Request::Connect(address)).await;
}

/// Abort a connect to `address`, whether running or still queued.
///
/// Answered by [`AvrcpEvent::ConnectConfirm`] with `ConnectAttemptCancelled`,
/// or `NothingToCancel` when no connect was found.
pub async fn cancel_connect(address: BluetoothAddress) {
    REQUEST_CHANNEL.send(Request::CancelConnect(address)).await;
}

/// Disconnect an established connection.
///
/// Answered by [`AvrcpEvent::DisconnectIndication`].
pub async fn disconnect(connection_id: ConnectionId) {
    REQUEST_CHANNEL
        .send(Request::Disconnect(connection_id))
        .await;
}

/// Change the security required from incoming channels.
///
/// `mask` selects the channels with `constants::security_config` bits.
/// Answered by [`AvrcpEvent::SecurityInConfirm`].
pub async fn set_security_in(mask: u8, level: SecurityLevel) {
    REQUEST_CHANNEL
        .send(Request::SecurityIn { mask, level })
        .await;
}

/// Change the security requested on outgoing channels.
///
/// `mask` selects the channels with `constants::security_config` bits.
/// Answered by [`AvrcpEvent::SecurityOutConfirm`].
pub async fn set_security_out(mask: u8, level: SecurityLevel) {
    REQUEST_CHANNEL
        .send(Request::SecurityOut { mask, level })
        .await;
}

/// Send one AVCTP frame, single-packet header included.
///
/// Control frames larger than the channel MTU are fragmented. A browsing
/// frame on a disconnected browsing channel opens the channel first.
/// Failures found later are reported as [`AvrcpEvent::FrameDropped`].
///
/// # Errors
///
/// Returns `AvrcpError::InvalidParameter` for an empty frame and
/// `AvrcpError::Frame(FrameError::TooLarge)` when it exceeds the largest
/// logical frame.
pub async fn send_frame(
    connection_id: ConnectionId,
    channel: ChannelKind,
    frame: &[u8],
) -> Result<(), AvrcpError> {
    if frame.is_empty() {
        return Err(AvrcpError::InvalidParameter);
    }
    let frame = Frame::from_slice(frame).map_err(|()| FrameError::TooLarge)?;
    REQUEST_CHANNEL
        .send(Request::Send {
            connection_id,
            channel,
            frame,
        })
        .await;
    Ok(())
}

/// Wait for the next confirmation or indication.
pub async fn next_event() -> AvrcpEvent {
    EVENT_CHANNEL.receive().await
}

/// Take the next confirmation or indication if one is waiting.
#[must_use]
pub fn try_next_event() -> Option<AvrcpEvent> {
    EVENT_CHANNEL.try_receive().ok()
}

/// Get the live connections as `(connection_id, address)` pairs.
///
/// # Errors
///
/// Returns `AvrcpError::NotInitialized` if the profile is not running.
pub async fn get_connections()
-> Result<Vec<(ConnectionId, BluetoothAddress), MAX_CONNECTIONS>, AvrcpError> {
    with_avrcp(|profile| {
        profile
            .connections()
            .iter()
            .map(|record| (record.connection_id, record.address))
            .collect()
    })
    .await
}
