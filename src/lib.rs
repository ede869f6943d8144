#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::too_many_lines)]

#[macro_use]
mod fmt;

mod address;
pub mod api;
pub mod avctp;
pub mod channel;
pub mod cm;
pub mod connection;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod profile;
pub mod sdp;

use crate::{
    avctp::Frame,
    channel::ChannelKind,
    cm::SecurityLevel,
    connection::ConnectionId,
    constants::{DEFAULT_MTU, MAX_CHANNELS},
    error::{AvrcpError, Outcome},
    profile::AvrcpProfile,
    sdp::{ConfigRequest, RemoteFeatures},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, mutex::Mutex};

pub use address::BluetoothAddress;

pub(crate) static REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, Request, MAX_CHANNELS> =
    Channel::new();

pub(crate) static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, AvrcpEvent, MAX_CHANNELS> =
    Channel::new();

pub(crate) static INTERNAL_COMMAND_CHANNEL: Channel<
    CriticalSectionRawMutex,
    InternalCommand,
    MAX_CHANNELS,
> = Channel::new();

/// Global `AvrcpProfile`, initialized by [`processor::run`]
pub(crate) static AVRCP: Mutex<CriticalSectionRawMutex, Option<AvrcpProfile>> = Mutex::new(None);

/// Initialize the global `AvrcpProfile` with the given options.
///
/// [`processor::run`] calls this before it starts processing; call it
/// yourself only when driving the profile without the processor.
///
/// # Errors
///
/// Returns `AvrcpError::AlreadyInitialized` if the profile already exists.
pub async fn init_avrcp(options: AvrcpOptions) -> Result<(), AvrcpError> {
    let mut guard = AVRCP.lock().await;
    if guard.is_some() {
        return Err(AvrcpError::AlreadyInitialized);
    }
    *guard = Some(AvrcpProfile::new(options));
    Ok(())
}

/// Run `f` on the locked global `AvrcpProfile`.
///
/// The lock is released when `f` returns, so keep `f` short and never await
/// inside it.
///
/// # Errors
///
/// Returns `AvrcpError::NotInitialized` if [`init_avrcp`] has not run.
pub async fn with_avrcp<R>(f: impl FnOnce(&mut AvrcpProfile) -> R) -> Result<R, AvrcpError> {
    let mut guard = AVRCP.lock().await;
    guard.as_mut().map(f).ok_or(AvrcpError::NotInitialized)
}

/// Security levels applied to new channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecuritySettings {
    /// Level required from incoming control channels
    pub incoming_control: SecurityLevel,
    /// Level required from incoming browsing channels
    pub incoming_browsing: SecurityLevel,
    /// Level requested on outgoing control channels
    pub outgoing_control: SecurityLevel,
    /// Level requested on outgoing browsing channels
    pub outgoing_browsing: SecurityLevel,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            incoming_control: SecurityLevel::default(),
            incoming_browsing: SecurityLevel::default(),
            outgoing_control: SecurityLevel::default(),
            outgoing_browsing: SecurityLevel::default(),
        }
    }
}

/// Options for configuring the `AvrcpProfile`
///
/// # Examples
///
/// ```rust
/// use remotebird::AvrcpOptions;
///
/// // Offer a larger MTU, keep the default security
/// let options = AvrcpOptions {
///     mtu: 1024,
///     ..AvrcpOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AvrcpOptions {
    /// Local L2CAP MTU offered on both channels
    ///
    /// A later config request may replace it.
    pub mtu: u16,
    /// Initial channel security
    pub security: SecuritySettings,
}

impl Default for AvrcpOptions {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            security: SecuritySettings::default(),
        }
    }
}

/// Application requests sent to the profile
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Replace the local service records
    Config(ConfigRequest),
    /// Start accepting incoming connections
    Activate {
        /// Maximum number of simultaneous incoming connections
        max_incoming: u8,
    },
    /// Stop accepting incoming connections
    Deactivate,
    /// Connect to a remote device
    Connect(BluetoothAddress),
    /// Abort a connect in progress or still queued
    CancelConnect(BluetoothAddress),
    /// Disconnect an established connection
    Disconnect(ConnectionId),
    /// Change the security required from incoming channels
    SecurityIn {
        /// Which channels: `security_config::CONTROL`, `BROWSING` or both
        mask: u8,
        /// Requested level
        level: SecurityLevel,
    },
    /// Change the security requested on outgoing channels
    SecurityOut {
        /// Which channels: `security_config::CONTROL`, `BROWSING` or both
        mask: u8,
        /// Requested level
        level: SecurityLevel,
    },
    /// Send one AVCTP frame
    Send {
        /// Target connection
        connection_id: ConnectionId,
        /// Logical channel to send on
        channel: ChannelKind,
        /// Complete frame, single-packet header included
        frame: Frame,
    },
}

impl Request {
    /// Whether the request waits in the save queue while the profile is busy
    #[must_use]
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Request::Config(_) | Request::Activate { .. } | Request::Deactivate | Request::Connect(_)
        )
    }
}

/// Commands the profile sends to itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalCommand {
    /// Replay the next saved request
    HouseCleaning,
}

/// Confirmations and indications delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvrcpEvent {
    /// A config request finished
    ConfigConfirm {
        /// Result
        outcome: Outcome,
    },
    /// An activate request finished
    ActivateConfirm {
        /// Result
        outcome: Outcome,
    },
    /// A deactivate request finished
    DeactivateConfirm {
        /// Result
        outcome: Outcome,
    },
    /// A connect request finished
    ConnectConfirm {
        /// Remote device
        address: BluetoothAddress,
        /// Connection identifier, on success
        connection_id: Option<ConnectionId>,
        /// Control channel MTU, on success
        mtu: Option<u16>,
        /// What the remote device supports
        remote: RemoteFeatures,
        /// Result
        outcome: Outcome,
    },
    /// A remote device connected
    ConnectIndication {
        /// Remote device
        address: BluetoothAddress,
        /// Connection identifier
        connection_id: ConnectionId,
        /// Control channel MTU
        mtu: u16,
    },
    /// A connection went down
    DisconnectIndication {
        /// Remote device
        address: BluetoothAddress,
        /// Connection identifier
        connection_id: ConnectionId,
        /// Whether the local side closed it
        local_terminated: bool,
        /// Why
        reason: Outcome,
    },
    /// Remote features of an incoming connection are known
    RemoteFeaturesIndication {
        /// Remote device
        address: BluetoothAddress,
        /// Connection identifier
        connection_id: ConnectionId,
        /// What the remote device supports
        features: RemoteFeatures,
    },
    /// A security-in request finished
    SecurityInConfirm {
        /// Result
        outcome: Outcome,
    },
    /// A security-out request finished
    SecurityOutConfirm {
        /// Result
        outcome: Outcome,
    },
    /// A complete frame arrived
    FrameIndication {
        /// Source connection
        connection_id: ConnectionId,
        /// Logical channel it arrived on
        channel: ChannelKind,
        /// Reassembled frame, single-packet header included
        frame: Frame,
    },
    /// A frame could not be sent
    FrameDropped {
        /// Target connection
        connection_id: ConnectionId,
        /// Logical channel
        channel: ChannelKind,
        /// Why
        outcome: Outcome,
    },
}
