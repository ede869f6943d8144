//! Connection Manager boundary
//!
//! AVRCP never touches HCI or L2CAP signalling directly. It issues
//! [`CmRequest`]s to a Connection Manager and reacts to the [`CmEvent`]s that
//! come back. The [`ConnectionManager`] trait is the seam; [`ChannelCm`] wires
//! it to a pair of `embassy-sync` channels.

use crate::{
    BluetoothAddress,
    avctp::{Frame, Packet},
    constants::MAX_SDP_RECORDS,
    error::{Outcome, ResultCode},
    sdp::{RecordHandle, RemoteRecord, Role, ServiceRecordBytes},
};
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};
use heapless::Vec;

/// Identifier of an established L2CAP channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelHandle(pub u32);

/// L2CAP channel mode requested on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum L2capMode {
    /// Basic mode (control channel)
    Basic,
    /// Enhanced retransmission mode (browsing channel)
    EnhancedRetransmission,
}

/// Security requirements of an L2CAP channel, as a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityLevel(pub u16);

impl SecurityLevel {
    /// No security
    pub const NONE: Self = Self(0x0000);
    /// Authorisation required
    pub const AUTHORISATION: Self = Self(0x0001);
    /// Authentication required
    pub const AUTHENTICATION: Self = Self(0x0002);
    /// Encryption required
    pub const ENCRYPTION: Self = Self(0x0004);
    /// Man-in-the-middle protection required
    pub const MITM: Self = Self(0x0008);
    /// Use the profile default
    pub const DEFAULT: Self = Self(0x8000);

    /// Level AVRCP applies when asked for the default
    pub const PROFILE_DEFAULT: Self = Self(Self::AUTHENTICATION.0 | Self::ENCRYPTION.0);
    /// Level AVRCP always requires
    pub const MANDATORY: Self = Self::NONE;

    const KNOWN: u16 = Self::AUTHORISATION.0 | Self::AUTHENTICATION.0 | Self::ENCRYPTION.0 | Self::MITM.0;

    /// Resolve a requested level against the profile's default and mandatory levels
    ///
    /// # Errors
    /// Returns `ResultCode::UnacceptableParameter` if the level carries
    /// unknown bits or misses a mandatory one.
    pub fn resolve(self) -> Result<Self, ResultCode> {
        if self == Self::DEFAULT {
            return Ok(Self(Self::PROFILE_DEFAULT.0 | Self::MANDATORY.0));
        }
        if self.0 & !Self::KNOWN != 0 || self.0 & Self::MANDATORY.0 != Self::MANDATORY.0 {
            return Err(ResultCode::UnacceptableParameter);
        }
        Ok(self)
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::PROFILE_DEFAULT
    }
}

/// Requests sent to the Connection Manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmRequest {
    /// Reserve a PSM for AVCTP
    L2capRegister {
        /// PSM to reserve
        psm: u16,
    },
    /// Open an outgoing channel
    Connect {
        /// Remote device
        address: BluetoothAddress,
        /// Remote PSM
        psm: u16,
        /// Local MTU
        mtu: u16,
        /// Channel mode
        mode: L2capMode,
        /// Outgoing security
        security: SecurityLevel,
    },
    /// Accept one incoming channel on a PSM
    ConnectAccept {
        /// Local PSM
        psm: u16,
        /// Local MTU
        mtu: u16,
        /// Channel mode
        mode: L2capMode,
        /// Incoming security
        security: SecurityLevel,
    },
    /// Abort an outgoing connect
    CancelConnect {
        /// Remote device
        address: BluetoothAddress,
        /// Remote PSM
        psm: u16,
    },
    /// Withdraw an armed accept
    CancelConnectAccept {
        /// Local PSM
        psm: u16,
    },
    /// Close a channel
    Disconnect {
        /// Channel to close
        handle: ChannelHandle,
    },
    /// Acknowledge a remote-initiated disconnect
    DisconnectResponse {
        /// Channel that was closed
        handle: ChannelHandle,
    },
    /// Transmit one AVCTP packet
    Data {
        /// Channel to send on
        handle: ChannelHandle,
        /// Packet, at most one MTU long
        packet: Frame,
    },
    /// Acknowledge one received packet
    DataResponse {
        /// Channel the packet arrived on
        handle: ChannelHandle,
    },
    /// Register a local service record
    SdsRegister {
        /// Role the record advertises
        role: Role,
        /// Encoded attribute list
        record: ServiceRecordBytes,
    },
    /// Remove a local service record
    SdsUnregister {
        /// Handle returned by the register confirm
        handle: RecordHandle,
    },
    /// Look up AVRCP records on a remote device
    SdpSearch {
        /// Remote device
        address: BluetoothAddress,
        /// Service classes to search for
        classes: Vec<u16, 2>,
    },
    /// Abort the running search
    SdpSearchCancel {
        /// Remote device
        address: BluetoothAddress,
    },
}

/// Confirmations and indications from the Connection Manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmEvent {
    /// PSM reservation finished
    L2capRegisterConfirm {
        /// Reserved PSM
        psm: u16,
        /// Result
        outcome: Outcome,
    },
    /// Outgoing connect finished
    ConnectConfirm {
        /// Remote device
        address: BluetoothAddress,
        /// Remote PSM
        psm: u16,
        /// New channel, valid on success
        handle: ChannelHandle,
        /// Remote MTU
        mtu: u16,
        /// Result
        outcome: Outcome,
    },
    /// Armed accept finished
    ConnectAcceptConfirm {
        /// Remote device
        address: BluetoothAddress,
        /// Local PSM
        psm: u16,
        /// New channel, valid on success
        handle: ChannelHandle,
        /// Remote MTU
        mtu: u16,
        /// Result
        outcome: Outcome,
    },
    /// Accept withdrawal finished
    CancelConnectAcceptConfirm {
        /// Local PSM
        psm: u16,
        /// Result
        outcome: Outcome,
    },
    /// A channel closed
    DisconnectIndication {
        /// Closed channel
        handle: ChannelHandle,
        /// Whether the local side asked for it
        local_terminated: bool,
        /// Reason
        reason: Outcome,
    },
    /// Previous packet left the building
    DataConfirm {
        /// Channel the packet went out on
        handle: ChannelHandle,
        /// Result
        outcome: Outcome,
    },
    /// A packet arrived
    DataIndication {
        /// Channel the packet arrived on
        handle: ChannelHandle,
        /// Raw AVCTP packet
        packet: Packet,
    },
    /// Record registration finished
    SdsRegisterConfirm {
        /// Assigned handle, valid on success
        handle: RecordHandle,
        /// Result
        outcome: Outcome,
    },
    /// Record removal finished
    SdsUnregisterConfirm {
        /// Removed handle
        handle: RecordHandle,
        /// Result
        outcome: Outcome,
    },
    /// Remote search finished
    SdpSearchResult {
        /// Remote device
        address: BluetoothAddress,
        /// Result
        outcome: Outcome,
        /// Records found, already parsed
        records: Vec<RemoteRecord, MAX_SDP_RECORDS>,
    },
}

/// Transport below the profile
///
/// `send` must not wait for the confirmation of the request; confirmations
/// arrive later through `receive`.
#[allow(async_fn_in_trait)]
pub trait ConnectionManager {
    /// Hand a request to the Connection Manager
    async fn send(&self, request: CmRequest);

    /// Wait for the next confirmation or indication
    async fn receive(&self) -> CmEvent;
}

/// A [`ConnectionManager`] backed by two channels
///
/// The profile writes requests into `requests` and reads events from
/// `events`; the Connection Manager task does the opposite.
pub struct ChannelCm<'a, M: RawMutex, const N: usize> {
    requests: &'a Channel<M, CmRequest, N>,
    events: &'a Channel<M, CmEvent, N>,
}

impl<'a, M: RawMutex, const N: usize> ChannelCm<'a, M, N> {
    /// Wrap a request and an event channel
    #[must_use]
    pub const fn new(
        requests: &'a Channel<M, CmRequest, N>,
        events: &'a Channel<M, CmEvent, N>,
    ) -> Self {
        Self { requests, events }
    }
}

impl<M: RawMutex, const N: usize> ConnectionManager for ChannelCm<'_, M, N> {
    async fn send(&self, request: CmRequest) {
        self.requests.send(request).await;
    }

    async fn receive(&self) -> CmEvent {
        self.events.receive().await
    }
}
