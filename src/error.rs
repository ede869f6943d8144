//! Result codes, suppliers and error types.
//!
//! Confirmations delivered to the application carry an [`Outcome`]: a result
//! code together with the layer that produced it. Failures reported by the
//! Connection Manager are forwarded unchanged with [`Supplier::Cm`].

use core::fmt;

/// Result codes produced by the profile itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ResultCode {
    /// Operation completed
    Success = 0x0000,
    /// A parameter was out of range or inconsistent
    InvalidParameter = 0x0001,
    /// The operation is not allowed in the current state
    CommandDisallowed = 0x0002,
    /// The device is already connected
    AlreadyConnected = 0x0003,
    /// An outgoing connection attempt was cancelled
    ConnectAttemptCancelled = 0x0004,
    /// There was nothing to cancel
    NothingToCancel = 0x0005,
    /// The remote service record is missing or malformed
    InvalidSdpRecord = 0x0006,
    /// The channel needed for the operation is not connected
    ChannelNotConnected = 0x0007,
    /// A security level was rejected
    UnacceptableParameter = 0x0008,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "Success"),
            ResultCode::InvalidParameter => write!(f, "Invalid parameter"),
            ResultCode::CommandDisallowed => write!(f, "Command disallowed"),
            ResultCode::AlreadyConnected => write!(f, "Already connected"),
            ResultCode::ConnectAttemptCancelled => write!(f, "Connect attempt cancelled"),
            ResultCode::NothingToCancel => write!(f, "Nothing to cancel"),
            ResultCode::InvalidSdpRecord => write!(f, "Invalid SDP record"),
            ResultCode::ChannelNotConnected => write!(f, "Channel not connected"),
            ResultCode::UnacceptableParameter => write!(f, "Unacceptable parameter"),
        }
    }
}

/// Result codes used at the Connection Manager boundary
pub mod cm_code {
    /// The CM operation succeeded
    pub const SUCCESS: u16 = 0x0000;
    /// The CM operation was cancelled
    pub const CANCELLED: u16 = 0x0001;
}

/// Result codes used by SDP search results
pub mod sdp_code {
    /// The search completed
    pub const SUCCESS: u16 = 0x0000;
    /// The remote device returned no matching records
    pub const NO_RESPONSE_DATA: u16 = 0x0001;
}

/// Layer that produced a result code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Supplier {
    /// The AVRCP profile
    Avrcp,
    /// The Connection Manager (L2CAP and SDS operations)
    Cm,
    /// The SDP client
    Sdp,
}

/// A result code paired with its supplier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outcome {
    /// Raw result code, interpreted according to `supplier`
    pub code: u16,
    /// Layer that produced `code`
    pub supplier: Supplier,
}

impl Outcome {
    /// Profile-level success
    pub const SUCCESS: Self = Self::avrcp(ResultCode::Success);

    /// Outcome produced by the profile
    #[must_use]
    pub const fn avrcp(code: ResultCode) -> Self {
        Self {
            code: code as u16,
            supplier: Supplier::Avrcp,
        }
    }

    /// Outcome reported by the Connection Manager
    #[must_use]
    pub const fn cm(code: u16) -> Self {
        Self {
            code,
            supplier: Supplier::Cm,
        }
    }

    /// Outcome reported by the SDP client
    #[must_use]
    pub const fn sdp(code: u16) -> Self {
        Self {
            code,
            supplier: Supplier::Sdp,
        }
    }

    /// Whether this is a success according to its supplier
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self.supplier {
            Supplier::Avrcp => self.code == ResultCode::Success as u16,
            Supplier::Cm => self.code == cm_code::SUCCESS,
            Supplier::Sdp => self.code == sdp_code::SUCCESS,
        }
    }

    /// Whether the CM reported the operation as cancelled
    #[must_use]
    pub fn is_cm_cancelled(&self) -> bool {
        self.supplier == Supplier::Cm && self.code == cm_code::CANCELLED
    }

    /// Whether this outcome carries the given profile result code
    #[must_use]
    pub fn is(&self, code: ResultCode) -> bool {
        self.supplier == Supplier::Avrcp && self.code == code as u16
    }
}

impl From<ResultCode> for Outcome {
    fn from(code: ResultCode) -> Self {
        Self::avrcp(code)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.supplier {
            Supplier::Avrcp => match ResultCode::try_from(self.code) {
                Ok(code) => write!(f, "{code}"),
                Err(()) => write!(f, "AVRCP result 0x{:04X}", self.code),
            },
            Supplier::Cm => write!(f, "CM result 0x{:04X}", self.code),
            Supplier::Sdp => write!(f, "SDP result 0x{:04X}", self.code),
        }
    }
}

impl TryFrom<u16> for ResultCode {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0000 => ResultCode::Success,
            0x0001 => ResultCode::InvalidParameter,
            0x0002 => ResultCode::CommandDisallowed,
            0x0003 => ResultCode::AlreadyConnected,
            0x0004 => ResultCode::ConnectAttemptCancelled,
            0x0005 => ResultCode::NothingToCancel,
            0x0006 => ResultCode::InvalidSdpRecord,
            0x0007 => ResultCode::ChannelNotConnected,
            0x0008 => ResultCode::UnacceptableParameter,
            _ => return Err(()),
        })
    }
}

/// AVCTP framing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer octets than the declared packet type requires
    TooShort,
    /// The frame exceeds the largest logical frame
    TooLarge,
    /// The profile identifier does not match A/V Remote Control
    InvalidProfileId(u16),
    /// The invalid-profile-identifier bit is set
    IpidSet,
    /// The MTU cannot carry a start fragment
    MtuTooSmall,
    /// The frame needs more than 255 fragments
    TooManyFragments,
    /// The pending-send queue cannot hold the frame
    QueueFull,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort => write!(f, "Frame too short"),
            FrameError::TooLarge => write!(f, "Frame too large"),
            FrameError::InvalidProfileId(pid) => write!(f, "Invalid profile id 0x{pid:04X}"),
            FrameError::IpidSet => write!(f, "Invalid profile id bit set"),
            FrameError::MtuTooSmall => write!(f, "MTU too small for fragmentation"),
            FrameError::TooManyFragments => write!(f, "Too many fragments"),
            FrameError::QueueFull => write!(f, "Pending-send queue full"),
        }
    }
}

/// Errors returned by the API surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvrcpError {
    /// `init_avrcp` has not been called
    NotInitialized,
    /// `init_avrcp` was called twice
    AlreadyInitialized,
    /// Invalid parameter (e.g. malformed address)
    InvalidParameter,
    /// No live connection has this identifier
    UnknownConnection,
    /// The channel is not connected and cannot be connected on demand
    ChannelNotConnected,
    /// A bounded container is full
    ResourceExhausted,
    /// Framing failed
    Frame(FrameError),
}

impl fmt::Display for AvrcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvrcpError::NotInitialized => write!(f, "Profile not initialized"),
            AvrcpError::AlreadyInitialized => write!(f, "Profile already initialized"),
            AvrcpError::InvalidParameter => write!(f, "Invalid parameter"),
            AvrcpError::UnknownConnection => write!(f, "Unknown connection"),
            AvrcpError::ChannelNotConnected => write!(f, "Channel not connected"),
            AvrcpError::ResourceExhausted => write!(f, "Resource exhausted"),
            AvrcpError::Frame(e) => write!(f, "Framing error: {e}"),
        }
    }
}

impl From<FrameError> for AvrcpError {
    fn from(e: FrameError) -> Self {
        AvrcpError::Frame(e)
    }
}
