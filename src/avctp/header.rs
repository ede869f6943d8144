//! AVCTP packet headers
//!
//! ```text
//!  octet 0: | tLabel (4) | type (2) | C/R | IPID |
//!  single:  octet 0, PID (2)
//!  start:   octet 0, number of packets, PID (2)
//!  continue/end: octet 0
//! ```

use crate::{
    constants::avctp::{
        CONTINUE_HEADER_SIZE, CR_BIT, IPID_BIT, PACKET_TYPE_MASK, PACKET_TYPE_SHIFT, PROFILE_ID,
        SINGLE_HEADER_SIZE, SINGLE_PID_INDEX, START_COUNT_INDEX, START_HEADER_SIZE,
        START_PID_INDEX, TLABEL_MASK, TLABEL_SHIFT,
    },
    error::FrameError,
};

/// AVCTP packet type (bits 3..2 of the first octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// Complete message in one packet
    Single = 0,
    /// First packet of a fragmented message
    Start = 1,
    /// Middle packet of a fragmented message
    Continue = 2,
    /// Last packet of a fragmented message
    End = 3,
}

impl PacketType {
    /// Extract the packet type from the first header octet
    #[must_use]
    pub const fn from_octet(octet: u8) -> Self {
        match (octet >> PACKET_TYPE_SHIFT) & PACKET_TYPE_MASK {
            0 => PacketType::Single,
            1 => PacketType::Start,
            2 => PacketType::Continue,
            _ => PacketType::End,
        }
    }

    /// Replace the packet type bits of `octet`, keeping every other bit
    #[must_use]
    pub const fn apply(self, octet: u8) -> u8 {
        (octet & !(PACKET_TYPE_MASK << PACKET_TYPE_SHIFT)) | ((self as u8) << PACKET_TYPE_SHIFT)
    }

    /// Number of header octets for this packet type
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            PacketType::Single => SINGLE_HEADER_SIZE,
            PacketType::Start => START_HEADER_SIZE,
            PacketType::Continue | PacketType::End => CONTINUE_HEADER_SIZE,
        }
    }
}

/// Command/response indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    /// C/R bit clear
    Command,
    /// C/R bit set
    Response,
}

/// A decoded AVCTP packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    /// Transaction label (0..=15)
    pub transaction_label: u8,
    /// Packet type
    pub packet_type: PacketType,
    /// Command or response
    pub message_type: MessageType,
    /// Invalid profile identifier flag
    pub ipid: bool,
    /// Number of packets, start packets only
    pub packet_count: Option<u8>,
    /// Profile identifier, single and start packets only
    pub profile_id: Option<u16>,
}

impl Header {
    /// Header of a single-packet command for A/V Remote Control
    #[must_use]
    pub const fn command(transaction_label: u8) -> Self {
        Self {
            transaction_label: transaction_label & TLABEL_MASK,
            packet_type: PacketType::Single,
            message_type: MessageType::Command,
            ipid: false,
            packet_count: None,
            profile_id: Some(PROFILE_ID),
        }
    }

    /// Header of a single-packet response for A/V Remote Control
    #[must_use]
    pub const fn response(transaction_label: u8) -> Self {
        Self {
            message_type: MessageType::Response,
            ..Self::command(transaction_label)
        }
    }

    /// Encode the first header octet
    #[must_use]
    pub const fn first_octet(&self) -> u8 {
        let mut octet = (self.transaction_label & TLABEL_MASK) << TLABEL_SHIFT;
        octet = self.packet_type.apply(octet);
        if matches!(self.message_type, MessageType::Response) {
            octet |= CR_BIT;
        }
        if self.ipid {
            octet |= IPID_BIT;
        }
        octet
    }

    /// Parse the header at the start of `bytes`
    ///
    /// # Errors
    /// Returns `FrameError::TooShort` if `bytes` cannot hold the header of the
    /// packet type announced in the first octet.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let first = *bytes.first().ok_or(FrameError::TooShort)?;
        let packet_type = PacketType::from_octet(first);
        if bytes.len() < packet_type.header_size() {
            return Err(FrameError::TooShort);
        }

        let (packet_count, profile_id) = match packet_type {
            PacketType::Single => (None, Some(read_pid(bytes, SINGLE_PID_INDEX))),
            PacketType::Start => (
                Some(bytes[START_COUNT_INDEX]),
                Some(read_pid(bytes, START_PID_INDEX)),
            ),
            PacketType::Continue | PacketType::End => (None, None),
        };

        Ok(Self {
            transaction_label: (first >> TLABEL_SHIFT) & TLABEL_MASK,
            packet_type,
            message_type: if first & CR_BIT == 0 {
                MessageType::Command
            } else {
                MessageType::Response
            },
            ipid: first & IPID_BIT != 0,
            packet_count,
            profile_id,
        })
    }

    /// Append the encoded header to `out`
    ///
    /// # Errors
    /// Returns `FrameError::TooLarge` if `out` has no room for the header.
    pub fn encode<const N: usize>(&self, out: &mut heapless::Vec<u8, N>) -> Result<(), FrameError> {
        out.push(self.first_octet())
            .map_err(|_| FrameError::TooLarge)?;
        if let (PacketType::Start, Some(count)) = (self.packet_type, self.packet_count) {
            out.push(count).map_err(|_| FrameError::TooLarge)?;
        }
        if let Some(pid) = self.profile_id {
            out.extend_from_slice(&pid.to_be_bytes())
                .map_err(|_| FrameError::TooLarge)?;
        }
        Ok(())
    }
}

fn read_pid(bytes: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([bytes[index], bytes[index + 1]])
}

/// Check that an inbound packet is well formed
///
/// Single and start packets must carry a payload after their header, have the
/// IPID bit clear and name the A/V Remote Control profile. Continue and end
/// packets only need one octet of payload.
///
/// # Errors
/// Returns the first violated rule.
pub fn validate(packet: &[u8]) -> Result<Header, FrameError> {
    if packet.len() <= CONTINUE_HEADER_SIZE {
        return Err(FrameError::TooShort);
    }
    let header = Header::parse(packet)?;
    match header.packet_type {
        PacketType::Single | PacketType::Start => {
            if packet.len() <= header.packet_type.header_size() {
                return Err(FrameError::TooShort);
            }
            if header.ipid {
                return Err(FrameError::IpidSet);
            }
            match header.profile_id {
                Some(PROFILE_ID) => Ok(header),
                Some(pid) => Err(FrameError::InvalidProfileId(pid)),
                None => Err(FrameError::TooShort),
            }
        }
        PacketType::Continue | PacketType::End => Ok(header),
    }
}

/// Build the rejection sent back for an invalid single or start packet
///
/// The reply is a single-packet response with the IPID bit set, carrying the
/// transaction label and profile identifier of the offending packet. Returns
/// `None` when the packet is too short to identify either, or when it is a
/// continue or end packet, which are dropped without notice.
#[must_use]
pub fn reject_frame(packet: &[u8]) -> Option<[u8; SINGLE_HEADER_SIZE]> {
    let first = *packet.first()?;
    let pid_index = match PacketType::from_octet(first) {
        PacketType::Single => SINGLE_PID_INDEX,
        PacketType::Start => START_PID_INDEX,
        PacketType::Continue | PacketType::End => return None,
    };
    let pid = packet.get(pid_index..pid_index + 2)?;

    let header = Header {
        transaction_label: (first >> TLABEL_SHIFT) & TLABEL_MASK,
        packet_type: PacketType::Single,
        message_type: MessageType::Response,
        ipid: true,
        packet_count: None,
        profile_id: None,
    };
    Some([header.first_octet(), pid[0], pid[1]])
}
