//! AVCTP transport framing
//!
//! AVRCP commands travel inside AVCTP packets. A logical frame that does not
//! fit the negotiated L2CAP MTU is split into a start packet, zero or more
//! continue packets and an end packet; the receiver glues them back together.
//!
//! * [`header`] parses, encodes and validates packet headers
//! * [`fragment`] splits outbound frames
//! * [`reassembly`] rebuilds inbound frames on the control channel

pub mod fragment;
pub mod header;
pub mod reassembly;

pub use fragment::{Fragmenter, fragment_count};
pub use header::{Header, MessageType, PacketType, reject_frame, validate};
pub use reassembly::Reassembler;

use crate::constants::MAX_FRAME_SIZE;

/// Largest raw packet accepted from the Connection Manager
pub const MAX_PACKET_SIZE: usize = 1024;

/// A complete logical AVCTP frame, or one outbound fragment of it
pub type Frame = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// One raw inbound L2CAP payload
pub type Packet = heapless::Vec<u8, MAX_PACKET_SIZE>;
