//! Outbound fragmentation
//!
//! Every fragment of a split frame is exactly one MTU long except the last.
//! The start packet reuses the three single-header octets of the logical frame
//! and inserts the packet count, so each fragment consumes `mtu - 1` octets of
//! the logical frame.

use super::{Frame, header::PacketType};
use crate::{
    constants::avctp::{CONTINUE_HEADER_SIZE, SINGLE_HEADER_SIZE, START_HEADER_SIZE},
    error::FrameError,
};

/// Number of packets needed to send a logical frame of `len` octets
///
/// # Errors
/// Returns `FrameError::MtuTooSmall` if a start packet cannot carry payload,
/// or `FrameError::TooManyFragments` if the count does not fit the start
/// header.
pub fn fragment_count(len: usize, mtu: u16) -> Result<u8, FrameError> {
    let mtu = usize::from(mtu);
    if len <= mtu || len <= SINGLE_HEADER_SIZE {
        return Ok(1);
    }
    if mtu <= START_HEADER_SIZE {
        return Err(FrameError::MtuTooSmall);
    }
    let usable = mtu - CONTINUE_HEADER_SIZE;
    u8::try_from(len.div_ceil(usable)).map_err(|_| FrameError::TooManyFragments)
}

/// Lazily splits a logical frame into MTU-sized AVCTP packets
#[derive(Debug, Clone)]
pub struct Fragmenter<'a> {
    frame: &'a [u8],
    mtu: usize,
    count: u8,
    index: u8,
    offset: usize,
}

impl<'a> Fragmenter<'a> {
    /// Prepare to split `frame`, a single-packet AVCTP frame, for `mtu`
    ///
    /// # Errors
    /// See [`fragment_count`]. Also returns `FrameError::TooShort` if the frame
    /// has no header.
    pub fn new(frame: &'a [u8], mtu: u16) -> Result<Self, FrameError> {
        if frame.is_empty() {
            return Err(FrameError::TooShort);
        }
        Ok(Self {
            frame,
            mtu: usize::from(mtu),
            count: fragment_count(frame.len(), mtu)?,
            index: 0,
            offset: 0,
        })
    }

    /// Total number of packets this frame produces
    #[must_use]
    pub fn packet_count(&self) -> u8 {
        self.count
    }

    fn usable(&self) -> usize {
        self.mtu - CONTINUE_HEADER_SIZE
    }

    fn build(&mut self) -> Result<Frame, FrameError> {
        let first = self.frame[0];
        let mut packet = Frame::new();

        if self.count == 1 {
            packet
                .extend_from_slice(self.frame)
                .map_err(|_| FrameError::TooLarge)?;
            self.offset = self.frame.len();
            return Ok(packet);
        }

        let packet_type = if self.index == 0 {
            PacketType::Start
        } else if self.index + 1 == self.count {
            PacketType::End
        } else {
            PacketType::Continue
        };

        let (header_end, body_end) = match packet_type {
            PacketType::Start => {
                packet
                    .extend_from_slice(&[
                        packet_type.apply(first),
                        self.count,
                        self.frame[1],
                        self.frame[2],
                    ])
                    .map_err(|_| FrameError::TooLarge)?;
                (SINGLE_HEADER_SIZE, self.usable())
            }
            PacketType::Continue => {
                packet
                    .push(packet_type.apply(first))
                    .map_err(|_| FrameError::TooLarge)?;
                (self.offset, self.offset + self.usable())
            }
            PacketType::End | PacketType::Single => {
                packet
                    .push(PacketType::End.apply(first))
                    .map_err(|_| FrameError::TooLarge)?;
                (self.offset, self.frame.len())
            }
        };

        packet
            .extend_from_slice(&self.frame[header_end..body_end])
            .map_err(|_| FrameError::TooLarge)?;
        self.offset = body_end;
        Ok(packet)
    }
}

impl Iterator for Fragmenter<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let packet = self.build();
        self.index += 1;
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::from(self.count - self.index);
        (remaining, Some(remaining))
    }
}
