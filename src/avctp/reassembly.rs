//! Inbound reassembly of fragmented control-channel frames

use super::{Frame, header::PacketType};
use crate::constants::{
    MAX_FRAME_SIZE,
    avctp::{CONTINUE_HEADER_SIZE, START_COUNT_INDEX, START_HEADER_SIZE, START_PID_INDEX},
};

/// Per-connection buffer collecting start, continue and end packets
///
/// The assembled frame is presented with a single-packet header so that
/// consumers never see fragmentation.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Option<Frame>,
}

impl Reassembler {
    /// Create an empty reassembler
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: None }
    }

    /// Whether a fragmented frame is partly collected
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.buffer.is_some()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        if self.buffer.take().is_some() {
            trace!("[AVCTP] Discarding partial frame");
        }
    }

    /// Feed one validated packet, returning a complete frame when one is ready
    ///
    /// Out-of-sequence continue/end packets and frames that would exceed the
    /// largest logical frame are dropped along with any partial state.
    pub fn push(&mut self, packet: &[u8]) -> Option<Frame> {
        let first = *packet.first()?;
        match PacketType::from_octet(first) {
            PacketType::Single => {
                self.reset();
                Frame::from_slice(packet).ok()
            }
            PacketType::Start => {
                self.reset();
                if packet.len() < START_HEADER_SIZE {
                    return None;
                }
                let mut frame = Frame::new();
                let header = [
                    PacketType::Single.apply(first),
                    packet[START_PID_INDEX],
                    packet[START_PID_INDEX + 1],
                ];
                if frame.extend_from_slice(&header).is_err()
                    || frame.extend_from_slice(&packet[START_HEADER_SIZE..]).is_err()
                {
                    debug!(
                        "[AVCTP] Start packet of {} packets exceeds frame limit",
                        packet[START_COUNT_INDEX]
                    );
                    return None;
                }
                self.buffer = Some(frame);
                None
            }
            packet_type @ (PacketType::Continue | PacketType::End) => {
                let mut frame = self.buffer.take()?;
                let body = &packet[CONTINUE_HEADER_SIZE..];
                if frame.len() + body.len() > MAX_FRAME_SIZE {
                    debug!("[AVCTP] Reassembly overflow, dropping frame");
                    return None;
                }
                frame.extend_from_slice(body).ok()?;
                if packet_type == PacketType::End {
                    Some(frame)
                } else {
                    self.buffer = Some(frame);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_delivered_immediately() {
        let mut reassembler = Reassembler::new();
        let frame = reassembler.push(&[0x10, 0x11, 0x0E, 0x01, 0x02]).unwrap();
        assert_eq!(frame.as_slice(), &[0x10, 0x11, 0x0E, 0x01, 0x02]);
        assert!(!reassembler.in_progress());
    }

    #[test]
    fn test_start_continue_end() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[0x24, 0x03, 0x11, 0x0E, 0xA0, 0xA1]).is_none());
        assert!(reassembler.in_progress());
        assert!(reassembler.push(&[0x28, 0xB0, 0xB1]).is_none());
        let frame = reassembler.push(&[0x2C, 0xC0]).unwrap();
        assert_eq!(
            frame.as_slice(),
            &[0x20, 0x11, 0x0E, 0xA0, 0xA1, 0xB0, 0xB1, 0xC0]
        );
        assert!(!reassembler.in_progress());
    }

    #[test]
    fn test_new_start_discards_partial_frame() {
        let mut reassembler = Reassembler::new();
        reassembler.push(&[0x24, 0x02, 0x11, 0x0E, 0xEE, 0xEE]);
        reassembler.push(&[0x34, 0x02, 0x11, 0x0E, 0x01]);
        let frame = reassembler.push(&[0x3C, 0x02]).unwrap();
        assert_eq!(frame.as_slice(), &[0x30, 0x11, 0x0E, 0x01, 0x02]);
    }

    #[test]
    fn test_single_discards_partial_frame() {
        let mut reassembler = Reassembler::new();
        reassembler.push(&[0x24, 0x02, 0x11, 0x0E, 0xEE]);
        assert!(reassembler.push(&[0x40, 0x11, 0x0E, 0x07]).is_some());
        assert!(!reassembler.in_progress());
        // The end of the discarded frame has nothing to attach to
        assert!(reassembler.push(&[0x2C, 0xEE]).is_none());
    }

    #[test]
    fn test_out_of_sequence_dropped() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&[0x28, 0x01]).is_none());
        assert!(reassembler.push(&[0x2C, 0x01]).is_none());
        assert!(!reassembler.in_progress());
    }

    #[test]
    fn test_overflow_drops_silently() {
        let mut reassembler = Reassembler::new();
        let mut start = [0u8; 400];
        start[..4].copy_from_slice(&[0x24, 0x03, 0x11, 0x0E]);
        assert!(reassembler.push(&start).is_none());

        // 3 + 396 + 199 > 515
        let mut cont = [0u8; 200];
        cont[0] = 0x28;
        assert!(reassembler.push(&cont).is_none());
        assert!(!reassembler.in_progress());
        assert!(reassembler.push(&[0x2C, 0x00]).is_none());
    }

    #[test]
    fn test_exactly_max_frame() {
        let mut reassembler = Reassembler::new();
        let mut start = [0u8; 300];
        start[..4].copy_from_slice(&[0x04, 0x02, 0x11, 0x0E]);
        reassembler.push(&start);
        // 3 + 296 + 216 == 515
        let mut end = [0u8; 217];
        end[0] = 0x0C;
        let frame = reassembler.push(&end).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_oversized_single_dropped() {
        let mut reassembler = Reassembler::new();
        let mut single = [0u8; MAX_FRAME_SIZE + 1];
        single[1..3].copy_from_slice(&[0x11, 0x0E]);
        assert!(reassembler.push(&single).is_none());
    }
}
