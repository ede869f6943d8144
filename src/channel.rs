//! Logical AVCTP channels
//!
//! Every remote device has a control channel and may have a browsing channel.
//! Each one carries its own connection state and a pending-send queue that
//! keeps at most one packet outstanding towards the Connection Manager.

use crate::{
    avctp::{Frame, Fragmenter},
    cm::{ChannelHandle, CmRequest, L2capMode},
    constants::{MAX_PENDING_FRAMES, psm},
    error::FrameError,
    fmt::Dbg,
};
use heapless::Deque;

/// Connection state of one logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// No L2CAP channel
    Disconnected,
    /// Connect requested, waiting for a prerequisite (SDP search)
    Pending,
    /// Outgoing connect in progress
    Connecting,
    /// L2CAP channel open
    Connected,
    /// Local disconnect in progress
    Disconnecting,
    /// Outgoing connect being cancelled
    Cancelling,
    /// Crossing connections being torn down before a fresh connect
    DisconnectingToReconnect,
}

/// Which of the two AVCTP channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    /// Control channel, PSM 0x17
    Control,
    /// Browsing channel, PSM 0x1B
    Browsing,
}

impl ChannelKind {
    /// L2CAP PSM of this channel
    #[must_use]
    pub const fn psm(self) -> u16 {
        match self {
            ChannelKind::Control => psm::CONTROL,
            ChannelKind::Browsing => psm::BROWSING,
        }
    }

    /// Channel kind for a PSM
    #[must_use]
    pub const fn from_psm(value: u16) -> Option<Self> {
        match value {
            psm::CONTROL => Some(ChannelKind::Control),
            psm::BROWSING => Some(ChannelKind::Browsing),
            _ => None,
        }
    }

    /// L2CAP mode used when connecting this channel
    #[must_use]
    pub const fn mode(self) -> L2capMode {
        match self {
            ChannelKind::Control => L2capMode::Basic,
            ChannelKind::Browsing => L2capMode::EnhancedRetransmission,
        }
    }
}

/// Whether a connect-accept is armed on a PSM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcceptState {
    /// No accept outstanding
    #[default]
    Deactivated,
    /// One accept outstanding
    Activated,
}

/// One logical channel of a connection
#[derive(Debug)]
pub struct LogicalChannel {
    kind: ChannelKind,
    handle: Option<ChannelHandle>,
    mtu: Option<u16>,
    state: ChannelState,
    send_permitted: bool,
    pending: Deque<Frame, MAX_PENDING_FRAMES>,
}

impl LogicalChannel {
    /// A disconnected channel
    #[must_use]
    pub const fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            handle: None,
            mtu: None,
            state: ChannelState::Disconnected,
            send_permitted: false,
            pending: Deque::new(),
        }
    }

    /// Which channel this is
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// L2CAP channel handle, once connected
    #[must_use]
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.handle
    }

    /// Remote MTU, once connected
    #[must_use]
    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    /// Whether nothing is outstanding on this channel
    #[must_use]
    pub fn send_permitted(&self) -> bool {
        self.send_permitted
    }

    /// Number of queued frames
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the channel is in `state`
    #[must_use]
    pub fn is(&self, state: ChannelState) -> bool {
        self.state == state
    }

    /// Move to `state`
    pub fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            debug!(
                "[AVRCP] {:?} channel {:?} -> {:?}",
                Dbg(&self.kind),
                Dbg(&self.state),
                Dbg(&state)
            );
            self.state = state;
        }
    }

    /// Record an established L2CAP channel
    ///
    /// Sending stays blocked until [`Self::next_transmission`] releases it.
    pub fn on_connected(&mut self, handle: ChannelHandle, mtu: u16) {
        self.handle = Some(handle);
        self.mtu = Some(mtu);
        self.set_state(ChannelState::Connected);
    }

    /// Remember the handle of a channel that is only opened to be closed
    pub fn set_handle(&mut self, handle: ChannelHandle) {
        self.handle = Some(handle);
    }

    /// Forget the L2CAP channel but keep the state and the queue
    ///
    /// Used when a channel is torn down only to be reconnected.
    pub fn reset_link(&mut self) {
        self.handle = None;
        self.mtu = None;
        self.send_permitted = false;
    }

    /// Forget the L2CAP channel and everything queued on it
    pub fn on_disconnected(&mut self) {
        self.reset_link();
        if !self.pending.is_empty() {
            debug!(
                "[AVRCP] {:?} channel dropping {} queued frames",
                Dbg(&self.kind),
                self.pending.len()
            );
            self.pending.clear();
        }
        self.set_state(ChannelState::Disconnected);
    }

    /// Release the channel for the next transmission
    ///
    /// Called once a channel opens and after every data confirm. Returns the
    /// queue head to transmit, or marks the channel free when nothing waits.
    pub fn next_transmission(&mut self) -> Option<CmRequest> {
        if let Some(handle) = self.handle {
            if let Some(packet) = self.pending.pop_front() {
                self.send_permitted = false;
                return Some(CmRequest::Data { handle, packet });
            }
        }
        self.send_permitted = true;
        None
    }

    /// Queue a frame, fragmenting control frames to the remote MTU
    ///
    /// Returns the packet to transmit now, if the channel was free.
    ///
    /// # Errors
    /// Returns a framing error, or `FrameError::QueueFull` when the pending
    /// queue cannot take every fragment. Nothing is queued on error.
    pub fn send(&mut self, frame: &[u8]) -> Result<Option<CmRequest>, FrameError> {
        match (self.kind, self.mtu) {
            (ChannelKind::Control, Some(mtu)) => {
                let fragments = Fragmenter::new(frame, mtu)?;
                let immediate = usize::from(self.send_permitted && self.handle.is_some());
                let needed = usize::from(fragments.packet_count()) - immediate;
                if self.pending.capacity() - self.pending.len() < needed {
                    return Err(FrameError::QueueFull);
                }
                if fragments.packet_count() > 1 {
                    trace!(
                        "[AVCTP] Splitting {} octets into {} packets for MTU {}",
                        frame.len(),
                        fragments.packet_count(),
                        mtu
                    );
                }
                let mut first = None;
                for fragment in fragments {
                    let sent = self.enqueue(fragment?)?;
                    first = first.or(sent);
                }
                Ok(first)
            }
            _ => {
                let packet = Frame::from_slice(frame).map_err(|()| FrameError::TooLarge)?;
                self.enqueue(packet)
            }
        }
    }

    /// Transmit `packet` if the channel is free, otherwise append it to the queue
    ///
    /// # Errors
    /// Returns `FrameError::QueueFull` if the queue is full.
    pub fn enqueue(&mut self, packet: Frame) -> Result<Option<CmRequest>, FrameError> {
        if self.send_permitted {
            if let Some(handle) = self.handle {
                self.send_permitted = false;
                return Ok(Some(CmRequest::Data { handle, packet }));
            }
        }
        self.pending
            .push_back(packet)
            .map_err(|_| FrameError::QueueFull)?;
        Ok(None)
    }

    /// Empty the queue, returning how many frames were dropped
    pub fn drain_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(kind: ChannelKind, mtu: u16) -> LogicalChannel {
        let mut channel = LogicalChannel::new(kind);
        channel.on_connected(ChannelHandle(0x40), mtu);
        assert!(channel.next_transmission().is_none());
        channel
    }

    fn data(request: Option<CmRequest>) -> Frame {
        match request {
            Some(CmRequest::Data { packet, .. }) => packet,
            other => panic!("expected data request, got {other:?}"),
        }
    }

    #[test]
    fn test_psm_mapping() {
        assert_eq!(ChannelKind::Control.psm(), 0x17);
        assert_eq!(ChannelKind::from_psm(0x1B), Some(ChannelKind::Browsing));
        assert_eq!(ChannelKind::from_psm(0x19), None);
        assert_eq!(ChannelKind::Control.mode(), L2capMode::Basic);
    }

    #[test]
    fn test_one_frame_in_flight() {
        let mut channel = connected(ChannelKind::Control, 672);
        assert!(channel.send_permitted());

        let first = data(channel.send(&[0x00, 0x11, 0x0E, 0x01]).unwrap());
        assert_eq!(first.as_slice(), &[0x00, 0x11, 0x0E, 0x01]);
        assert!(!channel.send_permitted());

        assert!(channel.send(&[0x10, 0x11, 0x0E, 0x02]).unwrap().is_none());
        assert!(channel.send(&[0x20, 0x11, 0x0E, 0x03]).unwrap().is_none());
        assert_eq!(channel.pending_len(), 2);

        let second = data(channel.next_transmission());
        assert_eq!(second[3], 0x02);
        assert!(!channel.send_permitted());
        let third = data(channel.next_transmission());
        assert_eq!(third[3], 0x03);

        assert!(channel.next_transmission().is_none());
        assert!(channel.send_permitted());
    }

    #[test]
    fn test_fragmented_send_in_order() {
        let mut channel = connected(ChannelKind::Control, 200);
        let mut frame = [0u8; 515];
        frame[..3].copy_from_slice(&[0x30, 0x11, 0x0E]);

        let start = data(channel.send(&frame).unwrap());
        assert_eq!(start.len(), 200);
        assert_eq!(&start[..4], &[0x34, 0x03, 0x11, 0x0E]);
        assert_eq!(channel.pending_len(), 2);

        let middle = data(channel.next_transmission());
        assert_eq!(middle.len(), 200);
        assert_eq!(middle[0], 0x38);
        let end = data(channel.next_transmission());
        assert_eq!(end[0], 0x3C);
        assert_eq!(end.len(), 515 - 2 * 199 + 1);
        assert!(channel.next_transmission().is_none());
    }

    #[test]
    fn test_browsing_not_fragmented() {
        let mut channel = connected(ChannelKind::Browsing, 48);
        let frame = [0x00u8; 100];
        let packet = data(channel.send(&frame).unwrap());
        assert_eq!(packet.len(), 100);
    }

    #[test]
    fn test_queued_while_disconnected() {
        let mut channel = LogicalChannel::new(ChannelKind::Browsing);
        assert!(channel.send(&[0x00, 0x11, 0x0E, 0x70]).unwrap().is_none());
        assert_eq!(channel.pending_len(), 1);

        channel.on_connected(ChannelHandle(9), 335);
        let packet = data(channel.next_transmission());
        assert_eq!(packet[3], 0x70);
    }

    #[test]
    fn test_queue_full_rejects_whole_frame() {
        let mut channel = connected(ChannelKind::Control, 672);
        channel.send(&[0x00, 0x11, 0x0E, 0x00]).unwrap();
        for _ in 0..MAX_PENDING_FRAMES {
            channel.send(&[0x00, 0x11, 0x0E, 0x00]).unwrap();
        }
        assert_eq!(
            channel.send(&[0x00, 0x11, 0x0E, 0x00]),
            Err(FrameError::QueueFull)
        );

        let mut small = connected(ChannelKind::Control, 100);
        small.send(&[0x00, 0x11, 0x0E, 0x00]).unwrap();
        for _ in 0..MAX_PENDING_FRAMES - 2 {
            small.send(&[0x00, 0x11, 0x0E, 0x00]).unwrap();
        }
        // Three fragments do not fit the two free slots
        assert_eq!(small.send(&[0u8; 250]), Err(FrameError::QueueFull));
        assert_eq!(small.pending_len(), MAX_PENDING_FRAMES - 2);
    }

    #[test]
    fn test_reset_link_keeps_queue() {
        let mut channel = connected(ChannelKind::Browsing, 672);
        channel.send(&[0x00, 0x11, 0x0E, 0x01]).unwrap();
        channel.send(&[0x00, 0x11, 0x0E, 0x02]).unwrap();
        channel.set_state(ChannelState::DisconnectingToReconnect);
        channel.reset_link();
        assert_eq!(channel.pending_len(), 1);
        assert_eq!(channel.handle(), None);
        assert!(channel.is(ChannelState::DisconnectingToReconnect));
    }

    #[test]
    fn test_disconnect_clears_queue() {
        let mut channel = connected(ChannelKind::Control, 672);
        channel.send(&[0x00, 0x11, 0x0E, 0x00]).unwrap();
        channel.send(&[0x00, 0x11, 0x0E, 0x01]).unwrap();
        channel.on_disconnected();
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert_eq!(channel.pending_len(), 0);
        assert!(!channel.send_permitted());
        assert_eq!(channel.handle(), None);
    }
}
