//! Per-device connection records

use crate::{
    BluetoothAddress,
    avctp::Reassembler,
    channel::{ChannelKind, ChannelState, LogicalChannel},
    cm::ChannelHandle,
    constants::MAX_CONNECTIONS,
    error::AvrcpError,
    fmt::Dbg,
    sdp::{RemoteFeatures, SearchState},
};
use heapless::FnvIndexMap;

/// Identifier of a connection as seen by the application
pub type ConnectionId = u8;

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Not decided yet
    Unset,
    /// Accepted from the remote device
    Incoming,
    /// Opened by the local side
    Outgoing,
}

/// State kept for one remote device
#[derive(Debug)]
pub struct ConnectionRecord {
    /// Remote device
    pub address: BluetoothAddress,
    /// Application-visible identifier
    pub connection_id: ConnectionId,
    /// Control channel
    pub control: LogicalChannel,
    /// Browsing channel
    pub browsing: LogicalChannel,
    /// Inbound reassembly on the control channel
    pub reassembler: Reassembler,
    /// Remote SDP search lifecycle
    pub sdp_state: SearchState,
    /// Remote capabilities learned through SDP
    pub remote_features: RemoteFeatures,
    /// Set when a local disconnect was issued on a connected channel
    pub reset_app_state: bool,
    /// Set when the application cancelled the connection
    pub cancel_requested: bool,
    direction: Direction,
}

impl ConnectionRecord {
    /// A fresh record with both channels disconnected
    #[must_use]
    pub fn new(address: BluetoothAddress, connection_id: ConnectionId) -> Self {
        Self {
            address,
            connection_id,
            control: LogicalChannel::new(ChannelKind::Control),
            browsing: LogicalChannel::new(ChannelKind::Browsing),
            reassembler: Reassembler::new(),
            sdp_state: SearchState::Pending,
            remote_features: RemoteFeatures::default(),
            reset_app_state: false,
            cancel_requested: false,
            direction: Direction::Unset,
        }
    }

    /// Channel of the given kind
    #[must_use]
    pub fn channel(&self, kind: ChannelKind) -> &LogicalChannel {
        match kind {
            ChannelKind::Control => &self.control,
            ChannelKind::Browsing => &self.browsing,
        }
    }

    /// Mutable channel of the given kind
    pub fn channel_mut(&mut self, kind: ChannelKind) -> &mut LogicalChannel {
        match kind {
            ChannelKind::Control => &mut self.control,
            ChannelKind::Browsing => &mut self.browsing,
        }
    }

    /// Which channel uses `handle`, if any
    #[must_use]
    pub fn kind_of(&self, handle: ChannelHandle) -> Option<ChannelKind> {
        if self.control.handle() == Some(handle) {
            Some(ChannelKind::Control)
        } else if self.browsing.handle() == Some(handle) {
            Some(ChannelKind::Browsing)
        } else {
            None
        }
    }

    /// Whether both channels are down
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.control.is(ChannelState::Disconnected) && self.browsing.is(ChannelState::Disconnected)
    }

    /// Direction of the connection
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Set the direction of a fresh connection
    ///
    /// The first establishment decides; later calls are ignored and return
    /// `false`.
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        if self.direction != Direction::Unset {
            return false;
        }
        debug!(
            "[AVRCP] Connection {} direction {:?}",
            self.connection_id,
            Dbg(&direction)
        );
        self.direction = direction;
        true
    }

    /// Move the remote SDP search to `state`
    pub fn set_sdp_state(&mut self, state: SearchState) {
        if self.sdp_state != state {
            debug!(
                "[SDP] Connection {} search {:?} -> {:?}",
                self.connection_id,
                Dbg(&self.sdp_state),
                Dbg(&state)
            );
            self.sdp_state = state;
        }
    }
}

/// Live connection records keyed by remote address
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: FnvIndexMap<BluetoothAddress, ConnectionRecord, MAX_CONNECTIONS>,
}

impl ConnectionRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: FnvIndexMap::new(),
        }
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records whose control channel is connected
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.control.is(ChannelState::Connected))
            .count()
    }

    /// Whether a record exists for `address`
    #[must_use]
    pub fn contains(&self, address: &BluetoothAddress) -> bool {
        self.records.contains_key(address)
    }

    /// Record for `address`
    #[must_use]
    pub fn get(&self, address: &BluetoothAddress) -> Option<&ConnectionRecord> {
        self.records.get(address)
    }

    /// Mutable record for `address`
    pub fn get_mut(&mut self, address: &BluetoothAddress) -> Option<&mut ConnectionRecord> {
        self.records.get_mut(address)
    }

    /// Create a record with the lowest free connection id
    ///
    /// # Errors
    /// Returns `AvrcpError::ResourceExhausted` when every slot is taken.
    pub fn add(&mut self, address: BluetoothAddress) -> Result<&mut ConnectionRecord, AvrcpError> {
        let connection_id = (0..=ConnectionId::MAX)
            .find(|id| !self.records.values().any(|r| r.connection_id == *id))
            .ok_or(AvrcpError::ResourceExhausted)?;
        self.records
            .insert(address, ConnectionRecord::new(address, connection_id))
            .map_err(|_| AvrcpError::ResourceExhausted)?;
        debug!(
            "[AVRCP] Added connection {} for {}",
            connection_id,
            Dbg(&address)
        );
        self.records
            .get_mut(&address)
            .ok_or(AvrcpError::ResourceExhausted)
    }

    /// Remove the record for `address`
    pub fn remove(&mut self, address: &BluetoothAddress) -> Option<ConnectionRecord> {
        let record = self.records.remove(address)?;
        debug!(
            "[AVRCP] Removed connection {} for {}",
            record.connection_id,
            Dbg(address)
        );
        Some(record)
    }

    /// Address of the record with `connection_id`
    #[must_use]
    pub fn address_of(&self, connection_id: ConnectionId) -> Option<BluetoothAddress> {
        self.records
            .values()
            .find(|record| record.connection_id == connection_id)
            .map(|record| record.address)
    }

    /// Record and channel using `handle`
    #[must_use]
    pub fn find_by_handle(&self, handle: ChannelHandle) -> Option<(BluetoothAddress, ChannelKind)> {
        self.records
            .values()
            .find_map(|record| record.kind_of(handle).map(|kind| (record.address, kind)))
    }

    /// First record whose remote search is in `state`
    #[must_use]
    pub fn find_by_sdp_state(&self, state: SearchState) -> Option<BluetoothAddress> {
        self.records
            .values()
            .find(|record| record.sdp_state == state)
            .map(|record| record.address)
    }

    /// Iterate over the live records
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> BluetoothAddress {
        BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, last])
    }

    #[test]
    fn test_lowest_free_id() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.add(addr(1)).unwrap().connection_id, 0);
        assert_eq!(registry.add(addr(2)).unwrap().connection_id, 1);
        assert_eq!(registry.add(addr(3)).unwrap().connection_id, 2);

        registry.remove(&addr(2));
        assert_eq!(registry.add(addr(4)).unwrap().connection_id, 1);
        registry.remove(&addr(1));
        assert_eq!(registry.add(addr(5)).unwrap().connection_id, 0);

        let mut ids: heapless::Vec<ConnectionId, MAX_CONNECTIONS> =
            registry.iter().map(|r| r.connection_id).collect();
        ids.sort_unstable();
        assert_eq!(ids.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_registry_full() {
        let mut registry = ConnectionRegistry::new();
        for i in 0..MAX_CONNECTIONS {
            registry.add(addr(i as u8)).unwrap();
        }
        assert_eq!(
            registry.add(addr(0xFF)).map(|r| r.connection_id),
            Err(AvrcpError::ResourceExhausted)
        );
    }

    #[test]
    fn test_lookup_by_handle_and_id() {
        let mut registry = ConnectionRegistry::new();
        registry.add(addr(1)).unwrap();
        let record = registry.add(addr(2)).unwrap();
        record.control.on_connected(ChannelHandle(0x41), 672);
        record.browsing.on_connected(ChannelHandle(0x42), 1000);

        assert_eq!(
            registry.find_by_handle(ChannelHandle(0x42)),
            Some((addr(2), ChannelKind::Browsing))
        );
        assert_eq!(registry.find_by_handle(ChannelHandle(0x99)), None);
        assert_eq!(registry.address_of(1), Some(addr(2)));
        assert_eq!(registry.address_of(7), None);
        assert_eq!(registry.connected_count(), 1);
    }

    #[test]
    fn test_sdp_state_lookup() {
        let mut registry = ConnectionRegistry::new();
        registry.add(addr(1)).unwrap().set_sdp_state(SearchState::Done);
        registry.add(addr(2)).unwrap();
        assert_eq!(registry.find_by_sdp_state(SearchState::Pending), Some(addr(2)));
        assert_eq!(registry.find_by_sdp_state(SearchState::Active), None);
    }

    #[test]
    fn test_record_idle() {
        let mut record = ConnectionRecord::new(addr(1), 0);
        assert!(record.is_idle());
        record.control.set_state(ChannelState::Pending);
        assert!(!record.is_idle());
        assert_eq!(record.direction(), Direction::Unset);
        assert!(record.set_direction(Direction::Incoming));
        assert_eq!(record.direction(), Direction::Incoming);
    }

    #[test]
    fn test_direction_set_once() {
        let mut record = ConnectionRecord::new(addr(1), 0);
        assert!(record.set_direction(Direction::Incoming));
        assert!(!record.set_direction(Direction::Outgoing));
        assert_eq!(record.direction(), Direction::Incoming);
    }
}
