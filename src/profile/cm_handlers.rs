//! L2CAP events from the Connection Manager

use super::{AvrcpProfile, link::Establishment};
use crate::{
    AvrcpEvent, BluetoothAddress,
    avctp::{Frame, reject_frame, validate},
    channel::{AcceptState, ChannelKind, ChannelState},
    cm::{ChannelHandle, CmRequest},
    constants::psm,
    dispatcher::PendingOp,
    error::{FrameError, Outcome, ResultCode},
    fmt::Dbg,
};

impl AvrcpProfile {
    pub(super) fn l2cap_register_confirm(&mut self, psm: u16, outcome: Outcome) {
        if !outcome.is_success() {
            error!("[AVRCP] PSM 0x{:04X} registration failed: {}", psm, outcome);
        }
        match psm {
            psm::CONTROL => {
                self.output
                    .request(CmRequest::L2capRegister { psm: psm::BROWSING });
            }
            psm::BROWSING => {
                info!("[AVRCP] AVCTP PSMs registered");
                self.finish(PendingOp::Init);
            }
            _ => warn!("[AVRCP] Register confirm for unknown PSM 0x{:04X}", psm),
        }
    }

    pub(super) fn connect_confirm(
        &mut self,
        address: BluetoothAddress,
        psm: u16,
        handle: ChannelHandle,
        mtu: u16,
        outcome: Outcome,
    ) {
        let success = outcome.is_success();
        let Some(record) = self.connections.get(&address) else {
            if success {
                debug!("[AVRCP] Connect confirm for unknown {}, disconnecting", address);
                self.output.request(CmRequest::Disconnect { handle });
            }
            return;
        };
        let Some(kind) = ChannelKind::from_psm(psm) else {
            warn!("[AVRCP] Connect confirm on unknown PSM 0x{:04X}", psm);
            if success {
                self.output.request(CmRequest::Disconnect { handle });
            }
            return;
        };

        match (record.control.state(), kind) {
            (ChannelState::Connecting, ChannelKind::Control) => {
                self.control_connect_confirm(address, handle, mtu, outcome);
            }
            (ChannelState::Cancelling, ChannelKind::Control) => {
                if success {
                    // The cancel lost the race; close what was opened
                    if let Some(record) = self.connections.get_mut(&address) {
                        record.control.set_handle(handle);
                    }
                    self.output.request(CmRequest::Disconnect { handle });
                } else {
                    self.complete_pending_op(address, outcome, true);
                    self.remove_connection(address);
                }
            }
            (ChannelState::Disconnected, _) => {
                if success {
                    self.close_stray(address, kind, handle);
                } else {
                    self.complete_pending_op(address, outcome, true);
                    self.remove_connection(address);
                }
            }
            (ChannelState::Connected, _) => {
                self.connected_connect_confirm(address, kind, handle, mtu, outcome);
            }
            (ChannelState::Disconnecting, ChannelKind::Browsing) => {
                if success {
                    self.close_stray(address, kind, handle);
                } else if let Some(record) = self.connections.get_mut(&address) {
                    record.browsing.on_disconnected();
                }
            }
            _ => {
                if success {
                    self.close_stray(address, kind, handle);
                }
            }
        }
    }

    /// Outgoing control connect answered
    fn control_connect_confirm(
        &mut self,
        address: BluetoothAddress,
        handle: ChannelHandle,
        mtu: u16,
        outcome: Outcome,
    ) {
        if !outcome.is_success() {
            info!("[AVRCP] Connect to {} failed: {}", address, outcome);
            self.complete_pending_op(address, outcome, false);
            self.remove_connection(address);
            return;
        }
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        record.control.on_connected(handle, mtu);
        if record.remote_features.browsing() && self.sdp.browsing_after_control() {
            self.connect(address);
        } else {
            self.new_connection_established(address, Establishment::Outgoing);
        }
    }

    /// Connect confirm while the control channel is already up
    fn connected_connect_confirm(
        &mut self,
        address: BluetoothAddress,
        kind: ChannelKind,
        handle: ChannelHandle,
        mtu: u16,
        outcome: Outcome,
    ) {
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        let browsing_state = record.browsing.state();
        if outcome.is_success() {
            match (kind, browsing_state) {
                (ChannelKind::Control, _) | (ChannelKind::Browsing, ChannelState::Connected) => {
                    // Crossing connections: drop both and start over
                    let channel = record.channel_mut(kind);
                    channel.set_state(ChannelState::DisconnectingToReconnect);
                    let existing = channel.handle();
                    info!("[AVRCP] Crossing {:?} connections to {}", Dbg(&kind), address);
                    self.output.request(CmRequest::Disconnect { handle });
                    if let Some(existing) = existing {
                        self.output.request(CmRequest::Disconnect { handle: existing });
                    }
                }
                (ChannelKind::Browsing, ChannelState::Connecting) => {
                    let lazy = record.browsing.pending_len() > 0;
                    record.browsing.on_connected(handle, mtu);
                    if let Some(request) = record.browsing.next_transmission() {
                        self.output.request(request);
                    }
                    if !lazy {
                        self.new_connection_established(address, Establishment::Outgoing);
                    }
                }
                (ChannelKind::Browsing, _) => self.close_stray(address, kind, handle),
            }
            return;
        }

        if kind == ChannelKind::Control || browsing_state == ChannelState::Connected {
            debug!("[AVRCP] Late {:?} connect failure ignored", Dbg(&kind));
            return;
        }
        info!("[AVRCP] Browsing connect to {} failed: {}", address, outcome);
        let connection_id = record.connection_id;
        let dropped = record.browsing.drain_pending();
        record.browsing.on_disconnected();
        if dropped > 0 {
            for _ in 0..dropped {
                self.output.event(AvrcpEvent::FrameDropped {
                    connection_id,
                    channel: ChannelKind::Browsing,
                    outcome: Outcome::avrcp(ResultCode::ChannelNotConnected),
                });
            }
        } else {
            self.new_connection_established(address, Establishment::Outgoing);
        }
    }

    /// Close a channel nobody is waiting for
    fn close_stray(&mut self, address: BluetoothAddress, kind: ChannelKind, handle: ChannelHandle) {
        debug!("[AVRCP] Closing stray {:?} channel to {}", Dbg(&kind), address);
        if let Some(record) = self.connections.get_mut(&address) {
            let channel = record.channel_mut(kind);
            if channel.handle().is_none() {
                channel.set_handle(handle);
            }
        }
        self.output.request(CmRequest::Disconnect { handle });
    }

    pub(super) fn connect_accept_confirm(
        &mut self,
        address: BluetoothAddress,
        psm: u16,
        handle: ChannelHandle,
        mtu: u16,
        outcome: Outcome,
    ) {
        if !outcome.is_success() {
            debug!("[AVRCP] Accept on PSM 0x{:04X} ended: {}", psm, outcome);
            return;
        }
        let Some(kind) = ChannelKind::from_psm(psm) else {
            warn!("[AVRCP] Accept confirm on unknown PSM 0x{:04X}", psm);
            self.output.request(CmRequest::Disconnect { handle });
            return;
        };
        info!("[AVRCP] Incoming {:?} channel from {}", Dbg(&kind), address);

        let room = self.max_incoming > self.incoming_current;
        match self.connections.get_mut(&address) {
            Some(record) => match kind {
                ChannelKind::Control => {
                    if record.control.is(ChannelState::Connecting) && room {
                        info!("[AVRCP] Connection collision with {}, keeping incoming", address);
                        self.output.request(CmRequest::CancelConnect {
                            address,
                            psm: psm::CONTROL,
                        });
                        record.control.on_connected(handle, mtu);
                        self.new_connection_established(address, Establishment::Collision);
                    } else {
                        self.output.request(CmRequest::Disconnect { handle });
                    }
                }
                ChannelKind::Browsing => {
                    if !record.control.is(ChannelState::Connected) {
                        self.output.request(CmRequest::Disconnect { handle });
                    } else if record.browsing.is(ChannelState::Connected) {
                        let existing = record.browsing.handle();
                        if record.browsing.pending_len() > 0 {
                            record
                                .browsing
                                .set_state(ChannelState::DisconnectingToReconnect);
                        }
                        self.output.request(CmRequest::Disconnect { handle });
                        if let Some(existing) = existing {
                            self.output.request(CmRequest::Disconnect { handle: existing });
                        }
                    } else {
                        record.browsing.on_connected(handle, mtu);
                        if let Some(request) = record.browsing.next_transmission() {
                            self.output.request(request);
                        }
                    }
                }
            },
            None if room && kind == ChannelKind::Control => match self.connections.add(address) {
                Ok(record) => {
                    record.control.on_connected(handle, mtu);
                    self.new_connection_established(address, Establishment::Incoming);
                }
                Err(e) => {
                    warn!("[AVRCP] Cannot track {}: {}", address, e);
                    self.output.request(CmRequest::Disconnect { handle });
                }
            },
            None => {
                debug!("[AVRCP] Refusing incoming {:?} channel", Dbg(&kind));
                self.output.request(CmRequest::Disconnect { handle });
            }
        }

        match kind {
            ChannelKind::Control => self.control_accept = AcceptState::Deactivated,
            ChannelKind::Browsing => self.browsing_accept = AcceptState::Deactivated,
        }
        self.connect_accept();
    }

    pub(super) fn cancel_connect_accept_confirm(&mut self, psm: u16, outcome: Outcome) {
        debug!("[AVRCP] Accept on PSM 0x{:04X} cancelled: {}", psm, outcome);
        if self.dispatcher.pending_op() != Some(PendingOp::Deactivate) {
            return;
        }
        let outcome = if outcome.is_success() {
            Outcome::SUCCESS
        } else {
            outcome
        };
        self.output.event(AvrcpEvent::DeactivateConfirm { outcome });
        self.go_idle();
    }

    pub(super) fn disconnect_indication(
        &mut self,
        handle: ChannelHandle,
        local_terminated: bool,
        reason: Outcome,
    ) {
        if !local_terminated {
            self.output.request(CmRequest::DisconnectResponse { handle });
        }
        let Some((address, kind)) = self.connections.find_by_handle(handle) else {
            debug!("[AVRCP] Disconnect of untracked channel {:?}", Dbg(&handle));
            return;
        };
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        info!(
            "[AVRCP] {:?} channel to {} down ({}, local {})",
            Dbg(&kind),
            address,
            reason,
            local_terminated
        );

        let channel = record.channel_mut(kind);
        if channel.is(ChannelState::DisconnectingToReconnect) {
            channel.reset_link();
            self.connect(address);
            return;
        }
        channel.on_disconnected();
        if kind == ChannelKind::Control {
            record.reassembler.reset();
        }

        if !record.control.is(ChannelState::Disconnected) {
            // Browsing went down on its own
            if !record.control.is(ChannelState::Disconnecting)
                && self.browsing_accept == AcceptState::Deactivated
            {
                self.accept_browsing();
            }
            return;
        }

        if record.browsing.is(ChannelState::Disconnected) {
            self.complete_pending_op(address, reason, local_terminated);
        } else {
            self.disconnect(address);
        }
        self.cancel_search(address);
        if self
            .connections
            .get(&address)
            .is_some_and(|record| record.is_idle())
        {
            self.remove_connection(address);
        }
        self.connect_accept();
    }

    pub(super) fn data_confirm(&mut self, handle: ChannelHandle, outcome: Outcome) {
        if !outcome.is_success() {
            warn!("[AVCTP] Data confirm failed on {:?}: {}", Dbg(&handle), outcome);
            return;
        }
        let Some((address, kind)) = self.connections.find_by_handle(handle) else {
            return;
        };
        if let Some(record) = self.connections.get_mut(&address) {
            if let Some(request) = record.channel_mut(kind).next_transmission() {
                self.output.request(request);
            }
        }
    }

    pub(super) fn data_indication(&mut self, handle: ChannelHandle, packet: &[u8]) {
        self.output.request(CmRequest::DataResponse { handle });
        let Some((address, kind)) = self.connections.find_by_handle(handle) else {
            debug!("[AVCTP] Data on untracked channel {:?}", Dbg(&handle));
            return;
        };
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        if !record.channel(kind).is(ChannelState::Connected) {
            return;
        }
        let connection_id = record.connection_id;

        match validate(packet) {
            Ok(_) => {
                let frame = match kind {
                    ChannelKind::Browsing => Frame::from_slice(packet).ok(),
                    ChannelKind::Control => record.reassembler.push(packet),
                };
                match frame {
                    Some(frame) => self.output.event(AvrcpEvent::FrameIndication {
                        connection_id,
                        channel: kind,
                        frame,
                    }),
                    None if kind == ChannelKind::Browsing => {
                        warn!("[AVCTP] Browsing frame of {} octets dropped", packet.len());
                    }
                    None => {}
                }
            }
            Err(FrameError::IpidSet) => {
                warn!("[AVCTP] Peer rejected a frame on connection {}", connection_id);
            }
            Err(e) => {
                warn!("[AVCTP] Invalid packet on connection {}: {}", connection_id, e);
                let Some(reject) = reject_frame(packet) else {
                    return;
                };
                let Ok(reject) = Frame::from_slice(&reject) else {
                    return;
                };
                match record.channel_mut(kind).enqueue(reject) {
                    Ok(Some(request)) => self.output.request(request),
                    Ok(None) => {}
                    Err(e) => warn!("[AVCTP] Reject not sent: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::{Request, cm::CmEvent, connection::Direction, constants::version};

    fn activated(max_incoming: u8) -> AvrcpProfile {
        let mut profile = configured(version::V1_4);
        profile.handle_request(Request::Activate { max_incoming });
        profile.take_output();
        profile
    }

    fn accept(profile: &mut AvrcpProfile, address: BluetoothAddress, psm: u16, handle: u32) {
        profile.handle_cm_event(CmEvent::ConnectAcceptConfirm {
            address,
            psm,
            handle: ChannelHandle(handle),
            mtu: 672,
            outcome: CM_OK,
        });
    }

    #[test]
    fn test_basic_connect() {
        let mut profile = configured(version::V1_3);
        profile.handle_request(Request::Connect(addr(1)));
        let output = profile.take_output();
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::SdpSearch { address, .. }] if *address == addr(1)
        ));

        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(1),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        let output = profile.take_output();
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::Connect { psm: 0x17, .. }]
        ));

        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::CONTROL,
            handle: ChannelHandle(0x40),
            mtu: 672,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                connection_id: Some(0),
                mtu: Some(672),
                outcome: Outcome::SUCCESS,
                ..
            }]
        ));
        let record = profile.connections().get(&addr(1)).unwrap();
        assert!(record.control.is(ChannelState::Connected));
        assert!(record.control.send_permitted());
        assert_eq!(record.direction(), Direction::Outgoing);
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_browsing_follows_control() {
        let mut profile = configured(version::V1_4);
        let output = connected_outgoing(&mut profile, addr(1), ChannelHandle(0x40), version::V1_4);
        assert!(output.events.is_empty());
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::Connect {
                psm: psm::BROWSING,
                ..
            }]
        ));

        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::BROWSING,
            handle: ChannelHandle(0x41),
            mtu: 1000,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                outcome: Outcome::SUCCESS,
                ..
            }]
        ));
        let record = profile.connections().get(&addr(1)).unwrap();
        assert!(record.browsing.is(ChannelState::Connected));
        assert!(record.remote_features.browsing());
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_browsing_failure_still_confirms() {
        let mut profile = configured(version::V1_4);
        connected_outgoing(&mut profile, addr(1), ChannelHandle(0x40), version::V1_4);
        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::BROWSING,
            handle: ChannelHandle(0),
            mtu: 0,
            outcome: Outcome::cm(0x0010),
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                outcome: Outcome::SUCCESS,
                ..
            }]
        ));
        let record = profile.connections().get(&addr(1)).unwrap();
        assert!(record.browsing.is(ChannelState::Disconnected));
        assert!(record.control.is(ChannelState::Connected));
    }

    #[test]
    fn test_control_connect_failure_propagates_cm_result() {
        let mut profile = configured(version::V1_3);
        profile.handle_request(Request::Connect(addr(1)));
        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(1),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        profile.take_output();
        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::CONTROL,
            handle: ChannelHandle(0),
            mtu: 0,
            outcome: Outcome::cm(0x0123),
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                connection_id: None,
                outcome,
                ..
            }] if *outcome == Outcome::cm(0x0123)
        ));
        assert!(profile.connections().is_empty());
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_incoming_connection() {
        let mut profile = activated(1);
        accept(&mut profile, addr(2), psm::CONTROL, 0x50);
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectIndication {
                connection_id: 0,
                mtu: 672,
                ..
            }]
        ));
        // Limit reached: the browsing accept is withdrawn, control is not re-armed
        assert!(output.cm.contains(&CmRequest::CancelConnectAccept { psm: psm::BROWSING }));
        assert!(
            output
                .cm
                .iter()
                .any(|request| matches!(request, CmRequest::SdpSearch { .. }))
        );
        assert!(
            !output
                .cm
                .iter()
                .any(|request| matches!(request, CmRequest::ConnectAccept { .. }))
        );
        assert_eq!(profile.incoming_current(), 1);
        assert_eq!(
            profile.connections().get(&addr(2)).unwrap().direction(),
            Direction::Incoming
        );
    }

    #[test]
    fn test_incoming_beyond_limit_refused() {
        let mut profile = activated(1);
        accept(&mut profile, addr(2), psm::CONTROL, 0x50);
        profile.take_output();
        accept(&mut profile, addr(3), psm::CONTROL, 0x51);
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::Disconnect {
                handle: ChannelHandle(0x51)
            }]
        );
        assert!(!profile.connections().contains(&addr(3)));
    }

    #[test]
    fn test_browsing_without_control_refused() {
        let mut profile = activated(2);
        accept(&mut profile, addr(2), psm::BROWSING, 0x60);
        let output = profile.take_output();
        assert_eq!(
            output.cm[0],
            CmRequest::Disconnect {
                handle: ChannelHandle(0x60)
            }
        );
        // Browsing accept is armed again
        assert!(matches!(
            output.cm[1],
            CmRequest::ConnectAccept {
                psm: psm::BROWSING,
                ..
            }
        ));
    }

    #[test]
    fn test_collision_keeps_incoming() {
        let mut profile = activated(2);
        profile.handle_request(Request::Connect(addr(4)));
        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(4),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        profile.take_output();

        accept(&mut profile, addr(4), psm::CONTROL, 0x70);
        let output = profile.take_output();
        assert_eq!(
            output.cm[0],
            CmRequest::CancelConnect {
                address: addr(4),
                psm: psm::CONTROL
            }
        );
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                outcome: Outcome::SUCCESS,
                ..
            }]
        ));
        let record = profile.connections().get(&addr(4)).unwrap();
        assert_eq!(record.control.handle(), Some(ChannelHandle(0x70)));
        assert_eq!(record.direction(), Direction::Incoming);

        // The cancelled outgoing attempt reports failure: nothing changes
        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(4),
            psm: psm::CONTROL,
            handle: ChannelHandle(0),
            mtu: 0,
            outcome: Outcome::cm(crate::error::cm_code::CANCELLED),
        });
        let output = profile.take_output();
        assert!(output.cm.is_empty() && output.events.is_empty());
        assert!(
            profile
                .connections()
                .get(&addr(4))
                .unwrap()
                .control
                .is(ChannelState::Connected)
        );
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_crossing_connections_reconnect() {
        let mut profile = configured(version::V1_3);
        connected_outgoing(&mut profile, addr(5), ChannelHandle(0x40), version::V1_3);

        // A second control channel to the same device shows up
        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(5),
            psm: psm::CONTROL,
            handle: ChannelHandle(0x41),
            mtu: 672,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[
                CmRequest::Disconnect {
                    handle: ChannelHandle(0x41)
                },
                CmRequest::Disconnect {
                    handle: ChannelHandle(0x40)
                },
            ]
        );
        assert!(
            profile
                .connections()
                .get(&addr(5))
                .unwrap()
                .control
                .is(ChannelState::DisconnectingToReconnect)
        );

        profile.handle_cm_event(CmEvent::DisconnectIndication {
            handle: ChannelHandle(0x40),
            local_terminated: true,
            reason: CM_OK,
        });
        let output = profile.take_output();
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::Connect {
                psm: psm::CONTROL,
                ..
            }]
        ));
        assert!(output.events.is_empty());
        assert!(
            profile
                .connections()
                .get(&addr(5))
                .unwrap()
                .control
                .is(ChannelState::Connecting)
        );
    }

    #[test]
    fn test_collision_then_crossing_keeps_incoming_count() {
        let mut profile = activated(1);
        profile.handle_request(Request::Connect(addr(4)));
        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(4),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        profile.take_output();
        accept(&mut profile, addr(4), psm::CONTROL, 0x70);
        profile.take_output();
        assert_eq!(profile.incoming_current(), 1);

        // The outgoing attempt was not cancelled in time
        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(4),
            psm: psm::CONTROL,
            handle: ChannelHandle(0x71),
            mtu: 672,
            outcome: CM_OK,
        });
        profile.take_output();
        for handle in [0x71, 0x70] {
            profile.handle_cm_event(CmEvent::DisconnectIndication {
                handle: ChannelHandle(handle),
                local_terminated: true,
                reason: CM_OK,
            });
        }
        let output = profile.take_output();
        assert!(output.events.is_empty());
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::Connect {
                psm: psm::CONTROL,
                ..
            }]
        ));

        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(4),
            psm: psm::CONTROL,
            handle: ChannelHandle(0x72),
            mtu: 672,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert!(output.events.is_empty());
        let record = profile.connections().get(&addr(4)).unwrap();
        assert!(record.control.is(ChannelState::Connected));
        assert_eq!(record.direction(), Direction::Incoming);
        assert_eq!(profile.incoming_current(), 1);

        profile.handle_cm_event(CmEvent::DisconnectIndication {
            handle: ChannelHandle(0x72),
            local_terminated: false,
            reason: Outcome::cm(0x0013),
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::DisconnectIndication {
                connection_id: 0,
                local_terminated: false,
                ..
            }]
        ));
        assert!(profile.connections().is_empty());
        assert_eq!(profile.incoming_current(), 0);
        assert_eq!(
            profile.accept_states(),
            (AcceptState::Activated, AcceptState::Activated)
        );
    }

    #[test]
    fn test_cancel_loses_race_to_connect() {
        let mut profile = configured(version::V1_3);
        profile.handle_request(Request::Connect(addr(1)));
        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(1),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        profile.take_output();

        profile.handle_request(Request::CancelConnect(addr(1)));
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::CancelConnect {
                address: addr(1),
                psm: psm::CONTROL
            }]
        );

        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::CONTROL,
            handle: ChannelHandle(0x40),
            mtu: 672,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::Disconnect {
                handle: ChannelHandle(0x40)
            }]
        );
        assert!(output.events.is_empty());
        assert!(!profile.dispatcher().is_idle());

        profile.handle_cm_event(CmEvent::DisconnectIndication {
            handle: ChannelHandle(0x40),
            local_terminated: true,
            reason: CM_OK,
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                connection_id: None,
                outcome,
                ..
            }] if outcome.is(ResultCode::ConnectAttemptCancelled)
        ));
        assert!(profile.connections().is_empty());
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_cancel_confirmed_by_failed_connect() {
        let mut profile = configured(version::V1_3);
        profile.handle_request(Request::Connect(addr(1)));
        profile.handle_cm_event(CmEvent::SdpSearchResult {
            address: addr(1),
            outcome: CM_OK,
            records: remote_controller(version::V1_3),
        });
        profile.handle_request(Request::CancelConnect(addr(1)));
        profile.take_output();

        profile.handle_cm_event(CmEvent::ConnectConfirm {
            address: addr(1),
            psm: psm::CONTROL,
            handle: ChannelHandle(0),
            mtu: 0,
            outcome: Outcome::cm(crate::error::cm_code::CANCELLED),
        });
        let output = profile.take_output();
        assert!(output.cm.is_empty());
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::ConnectConfirm {
                address,
                outcome,
                ..
            }] if *address == addr(1) && outcome.is(ResultCode::ConnectAttemptCancelled)
        ));
        assert!(profile.connections().is_empty());
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_remote_disconnect() {
        let mut profile = activated(1);
        accept(&mut profile, addr(2), psm::CONTROL, 0x50);
        profile.take_output();

        profile.handle_cm_event(CmEvent::DisconnectIndication {
            handle: ChannelHandle(0x50),
            local_terminated: false,
            reason: Outcome::cm(0x0013),
        });
        let output = profile.take_output();
        assert_eq!(
            output.cm[0],
            CmRequest::DisconnectResponse {
                handle: ChannelHandle(0x50)
            }
        );
        assert!(output.cm.contains(&CmRequest::SdpSearchCancel { address: addr(2) }));
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::DisconnectIndication {
                connection_id: 0,
                local_terminated: false,
                ..
            }]
        ));
        assert!(profile.connections().is_empty());
        assert_eq!(profile.incoming_current(), 0);
        // Accepts come back once below the limit
        assert!(output.cm.contains(&CmRequest::ConnectAccept {
            psm: psm::CONTROL,
            mtu: 672,
            mode: crate::cm::L2capMode::Basic,
            security: crate::cm::SecurityLevel::default(),
        }));
    }

    #[test]
    fn test_local_disconnect_completes() {
        let mut profile = configured(version::V1_3);
        connected_outgoing(&mut profile, addr(1), ChannelHandle(0x40), version::V1_3);
        profile.handle_request(Request::Disconnect(0));
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::Disconnect {
                handle: ChannelHandle(0x40)
            }]
        );

        profile.handle_cm_event(CmEvent::DisconnectIndication {
            handle: ChannelHandle(0x40),
            local_terminated: true,
            reason: CM_OK,
        });
        let output = profile.take_output();
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::DisconnectIndication {
                connection_id: 0,
                local_terminated: true,
                ..
            }]
        ));
        assert!(profile.connections().is_empty());
        assert!(profile.dispatcher().is_idle());
    }

    #[test]
    fn test_inbound_frame_acknowledged_and_delivered() {
        let mut profile = configured(version::V1_3);
        connected_outgoing(&mut profile, addr(1), ChannelHandle(0x40), version::V1_3);

        let mut packet = crate::avctp::Packet::new();
        packet
            .extend_from_slice(&[0x20, 0x11, 0x0E, 0x01, 0x48, 0x00])
            .unwrap();
        profile.handle_cm_event(CmEvent::DataIndication {
            handle: ChannelHandle(0x40),
            packet,
        });
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::DataResponse {
                handle: ChannelHandle(0x40)
            }]
        );
        assert!(matches!(
            output.events.as_slice(),
            [AvrcpEvent::FrameIndication {
                connection_id: 0,
                channel: ChannelKind::Control,
                frame,
            }] if frame.as_slice() == [0x20, 0x11, 0x0E, 0x01, 0x48, 0x00]
        ));
    }

    #[test]
    fn test_invalid_pid_rejected() {
        let mut profile = configured(version::V1_3);
        connected_outgoing(&mut profile, addr(1), ChannelHandle(0x40), version::V1_3);

        let mut packet = crate::avctp::Packet::new();
        packet
            .extend_from_slice(&[0x70, 0x11, 0x0D, 0x01, 0x48])
            .unwrap();
        profile.handle_cm_event(CmEvent::DataIndication {
            handle: ChannelHandle(0x40),
            packet,
        });
        let output = profile.take_output();
        assert!(output.events.is_empty());
        assert_eq!(output.cm.len(), 2);
        match &output.cm[1] {
            CmRequest::Data { handle, packet } => {
                assert_eq!(*handle, ChannelHandle(0x40));
                assert_eq!(packet.as_slice(), &[0x73, 0x11, 0x0D]);
            }
            other => panic!("expected reject, got {other:?}"),
        }

        // Malformed continue packets vanish silently
        let mut packet = crate::avctp::Packet::new();
        packet.push(0x78).unwrap();
        profile.handle_cm_event(CmEvent::DataIndication {
            handle: ChannelHandle(0x40),
            packet,
        });
        let output = profile.take_output();
        assert_eq!(output.cm.len(), 1);
        assert!(output.events.is_empty());
    }
}
