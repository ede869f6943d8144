//! Application requests

use super::AvrcpProfile;
use crate::{
    AvrcpEvent, BluetoothAddress, Request,
    avctp::Frame,
    channel::{AcceptState, ChannelKind, ChannelState},
    cm::SecurityLevel,
    connection::ConnectionId,
    constants::security_config,
    dispatcher::PendingOp,
    error::{FrameError, Outcome, ResultCode},
    sdp::RemoteFeatures,
};

impl AvrcpProfile {
    pub(super) fn activate_request(&mut self, max_incoming: u8) {
        let outcome = if !self.sdp.has_records() {
            Outcome::avrcp(ResultCode::CommandDisallowed)
        } else if max_incoming == 0 {
            Outcome::avrcp(ResultCode::InvalidParameter)
        } else {
            info!("[AVRCP] Activated for {} incoming connections", max_incoming);
            self.max_incoming = max_incoming;
            self.connect_accept();
            Outcome::SUCCESS
        };
        self.output.event(AvrcpEvent::ActivateConfirm { outcome });
        self.go_idle();
    }

    pub(super) fn deactivate_request(&mut self) {
        if self.max_incoming == 0 && self.browsing_accept != AcceptState::Activated {
            self.output.event(AvrcpEvent::DeactivateConfirm {
                outcome: Outcome::avrcp(ResultCode::NothingToCancel),
            });
            self.go_idle();
            return;
        }
        info!("[AVRCP] Deactivating");
        self.max_incoming = 0;
        if self.cancel_accepts() {
            self.dispatcher.go_busy(PendingOp::Deactivate);
        } else {
            self.output.event(AvrcpEvent::DeactivateConfirm {
                outcome: Outcome::SUCCESS,
            });
            self.go_idle();
        }
    }

    pub(super) fn connect_request(&mut self, address: BluetoothAddress) {
        let refusal = if !self.sdp.has_records() {
            Some(ResultCode::CommandDisallowed)
        } else if self.connections.contains(&address) {
            Some(ResultCode::AlreadyConnected)
        } else {
            None
        };
        if let Some(code) = refusal {
            self.output.event(AvrcpEvent::ConnectConfirm {
                address,
                connection_id: None,
                mtu: None,
                remote: RemoteFeatures::default(),
                outcome: Outcome::avrcp(code),
            });
            self.go_idle();
            return;
        }
        if self.search_active {
            debug!("[AVRCP] Connect to {} waits for a running search", address);
            self.save(Request::Connect(address));
            return;
        }

        match self.connections.add(address) {
            Ok(record) => {
                info!("[AVRCP] Connecting to {}", address);
                record.control.set_state(ChannelState::Pending);
                self.start_search(address);
                self.dispatcher.go_busy(PendingOp::Connect(address));
            }
            Err(e) => {
                warn!("[AVRCP] Cannot connect to {}: {}", address, e);
                self.output.event(AvrcpEvent::ConnectConfirm {
                    address,
                    connection_id: None,
                    mtu: None,
                    remote: RemoteFeatures::default(),
                    outcome: Outcome::avrcp(ResultCode::CommandDisallowed),
                });
                self.go_idle();
            }
        }
    }

    pub(super) fn cancel_connect_request(&mut self, address: BluetoothAddress) {
        if let Some(record) = self.connections.get_mut(&address) {
            info!("[AVRCP] Cancelling connection to {}", address);
            record.cancel_requested = true;
            self.disconnect(address);
            return;
        }
        let outcome = if self.dispatcher.cancel_saved_connect(&address) {
            debug!("[AVRCP] Dropped saved connect to {}", address);
            ResultCode::ConnectAttemptCancelled
        } else {
            ResultCode::NothingToCancel
        };
        self.output.event(AvrcpEvent::ConnectConfirm {
            address,
            connection_id: None,
            mtu: None,
            remote: RemoteFeatures::default(),
            outcome: Outcome::avrcp(outcome),
        });
    }

    pub(super) fn disconnect_request(&mut self, connection_id: ConnectionId) {
        let Some(address) = self.connections.address_of(connection_id) else {
            debug!("[AVRCP] Disconnect of unknown connection {}", connection_id);
            return;
        };
        let connected = self
            .connections
            .get(&address)
            .is_some_and(|record| record.control.is(ChannelState::Connected));
        if !connected {
            debug!("[AVRCP] Connection {} is not up yet", connection_id);
            return;
        }
        info!("[AVRCP] Disconnecting connection {}", connection_id);
        self.disconnect(address);
    }

    pub(super) fn security_in_request(&mut self, mask: u8, level: SecurityLevel) {
        let outcome = Self::apply_security(
            mask,
            level,
            &mut self.security.incoming_control,
            &mut self.security.incoming_browsing,
        );
        self.output.event(AvrcpEvent::SecurityInConfirm { outcome });
    }

    pub(super) fn security_out_request(&mut self, mask: u8, level: SecurityLevel) {
        let outcome = Self::apply_security(
            mask,
            level,
            &mut self.security.outgoing_control,
            &mut self.security.outgoing_browsing,
        );
        self.output.event(AvrcpEvent::SecurityOutConfirm { outcome });
    }

    fn apply_security(
        mask: u8,
        level: SecurityLevel,
        control: &mut SecurityLevel,
        browsing: &mut SecurityLevel,
    ) -> Outcome {
        let level = match level.resolve() {
            Ok(level) => level,
            Err(code) => return Outcome::avrcp(code),
        };
        let mut outcome = Outcome::avrcp(ResultCode::UnacceptableParameter);
        if mask & security_config::CONTROL != 0 {
            *control = level;
            outcome = Outcome::SUCCESS;
        }
        if mask & security_config::BROWSING != 0 {
            *browsing = level;
            outcome = Outcome::SUCCESS;
        }
        outcome
    }

    pub(super) fn send_request(
        &mut self,
        connection_id: ConnectionId,
        channel: ChannelKind,
        frame: &Frame,
    ) {
        let record = self
            .connections
            .address_of(connection_id)
            .and_then(|address| self.connections.get_mut(&address))
            .filter(|record| record.control.is(ChannelState::Connected));
        let Some(record) = record else {
            warn!("[AVCTP] Frame for connection {} dropped, not connected", connection_id);
            self.output.event(AvrcpEvent::FrameDropped {
                connection_id,
                channel,
                outcome: Outcome::avrcp(ResultCode::ChannelNotConnected),
            });
            return;
        };
        let address = record.address;
        let lazy_connect =
            channel == ChannelKind::Browsing && record.browsing.is(ChannelState::Disconnected);

        match record.channel_mut(channel).send(frame) {
            Ok(Some(request)) => self.output.request(request),
            Ok(None) => {
                if lazy_connect {
                    debug!("[AVRCP] Opening browsing to {} for a queued frame", address);
                    self.connect(address);
                }
            }
            Err(e) => {
                warn!("[AVCTP] Frame for connection {} dropped: {}", connection_id, e);
                let code = match e {
                    FrameError::QueueFull => ResultCode::CommandDisallowed,
                    _ => ResultCode::InvalidParameter,
                };
                self.output.event(AvrcpEvent::FrameDropped {
                    connection_id,
                    channel,
                    outcome: Outcome::avrcp(code),
                });
            }
        }
    }
}
