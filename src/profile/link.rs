//! Connect, disconnect and accept helpers shared by the handlers

use super::AvrcpProfile;
use crate::{
    AvrcpEvent, BluetoothAddress,
    channel::{AcceptState, ChannelKind, ChannelState},
    cm::CmRequest,
    connection::Direction,
    constants::{psm, version},
    dispatcher::PendingOp,
    error::{Outcome, ResultCode},
    fmt::Dbg,
    sdp::{RemoteFeatures, SearchState},
};

/// How a control channel came up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Establishment {
    /// Accepted from the remote device
    Incoming,
    /// Opened locally
    Outgoing,
    /// A local attempt lost to an incoming connection
    Collision,
}

impl AvrcpProfile {
    /// Open the next channel of `address`
    ///
    /// Browsing is opened once control is up; otherwise control is opened.
    pub(super) fn connect(&mut self, address: BluetoothAddress) {
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        let kind = if record.control.is(ChannelState::Connected)
            && matches!(
                record.browsing.state(),
                ChannelState::Disconnected | ChannelState::DisconnectingToReconnect
            ) {
            ChannelKind::Browsing
        } else if matches!(
            record.control.state(),
            ChannelState::Disconnected
                | ChannelState::Pending
                | ChannelState::DisconnectingToReconnect
        ) {
            ChannelKind::Control
        } else {
            return;
        };
        record.channel_mut(kind).set_state(ChannelState::Connecting);
        let security = match kind {
            ChannelKind::Control => self.security.outgoing_control,
            ChannelKind::Browsing => self.security.outgoing_browsing,
        };
        self.output.request(CmRequest::Connect {
            address,
            psm: kind.psm(),
            mtu: self.mtu,
            mode: kind.mode(),
            security,
        });
    }

    /// Tear down both channels of `address`, browsing first
    pub(super) fn disconnect(&mut self, address: BluetoothAddress) {
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        let mut reset_app_state = false;
        for kind in [ChannelKind::Browsing, ChannelKind::Control] {
            let channel = record.channel_mut(kind);
            match channel.state() {
                ChannelState::Pending => channel.set_state(ChannelState::Disconnected),
                ChannelState::Connecting => {
                    self.output.request(CmRequest::CancelConnect {
                        address,
                        psm: kind.psm(),
                    });
                    channel.set_state(ChannelState::Cancelling);
                }
                ChannelState::Connected => {
                    if let Some(handle) = channel.handle() {
                        self.output.request(CmRequest::Disconnect { handle });
                    }
                    channel.set_state(ChannelState::Disconnecting);
                    reset_app_state = true;
                }
                _ => {}
            }
        }
        if reset_app_state {
            record.reset_app_state = true;
        }
        self.cancel_search(address);
    }

    /// Arm connect-accept on every PSM that has none outstanding
    pub(super) fn connect_accept(&mut self) {
        if self.incoming_current >= self.max_incoming
            || self.connections.connected_count() >= usize::from(self.max_incoming)
        {
            return;
        }
        if self.control_accept == AcceptState::Deactivated {
            debug!("[AVRCP] Accepting on control PSM");
            self.output.request(CmRequest::ConnectAccept {
                psm: psm::CONTROL,
                mtu: self.mtu,
                mode: ChannelKind::Control.mode(),
                security: self.security.incoming_control,
            });
            self.control_accept = AcceptState::Activated;
        }
        self.accept_browsing();
    }

    /// Arm connect-accept on the browsing PSM when AVRCP 1.4 is configured
    pub(super) fn accept_browsing(&mut self) {
        if self.sdp.highest_version() >= version::V1_4
            && self.browsing_accept == AcceptState::Deactivated
        {
            debug!("[AVRCP] Accepting on browsing PSM");
            self.output.request(CmRequest::ConnectAccept {
                psm: psm::BROWSING,
                mtu: self.mtu,
                mode: ChannelKind::Browsing.mode(),
                security: self.security.incoming_browsing,
            });
            self.browsing_accept = AcceptState::Activated;
        }
    }

    /// Withdraw every armed accept
    ///
    /// Returns whether a cancel was issued.
    pub(super) fn cancel_accepts(&mut self) -> bool {
        let mut cancelled = false;
        for (psm, accept) in [
            (psm::CONTROL, &mut self.control_accept),
            (psm::BROWSING, &mut self.browsing_accept),
        ] {
            if *accept == AcceptState::Activated {
                *accept = AcceptState::Deactivated;
                self.output.request(CmRequest::CancelConnectAccept { psm });
                cancelled = true;
            }
        }
        cancelled
    }

    /// Announce a control channel that just came up
    ///
    /// Only the first establishment of a record is counted and announced. A
    /// control channel reopened after crossing connections is already known
    /// to the application.
    pub(super) fn new_connection_established(
        &mut self,
        address: BluetoothAddress,
        establishment: Establishment,
    ) {
        if self.control_accept == AcceptState::Activated
            && self.connections.connected_count() >= usize::from(self.max_incoming)
        {
            debug!("[AVRCP] Connection limit reached");
            self.cancel_accepts();
        }

        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        let direction = match establishment {
            Establishment::Outgoing => Direction::Outgoing,
            Establishment::Incoming | Establishment::Collision => Direction::Incoming,
        };
        let first = record.set_direction(direction);
        if let Some(request) = record.control.next_transmission() {
            self.output.request(request);
        }
        let connection_id = record.connection_id;
        if !first {
            info!("[AVRCP] Connection {} to {} re-established", connection_id, address);
            return;
        }
        let mtu = record.control.mtu();
        let remote = record.remote_features;
        info!(
            "[AVRCP] Connection {} to {} established ({:?})",
            connection_id,
            address,
            Dbg(&establishment)
        );
        if direction == Direction::Incoming {
            self.incoming_current = self.incoming_current.saturating_add(1);
        }

        if establishment == Establishment::Incoming {
            self.output.event(AvrcpEvent::ConnectIndication {
                address,
                connection_id,
                mtu: mtu.unwrap_or(self.mtu),
            });
            self.start_search(address);
        } else {
            self.output.event(AvrcpEvent::ConnectConfirm {
                address,
                connection_id: Some(connection_id),
                mtu,
                remote,
                outcome: Outcome::SUCCESS,
            });
            self.finish(PendingOp::Connect(address));
        }
    }

    /// Report a record that went down to whoever waits for it
    ///
    /// A connect still in progress for `address` is confirmed, as cancelled
    /// when the application asked for it. Otherwise the application already
    /// knows the connection and gets a disconnect indication.
    pub(super) fn complete_pending_op(
        &mut self,
        address: BluetoothAddress,
        reason: Outcome,
        local_terminated: bool,
    ) {
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        let connection_id = record.connection_id;
        let cancelled = record.cancel_requested;
        let announced = record.direction() != Direction::Unset;
        let local_terminated = core::mem::take(&mut record.reset_app_state) || local_terminated;

        if self.dispatcher.pending_op() == Some(PendingOp::Connect(address)) {
            let outcome = if cancelled {
                Outcome::avrcp(ResultCode::ConnectAttemptCancelled)
            } else {
                reason
            };
            self.output.event(AvrcpEvent::ConnectConfirm {
                address,
                connection_id: None,
                mtu: None,
                remote: RemoteFeatures::default(),
                outcome,
            });
            self.go_idle();
        } else if announced {
            self.output.event(AvrcpEvent::DisconnectIndication {
                address,
                connection_id,
                local_terminated,
                reason,
            });
        }
    }

    /// Forget a record, keeping the incoming counter in step
    pub(super) fn remove_connection(&mut self, address: BluetoothAddress) {
        if let Some(record) = self.connections.remove(&address) {
            if record.direction() == Direction::Incoming {
                self.incoming_current = self.incoming_current.saturating_sub(1);
            }
        }
    }

    /// Start the remote search for `address` if no other search runs
    pub(super) fn start_search(&mut self, address: BluetoothAddress) {
        if self.search_active {
            debug!("[SDP] Search busy, {} waits", address);
            return;
        }
        let classes = self.sdp.search_classes();
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        self.search_active = true;
        record.set_sdp_state(SearchState::Active);
        self.output
            .request(CmRequest::SdpSearch { address, classes });
    }

    /// Start the next waiting search on a connected record
    pub(super) fn restart_search(&mut self) {
        let next = self
            .connections
            .iter()
            .find(|record| {
                record.sdp_state == SearchState::Pending && record.control.is(ChannelState::Connected)
            })
            .map(|record| record.address);
        if let Some(address) = next {
            self.start_search(address);
        }
    }

    /// Abandon the search running for `address`, if any
    pub(super) fn cancel_search(&mut self, address: BluetoothAddress) {
        let Some(record) = self.connections.get_mut(&address) else {
            return;
        };
        if record.sdp_state == SearchState::Active {
            record.set_sdp_state(SearchState::Done);
            self.output.request(CmRequest::SdpSearchCancel { address });
        }
    }
}
