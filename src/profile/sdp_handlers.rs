//! Local service record registration and remote SDP searches

use super::AvrcpProfile;
use crate::{
    AvrcpEvent, BluetoothAddress,
    channel::ChannelState,
    dispatcher::PendingOp,
    error::{Outcome, ResultCode, Supplier, sdp_code},
    sdp::{ConfigRequest, RecordHandle, RemoteFeatures, RemoteRecord, SearchState},
};

impl AvrcpProfile {
    /// Replace the local service records
    pub(super) fn config_request(&mut self, config: ConfigRequest) {
        self.dispatcher.go_busy(PendingOp::Config);
        if let Some(mtu) = config.mtu {
            self.mtu = mtu;
        }
        let empty = config.is_empty();
        match self.sdp.begin(config) {
            Some(request) => self.output.request(request),
            None if empty => {
                self.sdp.abort();
                self.config_done(Outcome::avrcp(ResultCode::InvalidParameter));
            }
            None => self.register_next_record(),
        }
    }

    fn register_next_record(&mut self) {
        match self.sdp.register_next() {
            Ok(Some(request)) => self.output.request(request),
            Ok(None) => self.config_done(Outcome::SUCCESS),
            Err(e) => {
                warn!("[SDP] Configuration aborted: {}", e);
                self.config_done(Outcome::avrcp(ResultCode::InvalidParameter));
            }
        }
    }

    fn config_done(&mut self, outcome: Outcome) {
        info!("[SDP] Configuration done: {}", outcome);
        self.output.event(AvrcpEvent::ConfigConfirm { outcome });
        self.finish(PendingOp::Config);
    }

    pub(super) fn sds_register_confirm(&mut self, handle: RecordHandle, outcome: Outcome) {
        if self.sdp.active_role().is_none() {
            warn!("[SDP] Unexpected register confirm 0x{:08X}", handle);
            return;
        }
        if outcome.is_success() {
            debug!("[SDP] Registered record 0x{:08X}", handle);
            self.sdp.on_registered(handle);
            self.register_next_record();
        } else {
            self.sdp.abort();
            self.config_done(outcome);
        }
    }

    pub(super) fn sds_unregister_confirm(&mut self, handle: RecordHandle, outcome: Outcome) {
        if self.sdp.active_role().is_none() {
            warn!("[SDP] Unexpected unregister confirm 0x{:08X}", handle);
            return;
        }
        if !outcome.is_success() {
            self.sdp.abort();
            self.config_done(outcome);
            return;
        }
        debug!("[SDP] Unregistered record 0x{:08X}", handle);
        match self.sdp.on_unregistered(handle) {
            Some(request) => self.output.request(request),
            None => self.register_next_record(),
        }
    }

    pub(super) fn sdp_search_result(
        &mut self,
        address: BluetoothAddress,
        outcome: Outcome,
        records: &[RemoteRecord],
    ) {
        debug!(
            "[SDP] Search of {} done: {}, {} records",
            address,
            outcome,
            records.len()
        );
        self.search_active = false;
        let highest_version = self.sdp.highest_version();

        match self.connections.get_mut(&address) {
            Some(record) if record.sdp_state == SearchState::Active => {
                record.set_sdp_state(SearchState::Done);
                let connection_id = record.connection_id;
                if outcome.is_success() && !records.is_empty() {
                    for remote in records {
                        record.remote_features.apply(remote, highest_version);
                    }
                    match record.control.state() {
                        ChannelState::Pending => self.connect(address),
                        ChannelState::Connected => {
                            let features = record.remote_features;
                            self.remote_features_found(address, connection_id, features);
                        }
                        _ => {}
                    }
                } else if record.control.is(ChannelState::Connected) {
                    info!("[SDP] No usable record on {}, keeping connection", address);
                    self.remote_features_found(address, connection_id, RemoteFeatures::default());
                } else {
                    let outcome = if outcome.is_success()
                        || (outcome.supplier == Supplier::Sdp
                            && outcome.code == sdp_code::NO_RESPONSE_DATA)
                    {
                        Outcome::avrcp(ResultCode::InvalidSdpRecord)
                    } else {
                        outcome
                    };
                    self.complete_pending_op(address, outcome, false);
                    self.remove_connection(address);
                }
            }
            Some(record) if record.sdp_state == SearchState::Done => {
                if record.is_idle() {
                    self.complete_pending_op(
                        address,
                        Outcome::avrcp(ResultCode::ConnectAttemptCancelled),
                        true,
                    );
                    self.remove_connection(address);
                }
            }
            Some(_) => warn!("[SDP] Search result for {} without a search", address),
            None => debug!("[SDP] Search result for forgotten {}", address),
        }
        self.restart_search();
    }

    /// Report what an incoming connection's peer supports
    fn remote_features_found(
        &mut self,
        address: BluetoothAddress,
        connection_id: crate::connection::ConnectionId,
        features: RemoteFeatures,
    ) {
        self.output.event(AvrcpEvent::RemoteFeaturesIndication {
            address,
            connection_id,
            features,
        });
        // Saved connect requests may have been waiting for this search
        if self.dispatcher.is_idle() {
            self.go_idle();
        }
    }
}
