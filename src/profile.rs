//! AVRCP profile core
//!
//! [`AvrcpProfile`] owns every piece of profile state: the dispatcher, the
//! connection registry, the local SDP registration and the connect-accept
//! bookkeeping. It is synchronous and message driven. Each call to
//! [`AvrcpProfile::handle_request`], [`AvrcpProfile::handle_cm_event`] or
//! [`AvrcpProfile::handle_internal_command`] mutates the state and fills an
//! [`Output`] that the processor drains with [`AvrcpProfile::take_output`].
//!
//! The handlers are split by source:
//!
//! * `app_handlers`: application requests
//! * `cm_handlers`: L2CAP events from the Connection Manager
//! * `sdp_handlers`: service record (un)registration and remote searches
//! * `link`: connect, disconnect and accept helpers shared by the above

mod app_handlers;
mod cm_handlers;
mod link;
mod sdp_handlers;

use crate::{
    AvrcpEvent, AvrcpOptions, InternalCommand, Request, SecuritySettings,
    channel::AcceptState,
    cm::{CmEvent, CmRequest},
    connection::ConnectionRegistry,
    constants::{MAX_OUTBOX, psm},
    dispatcher::{Dispatcher, PendingOp},
    error::{Outcome, ResultCode},
    fmt::Dbg,
    sdp::{RemoteFeatures, SdpRegistrar},
};
use heapless::Vec;

/// Everything a handler asks the outside world to do
#[derive(Debug, Default)]
pub struct Output {
    /// Requests for the Connection Manager, in order
    pub cm: Vec<CmRequest, MAX_OUTBOX>,
    /// Events for the application, in order
    pub events: Vec<AvrcpEvent, MAX_OUTBOX>,
    /// Commands the profile sends to itself
    pub internal: Vec<InternalCommand, 2>,
}

impl Output {
    /// Whether nothing was produced
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cm.is_empty() && self.events.is_empty() && self.internal.is_empty()
    }

    fn request(&mut self, request: CmRequest) {
        trace!("[CM] -> {:?}", Dbg(&request));
        if self.cm.push(request).is_err() {
            error!("[CM] Outbox full, request dropped");
        }
    }

    fn event(&mut self, event: AvrcpEvent) {
        trace!("[AVRCP] Event {:?}", Dbg(&event));
        if self.events.push(event).is_err() {
            error!("[AVRCP] Outbox full, event dropped");
        }
    }

    fn internal(&mut self, command: InternalCommand) {
        if self.internal.push(command).is_err() {
            warn!("[AVRCP] Internal command dropped");
        }
    }
}

/// State of the AVRCP profile manager
#[derive(Debug)]
pub struct AvrcpProfile {
    mtu: u16,
    security: SecuritySettings,
    dispatcher: Dispatcher,
    connections: ConnectionRegistry,
    sdp: SdpRegistrar,
    search_active: bool,
    control_accept: AcceptState,
    browsing_accept: AcceptState,
    max_incoming: u8,
    incoming_current: u8,
    output: Output,
}

impl AvrcpProfile {
    /// Create the profile with the given options
    ///
    /// The profile starts busy; call [`Self::init`] to register the PSMs.
    #[must_use]
    pub fn new(options: AvrcpOptions) -> Self {
        Self {
            mtu: options.mtu,
            security: options.security,
            dispatcher: Dispatcher::new(),
            connections: ConnectionRegistry::new(),
            sdp: SdpRegistrar::new(),
            search_active: false,
            control_accept: AcceptState::Deactivated,
            browsing_accept: AcceptState::Deactivated,
            max_incoming: 0,
            incoming_current: 0,
            output: Output::default(),
        }
    }

    /// Register the control PSM; the browsing PSM follows on its confirm
    pub fn init(&mut self) {
        info!("[AVRCP] Registering AVCTP PSMs");
        self.output
            .request(CmRequest::L2capRegister { psm: psm::CONTROL });
    }

    /// Drain everything produced since the last call
    pub fn take_output(&mut self) -> Output {
        core::mem::take(&mut self.output)
    }

    /// Live connections
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Control-plane dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Local service record registration
    #[must_use]
    pub fn sdp(&self) -> &SdpRegistrar {
        &self.sdp
    }

    /// Maximum number of incoming connections set by the last activate
    #[must_use]
    pub fn max_incoming(&self) -> u8 {
        self.max_incoming
    }

    /// Number of live incoming connections
    #[must_use]
    pub fn incoming_current(&self) -> u8 {
        self.incoming_current
    }

    /// Accept states of the control and browsing PSMs
    #[must_use]
    pub fn accept_states(&self) -> (AcceptState, AcceptState) {
        (self.control_accept, self.browsing_accept)
    }

    /// Handle an application request
    ///
    /// Config, activate, deactivate and connect wait in the save queue while
    /// another operation is in progress; everything else runs at once.
    pub fn handle_request(&mut self, request: Request) {
        debug!("[AVRCP] Request {:?}", Dbg(&request));
        if self.dispatcher.must_defer(&request) {
            self.save(request);
            return;
        }
        self.dispatch(request);
    }

    /// Handle a command the profile sent to itself
    pub fn handle_internal_command(&mut self, command: InternalCommand) {
        match command {
            InternalCommand::HouseCleaning => {
                if let Some(request) = self.dispatcher.restore() {
                    debug!("[AVRCP] Restoring {:?}", Dbg(&request));
                    self.dispatch(request);
                }
            }
        }
    }

    /// Handle an event from the Connection Manager
    pub fn handle_cm_event(&mut self, event: CmEvent) {
        trace!("[CM] <- {:?}", Dbg(&event));
        match event {
            CmEvent::L2capRegisterConfirm { psm, outcome } => {
                self.l2cap_register_confirm(psm, outcome);
            }
            CmEvent::ConnectConfirm {
                address,
                psm,
                handle,
                mtu,
                outcome,
            } => self.connect_confirm(address, psm, handle, mtu, outcome),
            CmEvent::ConnectAcceptConfirm {
                address,
                psm,
                handle,
                mtu,
                outcome,
            } => self.connect_accept_confirm(address, psm, handle, mtu, outcome),
            CmEvent::CancelConnectAcceptConfirm { psm, outcome } => {
                self.cancel_connect_accept_confirm(psm, outcome);
            }
            CmEvent::DisconnectIndication {
                handle,
                local_terminated,
                reason,
            } => self.disconnect_indication(handle, local_terminated, reason),
            CmEvent::DataConfirm { handle, outcome } => self.data_confirm(handle, outcome),
            CmEvent::DataIndication { handle, packet } => self.data_indication(handle, &packet),
            CmEvent::SdsRegisterConfirm { handle, outcome } => {
                self.sds_register_confirm(handle, outcome);
            }
            CmEvent::SdsUnregisterConfirm { handle, outcome } => {
                self.sds_unregister_confirm(handle, outcome);
            }
            CmEvent::SdpSearchResult {
                address,
                outcome,
                records,
            } => self.sdp_search_result(address, outcome, &records),
        }
    }

    fn dispatch(&mut self, request: Request) {
        match request {
            Request::Config(config) => self.config_request(config),
            Request::Activate { max_incoming } => self.activate_request(max_incoming),
            Request::Deactivate => self.deactivate_request(),
            Request::Connect(address) => self.connect_request(address),
            Request::CancelConnect(address) => self.cancel_connect_request(address),
            Request::Disconnect(connection_id) => self.disconnect_request(connection_id),
            Request::SecurityIn { mask, level } => self.security_in_request(mask, level),
            Request::SecurityOut { mask, level } => self.security_out_request(mask, level),
            Request::Send {
                connection_id,
                channel,
                frame,
            } => self.send_request(connection_id, channel, &frame),
        }
    }

    /// Put a request in the save queue, refusing it if the queue is full
    fn save(&mut self, request: Request) {
        let Err(request) = self.dispatcher.save(request) else {
            return;
        };
        warn!("[AVRCP] Save queue full, refusing {:?}", Dbg(&request));
        let outcome = Outcome::avrcp(ResultCode::CommandDisallowed);
        let event = match request {
            Request::Config(_) => AvrcpEvent::ConfigConfirm { outcome },
            Request::Activate { .. } => AvrcpEvent::ActivateConfirm { outcome },
            Request::Deactivate => AvrcpEvent::DeactivateConfirm { outcome },
            Request::Connect(address) => AvrcpEvent::ConnectConfirm {
                address,
                connection_id: None,
                mtu: None,
                remote: RemoteFeatures::default(),
                outcome,
            },
            _ => return,
        };
        self.output.event(event);
    }

    fn go_idle(&mut self) {
        if let Some(command) = self.dispatcher.go_idle() {
            self.output.internal(command);
        }
    }

    /// Go idle only if `op` is the operation in progress
    fn finish(&mut self, op: PendingOp) {
        if self.dispatcher.pending_op() == Some(op) {
            self.go_idle();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::constants::version;

    #[test]
    fn test_init_registers_both_psms() {
        let mut profile = AvrcpProfile::new(AvrcpOptions::default());
        assert_eq!(profile.dispatcher().pending_op(), Some(PendingOp::Init));
        profile.init();
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::L2capRegister { psm: psm::CONTROL }]
        );

        profile.handle_cm_event(CmEvent::L2capRegisterConfirm {
            psm: psm::CONTROL,
            outcome: CM_OK,
        });
        let output = profile.take_output();
        assert_eq!(
            output.cm.as_slice(),
            &[CmRequest::L2capRegister { psm: psm::BROWSING }]
        );
        assert!(!profile.dispatcher().is_idle());

        profile.handle_cm_event(CmEvent::L2capRegisterConfirm {
            psm: psm::BROWSING,
            outcome: CM_OK,
        });
        assert!(profile.dispatcher().is_idle());
        assert!(profile.take_output().is_empty());
    }

    #[test]
    fn test_requests_saved_during_init() {
        let mut profile = AvrcpProfile::new(AvrcpOptions::default());
        profile.init();
        profile.take_output();
        profile.handle_request(Request::Config(target_config(version::V1_4)));
        assert_eq!(profile.dispatcher().saved_len(), 1);

        for psm in [psm::CONTROL, psm::BROWSING] {
            profile.handle_cm_event(CmEvent::L2capRegisterConfirm {
                psm,
                outcome: CM_OK,
            });
        }
        let output = profile.take_output();
        assert_eq!(output.internal.as_slice(), &[InternalCommand::HouseCleaning]);

        profile.handle_internal_command(InternalCommand::HouseCleaning);
        let output = profile.take_output();
        assert!(matches!(
            output.cm.as_slice(),
            [CmRequest::SdsRegister { .. }]
        ));
        assert_eq!(profile.dispatcher().pending_op(), Some(PendingOp::Config));
    }

    #[test]
    fn test_save_queue_full_refuses() {
        let mut profile = AvrcpProfile::new(AvrcpOptions::default());
        for _ in 0..crate::constants::MAX_SAVED_REQUESTS {
            profile.handle_request(Request::Deactivate);
        }
        profile.handle_request(Request::Activate { max_incoming: 1 });
        let output = profile.take_output();
        assert_eq!(
            output.events.as_slice(),
            &[AvrcpEvent::ActivateConfirm {
                outcome: Outcome::avrcp(ResultCode::CommandDisallowed)
            }]
        );
    }
}
