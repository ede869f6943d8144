//! Service discovery for AVRCP
//!
//! Two concerns live here:
//!
//! * the local side: one service record per role (target, controller),
//!   registered and unregistered through the Connection Manager strictly one
//!   transaction at a time ([`SdpRegistrar`], [`record`])
//! * the remote side: what a peer's records mean for browsing and cover art
//!   ([`remote`])

pub mod record;
pub mod remote;

pub use record::{ServiceRecordBytes, service_record};
pub use remote::{RemoteFeatures, RemoteRecord, search_classes};

use crate::{
    cm::CmRequest,
    constants::{MAX_NAME_LENGTH, features, role_config, version},
    error::AvrcpError,
    fmt::Dbg,
};
use heapless::String;

/// Handle assigned by the SDP server to a registered record
pub type RecordHandle = u32;

/// AVRCP role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Rendering device, receives commands
    Target,
    /// Remote control device, sends commands
    Controller,
}

impl Role {
    /// Whether a record for this role advertises the cover art stack
    #[must_use]
    pub fn advertises_cover_art(self, details: &RoleDetails) -> bool {
        self == Role::Target
            && details.version >= version::V1_6
            && details.features & features::COVER_ART != 0
    }
}

/// Local configuration of one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDetails {
    /// AVRCP version advertised in the service record
    pub version: u16,
    /// Supported features advertised in the service record
    pub features: u16,
    /// Role configuration flags, see [`role_config`]
    pub config: u32,
    /// Optional service name
    pub service_name: Option<String<MAX_NAME_LENGTH>>,
    /// Optional provider name
    pub provider_name: Option<String<MAX_NAME_LENGTH>>,
    /// OBEX PSM advertised for cover art (targets only)
    pub cover_art_psm: Option<u16>,
}

impl RoleDetails {
    /// Role details with only a version and feature mask
    #[must_use]
    pub fn new(version: u16, features: u16) -> Self {
        Self {
            version,
            features,
            config: 0,
            service_name: None,
            provider_name: None,
            cover_art_psm: None,
        }
    }

    /// Whether the role asks not to open browsing right after control
    #[must_use]
    pub fn no_browsing_after_control(&self) -> bool {
        self.config & role_config::NO_BROWSING_AFTER_CONTROL != 0
    }
}

/// Desired local configuration: which roles to advertise and how
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigRequest {
    /// Target role, if supported
    pub target: Option<RoleDetails>,
    /// Controller role, if supported
    pub controller: Option<RoleDetails>,
    /// Local L2CAP MTU, `None` keeps the configured one
    pub mtu: Option<u16>,
}

impl ConfigRequest {
    /// Whether neither role is requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.controller.is_none()
    }

    /// Highest AVRCP version across the requested roles (at least 1.0)
    #[must_use]
    pub fn highest_version(&self) -> u16 {
        [&self.target, &self.controller]
            .into_iter()
            .flatten()
            .map(|details| details.version)
            .fold(version::V1_0, u16::max)
    }
}

/// Lifecycle of the SDP search against one remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchState {
    /// Search still to be started
    Pending,
    /// Search in progress
    Active,
    /// Search finished or cancelled
    Done,
}

/// Local service record registration
///
/// Reconfiguration always unregisters every existing record first, target
/// before controller, then registers the requested roles in the same order.
/// Only one SDS transaction is outstanding at a time; `active_role` names the
/// role it concerns.
#[derive(Debug, Default)]
pub struct SdpRegistrar {
    active_role: Option<Role>,
    target_handle: Option<RecordHandle>,
    controller_handle: Option<RecordHandle>,
    pending: Option<ConfigRequest>,
    target: Option<RoleDetails>,
    controller: Option<RoleDetails>,
    highest_version: u16,
}

impl SdpRegistrar {
    /// Create a registrar with nothing registered
    #[must_use]
    pub fn new() -> Self {
        Self {
            highest_version: version::V1_0,
            ..Self::default()
        }
    }

    /// Whether at least one record is registered
    #[must_use]
    pub fn has_records(&self) -> bool {
        self.target_handle.is_some() || self.controller_handle.is_some()
    }

    /// Registered target record handle
    #[must_use]
    pub fn target_handle(&self) -> Option<RecordHandle> {
        self.target_handle
    }

    /// Registered controller record handle
    #[must_use]
    pub fn controller_handle(&self) -> Option<RecordHandle> {
        self.controller_handle
    }

    /// Role of the outstanding SDS transaction
    #[must_use]
    pub fn active_role(&self) -> Option<Role> {
        self.active_role
    }

    /// Highest locally configured AVRCP version
    #[must_use]
    pub fn highest_version(&self) -> u16 {
        self.highest_version
    }

    /// Locally configured target details
    #[must_use]
    pub fn local_target(&self) -> Option<&RoleDetails> {
        self.target.as_ref()
    }

    /// Locally configured controller details
    #[must_use]
    pub fn local_controller(&self) -> Option<&RoleDetails> {
        self.controller.as_ref()
    }

    /// Whether browsing may be opened right after an outgoing control channel
    #[must_use]
    pub fn browsing_after_control(&self) -> bool {
        ![&self.target, &self.controller]
            .into_iter()
            .flatten()
            .any(RoleDetails::no_browsing_after_control)
    }

    /// Classes to search for on a remote device, given the registered roles
    #[must_use]
    pub fn search_classes(&self) -> heapless::Vec<u16, 2> {
        search_classes(
            self.target_handle.is_some(),
            self.controller_handle.is_some(),
        )
    }

    fn set_active(&mut self, role: Option<Role>) {
        if self.active_role != role {
            debug!(
                "[SDP] Active role {:?} -> {:?}",
                Dbg(&self.active_role),
                Dbg(&role)
            );
            self.active_role = role;
        }
    }

    /// Start a reconfiguration towards `request`
    ///
    /// Returns the first unregister request, or `None` if nothing is
    /// registered.
    pub fn begin(&mut self, request: ConfigRequest) -> Option<CmRequest> {
        self.highest_version = request.highest_version();
        self.target.clone_from(&request.target);
        self.controller.clone_from(&request.controller);
        info!(
            "[SDP] Configuring target={} controller={} highest version 0x{:04X}",
            request.target.is_some(),
            request.controller.is_some(),
            self.highest_version
        );
        self.pending = Some(request);
        self.unregister_next()
    }

    fn unregister_next(&mut self) -> Option<CmRequest> {
        if let Some(handle) = self.target_handle {
            self.set_active(Some(Role::Target));
            Some(CmRequest::SdsUnregister { handle })
        } else if let Some(handle) = self.controller_handle {
            self.set_active(Some(Role::Controller));
            Some(CmRequest::SdsUnregister { handle })
        } else {
            None
        }
    }

    /// Build the register request for the next pending role
    ///
    /// Returns `Ok(None)` once every requested role is registered.
    ///
    /// # Errors
    /// Returns an error if a service record cannot be encoded; the pending
    /// request is dropped.
    pub fn register_next(&mut self) -> Result<Option<CmRequest>, AvrcpError> {
        let next = self.pending.as_mut().and_then(|pending| {
            pending
                .target
                .take()
                .map(|details| (Role::Target, details))
                .or_else(|| {
                    pending
                        .controller
                        .take()
                        .map(|details| (Role::Controller, details))
                })
        });

        let Some((role, details)) = next else {
            self.pending = None;
            self.set_active(None);
            return Ok(None);
        };

        match service_record(role, &details) {
            Ok(record) => {
                self.set_active(Some(role));
                Ok(Some(CmRequest::SdsRegister { role, record }))
            }
            Err(e) => {
                error!("[SDP] Cannot encode {:?} record", Dbg(&role));
                self.abort();
                Err(e)
            }
        }
    }

    /// Store the handle of a successful registration
    pub fn on_registered(&mut self, handle: RecordHandle) {
        match self.active_role {
            Some(Role::Target) => self.target_handle = Some(handle),
            Some(Role::Controller) => self.controller_handle = Some(handle),
            None => warn!("[SDP] Register confirm without active role"),
        }
    }

    /// Forget an unregistered handle and return the next unregister, if any
    pub fn on_unregistered(&mut self, handle: RecordHandle) -> Option<CmRequest> {
        if self.target_handle == Some(handle) {
            self.target_handle = None;
        } else if self.controller_handle == Some(handle) {
            self.controller_handle = None;
        } else {
            warn!("[SDP] Unregister confirm for unknown handle 0x{:08X}", handle);
        }
        self.unregister_next()
    }

    /// Drop the pending request after a failure
    pub fn abort(&mut self) {
        self.pending = None;
        self.set_active(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_only() -> ConfigRequest {
        ConfigRequest {
            target: Some(RoleDetails::new(version::V1_4, features::CATEGORY_1)),
            ..ConfigRequest::default()
        }
    }

    fn controller_only() -> ConfigRequest {
        ConfigRequest {
            controller: Some(RoleDetails::new(version::V1_6, features::CATEGORY_2)),
            ..ConfigRequest::default()
        }
    }

    #[test]
    fn test_highest_version() {
        assert_eq!(ConfigRequest::default().highest_version(), version::V1_0);
        let both = ConfigRequest {
            target: target_only().target,
            controller: controller_only().controller,
            mtu: None,
        };
        assert_eq!(both.highest_version(), version::V1_6);
    }

    #[test]
    fn test_fresh_registration() {
        let mut registrar = SdpRegistrar::new();
        assert!(registrar.begin(target_only()).is_none());

        let request = registrar.register_next().unwrap().unwrap();
        assert!(matches!(
            request,
            CmRequest::SdsRegister {
                role: Role::Target,
                ..
            }
        ));
        assert_eq!(registrar.active_role(), Some(Role::Target));

        registrar.on_registered(0x0001_0001);
        assert_eq!(registrar.target_handle(), Some(0x0001_0001));
        assert!(registrar.register_next().unwrap().is_none());
        assert_eq!(registrar.active_role(), None);
        assert!(registrar.has_records());
    }

    #[test]
    fn test_reconfigure_unregisters_first() {
        let mut registrar = SdpRegistrar::new();
        registrar.begin(target_only());
        registrar.register_next().unwrap();
        registrar.on_registered(7);
        registrar.register_next().unwrap();

        let first = registrar.begin(controller_only()).unwrap();
        assert_eq!(first, CmRequest::SdsUnregister { handle: 7 });
        assert!(registrar.on_unregistered(7).is_none());
        assert!(!registrar.has_records());

        let next = registrar.register_next().unwrap().unwrap();
        assert!(matches!(
            next,
            CmRequest::SdsRegister {
                role: Role::Controller,
                ..
            }
        ));
        assert_eq!(registrar.highest_version(), version::V1_6);
    }

    #[test]
    fn test_unregisters_target_then_controller() {
        let mut registrar = SdpRegistrar::new();
        registrar.begin(ConfigRequest {
            target: target_only().target,
            controller: controller_only().controller,
            mtu: None,
        });
        registrar.register_next().unwrap();
        registrar.on_registered(1);
        registrar.register_next().unwrap();
        registrar.on_registered(2);
        assert!(registrar.register_next().unwrap().is_none());

        let first = registrar.begin(ConfigRequest::default());
        assert_eq!(first, Some(CmRequest::SdsUnregister { handle: 1 }));
        assert_eq!(
            registrar.on_unregistered(1),
            Some(CmRequest::SdsUnregister { handle: 2 })
        );
        assert_eq!(registrar.active_role(), Some(Role::Controller));
        assert!(registrar.on_unregistered(2).is_none());
        assert!(registrar.register_next().unwrap().is_none());
    }

    #[test]
    fn test_browsing_after_control_flag() {
        let mut registrar = SdpRegistrar::new();
        let mut request = target_only();
        registrar.begin(request.clone());
        assert!(registrar.browsing_after_control());

        if let Some(details) = request.target.as_mut() {
            details.config = role_config::NO_BROWSING_AFTER_CONTROL;
        }
        registrar.begin(request);
        assert!(!registrar.browsing_after_control());
    }
}
