//! Remote service records and the feature decisions derived from them

use super::Role;
use crate::constants::{MAX_NAME_LENGTH, features, uuid, version};
use heapless::String;

/// An AVRCP service record found on a remote device
///
/// The SDP client parses the attribute list; only the fields AVRCP needs
/// are carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    /// Role the record advertises
    pub role: Role,
    /// AVRCP version from the profile descriptor list (1.0 when absent)
    pub version: u16,
    /// Supported features attribute (0 when absent)
    pub features: u16,
    /// Service name, if advertised
    pub service_name: Option<String<MAX_NAME_LENGTH>>,
    /// Provider name, if advertised
    pub provider_name: Option<String<MAX_NAME_LENGTH>>,
    /// L2CAP PSM of the cover art OBEX service, if advertised
    pub cover_art_psm: Option<u16>,
}

impl RemoteRecord {
    /// A record with only version and features
    #[must_use]
    pub fn new(role: Role, version: u16, features: u16) -> Self {
        Self {
            role,
            version,
            features,
            service_name: None,
            provider_name: None,
            cover_art_psm: None,
        }
    }

    /// Whether a browsing channel may be opened towards this record
    ///
    /// Requires AVRCP 1.4 on both sides. A remote target must also be a
    /// player, a tuner, or advertise browsing or multiple players; a remote
    /// controller must advertise browsing.
    #[must_use]
    pub fn supports_browsing(&self, local_highest_version: u16) -> bool {
        if local_highest_version < version::V1_4 || self.version < version::V1_4 {
            return false;
        }
        let required = match self.role {
            Role::Target => {
                features::CATEGORY_1
                    | features::CATEGORY_3
                    | features::BROWSING
                    | features::MULTIPLE_PLAYERS
            }
            Role::Controller => features::BROWSING,
        };
        self.features & required != 0
    }

    /// Whether cover art can be fetched from this record
    ///
    /// Only remote targets serve cover art. Both sides must be AVRCP 1.6 and
    /// the record must name the OBEX PSM.
    #[must_use]
    pub fn supports_cover_art(&self, local_highest_version: u16) -> bool {
        self.role == Role::Target
            && local_highest_version >= version::V1_6
            && self.version >= version::V1_6
            && self.features & features::COVER_ART != 0
            && self.cover_art_psm.is_some()
    }
}

/// Feature summary of a remote device, built from its search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteFeatures {
    /// Feature bits the local side may act on (browsing, cover art)
    pub features: u16,
    /// Version of the remote target record, if any
    pub target_version: Option<u16>,
    /// Version of the remote controller record, if any
    pub controller_version: Option<u16>,
    /// OBEX PSM for cover art, if usable
    pub cover_art_psm: Option<u16>,
}

impl RemoteFeatures {
    /// Fold one remote record into the summary
    pub fn apply(&mut self, record: &RemoteRecord, local_highest_version: u16) {
        match record.role {
            Role::Target => self.target_version = Some(record.version),
            Role::Controller => self.controller_version = Some(record.version),
        }
        if record.supports_browsing(local_highest_version) {
            self.features |= features::BROWSING;
        }
        if record.supports_cover_art(local_highest_version) {
            self.features |= features::COVER_ART;
            self.cover_art_psm = record.cover_art_psm;
        }
    }

    /// Whether browsing may be opened towards the remote device
    #[must_use]
    pub fn browsing(&self) -> bool {
        self.features & features::BROWSING != 0
    }

    /// Whether the remote target serves cover art
    #[must_use]
    pub fn cover_art(&self) -> bool {
        self.features & features::COVER_ART != 0
    }
}

/// Service classes to search on a remote device
///
/// A local target looks for remote controllers and a local controller looks
/// for remote targets.
#[must_use]
pub fn search_classes(local_target: bool, local_controller: bool) -> heapless::Vec<u16, 2> {
    let mut classes = heapless::Vec::new();
    if local_target {
        classes.push(uuid::AV_REMOTE_CONTROL).ok();
    }
    if local_controller {
        classes.push(uuid::AV_REMOTE_CONTROL_TARGET).ok();
    }
    classes
}
