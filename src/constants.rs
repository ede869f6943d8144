//! `Remotebird` Constants
//!
//! Protocol identifiers, profile versions, feature bits and the compile-time
//! capacities of every `heapless` container used by the profile.

/// Depth of the static request, event and CM channels
pub const MAX_CHANNELS: usize = 8;

/// Maximum number of remote devices tracked at the same time (power of two)
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum number of frames waiting for transmission on one logical channel
pub const MAX_PENDING_FRAMES: usize = 16;

/// Maximum number of application requests deferred while the dispatcher is busy
pub const MAX_SAVED_REQUESTS: usize = 8;

/// Maximum number of CM requests or application events emitted by one handler
pub const MAX_OUTBOX: usize = 16;

/// Maximum number of remote service records carried by one SDP search result
pub const MAX_SDP_RECORDS: usize = 2;

/// Maximum length of SDP service and provider names
pub const MAX_NAME_LENGTH: usize = 32;

/// Largest AV/C command payload defined by the profile
pub const MAX_AVC_PAYLOAD: usize = 512;

/// Largest logical AVCTP frame (single-packet header plus the largest payload)
pub const MAX_FRAME_SIZE: usize = MAX_AVC_PAYLOAD + avctp::SINGLE_HEADER_SIZE;

/// Default local L2CAP MTU offered for both channels
pub const DEFAULT_MTU: u16 = 672;

/// L2CAP protocol/service multiplexers used by AVCTP
pub mod psm {
    /// AVCTP control channel
    pub const CONTROL: u16 = 0x0017;
    /// AVCTP browsing channel
    pub const BROWSING: u16 = 0x001B;
}

/// 16-bit service class UUIDs
pub mod uuid {
    /// A/V Remote Control (also the AVCTP profile identifier)
    pub const AV_REMOTE_CONTROL: u16 = 0x110E;
    /// A/V Remote Control Target
    pub const AV_REMOTE_CONTROL_TARGET: u16 = 0x110C;
    /// A/V Remote Control Controller
    pub const AV_REMOTE_CONTROL_CONTROLLER: u16 = 0x110F;
}

/// AVCTP header layout
pub mod avctp {
    /// AVCTP protocol version advertised in service records
    pub const VERSION: u16 = 0x0104;
    /// Profile identifier carried in single and start headers
    pub const PROFILE_ID: u16 = super::uuid::AV_REMOTE_CONTROL;

    /// Header length of a single packet
    pub const SINGLE_HEADER_SIZE: usize = 3;
    /// Header length of a start packet
    pub const START_HEADER_SIZE: usize = 4;
    /// Header length of continue and end packets
    pub const CONTINUE_HEADER_SIZE: usize = 1;

    /// Transaction label, bits 7..4 of the first octet
    pub const TLABEL_SHIFT: u8 = 4;
    /// Transaction label mask after shifting
    pub const TLABEL_MASK: u8 = 0x0F;
    /// Packet type, bits 3..2 of the first octet
    pub const PACKET_TYPE_SHIFT: u8 = 2;
    /// Packet type mask after shifting
    pub const PACKET_TYPE_MASK: u8 = 0x03;
    /// Command/response bit
    pub const CR_BIT: u8 = 0x02;
    /// Invalid profile identifier bit
    pub const IPID_BIT: u8 = 0x01;

    /// Offset of the profile identifier in a single packet
    pub const SINGLE_PID_INDEX: usize = 1;
    /// Offset of the packet count in a start packet
    pub const START_COUNT_INDEX: usize = 1;
    /// Offset of the profile identifier in a start packet
    pub const START_PID_INDEX: usize = 2;
}

/// AVRCP profile versions as advertised in SDP
pub mod version {
    /// AVRCP 1.0
    pub const V1_0: u16 = 0x0100;
    /// AVRCP 1.3
    pub const V1_3: u16 = 0x0103;
    /// AVRCP 1.4, first version with a browsing channel
    pub const V1_4: u16 = 0x0104;
    /// AVRCP 1.5
    pub const V1_5: u16 = 0x0105;
    /// AVRCP 1.6, first version with cover art
    pub const V1_6: u16 = 0x0106;
}

/// Supported-features bits of the AVRCP service record
pub mod features {
    /// Category 1: player/recorder
    pub const CATEGORY_1: u16 = 0x0001;
    /// Category 2: monitor/amplifier
    pub const CATEGORY_2: u16 = 0x0002;
    /// Category 3: tuner
    pub const CATEGORY_3: u16 = 0x0004;
    /// Category 4: menu
    pub const CATEGORY_4: u16 = 0x0008;
    /// Player application settings (target)
    pub const PLAYER_SETTINGS: u16 = 0x0010;
    /// Group navigation (target)
    pub const GROUP_NAVIGATION: u16 = 0x0020;
    /// Browsing
    pub const BROWSING: u16 = 0x0040;
    /// Multiple media players (target)
    pub const MULTIPLE_PLAYERS: u16 = 0x0080;
    /// Cover art (target)
    pub const COVER_ART: u16 = 0x0100;
    /// Cover art: get image properties (controller)
    pub const COVER_ART_GET_IMAGE_PROPERTIES: u16 = 0x0080;
    /// Cover art: get image (controller)
    pub const COVER_ART_GET_IMAGE: u16 = 0x0100;
    /// Cover art: get linked thumbnail (controller)
    pub const COVER_ART_GET_THUMBNAIL: u16 = 0x0200;

    /// Bits a controller record may carry
    pub const CONTROLLER_MASK: u16 = 0x03CF;
    /// Bits a target record may carry
    pub const TARGET_MASK: u16 = 0x01FF;
}

/// Role configuration flags of a `RoleDetails`
pub mod role_config {
    /// Do not open the browsing channel right after the control channel
    pub const NO_BROWSING_AFTER_CONTROL: u32 = 0x0000_0001;
}

/// Channel selection mask of the security requests
pub mod security_config {
    /// Apply to the control channel
    pub const CONTROL: u8 = 0x01;
    /// Apply to the browsing channel
    pub const BROWSING: u8 = 0x02;
}
