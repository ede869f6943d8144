//! AVRCP service record encoding
//!
//! The Connection Manager registers service records as a flat list of
//! (attribute id, data element) pairs. Only the data element types an AVRCP
//! record needs are modelled.

use super::{Role, RoleDetails};
use crate::{
    constants::{avctp, features, psm, uuid, version},
    error::AvrcpError,
};
use heapless::Vec;

/// Largest encoded service record
pub const MAX_SERVICE_RECORD_SIZE: usize = 192;

/// Encoded service record bytes
pub type ServiceRecordBytes = Vec<u8, MAX_SERVICE_RECORD_SIZE>;

/// Universal attribute identifiers used by AVRCP records
pub mod attribute {
    /// Service Class ID List
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    /// Protocol Descriptor List
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    /// Browse Group List
    pub const BROWSE_GROUP_LIST: u16 = 0x0005;
    /// Bluetooth Profile Descriptor List
    pub const PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    /// Additional Protocol Descriptor Lists
    pub const ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS: u16 = 0x000D;
    /// Service Name (English language base)
    pub const SERVICE_NAME: u16 = 0x0100;
    /// Provider Name (English language base)
    pub const PROVIDER_NAME: u16 = 0x0102;
    /// AVRCP Supported Features
    pub const SUPPORTED_FEATURES: u16 = 0x0311;
}

/// Protocol UUIDs
pub mod protocol {
    /// L2CAP
    pub const L2CAP: u16 = 0x0100;
    /// AVCTP
    pub const AVCTP: u16 = 0x0017;
    /// OBEX
    pub const OBEX: u16 = 0x0008;
    /// Public Browse Group
    pub const PUBLIC_BROWSE_GROUP: u16 = 0x1002;
}

/// Data element type descriptor (upper five bits of the header octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum DataElementType {
    UnsignedInt = 1,
    Uuid = 3,
    TextString = 4,
    Sequence = 6,
}

/// Size index for a two-octet value
const SIZE_2: u8 = 1;
/// Size index for a length carried in the next octet
const SIZE_NEXT_U8: u8 = 5;
/// Size index for a length carried in the next two octets
const SIZE_NEXT_U16: u8 = 6;

/// One SDP data element, borrowing nested sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataElement<'a> {
    /// Unsigned 16-bit integer
    UnsignedInt16(u16),
    /// 16-bit UUID
    Uuid16(u16),
    /// UTF-8 text
    TextString(&'a str),
    /// Data element sequence
    Sequence(&'a [DataElement<'a>]),
}

impl DataElement<'_> {
    fn body_size(&self) -> usize {
        match self {
            Self::UnsignedInt16(_) | Self::Uuid16(_) => 2,
            Self::TextString(text) => text.len(),
            Self::Sequence(items) => items.iter().map(DataElement::encoded_size).sum(),
        }
    }

    /// Number of octets this element occupies, header included
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let body = self.body_size();
        let header = match self {
            Self::UnsignedInt16(_) | Self::Uuid16(_) => 1,
            Self::TextString(_) | Self::Sequence(_) if body <= usize::from(u8::MAX) => 2,
            Self::TextString(_) | Self::Sequence(_) => 3,
        };
        header + body
    }

    /// Append the encoded element to `out`
    ///
    /// # Errors
    /// Returns `AvrcpError::ResourceExhausted` if `out` overflows.
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), AvrcpError> {
        match *self {
            Self::UnsignedInt16(value) => {
                push(out, descriptor(DataElementType::UnsignedInt, SIZE_2))?;
                extend(out, &value.to_be_bytes())
            }
            Self::Uuid16(value) => {
                push(out, descriptor(DataElementType::Uuid, SIZE_2))?;
                extend(out, &value.to_be_bytes())
            }
            Self::TextString(text) => {
                variable_header(out, DataElementType::TextString, text.len())?;
                extend(out, text.as_bytes())
            }
            Self::Sequence(items) => {
                variable_header(out, DataElementType::Sequence, self.body_size())?;
                items.iter().try_for_each(|item| item.encode(out))
            }
        }
    }
}

const fn descriptor(kind: DataElementType, size: u8) -> u8 {
    ((kind as u8) << 3) | size
}

fn variable_header<const N: usize>(
    out: &mut Vec<u8, N>,
    kind: DataElementType,
    len: usize,
) -> Result<(), AvrcpError> {
    if let Ok(len) = u8::try_from(len) {
        push(out, descriptor(kind, SIZE_NEXT_U8))?;
        push(out, len)
    } else {
        let len = u16::try_from(len).map_err(|_| AvrcpError::ResourceExhausted)?;
        push(out, descriptor(kind, SIZE_NEXT_U16))?;
        extend(out, &len.to_be_bytes())
    }
}

fn push<const N: usize>(out: &mut Vec<u8, N>, byte: u8) -> Result<(), AvrcpError> {
    out.push(byte).map_err(|_| AvrcpError::ResourceExhausted)
}

fn extend<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), AvrcpError> {
    out.extend_from_slice(bytes)
        .map_err(|()| AvrcpError::ResourceExhausted)
}

fn attribute<const N: usize>(
    out: &mut Vec<u8, N>,
    id: u16,
    value: &DataElement<'_>,
) -> Result<(), AvrcpError> {
    DataElement::UnsignedInt16(id).encode(out)?;
    value.encode(out)
}

/// Build the service record advertised for `role`
///
/// Records of version 1.4 and later announce the browsing PSM. A target of
/// version 1.6 or later with the cover art feature and an OBEX PSM also
/// announces the cover art protocol stack. Feature bits outside the role's
/// mask are cleared.
///
/// # Errors
/// Returns `AvrcpError::ResourceExhausted` if the record does not fit.
pub fn service_record(role: Role, details: &RoleDetails) -> Result<ServiceRecordBytes, AvrcpError> {
    use DataElement::{Sequence, TextString, UnsignedInt16, Uuid16};

    let mut out = ServiceRecordBytes::new();

    let classes: &[DataElement<'_>] = match role {
        Role::Target => &[Uuid16(uuid::AV_REMOTE_CONTROL_TARGET)],
        Role::Controller if details.version >= version::V1_4 => &[
            Uuid16(uuid::AV_REMOTE_CONTROL),
            Uuid16(uuid::AV_REMOTE_CONTROL_CONTROLLER),
        ],
        Role::Controller => &[Uuid16(uuid::AV_REMOTE_CONTROL)],
    };
    attribute(&mut out, attribute::SERVICE_CLASS_ID_LIST, &Sequence(classes))?;

    let avctp_layer = [Uuid16(protocol::AVCTP), UnsignedInt16(avctp::VERSION)];
    let control_l2cap = [Uuid16(protocol::L2CAP), UnsignedInt16(psm::CONTROL)];
    let control_stack = [Sequence(&control_l2cap), Sequence(&avctp_layer)];
    attribute(
        &mut out,
        attribute::PROTOCOL_DESCRIPTOR_LIST,
        &Sequence(&control_stack),
    )?;

    attribute(
        &mut out,
        attribute::BROWSE_GROUP_LIST,
        &Sequence(&[Uuid16(protocol::PUBLIC_BROWSE_GROUP)]),
    )?;

    let profile = [Uuid16(uuid::AV_REMOTE_CONTROL), UnsignedInt16(details.version)];
    attribute(
        &mut out,
        attribute::PROFILE_DESCRIPTOR_LIST,
        &Sequence(&[Sequence(&profile)]),
    )?;

    if details.version >= version::V1_4 {
        let browsing_l2cap = [Uuid16(protocol::L2CAP), UnsignedInt16(psm::BROWSING)];
        let browsing_stack = [Sequence(&browsing_l2cap), Sequence(&avctp_layer)];

        let cover_art_l2cap;
        let cover_art_stack;
        let obex = [Uuid16(protocol::OBEX)];
        let mut stacks: Vec<DataElement<'_>, 2> = Vec::new();
        stacks
            .push(Sequence(&browsing_stack))
            .map_err(|_| AvrcpError::ResourceExhausted)?;
        if let Some(obex_psm) = details.cover_art_psm.filter(|_| role.advertises_cover_art(details)) {
            cover_art_l2cap = [Uuid16(protocol::L2CAP), UnsignedInt16(obex_psm)];
            cover_art_stack = [Sequence(&cover_art_l2cap), Sequence(&obex)];
            stacks
                .push(Sequence(&cover_art_stack))
                .map_err(|_| AvrcpError::ResourceExhausted)?;
        }
        attribute(
            &mut out,
            attribute::ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS,
            &Sequence(&stacks),
        )?;
    }

    if let Some(name) = &details.service_name {
        attribute(&mut out, attribute::SERVICE_NAME, &TextString(name))?;
    }
    if let Some(name) = &details.provider_name {
        attribute(&mut out, attribute::PROVIDER_NAME, &TextString(name))?;
    }

    let mask = match role {
        Role::Target => features::TARGET_MASK,
        Role::Controller => features::CONTROLLER_MASK,
    };
    attribute(
        &mut out,
        attribute::SUPPORTED_FEATURES,
        &UnsignedInt16(details.features & mask),
    )?;

    Ok(out)
}
