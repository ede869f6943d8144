use core::fmt;

use crate::error::AvrcpError;

/// A Bluetooth Device Address (`BD_ADDR`) identifying a remote AVRCP peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
    /// Create a new Bluetooth address from bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Format the address as a colon-separated hex string
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        let mut out = heapless::String::new();
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(':').ok();
            }
            out.push(char::from(HEX[usize::from(byte >> 4)])).ok();
            out.push(char::from(HEX[usize::from(byte & 0x0F)])).ok();
        }
        out
    }

    /// Parse a colon-separated hex string such as `00:1A:7D:DA:71:13`
    ///
    /// # Errors
    /// Returns `AvrcpError::InvalidParameter` unless the string holds exactly
    /// six two-digit hex groups.
    pub fn from_hex(hex: &str) -> Result<Self, AvrcpError> {
        if hex.len() != 17 {
            return Err(AvrcpError::InvalidParameter);
        }

        let mut bytes = [0u8; 6];
        let mut groups = hex.split(':');
        for slot in &mut bytes {
            let group = groups.next().ok_or(AvrcpError::InvalidParameter)?;
            if group.len() != 2 {
                return Err(AvrcpError::InvalidParameter);
            }
            *slot = u8::from_str_radix(group, 16).map_err(|_| AvrcpError::InvalidParameter)?;
        }
        if groups.next().is_some() {
            return Err(AvrcpError::InvalidParameter);
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format_hex().as_str())
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<BluetoothAddress> for [u8; 6] {
    fn from(addr: BluetoothAddress) -> Self {
        addr.0
    }
}

impl From<BluetoothAddress> for bt_hci::param::BdAddr {
    fn from(addr: BluetoothAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.0)
    }
}

impl TryFrom<bt_hci::param::BdAddr> for BluetoothAddress {
    type Error = AvrcpError;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        bd_addr.raw().try_into()
    }
}

impl TryFrom<&str> for BluetoothAddress {
    type Error = AvrcpError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        BluetoothAddress::from_hex(hex)
    }
}

impl TryFrom<&[u8]> for BluetoothAddress {
    type Error = AvrcpError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 6]>::try_from(bytes)
            .map(Self)
            .map_err(|_| AvrcpError::InvalidParameter)
    }
}
