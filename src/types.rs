//! Addresses, device records and other plain values exchanged with the stack

use std::str::FromStr;

use crate::error::ErrorKind;
use crate::Error;

/// Maximum length in bytes of a Bluetooth friendly name (Core Specification, Vol 2, Part E, §7.3.11)
pub const MAX_NAME_LEN: usize = 248;

/// A 48-bit Bluetooth device address.
///
/// Bytes are stored most significant first, the order in which the stack reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Creates an address from the low 48 bits of `value`
    pub const fn from_u64(value: u64) -> Self {
        let b = value.to_be_bytes();
        BdAddr([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    /// The address as a 48-bit integer
    pub const fn to_u64(self) -> u64 {
        let a = self.0;
        u64::from_be_bytes([0, 0, a[0], a[1], a[2], a[3], a[4], a[5]])
    }
}

impl From<u64> for BdAddr {
    fn from(value: u64) -> Self {
        BdAddr::from_u64(value)
    }
}

impl From<BdAddr> for u64 {
    fn from(addr: BdAddr) -> Self {
        addr.to_u64()
    }
}

impl std::fmt::Display for BdAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

impl FromStr for BdAddr {
    type Err = Error;

    /// Parses either `00:11:22:AA:BB:CC` or `001122aabbcc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = if s.len() == 17 {
            let mut parts = s.split(':');
            let parts_ok = parts.clone().count() == 6 && parts.all(|p| p.len() == 2);
            if !parts_ok {
                return Err(Error::with_message(ErrorKind::InvalidParameter, format!("bad address {s:?}")));
            }
            s.split(':').collect()
        } else {
            s.to_owned()
        };
        if digits.len() != 12 {
            return Err(Error::with_message(ErrorKind::InvalidParameter, format!("bad address {s:?}")));
        }
        u64::from_str_radix(&digits, 16)
            .map(BdAddr::from_u64)
            .map_err(|e| Error::new(ErrorKind::InvalidParameter, Some(Box::new(e)), format!("bad address {s:?}")))
    }
}

/// A 24-bit Bluetooth Class of Device (Assigned Numbers, §2.8)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceClass(u32);

impl DeviceClass {
    /// Creates a class of device from its raw bits. Bits above 24 are discarded.
    pub const fn from_bits(bits: u32) -> Self {
        DeviceClass(bits & 0x00ff_ffff)
    }

    /// Decodes the three class-of-device bytes in the order the stack reports them
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        DeviceClass(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }

    /// The raw 24 bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Major service class bits (bits 13 to 23), shifted down
    pub const fn service_classes(self) -> u16 {
        ((self.0 >> 13) & 0x07ff) as u16
    }

    /// Major device class (bits 8 to 12)
    pub const fn major_device_class(self) -> u8 {
        ((self.0 >> 8) & 0x1f) as u8
    }

    /// Minor device class (bits 2 to 7)
    pub const fn minor_device_class(self) -> u8 {
        ((self.0 >> 2) & 0x3f) as u8
    }
}

/// A device that responded to an inquiry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// The device address
    pub address: BdAddr,
    /// The device's class of device
    pub class: DeviceClass,
    /// The friendly name, empty if the device did not report one
    pub name: String,
}

impl DeviceRecord {
    /// Builds a record from the raw name buffer reported by the stack.
    ///
    /// The name ends at the first NUL byte and is limited to [`MAX_NAME_LEN`] bytes. Invalid UTF-8 is replaced.
    pub fn from_raw_name(address: BdAddr, class: DeviceClass, raw_name: &[u8]) -> Self {
        let raw_name = &raw_name[..raw_name.len().min(MAX_NAME_LEN)];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        DeviceRecord {
            address,
            class,
            name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
        }
    }
}

/// The access code used for a device inquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InquiryAccessCode {
    /// General/Unlimited Inquiry Access Code (0x9E8B33)
    General,
    /// Limited Dedicated Inquiry Access Code (0x9E8B00)
    Limited,
}

impl InquiryAccessCode {
    /// The LAP value of this access code
    pub const fn lap(self) -> u32 {
        match self {
            InquiryAccessCode::General => 0x9E8B33,
            InquiryAccessCode::Limited => 0x9E8B00,
        }
    }
}

impl TryFrom<u32> for InquiryAccessCode {
    type Error = Error;

    fn try_from(lap: u32) -> Result<Self, Self::Error> {
        match lap {
            0x9E8B33 => Ok(InquiryAccessCode::General),
            0x9E8B00 => Ok(InquiryAccessCode::Limited),
            _ => Err(Error::with_message(
                ErrorKind::InvalidParameter,
                format!("unsupported inquiry access code {lap:#08x}"),
            )),
        }
    }
}

/// How a device inquiry ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InquiryOutcome {
    /// The stack reported a successful inquiry
    Completed,
    /// The stack reported a failed inquiry
    Error,
    /// The inquiry was cancelled with [`Stack::cancel_inquiry`][crate::Stack::cancel_inquiry]
    Terminated,
}

/// Link security requested when opening a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecurityOptions {
    /// Require authentication of the remote device
    pub authenticate: bool,
    /// Require an encrypted link
    pub encrypt: bool,
}

impl SecurityOptions {
    /// No authentication or encryption
    pub const NONE: SecurityOptions = SecurityOptions {
        authenticate: false,
        encrypt: false,
    };
}

/// Version information of the local adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LocalVersionInfo {
    /// The local adapter's address
    pub address: BdAddr,
    /// HCI version
    pub hci_version: u8,
    /// HCI revision
    pub hci_revision: u16,
    /// LMP version
    pub lmp_version: u8,
    /// LMP sub-version
    pub lmp_sub_version: u16,
    /// Manufacturer company identifier
    pub manufacturer: u16,
}
