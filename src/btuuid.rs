//! `Uuid` extensions and assigned numbers for Bluetooth classic services

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with 16-bit and 32-bit UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Const function to create a 16-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Const function to create a 32-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u32(uuid: u32) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Building classic Bluetooth UUIDs from their short and on-the-wire forms.
///
/// Service records and discovery filters name services by 16 or 32-bit aliases of the base UUID. This trait turns
/// those aliases, and the UUID fields of SDP data elements, into full [`Uuid`]s.
pub trait BluetoothUuidExt: private::Sealed + Sized {
    /// The UUID for a 16-bit service alias
    fn from_u16(alias: u16) -> Self;

    /// The UUID for a 32-bit service alias
    fn from_u32(alias: u32) -> Self;

    /// The UUID held in an SDP UUID element, given the element's big-endian payload.
    ///
    /// SDP carries UUIDs as 2, 4 or 16 bytes. Any other length yields `None`.
    fn from_sdp_bytes(bytes: &[u8]) -> Option<Self>;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(alias: u16) -> Self {
        bluetooth_uuid_from_u16(alias)
    }

    fn from_u32(alias: u32) -> Self {
        bluetooth_uuid_from_u32(alias)
    }

    fn from_sdp_bytes(bytes: &[u8]) -> Option<Self> {
        if let Ok(short) = <[u8; 2]>::try_from(bytes) {
            Some(Self::from_u16(u16::from_be_bytes(short)))
        } else if let Ok(short) = <[u8; 4]>::try_from(bytes) {
            Some(Self::from_u32(u32::from_be_bytes(short)))
        } else {
            Uuid::from_slice(bytes).ok()
        }
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

/// Bluetooth service class and protocol 16-bit UUIDs used in SDP records
pub mod services {
    #![allow(missing_docs)]

    use uuid::Uuid;

    use super::bluetooth_uuid_from_u16;

    pub const SDP: Uuid = bluetooth_uuid_from_u16(0x0001);
    pub const RFCOMM: Uuid = bluetooth_uuid_from_u16(0x0003);
    pub const OBEX: Uuid = bluetooth_uuid_from_u16(0x0008);
    pub const L2CAP: Uuid = bluetooth_uuid_from_u16(0x0100);
    pub const SERVICE_DISCOVERY_SERVER: Uuid = bluetooth_uuid_from_u16(0x1000);
    pub const PUBLIC_BROWSE_ROOT: Uuid = bluetooth_uuid_from_u16(0x1002);
    pub const SERIAL_PORT: Uuid = bluetooth_uuid_from_u16(0x1101);
    pub const LAN_ACCESS_USING_PPP: Uuid = bluetooth_uuid_from_u16(0x1102);
    pub const DIALUP_NETWORKING: Uuid = bluetooth_uuid_from_u16(0x1103);
    pub const IRMC_SYNC: Uuid = bluetooth_uuid_from_u16(0x1104);
    pub const OBEX_OBJECT_PUSH: Uuid = bluetooth_uuid_from_u16(0x1105);
    pub const OBEX_FILE_TRANSFER: Uuid = bluetooth_uuid_from_u16(0x1106);
    pub const HEADSET: Uuid = bluetooth_uuid_from_u16(0x1108);
    pub const AUDIO_SOURCE: Uuid = bluetooth_uuid_from_u16(0x110A);
    pub const AUDIO_SINK: Uuid = bluetooth_uuid_from_u16(0x110B);
    pub const AV_REMOTE_CONTROL_TARGET: Uuid = bluetooth_uuid_from_u16(0x110C);
    pub const AV_REMOTE_CONTROL: Uuid = bluetooth_uuid_from_u16(0x110E);
    pub const HEADSET_AUDIO_GATEWAY: Uuid = bluetooth_uuid_from_u16(0x1112);
    pub const PANU: Uuid = bluetooth_uuid_from_u16(0x1115);
    pub const NAP: Uuid = bluetooth_uuid_from_u16(0x1116);
    pub const HANDSFREE: Uuid = bluetooth_uuid_from_u16(0x111E);
    pub const HANDSFREE_AUDIO_GATEWAY: Uuid = bluetooth_uuid_from_u16(0x111F);
    pub const HUMAN_INTERFACE_DEVICE: Uuid = bluetooth_uuid_from_u16(0x1124);
    pub const SIM_ACCESS: Uuid = bluetooth_uuid_from_u16(0x112D);
    pub const PHONEBOOK_ACCESS_PSE: Uuid = bluetooth_uuid_from_u16(0x112F);
    pub const MESSAGE_ACCESS_SERVER: Uuid = bluetooth_uuid_from_u16(0x1132);
    pub const PNP_INFORMATION: Uuid = bluetooth_uuid_from_u16(0x1200);
}

/// Universal SDP attribute IDs
pub mod attributes {
    #![allow(missing_docs)]

    pub const SERVICE_RECORD_HANDLE: u16 = 0x0000;
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const SERVICE_RECORD_STATE: u16 = 0x0002;
    pub const SERVICE_ID: u16 = 0x0003;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
    pub const BROWSE_GROUP_LIST: u16 = 0x0005;
    pub const LANGUAGE_BASE_ATTRIBUTE_ID_LIST: u16 = 0x0006;
    pub const SERVICE_INFO_TIME_TO_LIVE: u16 = 0x0007;
    pub const SERVICE_AVAILABILITY: u16 = 0x0008;
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST: u16 = 0x0009;
    pub const DOCUMENTATION_URL: u16 = 0x000A;
    pub const CLIENT_EXECUTABLE_URL: u16 = 0x000B;
    pub const ICON_URL: u16 = 0x000C;
    pub const ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS: u16 = 0x000D;
    /// Offset from the language base (normally 0x0100)
    pub const SERVICE_NAME_OFFSET: u16 = 0x0000;
    pub const SERVICE_NAME: u16 = 0x0100;
}
