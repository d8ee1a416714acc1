//! SDP data elements, the encoding of service attribute values.
//!
//! Each element starts with a header byte holding the type in its top five bits and a size index in the bottom
//! three. Size indices 0 to 4 give a fixed size of 1, 2, 4, 8 or 16 bytes. Indices 5, 6 and 7 mean a one, two or
//! four byte length follows the header.

use uuid::Uuid;

use crate::btuuid::BluetoothUuidExt;

/// A decoded SDP data element
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DataElement {
    /// The nil element
    Nil,
    /// An unsigned integer of up to 16 bytes
    Uint(u128),
    /// A two's complement integer of up to 16 bytes
    Int(i128),
    /// A 16, 32 or 128-bit UUID
    Uuid(Uuid),
    /// A text string, in whatever encoding the record uses
    Text(Vec<u8>),
    /// A boolean
    Bool(bool),
    /// A data element sequence
    Sequence(Vec<DataElement>),
    /// A data element alternative
    Alternative(Vec<DataElement>),
    /// A URL
    Url(Vec<u8>),
}

impl DataElement {
    /// Decodes a single element that spans all of `bytes`.
    ///
    /// Returns `None` if the bytes are not a well-formed element or if anything follows it.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match Self::decode_prefix(bytes)? {
            (element, []) => Some(element),
            _ => None,
        }
    }

    /// Decodes the element at the start of `bytes` and returns it with the bytes that follow.
    pub fn decode_prefix(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (&header, rest) = bytes.split_first()?;
        let kind = header >> 3;
        let (len, rest) = match header & 0x07 {
            // Nil is the only type whose size index 0 means no data.
            0 if kind == 0 => (0, rest),
            index @ 0..=4 => (1 << index, rest),
            5 => (*rest.first()? as usize, &rest[1..]),
            6 => (u16::from_be_bytes(rest.get(..2)?.try_into().ok()?) as usize, &rest[2..]),
            _ => (u32::from_be_bytes(rest.get(..4)?.try_into().ok()?) as usize, &rest[4..]),
        };
        if rest.len() < len {
            return None;
        }
        let (data, rest) = rest.split_at(len);

        let element = match kind {
            0 => DataElement::Nil,
            1 if len <= 16 => DataElement::Uint(data.iter().fold(0, |acc, &b| (acc << 8) | b as u128)),
            2 if len <= 16 => DataElement::Int(sign_extend(data)),
            3 => DataElement::Uuid(Uuid::from_sdp_bytes(data)?),
            4 => DataElement::Text(data.to_vec()),
            5 if len == 1 => DataElement::Bool(data[0] != 0),
            6 => DataElement::Sequence(decode_all(data)?),
            7 => DataElement::Alternative(decode_all(data)?),
            8 => DataElement::Url(data.to_vec()),
            _ => return None,
        };
        Some((element, rest))
    }

    /// The value of an unsigned integer element
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            DataElement::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// The value of a UUID element
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            DataElement::Uuid(uuid) => Some(*uuid),
            _ => None,
        }
    }

    /// The members of a sequence or alternative element
    pub fn as_list(&self) -> Option<&[DataElement]> {
        match self {
            DataElement::Sequence(items) | DataElement::Alternative(items) => Some(items),
            _ => None,
        }
    }
}

fn decode_all(mut bytes: &[u8]) -> Option<Vec<DataElement>> {
    let mut items = Vec::new();
    while !bytes.is_empty() {
        let (item, rest) = DataElement::decode_prefix(bytes)?;
        items.push(item);
        bytes = rest;
    }
    Some(items)
}

fn sign_extend(data: &[u8]) -> i128 {
    let negative = data.first().is_some_and(|&b| b & 0x80 != 0);
    let mut buf = if negative { [0xff; 16] } else { [0; 16] };
    buf[16 - data.len()..].copy_from_slice(data);
    i128::from_be_bytes(buf)
}
