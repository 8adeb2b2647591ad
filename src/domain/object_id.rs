//! Object Identifier Generator
//!
//! Produces CDMI enterprise object identifiers (CDMI 1.0, section 5.11):
//!
//! ```text
//! byte  0..4   enterprise number (big-endian)
//! byte  4      reserved (0)
//! byte  5      length in bytes (24)
//! byte  6..8   CRC-16 over all 24 bytes with this field zeroed
//! byte  8..24  opaque part
//! ```
//!
//! The opaque part is the first 16 characters of a random UUID's canonical
//! string form, taken as raw character codes. Existing stores contain
//! identifiers shaped this way, so the layout is kept bit-for-bit even though
//! it carries less entropy than the UUID's binary value would.

use crate::error::{Error, Result};
use uuid::Uuid;

/// Default enterprise number stamped into generated identifiers
pub const DEFAULT_ENTERPRISE_NUMBER: u32 = 99999;

/// Identifier length in bytes
pub const OBJECT_ID_BYTES: usize = 24;

/// Identifier length as hex characters
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_BYTES * 2;

const CRC_POLYNOMIAL: u32 = 0x1021;
const OPAQUE_OFFSET: usize = 8;
const OPAQUE_LEN: usize = 16;

// =============================================================================
// Generator
// =============================================================================

/// Generates identifiers for a fixed enterprise number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIdGenerator {
    enterprise_number: u32,
}

impl ObjectIdGenerator {
    pub fn new(enterprise_number: u32) -> Self {
        Self { enterprise_number }
    }

    pub fn enterprise_number(&self) -> u32 {
        self.enterprise_number
    }

    /// Generate a fresh 48-character uppercase hex identifier
    pub fn generate(&self) -> String {
        let uuid = Uuid::new_v4().to_string();
        encode_hex(&self.generate_bytes(uuid.as_bytes()))
    }

    fn generate_bytes(&self, opaque_source: &[u8]) -> [u8; OBJECT_ID_BYTES] {
        let mut bytes = [0u8; OBJECT_ID_BYTES];
        bytes[0..4].copy_from_slice(&self.enterprise_number.to_be_bytes());
        bytes[4] = 0;
        bytes[5] = OBJECT_ID_BYTES as u8;

        for (slot, source) in bytes[OPAQUE_OFFSET..OPAQUE_OFFSET + OPAQUE_LEN]
            .iter_mut()
            .zip(opaque_source.iter())
        {
            *slot = *source;
        }

        let crc = crc16(&bytes);
        bytes[6..8].copy_from_slice(&crc.to_be_bytes());
        bytes
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ENTERPRISE_NUMBER)
    }
}

// =============================================================================
// Checksum
// =============================================================================

/// Bitwise CRC-16 (polynomial 0x1021, initial value 0) with message bits
/// shifted in at the low end of the register.
///
/// This is the register algorithm stored identifiers were stamped with. It
/// does not append augmentation zeros, so it differs from CRC-16/XMODEM
/// unless two zero bytes are appended to the input.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut value: u32 = 0;
    for &byte in bytes {
        let mut shifted = byte as u32;
        for _ in 0..8 {
            shifted <<= 1;
            let bit = (shifted >> 8) & 1;
            value = if value & 0x8000 != 0 {
                ((value << 1) + bit) ^ CRC_POLYNOMIAL
            } else {
                (value << 1) + bit
            };
            value &= 0xffff;
        }
    }
    value as u16
}

// =============================================================================
// Parsing / Validation
// =============================================================================

/// Decoded view of an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdParts {
    pub enterprise_number: u32,
    pub length: u8,
    pub checksum: u16,
    pub opaque: [u8; OPAQUE_LEN],
}

/// Decode a hex identifier into its fields
pub fn parse(object_id: &str) -> Result<ObjectIdParts> {
    let bytes = decode_hex(object_id)?;

    let mut opaque = [0u8; OPAQUE_LEN];
    opaque.copy_from_slice(&bytes[OPAQUE_OFFSET..]);

    Ok(ObjectIdParts {
        enterprise_number: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        length: bytes[5],
        checksum: u16::from_be_bytes([bytes[6], bytes[7]]),
        opaque,
    })
}

/// Check that an identifier is well formed and its checksum matches
pub fn verify(object_id: &str) -> bool {
    let mut bytes = match decode_hex(object_id) {
        Ok(b) => b,
        Err(_) => return false,
    };
    if bytes[4] != 0 || bytes[5] as usize != OBJECT_ID_BYTES {
        return false;
    }

    let stored = u16::from_be_bytes([bytes[6], bytes[7]]);
    bytes[6] = 0;
    bytes[7] = 0;
    crc16(&bytes) == stored
}

fn encode_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

fn decode_hex(object_id: &str) -> Result<[u8; OBJECT_ID_BYTES]> {
    if object_id.len() != OBJECT_ID_HEX_LEN {
        return Err(Error::Malformed(format!(
            "object id must be {} hex characters: {}",
            OBJECT_ID_HEX_LEN, object_id
        )));
    }

    let mut bytes = [0u8; OBJECT_ID_BYTES];
    hex::decode_to_slice(object_id, &mut bytes).map_err(|e| {
        Error::Malformed(format!("invalid hex in object id {}: {}", object_id, e))
    })?;
    Ok(bytes)
}
