//! MMDB-specific Type Definitions

use crate::error::MmdbError;
use serde::Serialize;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Size of the all-zero separator between the search tree and data section
pub const DATA_SECTION_SEPARATOR: usize = 16;

/// IP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 (may include IPv4 at ::/96)
    V6,
}

impl IpVersion {
    /// Address width in bits: 32 or 128
    pub fn bit_width(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Create from the `ip_version` metadata field
    pub fn from_number(n: u64) -> Result<Self, MmdbError> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(MmdbError::InvalidMetadata(format!(
                "invalid IP version: {}",
                n
            ))),
        }
    }

    /// The number stored in metadata
    pub fn number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl From<IpVersion> for u16 {
    fn from(version: IpVersion) -> u16 {
        version.number()
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u16")]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Number of bits per record
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Create from bit size
    pub fn from_bits(bits: u64) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidMetadata(format!(
                "unsupported record size: {} bits",
                bits
            ))),
        }
    }
}

impl From<RecordSize> for u16 {
    fn from(size: RecordSize) -> u16 {
        size.bits()
    }
}
