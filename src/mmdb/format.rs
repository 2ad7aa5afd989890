//! MMDB Binary Format Parsing
//!
//! Locates the metadata section, decodes it with the data decoder and derives
//! the byte layout of the search tree and data section from it.
//!
//! ```text
//! ┌──────────────────────┐ 0
//! │ search tree          │ node_count * node_bytes
//! ├──────────────────────┤ tree_size
//! │ 16 zero bytes        │
//! ├──────────────────────┤ data_start
//! │ data section         │
//! ├──────────────────────┤ marker offset
//! │ \xAB\xCD\xEFMaxMind.com
//! │ metadata (one map)   │
//! └──────────────────────┘
//! ```

use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER};
use crate::decoder::Decoder;
use crate::error::MmdbError;
use crate::value::{Map, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// The marker must appear within this many bytes of the end of the file
const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Database metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size (24, 28, or 32 bits)
    pub record_size: RecordSize,
    /// IP version of the search tree
    pub ip_version: IpVersion,
    /// Free-form database type, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Major version of the binary format (2 for current files)
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Locale codes that records may carry names for
    pub languages: Vec<String>,
    /// Description by language code
    pub description: BTreeMap<String, String>,
}

impl Metadata {
    /// Build metadata from the decoded metadata map
    ///
    /// `node_count`, `record_size` and `ip_version` are required; descriptive
    /// fields default to empty values when absent.
    pub fn from_value(value: &Value) -> Result<Self, MmdbError> {
        let map = value
            .as_map()
            .ok_or_else(|| MmdbError::InvalidMetadata("metadata is not a map".to_string()))?;

        let node_count = required_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| {
            MmdbError::InvalidMetadata(format!("node_count {} does not fit 32 bits", node_count))
        })?;
        let record_size = RecordSize::from_bits(required_uint(map, "record_size")?)?;
        let ip_version = IpVersion::from_number(required_uint(map, "ip_version")?)?;

        let languages = match map.get("languages") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        MmdbError::InvalidMetadata("languages must be strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(MmdbError::InvalidMetadata(format!(
                    "languages is a {}, expected array",
                    other.type_name()
                )))
            }
            None => Vec::new(),
        };

        let description = match map.get("description") {
            Some(Value::Map(entries)) => entries
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_string(), s.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(Metadata {
            node_count,
            record_size,
            ip_version,
            database_type: map
                .get("database_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            binary_format_major_version: optional_u16(map, "binary_format_major_version")?,
            binary_format_minor_version: optional_u16(map, "binary_format_minor_version")?,
            build_epoch: optional_uint(map, "build_epoch"),
            languages,
            description,
        })
    }

    /// Size of the search tree in bytes
    pub fn tree_size(&self) -> usize {
        self.node_count as usize * self.record_size.node_bytes()
    }
}

/// Byte boundaries of the sections of an opened file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// End of the search tree
    pub tree_size: usize,
    /// First byte of the data section
    pub data_start: usize,
    /// One past the last byte of the data section (the marker offset)
    pub data_end: usize,
    /// First byte of the metadata map
    pub metadata_start: usize,
}

impl Layout {
    /// Compute section boundaries for a file
    pub fn compute(data: &[u8], metadata: &Metadata, marker_offset: usize) -> Result<Self, MmdbError> {
        let tree_size = metadata.tree_size();
        let data_start = tree_size + DATA_SECTION_SEPARATOR;
        if data_start > marker_offset {
            return Err(MmdbError::corrupt(format!(
                "search tree ({} bytes) and separator overlap the metadata at offset {}",
                tree_size, marker_offset
            )));
        }
        debug_assert!(marker_offset + METADATA_MARKER.len() <= data.len());

        Ok(Layout {
            tree_size,
            data_start,
            data_end: marker_offset,
            metadata_start: marker_offset + METADATA_MARKER.len(),
        })
    }
}

/// Decode the metadata map that follows the marker
pub fn read_metadata(data: &[u8]) -> Result<(Metadata, Layout), MmdbError> {
    let marker_offset = find_metadata_marker(data)?;
    let metadata_start = marker_offset + METADATA_MARKER.len();

    let value = Decoder::new(&data[metadata_start..])
        .decode(0)
        .map_err(|e| MmdbError::InvalidMetadata(format!("failed to decode metadata: {}", e)))?;
    let metadata = Metadata::from_value(&value)?;
    let layout = Layout::compute(data, &metadata, marker_offset)?;

    Ok((metadata, layout))
}

/// Find the metadata marker in an MMDB file (zero allocation)
///
/// The marker appears somewhere in the last 128KB of the file and the
/// metadata comes right after it. If the marker occurs more than once,
/// the last occurrence wins.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, MmdbError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);

    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(MmdbError::MetadataNotFound)
}

fn required_uint(map: &Map, key: &str) -> Result<u64, MmdbError> {
    match map.get(key) {
        Some(v) => v.as_u64().ok_or_else(|| {
            MmdbError::InvalidMetadata(format!(
                "field '{}' is a {}, expected unsigned integer",
                key,
                v.type_name()
            ))
        }),
        None => Err(MmdbError::InvalidMetadata(format!(
            "required field '{}' not found",
            key
        ))),
    }
}

fn optional_uint(map: &Map, key: &str) -> u64 {
    map.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn optional_u16(map: &Map, key: &str) -> Result<u16, MmdbError> {
    let n = optional_uint(map, key);
    u16::try_from(n)
        .map_err(|_| MmdbError::InvalidMetadata(format!("{} out of range: {}", key, n)))
}
