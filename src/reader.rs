//! Database reader
//!
//! `Reader` owns the file bytes (memory-mapped or in a `Vec`) and the parsed
//! metadata. Lookups, enumeration cursors and the data-section cursor all
//! borrow it.

use crate::decoder::Decoder;
use crate::error::{MmdbError, Result};
use crate::mmdb::format::{read_metadata, Layout, Metadata};
use crate::mmdb::tree::{Record, SearchTree};
use crate::mmdb::types::IpVersion;
use crate::network::{address_bits, Network};
use crate::networks::{Networks, NetworksOptions};
use crate::value::Value;
use memmap2::Mmap;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, trace};

/// Storage for database bytes - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// Result of resolving an address in the search tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupResult {
    /// Offset into the data section
    pub data_offset: usize,
    /// Number of address bits consumed to reach the record
    ///
    /// For IPv4 addresses this counts only IPv4 bits, also in IPv6 trees.
    pub prefix_len: u8,
    /// The stored network containing the address
    pub network: Network,
}

/// A read-only MaxMind DB
pub struct Reader {
    storage: Storage,
    metadata: Metadata,
    layout: Layout,
    /// Record reached by the `::/96` prefix; 0 for IPv4 trees
    ipv4_start: u32,
}

impl Reader {
    /// Open a database file using memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: the map is read-only; callers must not truncate the file
        // while the reader is alive.
        let mmap = unsafe { Mmap::map(&file) }?;

        debug!(path = %path.display(), size = mmap.len(), "mapped database");
        Self::from_storage(Storage::Mmap(mmap))
    }

    /// Create a reader over bytes already in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(Storage::Owned(data))
    }

    fn from_storage(storage: Storage) -> Result<Self> {
        let (metadata, layout) = read_metadata(storage.as_slice())?;

        let mut reader = Reader {
            storage,
            metadata,
            layout,
            ipv4_start: 0,
        };
        if reader.metadata.ip_version == IpVersion::V6 {
            reader.ipv4_start = reader.tree().ipv4_start()?;
        }

        debug!(
            node_count = reader.metadata.node_count,
            record_size = reader.metadata.record_size.bits(),
            ip_version = reader.metadata.ip_version.number(),
            database_type = %reader.metadata.database_type,
            data_section_size = layout.data_end - layout.data_start,
            "opened database"
        );
        Ok(reader)
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Section boundaries of the underlying file
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Find the data offset for `ip`
    ///
    /// Returns `Ok(None)` when the tree holds no data for the address.
    /// IPv6 addresses on an IPv4 database are accepted only when they are
    /// IPv4-mapped.
    pub fn lookup_offset(&self, ip: IpAddr) -> Result<Option<LookupResult>> {
        let (ipv4, start) = match (ip, self.metadata.ip_version) {
            (IpAddr::V4(v4), IpVersion::V4) => (v4, 0),
            (IpAddr::V4(v4), IpVersion::V6) => (v4, self.ipv4_start),
            (IpAddr::V6(v6), IpVersion::V6) => return self.lookup_bits(u128::from(v6), 128, 0),
            (IpAddr::V6(v6), IpVersion::V4) => match v6.to_ipv4_mapped() {
                Some(v4) => (v4, 0),
                None => {
                    return Err(MmdbError::IpVersionMismatch(format!(
                        "cannot look up IPv6 address {} in an IPv4-only database",
                        v6
                    )))
                }
            },
        };
        self.lookup_bits(u128::from(u32::from(ipv4)), 32, start)
    }

    fn lookup_bits(&self, bits: u128, width: u8, start: u32) -> Result<Option<LookupResult>> {
        let (record, prefix_len) = self.tree().walk(start, bits, width, width)?;
        trace!(record, prefix_len, "search tree walk finished");

        match self.resolve(record)? {
            Record::Empty => Ok(None),
            Record::Data(data_offset) => Ok(Some(LookupResult {
                data_offset,
                prefix_len,
                network: Network::from_bits(bits, prefix_len, width == 32),
            })),
            Record::Node(_) => Err(MmdbError::corrupt("invalid node in search tree")),
        }
    }

    /// Look up `ip` and decode its record
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<Value>> {
        match self.lookup_offset(ip)? {
            Some(result) => self.decode(result.data_offset).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the value at a data-section offset
    pub fn decode(&self, offset: usize) -> Result<Value> {
        self.decoder().decode(offset)
    }

    /// Enumerate every network in the database
    ///
    /// Aliased prefixes are skipped unless `options` says otherwise, so each
    /// IPv4 network of an IPv6 tree is yielded once.
    pub fn networks(&self, mut options: NetworksOptions) -> Networks<'_> {
        options.skip_aliased_networks.get_or_insert(true);
        let all = match self.metadata.ip_version {
            IpVersion::V4 => Network::ipv4_all(),
            IpVersion::V6 => Network::ipv6_all(),
        };
        self.networks_within(all, options)
    }

    /// Enumerate the networks inside `network`
    ///
    /// Aliased prefixes are walked unless `options` says otherwise. An IPv6
    /// network that cannot exist in an IPv4 database gives an empty cursor.
    pub fn networks_within(&self, network: Network, options: NetworksOptions) -> Networks<'_> {
        let width = self.metadata.ip_version.bit_width();
        let (bits, prefix_len) = match (network.addr(), self.metadata.ip_version) {
            (IpAddr::V4(v4), IpVersion::V6) => {
                let mapped = if options.skip_aliased_networks == Some(true) {
                    v4.to_ipv6_compatible()
                } else {
                    v4.to_ipv6_mapped()
                };
                (u128::from(mapped), network.prefix_len() + 96)
            }
            (IpAddr::V6(v6), IpVersion::V4) => match v6.to_ipv4_mapped() {
                Some(v4) if network.prefix_len() >= 96 => {
                    (u128::from(u32::from(v4)), network.prefix_len() - 96)
                }
                _ => return Networks::empty(self, options),
            },
            (addr, _) => (address_bits(&addr), network.prefix_len()),
        };

        match self.tree().walk(0, bits, width, prefix_len) {
            Ok((record, _)) => Networks::new(self, options, record, bits, prefix_len),
            Err(e) => Networks::failed(self, options, e),
        }
    }

    /// Sequential cursor over the top-level values of the data section
    pub fn data_section(&self) -> DataSection<'_> {
        DataSection {
            decoder: self.decoder(),
            offset: 0,
            err: None,
        }
    }

    /// Check the structure of the whole database
    ///
    /// Verifies the metadata, the all-zero separator, that every tree path
    /// ends within the address width, and that the data records the tree
    /// points to are exactly the top-level values of the data section.
    pub fn verify(&self) -> Result<()> {
        self.verify_metadata()?;

        let mut offsets = FxHashSet::default();
        // Walk the aliases too so every tree path is checked
        let mut networks = self.networks(NetworksOptions::new().skip_aliased_networks(false));
        for item in networks.by_ref() {
            if let Some(offset) = item.data_offset() {
                offsets.insert(offset);
            }
        }
        if let Some(err) = networks.take_err() {
            return Err(err);
        }
        let pointed_to = offsets.len();

        let buffer = self.buffer();
        if buffer[self.layout.tree_size..self.layout.data_start]
            .iter()
            .any(|b| *b != 0)
        {
            return Err(MmdbError::corrupt(
                "unexpected bytes in data separator; expected 16 zero bytes",
            ));
        }

        let mut values = self.data_section();
        for (offset, _) in values.by_ref() {
            if !offsets.remove(&offset) {
                return Err(MmdbError::corrupt(format!(
                    "found data at offset {} that the search tree does not point to",
                    offset
                )));
            }
        }
        if let Some(err) = values.take_err() {
            return Err(err);
        }
        if !offsets.is_empty() {
            return Err(MmdbError::corrupt(format!(
                "found {} pointers (of {}) in the search tree that are not in the data section",
                offsets.len(),
                pointed_to
            )));
        }

        debug!(records = pointed_to, "database verified");
        Ok(())
    }

    fn verify_metadata(&self) -> Result<()> {
        let m = &self.metadata;
        if m.binary_format_major_version != 2 {
            return Err(MmdbError::InvalidMetadata(format!(
                "binary_format_major_version: expected 2, got {}",
                m.binary_format_major_version
            )));
        }
        if m.binary_format_minor_version != 0 {
            return Err(MmdbError::InvalidMetadata(format!(
                "binary_format_minor_version: expected 0, got {}",
                m.binary_format_minor_version
            )));
        }
        if m.database_type.is_empty() {
            return Err(MmdbError::InvalidMetadata(
                "database_type is empty".to_string(),
            ));
        }
        if m.description.is_empty() {
            return Err(MmdbError::InvalidMetadata(
                "description is empty".to_string(),
            ));
        }
        if m.node_count == 0 {
            return Err(MmdbError::InvalidMetadata("node_count is 0".to_string()));
        }
        Ok(())
    }

    /// Interpret a record, checking data offsets against the data section
    pub(crate) fn resolve(&self, record: u32) -> Result<Record> {
        let resolved = self.tree().classify(record)?;
        if let Record::Data(offset) = resolved {
            let size = self.layout.data_end - self.layout.data_start;
            if offset >= size {
                return Err(MmdbError::corrupt(format!(
                    "data offset {} is beyond the data section ({} bytes)",
                    offset, size
                )));
            }
        }
        Ok(resolved)
    }

    pub(crate) fn tree(&self) -> SearchTree<'_> {
        SearchTree::new(
            &self.buffer()[..self.layout.tree_size],
            self.metadata.node_count,
            self.metadata.record_size,
        )
    }

    pub(crate) fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.buffer()[self.layout.data_start..self.layout.data_end])
    }

    fn buffer(&self) -> &[u8] {
        self.storage.as_slice()
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("metadata", &self.metadata)
            .field("layout", &self.layout)
            .field("mmap", &matches!(self.storage, Storage::Mmap(_)))
            .finish()
    }
}

/// Cursor over the top-level values of the data section, in file order
///
/// Yields `(offset, value)` pairs. Decoding stops at the first error, which
/// is then available from [`DataSection::err`].
#[derive(Debug)]
pub struct DataSection<'r> {
    decoder: Decoder<'r>,
    offset: usize,
    err: Option<MmdbError>,
}

impl DataSection<'_> {
    /// The error that ended the cursor, if any
    pub fn err(&self) -> Option<&MmdbError> {
        self.err.as_ref()
    }

    /// Take ownership of the error that ended the cursor
    pub fn take_err(&mut self) -> Option<MmdbError> {
        self.err.take()
    }
}

impl Iterator for DataSection<'_> {
    type Item = (usize, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.err.is_some() || self.offset >= self.decoder.len() {
            return None;
        }

        match self.decoder.decode_at(self.offset) {
            Ok((value, next)) => {
                let offset = self.offset;
                self.offset = next;
                Some((offset, value))
            }
            Err(e) => {
                self.offset = self.decoder.len();
                self.err = Some(e);
                None
            }
        }
    }
}
