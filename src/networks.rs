//! Network enumeration
//!
//! [`Networks`] walks the search tree depth first, left before right, and
//! yields every stored network in ascending address order. The walk keeps
//! its own frame stack so it can stop after any item and resume on the next
//! call to `next`.
//!
//! IPv6 databases usually alias the IPv4 subtree under other prefixes
//! (IPv4-mapped, Teredo, 6to4), so the same IPv4 data shows up several
//! times. With [`NetworksOptions::skip_aliased_networks`] the cursor does
//! not descend into those prefixes. Whole-tree enumeration skips them unless
//! told otherwise; enumeration within a network walks them unless told
//! otherwise.

use crate::error::MmdbError;
use crate::mmdb::tree::{Record, IPV4_SUBTREE_DEPTH};
use crate::network::{prefix_mask, Network};
use crate::reader::Reader;
use crate::value::Value;
use std::iter::FusedIterator;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

/// Prefixes that IPv6 databases commonly point at the IPv4 subtree
pub fn default_aliased_networks() -> Vec<Network> {
    vec![
        // IPv4-mapped
        Network::from_bits(0xffff_0000_0000, 96, false),
        // Teredo
        Network::from_bits(u128::from(Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0)), 32, false),
        // 6to4
        Network::from_bits(u128::from(Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0)), 16, false),
    ]
}

/// Options for [`Reader::networks`] and [`Reader::networks_within`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworksOptions {
    /// Also yield networks that have no data
    pub include_empty_networks: bool,
    /// Do not descend into the prefixes in `aliased_networks`
    ///
    /// `None` skips them for [`Reader::networks`] and walks them for
    /// [`Reader::networks_within`].
    pub skip_aliased_networks: Option<bool>,
    /// Alias prefixes checked when `skip_aliased_networks` is set
    pub aliased_networks: Vec<Network>,
}

impl Default for NetworksOptions {
    fn default() -> Self {
        NetworksOptions {
            include_empty_networks: false,
            skip_aliased_networks: None,
            aliased_networks: default_aliased_networks(),
        }
    }
}

impl NetworksOptions {
    /// Default options: no empty networks, alias skipping per entry point
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether networks without data are yielded
    pub fn include_empty_networks(mut self, include: bool) -> Self {
        self.include_empty_networks = include;
        self
    }

    /// Set whether aliased prefixes are skipped
    pub fn skip_aliased_networks(mut self, skip: bool) -> Self {
        self.skip_aliased_networks = Some(skip);
        self
    }

    /// Replace the alias table
    pub fn aliased_networks(mut self, networks: Vec<Network>) -> Self {
        self.aliased_networks = networks;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    record: u32,
    ip: u128,
    depth: u8,
}

/// Cursor over the networks of a database
///
/// Structural errors end the cursor; check [`Networks::err`] after the loop.
#[derive(Debug)]
pub struct Networks<'r> {
    reader: &'r Reader,
    options: NetworksOptions,
    /// Address width of the tree
    width: u8,
    /// Whether alias prefixes are skipped
    skip_aliases: bool,
    /// Alias prefixes as `(bits, prefix_len)`, empty unless skipping
    aliases: Vec<(u128, u8)>,
    stack: Vec<Frame>,
    err: Option<MmdbError>,
}

impl<'r> Networks<'r> {
    /// Cursor starting at `record`, reached by `prefix_len` bits of `ip`
    pub(crate) fn new(
        reader: &'r Reader,
        options: NetworksOptions,
        record: u32,
        ip: u128,
        prefix_len: u8,
    ) -> Self {
        let mut networks = Self::empty(reader, options);
        networks.stack.push(Frame {
            record,
            ip: ip & prefix_mask(prefix_len, networks.width),
            depth: prefix_len,
        });
        networks
    }

    /// Cursor that yields nothing
    pub(crate) fn empty(reader: &'r Reader, options: NetworksOptions) -> Self {
        let width = reader.metadata().ip_version.bit_width();
        let skip_aliases = options.skip_aliased_networks.unwrap_or(false);
        let aliases = if skip_aliases && width == 128 {
            options
                .aliased_networks
                .iter()
                .filter(|n| !n.is_ipv4())
                .map(|n| (n.bits(), n.prefix_len()))
                .collect()
        } else {
            Vec::new()
        };

        Networks {
            reader,
            options,
            width,
            skip_aliases,
            aliases,
            stack: Vec::new(),
            err: None,
        }
    }

    /// Cursor that failed before yielding anything
    pub(crate) fn failed(reader: &'r Reader, options: NetworksOptions, err: MmdbError) -> Self {
        let mut networks = Self::empty(reader, options);
        networks.fail(err);
        networks
    }

    /// The error that ended the cursor, if any
    pub fn err(&self) -> Option<&MmdbError> {
        self.err.as_ref()
    }

    /// Take ownership of the error that ended the cursor
    pub fn take_err(&mut self) -> Option<MmdbError> {
        self.err.take()
    }

    fn fail(&mut self, err: MmdbError) {
        warn!(error = %err, "network enumeration stopped");
        self.stack.clear();
        self.err = Some(err);
    }

    fn is_aliased(&self, frame: &Frame) -> bool {
        self.aliases
            .iter()
            .any(|&(ip, depth)| frame.ip == ip && frame.depth == depth)
    }

    /// Network for a frame, showing the IPv4 subtree as IPv4
    fn present(&self, ip: u128, depth: u8) -> Network {
        if self.width == 128 && depth >= IPV4_SUBTREE_DEPTH {
            let high = ip >> 32;
            if high == 0xffff || (self.skip_aliases && high == 0) {
                return Network::from_bits(ip & 0xffff_ffff, depth - IPV4_SUBTREE_DEPTH, true);
            }
        }
        Network::from_bits(ip, depth, self.width == 32)
    }

    fn address(&self, ip: u128) -> IpAddr {
        if self.width == 32 {
            IpAddr::V4(Ipv4Addr::from(ip as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(ip))
        }
    }

    fn item(&self, frame: Frame, data_offset: Option<usize>) -> NetworkItem<'r> {
        NetworkItem {
            reader: self.reader,
            network: self.present(frame.ip, frame.depth),
            data_offset,
        }
    }

    fn step(&mut self) -> Result<Option<NetworkItem<'r>>, MmdbError> {
        let tree = self.reader.tree();

        while let Some(mut frame) = self.stack.pop() {
            loop {
                if self.is_aliased(&frame) {
                    break;
                }

                match self.reader.resolve(frame.record)? {
                    Record::Empty => {
                        if self.options.include_empty_networks {
                            return Ok(Some(self.item(frame, None)));
                        }
                        break;
                    }
                    Record::Data(offset) => return Ok(Some(self.item(frame, Some(offset)))),
                    Record::Node(node) => {
                        if frame.depth >= self.width {
                            return Err(MmdbError::InvalidSearchTree {
                                ip: self.address(frame.ip),
                                prefix_len: frame.depth,
                            });
                        }

                        let depth = frame.depth + 1;
                        self.stack.push(Frame {
                            record: tree.read_record(node, 1)?,
                            ip: frame.ip | 1u128 << (self.width - depth),
                            depth,
                        });
                        frame = Frame {
                            record: tree.read_record(node, 0)?,
                            ip: frame.ip,
                            depth,
                        };
                    }
                }
            }
        }

        Ok(None)
    }
}

impl<'r> Iterator for Networks<'r> {
    type Item = NetworkItem<'r>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.err.is_some() {
            return None;
        }
        match self.step() {
            Ok(item) => item,
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }
}

impl FusedIterator for Networks<'_> {}

/// One network yielded by [`Networks`]
#[derive(Debug, Clone, Copy)]
pub struct NetworkItem<'r> {
    reader: &'r Reader,
    network: Network,
    data_offset: Option<usize>,
}

impl NetworkItem<'_> {
    /// The network
    pub fn network(&self) -> Network {
        self.network
    }

    /// Data-section offset, `None` for networks without data
    pub fn data_offset(&self) -> Option<usize> {
        self.data_offset
    }

    /// Decode the record for this network
    pub fn decode(&self) -> Result<Option<Value>, MmdbError> {
        self.data_offset
            .map(|offset| self.reader.decode(offset))
            .transpose()
    }
}
