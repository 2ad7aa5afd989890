//! MMDB Search Tree Traversal
//!
//! The tree is a flat array of nodes. Each node holds two records, left for
//! a zero bit and right for a one bit. A record either names another node,
//! marks "not found" (`node_count`), or points into the data section.

use super::types::{RecordSize, DATA_SECTION_SEPARATOR};
use crate::error::MmdbError;

/// Depth of the IPv4 subtree inside an IPv6 tree (`::/96`)
pub const IPV4_SUBTREE_DEPTH: u8 = 96;

/// What a record value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Index of another node
    Node(u32),
    /// No data for this network
    Empty,
    /// Offset into the data section
    Data(usize),
}

/// Read-only view of the search tree section
#[derive(Debug, Clone, Copy)]
pub struct SearchTree<'a> {
    tree: &'a [u8],
    node_count: u32,
    record_size: RecordSize,
}

impl<'a> SearchTree<'a> {
    /// Create a view over `tree`, which must hold exactly the tree bytes
    pub fn new(tree: &'a [u8], node_count: u32, record_size: RecordSize) -> Self {
        Self {
            tree,
            node_count,
            record_size,
        }
    }

    /// Number of nodes
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Read a record from a node
    ///
    /// `side` 0 is the left record (bit 0), 1 the right record (bit 1).
    pub fn read_record(&self, node: u32, side: u8) -> Result<u32, MmdbError> {
        if node >= self.node_count {
            return Err(MmdbError::corrupt(format!(
                "node index {} exceeds node count {}",
                node, self.node_count
            )));
        }

        let node_bytes = self.record_size.node_bytes();
        let offset = node as usize * node_bytes;
        let bytes = self.tree.get(offset..offset + node_bytes).ok_or_else(|| {
            MmdbError::corrupt(format!(
                "node {} at offset {} exceeds tree size {}",
                node,
                offset,
                self.tree.len()
            ))
        })?;

        Ok(match self.record_size {
            RecordSize::Bits24 => read_24bit_record(bytes, side),
            RecordSize::Bits28 => read_28bit_record(bytes, side),
            RecordSize::Bits32 => read_32bit_record(bytes, side),
        })
    }

    /// Interpret a record value
    ///
    /// Data records carry the separator size; a value that lands inside the
    /// separator is corrupt.
    pub fn classify(&self, record: u32) -> Result<Record, MmdbError> {
        if record < self.node_count {
            return Ok(Record::Node(record));
        }
        if record == self.node_count {
            return Ok(Record::Empty);
        }

        let past_nodes = (record - self.node_count) as usize;
        past_nodes
            .checked_sub(DATA_SECTION_SEPARATOR)
            .map(Record::Data)
            .ok_or_else(|| {
                MmdbError::corrupt(format!(
                    "record {} points into the data section separator",
                    record
                ))
            })
    }

    /// Follow `bit_count` bits of `bits` (a `width`-bit address) from `start`
    ///
    /// Stops early on any record that is not a node. Returns the last record
    /// value reached and the number of bits consumed.
    pub fn walk(
        &self,
        start: u32,
        bits: u128,
        width: u8,
        bit_count: u8,
    ) -> Result<(u32, u8), MmdbError> {
        debug_assert!(bit_count <= width);
        let mut node = start;
        let mut depth = 0u8;

        while depth < bit_count && node < self.node_count {
            let bit = ((bits >> (width - 1 - depth)) & 1) as u8;
            node = self.read_record(node, bit)?;
            depth += 1;
        }

        Ok((node, depth))
    }

    /// Find the node where IPv4 addresses begin in an IPv6 tree
    ///
    /// Follows up to 96 left records. If a non-node record is met first,
    /// that record is returned and every IPv4 lookup ends there.
    pub fn ipv4_start(&self) -> Result<u32, MmdbError> {
        let (node, _) = self.walk(0, 0, 128, IPV4_SUBTREE_DEPTH)?;
        Ok(node)
    }
}

/// Read a 24-bit record (3 bytes per record, 6 bytes per node)
fn read_24bit_record(node: &[u8], side: u8) -> u32 {
    let offset = side as usize * 3;
    let b = &node[offset..offset + 3];
    (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
}

/// Read a 28-bit record (3.5 bytes per record, 7 bytes per node)
///
/// Layout: [Left 24 bits][Middle 8 bits][Right 24 bits]
/// Middle byte contains 4 high bits of left + 4 high bits of right
fn read_28bit_record(node: &[u8], side: u8) -> u32 {
    let (high_bits, low) = if side == 0 {
        (u32::from(node[3] >> 4), &node[0..3])
    } else {
        (u32::from(node[3] & 0x0F), &node[4..7])
    };
    (high_bits << 24) | (u32::from(low[0]) << 16) | (u32::from(low[1]) << 8) | u32::from(low[2])
}

/// Read a 32-bit record (4 bytes per record, 8 bytes per node)
fn read_32bit_record(node: &[u8], side: u8) -> u32 {
    let offset = side as usize * 4;
    let b = &node[offset..offset + 4];
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}
