//! Test-only MMDB writer
//!
//! Builds small databases in memory: a search tree (with optional alias
//! records), a data section with pointer-deduplicated strings, and the
//! metadata map. The fixtures mirror the standard MaxMind test databases.
#![allow(dead_code)]

use mmdbscan::{Map, Network, Value};
use std::collections::HashMap;
use std::net::IpAddr;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";
pub const RECORD_SIZES: [u16; 3] = [24, 28, 32];

/// A child slot while building the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Node(u32),
    Data(u32),
}

/// Arena-allocated search tree builder
pub struct TreeWriter {
    width: u8,
    nodes: Vec<[Slot; 2]>,
}

impl TreeWriter {
    pub fn new(ip_version: u16) -> Self {
        let width = if ip_version == 4 { 32 } else { 128 };
        TreeWriter {
            width,
            nodes: vec![[Slot::Empty; 2]],
        }
    }

    /// Tree position of a network; IPv4 networks go under `::/96` in IPv6 trees
    fn position(&self, network: &str) -> (u128, u8) {
        let network: Network = network.parse().expect("fixture network");
        let bits = match network.addr() {
            IpAddr::V4(v4) => u128::from(u32::from(v4)),
            IpAddr::V6(v6) => u128::from(v6),
        };
        match (network.addr(), self.width) {
            (IpAddr::V4(_), 128) => (bits, network.prefix_len() + 96),
            (IpAddr::V6(_), 32) => panic!("IPv6 network in IPv4 tree"),
            _ => (bits, network.prefix_len()),
        }
    }

    fn bit(&self, bits: u128, depth: u8) -> usize {
        ((bits >> (self.width - 1 - depth)) & 1) as usize
    }

    fn allocate(&mut self) -> u32 {
        self.nodes.push([Slot::Empty; 2]);
        (self.nodes.len() - 1) as u32
    }

    /// Set the slot reached by the full prefix of `network`
    pub fn set(&mut self, network: &str, slot: Slot) {
        let (bits, prefix_len) = self.position(network);
        assert!(prefix_len > 0, "cannot replace the root");

        let mut node = 0u32;
        for depth in 0..prefix_len - 1 {
            let side = self.bit(bits, depth);
            node = match self.nodes[node as usize][side] {
                Slot::Node(next) => next,
                Slot::Empty => {
                    let next = self.allocate();
                    self.nodes[node as usize][side] = Slot::Node(next);
                    next
                }
                Slot::Data(_) => panic!("{} is inside an existing record", network),
            };
        }
        let side = self.bit(bits, prefix_len - 1);
        self.nodes[node as usize][side] = slot;
    }

    pub fn insert(&mut self, network: &str, data_offset: u32) {
        self.set(network, Slot::Data(data_offset));
    }

    /// Node at the end of an existing path
    pub fn node_at(&self, network: &str) -> u32 {
        let (bits, prefix_len) = self.position(network);
        let mut node = 0u32;
        for depth in 0..prefix_len {
            match self.nodes[node as usize][self.bit(bits, depth)] {
                Slot::Node(next) => node = next,
                other => panic!("no node at {} (found {:?})", network, other),
            }
        }
        node
    }

    /// Point `network` at the node that holds `target`
    pub fn alias(&mut self, network: &str, target: &str) {
        let node = self.node_at(target);
        self.set(network, Slot::Node(node));
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn build(&self, record_size: u16) -> Vec<u8> {
        let node_count = self.node_count();
        let value = |slot: Slot| match slot {
            Slot::Empty => node_count,
            Slot::Node(id) => id,
            Slot::Data(offset) => node_count + 16 + offset,
        };

        let mut out = Vec::new();
        for [left, right] in &self.nodes {
            let (l, r) = (value(*left), value(*right));
            match record_size {
                24 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                28 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.push((((l >> 24) & 0x0F) << 4 | ((r >> 24) & 0x0F)) as u8);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                32 => {
                    out.extend_from_slice(&l.to_be_bytes());
                    out.extend_from_slice(&r.to_be_bytes());
                }
                _ => panic!("unsupported record size {}", record_size),
            }
        }
        out
    }
}

/// Data section encoder
///
/// Strings longer than three bytes that were written before are replaced by
/// pointers to the first copy.
#[derive(Default)]
pub struct DataWriter {
    buf: Vec<u8>,
    strings: HashMap<String, usize>,
    dedup: bool,
}

impl DataWriter {
    pub fn new() -> Self {
        DataWriter {
            dedup: true,
            ..Default::default()
        }
    }

    pub fn without_pointers() -> Self {
        DataWriter::default()
    }

    /// Append a top-level record and return its offset
    pub fn write(&mut self, value: &Value) -> u32 {
        let offset = self.buf.len() as u32;
        self.encode(value);
        offset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn encode(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.encode_string(s),
            Value::Double(d) => {
                self.control(3, 8);
                self.buf.extend_from_slice(&d.to_be_bytes());
            }
            Value::Bytes(b) => {
                self.control(4, b.len());
                self.buf.extend_from_slice(b);
            }
            Value::Uint16(n) => self.encode_uint(5, u128::from(*n)),
            Value::Uint32(n) => self.encode_uint(6, u128::from(*n)),
            Value::Map(map) => self.encode_map(map),
            Value::Int32(n) => self.encode_uint(8, u128::from(*n as u32)),
            Value::Uint64(n) => self.encode_uint(9, u128::from(*n)),
            Value::Uint128(n) => self.encode_uint(10, *n),
            Value::Array(items) => {
                self.control(11, items.len());
                for item in items {
                    self.encode(item);
                }
            }
            Value::Bool(b) => self.control(14, usize::from(*b)),
            Value::Float(f) => {
                self.control(15, 4);
                self.buf.extend_from_slice(&f.to_be_bytes());
            }
        }
    }

    fn encode_map(&mut self, map: &Map) {
        self.control(7, map.len());
        for (key, value) in map.iter() {
            self.encode_string(key);
            self.encode(value);
        }
    }

    fn encode_string(&mut self, s: &str) {
        if self.dedup && s.len() > 3 {
            if let Some(&target) = self.strings.get(s) {
                self.pointer(target);
                return;
            }
            self.strings.insert(s.to_string(), self.buf.len());
        }
        self.control(2, s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn encode_uint(&mut self, type_id: u8, n: u128) {
        let bytes = n.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        self.control(type_id, 16 - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    pub fn pointer(&mut self, target: usize) {
        let t = target as u32;
        if target < 2048 {
            self.buf.push(0x20 | ((t >> 8) & 0x07) as u8);
            self.buf.push(t as u8);
        } else if target < 526_336 {
            let v = t - 2048;
            self.buf.push(0x28 | ((v >> 16) & 0x07) as u8);
            self.buf.extend_from_slice(&v.to_be_bytes()[2..]);
        } else if target < 134_744_064 {
            let v = t - 526_336;
            self.buf.push(0x30 | ((v >> 24) & 0x07) as u8);
            self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
        } else {
            self.buf.push(0x38);
            self.buf.extend_from_slice(&t.to_be_bytes());
        }
    }

    fn control(&mut self, type_id: u8, size: usize) {
        let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
            (size as u8, Vec::new())
        } else if size < 285 {
            (29, vec![(size - 29) as u8])
        } else if size < 65_821 {
            (30, ((size - 285) as u16).to_be_bytes().to_vec())
        } else {
            (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
        };

        if type_id <= 7 {
            self.buf.push((type_id << 5) | size_bits);
        } else {
            self.buf.push(size_bits);
            self.buf.push(type_id - 7);
        }
        self.buf.extend_from_slice(&extra);
    }
}

/// Everything needed to assemble a file
pub struct DatabaseSpec<'a> {
    pub tree: &'a TreeWriter,
    pub data: &'a [u8],
    pub record_size: u16,
    pub ip_version: u16,
    pub database_type: &'a str,
}

pub fn metadata_value(spec: &DatabaseSpec<'_>, node_count: u32) -> Value {
    let mut description = Map::new();
    description.insert("en", string("Test Database"));
    description.insert("zh", string("Test Database Chinese"));

    let mut map = Map::new();
    map.insert("binary_format_major_version", Value::Uint16(2));
    map.insert("binary_format_minor_version", Value::Uint16(0));
    map.insert("build_epoch", Value::Uint64(1_700_000_000));
    map.insert("database_type", string(spec.database_type));
    map.insert("description", Value::Map(description));
    map.insert("ip_version", Value::Uint16(spec.ip_version));
    map.insert(
        "languages",
        Value::Array(vec![string("en"), string("zh")]),
    );
    map.insert("node_count", Value::Uint32(node_count));
    map.insert("record_size", Value::Uint16(spec.record_size));
    Value::Map(map)
}

pub fn assemble(spec: &DatabaseSpec<'_>) -> Vec<u8> {
    let mut out = spec.tree.build(spec.record_size);
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(spec.data);
    out.extend_from_slice(METADATA_MARKER);

    let mut metadata = DataWriter::without_pointers();
    metadata.write(&metadata_value(spec, spec.tree.node_count()));
    out.extend_from_slice(metadata.bytes());
    out
}

pub fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

/// `{"ip": <ip>}`
pub fn ip_record(ip: &str) -> Value {
    let mut map = Map::new();
    map.insert("ip", string(ip));
    Value::Map(map)
}

pub const IPV4_NETWORKS: [&str; 6] = [
    "1.1.1.1/32",
    "1.1.1.2/31",
    "1.1.1.4/30",
    "1.1.1.8/29",
    "1.1.1.16/28",
    "1.1.1.32/32",
];

pub const IPV6_NETWORKS: [&str; 5] = [
    "::1:ffff:ffff/128",
    "::2:0:0/122",
    "::2:0:40/124",
    "::2:0:50/125",
    "::2:0:58/127",
];

fn insert_networks(tree: &mut TreeWriter, data: &mut DataWriter, networks: &[&str]) {
    for network in networks {
        let ip = network.split('/').next().expect("network address");
        let offset = data.write(&ip_record(ip));
        tree.insert(network, offset);
    }
}

/// The "ipv4" test database
pub fn ipv4_db(record_size: u16) -> Vec<u8> {
    let mut tree = TreeWriter::new(4);
    let mut data = DataWriter::new();
    insert_networks(&mut tree, &mut data, &IPV4_NETWORKS);
    assemble(&DatabaseSpec {
        tree: &tree,
        data: data.bytes(),
        record_size,
        ip_version: 4,
        database_type: "Test",
    })
}

/// The "ipv6" test database: IPv6 networks only
pub fn ipv6_db(record_size: u16) -> Vec<u8> {
    let mut tree = TreeWriter::new(6);
    let mut data = DataWriter::new();
    insert_networks(&mut tree, &mut data, &IPV6_NETWORKS);
    assemble(&DatabaseSpec {
        tree: &tree,
        data: data.bytes(),
        record_size,
        ip_version: 6,
        database_type: "Test",
    })
}

/// The "mixed" test database: IPv4 under `::/96`, IPv6 networks, and the
/// IPv4-mapped, Teredo and 6to4 prefixes aliased to the IPv4 subtree
pub fn mixed_db(record_size: u16) -> Vec<u8> {
    let mut tree = TreeWriter::new(6);
    let mut data = DataWriter::new();
    insert_networks(&mut tree, &mut data, &IPV4_NETWORKS);
    insert_networks(&mut tree, &mut data, &IPV6_NETWORKS);
    for alias in ["::ffff:0:0/96", "2001::/32", "2002::/16"] {
        tree.alias(alias, "::/96");
    }
    assemble(&DatabaseSpec {
        tree: &tree,
        data: data.bytes(),
        record_size,
        ip_version: 6,
        database_type: "Test",
    })
}

/// IPv4 database whose `128.128.128.128/32` record points back at the root
pub fn broken_search_tree_db() -> Vec<u8> {
    let mut tree = TreeWriter::new(4);
    let mut data = DataWriter::new();
    insert_networks(&mut tree, &mut data, &["1.1.1.1/32", "200.0.0.0/8"]);
    tree.set("128.128.128.128/32", Slot::Node(0));
    assemble(&DatabaseSpec {
        tree: &tree,
        data: data.bytes(),
        record_size: 24,
        ip_version: 4,
        database_type: "Test",
    })
}

/// Record with every type at its zero value
pub fn empty_record() -> Value {
    let mut map = Map::new();
    map.insert("array", Value::Array(vec![]));
    map.insert("boolean", Value::Bool(false));
    map.insert("bytes", Value::Bytes(vec![]));
    map.insert("double", Value::Double(0.0));
    map.insert("float", Value::Float(0.0));
    map.insert("int32", Value::Int32(0));
    map.insert("map", Value::Map(Map::new()));
    map.insert("uint128", Value::Uint128(0));
    map.insert("uint16", Value::Uint16(0));
    map.insert("uint32", Value::Uint32(0));
    map.insert("uint64", Value::Uint64(0));
    map.insert("utf8_string", string(""));
    Value::Map(map)
}

/// Record with typical non-zero values and nested containers
pub fn populated_record() -> Value {
    let mut inner = Map::new();
    inner.insert(
        "arrayX",
        Value::Array(vec![Value::Uint32(7), Value::Uint32(8), Value::Uint32(9)]),
    );
    inner.insert("utf8_stringX", string("hello"));
    let mut outer = Map::new();
    outer.insert("mapX", Value::Map(inner));

    let mut map = Map::new();
    map.insert(
        "array",
        Value::Array(vec![Value::Uint32(1), Value::Uint32(2), Value::Uint32(3)]),
    );
    map.insert("boolean", Value::Bool(true));
    map.insert("bytes", Value::Bytes(vec![0, 0, 0, 42]));
    map.insert("double", Value::Double(42.123456));
    map.insert("float", Value::Float(1.1));
    map.insert("int32", Value::Int32(-268_435_456));
    map.insert("map", Value::Map(outer));
    map.insert("uint128", Value::Uint128(1u128 << 120));
    map.insert("uint16", Value::Uint16(100));
    map.insert("uint32", Value::Uint32(268_435_456));
    map.insert("uint64", Value::Uint64(1u64 << 60));
    map.insert("utf8_string", string("unicode! ☯ - ♫"));
    Value::Map(map)
}

/// Record with the maximum value of each numeric type
pub fn boundary_record() -> Value {
    let mut map = Map::new();
    map.insert("double", Value::Double(f64::INFINITY));
    map.insert("float", Value::Float(f32::INFINITY));
    map.insert("int32", Value::Int32(i32::MAX));
    map.insert("uint128", Value::Uint128(u128::MAX));
    map.insert("uint16", Value::Uint16(u16::MAX));
    map.insert("uint32", Value::Uint32(u32::MAX));
    map.insert("uint64", Value::Uint64(u64::MAX));
    Value::Map(map)
}

/// IPv4 database holding the three decoder records
pub fn decoder_db() -> Vec<u8> {
    let mut tree = TreeWriter::new(4);
    let mut data = DataWriter::new();
    for (network, record) in [
        ("1.1.1.0/24", empty_record()),
        ("1.1.2.0/24", populated_record()),
        ("1.1.3.0/24", boundary_record()),
    ] {
        let offset = data.write(&record);
        tree.insert(network, offset);
    }
    assemble(&DatabaseSpec {
        tree: &tree,
        data: data.bytes(),
        record_size: 24,
        ip_version: 4,
        database_type: "MaxMind DB Decoder Test",
    })
}
