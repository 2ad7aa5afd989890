//! mmdbscan - Read-only MaxMind DB Engine
//!
//! mmdbscan opens MaxMind DB (`.mmdb`) files, resolves IP addresses to their
//! records, decodes the self-describing data section and enumerates every
//! network stored in the search tree.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mmdbscan::{NetworksOptions, Reader};
//! use std::net::IpAddr;
//!
//! let reader = Reader::open("GeoLite2-City.mmdb")?;
//!
//! // Point lookup
//! let ip: IpAddr = "81.2.69.142".parse()?;
//! if let Some(record) = reader.lookup(ip)? {
//!     let iso_code = record.path(&["country", "iso_code"]).and_then(|v| v.as_str());
//!     println!("{ip}: {iso_code:?}");
//! }
//!
//! // Walk every network; the IPv4 aliases of an IPv6 tree are skipped
//! let mut networks = reader.networks(NetworksOptions::new());
//! for item in networks.by_ref() {
//!     println!("{} -> {:?}", item.network(), item.data_offset());
//! }
//! if let Some(err) = networks.err() {
//!     eprintln!("enumeration stopped: {err}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MMDB File Format                    │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte zero separator           │
//! │  3. Data Section (typed values)      │
//! │  4. Metadata marker + metadata map   │
//! └──────────────────────────────────────┘
//!          ↓ mmap() or owned bytes
//! ┌──────────────────────────────────────┐
//! │  Reader (immutable, Send + Sync)     │
//! │   ├─ lookup / lookup_offset          │
//! │   ├─ networks / networks_within      │
//! │   └─ data_section / verify           │
//! └──────────────────────────────────────┘
//! ```
//!
//! Pointers in the data section are followed transparently; every decode
//! returns a freshly owned [`Value`] tree.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data section decoder
pub mod decoder;
/// Error types for database operations
pub mod error;
/// MMDB format implementation (metadata, layout, search tree)
pub mod mmdb;
/// CIDR network type
pub mod network;
/// Network enumeration cursor
pub mod networks;
/// Database reader
pub mod reader;
/// Decoded value tree
pub mod value;

// Re-exports for Rust consumers

pub use crate::decoder::Decoder;
pub use crate::error::{MmdbError, Result};
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
pub use crate::network::Network;
pub use crate::networks::{default_aliased_networks, NetworkItem, Networks, NetworksOptions};
pub use crate::reader::{DataSection, LookupResult, Reader};
pub use crate::value::{Map, Value};

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
