//! MaxMind DB (MMDB) Binary Format
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: metadata discovery and section layout
//! - **tree**: search tree records and traversal
//!
//! Data decoding lives in `crate::decoder`; the same decoder reads the
//! metadata map and the data section.

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, Layout, Metadata};
pub use tree::{Record, SearchTree, IPV4_SUBTREE_DEPTH};
pub use types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER};
