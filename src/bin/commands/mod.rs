pub mod dump_cmd;
pub mod lookup_cmd;
pub mod metadata_cmd;
pub mod networks_cmd;
pub mod verify_cmd;

pub use dump_cmd::cmd_dump;
pub use lookup_cmd::cmd_lookup;
pub use metadata_cmd::cmd_metadata;
pub use networks_cmd::cmd_networks;
pub use verify_cmd::cmd_verify;
