use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_unix_timestamp, open_database};

pub fn cmd_metadata(database: PathBuf) -> Result<()> {
    let reader = open_database(&database)?;
    let metadata = reader.metadata();
    let layout = reader.layout();

    let mut output = json!(metadata);
    output["build_date"] = json!(format_unix_timestamp(metadata.build_epoch));
    output["file"] = json!(database.display().to_string());
    output["search_tree_size"] = json!(format_bytes(layout.tree_size));
    output["data_section_size"] = json!(format_bytes(layout.data_end - layout.data_start));

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
