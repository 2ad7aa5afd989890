use anyhow::{Context, Result};
use mmdbscan::Value;
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli_utils::open_database;

#[derive(Serialize)]
struct LookupOutput {
    network: String,
    prefix_len: u8,
    data: Value,
}

pub fn cmd_lookup(database: PathBuf, ip: String, quiet: bool) -> Result<()> {
    let reader = open_database(&database)?;
    let addr: IpAddr = ip
        .trim()
        .parse()
        .with_context(|| format!("Invalid IP address: {}", ip))?;

    let result = reader
        .lookup_offset(addr)
        .with_context(|| format!("Lookup failed for: {}", ip))?;
    let found = result.is_some();

    if !quiet {
        let output = match result {
            Some(result) => {
                let data = reader.decode(result.data_offset).with_context(|| {
                    format!("Failed to decode record at offset {}", result.data_offset)
                })?;
                Some(LookupOutput {
                    network: result.network.to_string(),
                    prefix_len: result.prefix_len,
                    data,
                })
            }
            None => None,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    std::process::exit(if found { 0 } else { 1 });
}
