use anyhow::{Context, Result};
use mmdbscan::{Network, NetworksOptions, Value};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;

use crate::cli_utils::{open_database, write_json_line};

#[derive(Serialize)]
struct NetworkLine {
    network: String,
    data_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// `skip_aliased` of `None` keeps the library default for the entry point
pub fn cmd_networks(
    database: PathBuf,
    within: Option<String>,
    include_empty: bool,
    skip_aliased: Option<bool>,
    with_data: bool,
) -> Result<()> {
    let reader = open_database(&database)?;
    let mut options = NetworksOptions::new().include_empty_networks(include_empty);
    if let Some(skip) = skip_aliased {
        options = options.skip_aliased_networks(skip);
    }

    let mut networks = match within {
        Some(cidr) => {
            let network: Network = cidr
                .parse()
                .with_context(|| format!("Invalid network: {}", cidr))?;
            reader.networks_within(network, options)
        }
        None => reader.networks(options),
    };

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut count = 0usize;

    for item in networks.by_ref() {
        let data = if with_data {
            item.decode()
                .with_context(|| format!("Failed to decode record for {}", item.network()))?
        } else {
            None
        };
        let line = NetworkLine {
            network: item.network().to_string(),
            data_offset: item.data_offset(),
            data,
        };
        if !write_json_line(&mut out, &line)? {
            return Ok(());
        }
        count += 1;
    }
    out.flush()?;

    if let Some(err) = networks.take_err() {
        return Err(err).context("Network enumeration stopped");
    }
    debug!(count, "listed networks");
    Ok(())
}
