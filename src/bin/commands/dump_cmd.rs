use anyhow::{Context, Result};
use mmdbscan::Value;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli_utils::{open_database, write_json_line};

#[derive(Serialize)]
struct DumpLine {
    offset: usize,
    value: Value,
}

pub fn cmd_dump(database: PathBuf) -> Result<()> {
    let reader = open_database(&database)?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    let mut values = reader.data_section();
    for (offset, value) in values.by_ref() {
        if !write_json_line(&mut out, &DumpLine { offset, value })? {
            return Ok(());
        }
    }
    out.flush()?;

    if let Some(err) = values.take_err() {
        return Err(err).context("Data section decoding stopped");
    }
    Ok(())
}
