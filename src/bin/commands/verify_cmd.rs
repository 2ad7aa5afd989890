use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::open_database;

pub fn cmd_verify(database: PathBuf, json_output: bool) -> Result<()> {
    let reader = open_database(&database)?;
    let result = reader.verify();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "valid": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match &result {
            Ok(()) => println!("✓ {} is a valid MaxMind DB", database.display()),
            Err(e) => eprintln!("✗ {}: {}", database.display(), e),
        }
    }

    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
