mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{cmd_dump, cmd_lookup, cmd_metadata, cmd_networks, cmd_verify};

#[derive(Parser)]
#[command(name = "mmdbscan")]
#[command(
    about = "Inspect MaxMind DB files: lookups, network enumeration and data dumps",
    long_about = "mmdbscan - Read-only tool for MaxMind DB (.mmdb) files\n\n\
    Resolves IP addresses to their records, enumerates every network in the\n\
    search tree and decodes the data section. Output is JSON.\n\n\
    Examples:\n\
      mmdbscan lookup GeoLite2-City.mmdb 81.2.69.142\n\
      mmdbscan networks GeoLite2-City.mmdb --within 81.2.69.0/24\n\
      mmdbscan dump GeoLite2-City.mmdb\n\
      mmdbscan metadata GeoLite2-City.mmdb\n\
      mmdbscan verify GeoLite2-City.mmdb\n\n\
    Logging goes to stderr; use -v/-vv or RUST_LOG to raise the level."
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up an IP address
    Lookup {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address
        #[arg(value_name = "IP")]
        ip: String,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// List the networks stored in the database (one JSON object per line)
    Networks {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Only list networks inside this CIDR
        #[arg(long, value_name = "CIDR")]
        within: Option<String>,

        /// Also list networks that have no data
        #[arg(long)]
        include_empty: bool,

        /// Skip the IPv4-mapped, Teredo and 6to4 aliases of the IPv4 space
        /// (default without --within)
        #[arg(long, conflicts_with = "include_aliased")]
        skip_aliased: bool,

        /// Walk the aliases of the IPv4 space (default with --within)
        #[arg(long)]
        include_aliased: bool,

        /// Decode and print the record of each network
        #[arg(short, long)]
        data: bool,
    },

    /// Decode every top-level value of the data section (one JSON object per line)
    Dump {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,
    },

    /// Print the database metadata as JSON
    Metadata {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,
    },

    /// Check the structure of a database file
    Verify {
        /// Path to the database (.mmdb file)
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mmdbscan={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Lookup {
            database,
            ip,
            quiet,
        } => cmd_lookup(database, ip, quiet),
        Commands::Networks {
            database,
            within,
            include_empty,
            skip_aliased,
            include_aliased,
            data,
        } => {
            let skip = match (skip_aliased, include_aliased) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_networks(database, within, include_empty, skip, data)
        }
        Commands::Dump { database } => cmd_dump(database),
        Commands::Metadata { database } => cmd_metadata(database),
        Commands::Verify { database, json } => cmd_verify(database, json),
    }
}
