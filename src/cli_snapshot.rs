//! Snapshot CLI
//!
//! Offline export/import against a catalog database file: the full
//! snapshot by default, or one table with `--table`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use baduk_catalog_server::catalog_store::SqliteCatalogStore;
use baduk_catalog_server::snapshot::{
    export_snapshot, export_table, import_snapshot, import_table, Snapshot, TableKind,
};

#[derive(Parser, Debug)]
#[command(name = "cli-snapshot")]
#[command(about = "Export or import lecture catalog snapshots")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a snapshot of the catalog to a JSON file.
    Export {
        /// Path to the SQLite catalog database file.
        db: PathBuf,
        /// Path of the JSON file to write.
        output: PathBuf,
        /// Export only this table.
        #[arg(long)]
        table: Option<String>,
    },
    /// Merge a snapshot JSON file into the catalog.
    Import {
        /// Path to the SQLite catalog database file.
        db: PathBuf,
        /// Path of the JSON file to read.
        input: PathBuf,
        /// Import only this table.
        #[arg(long)]
        table: Option<String>,
        /// Clear the target table (and its dependents) before importing.
        /// Only valid together with --table.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
}

fn parse_table(name: &str) -> Result<TableKind> {
    TableKind::from_name(name).with_context(|| format!("Unknown table: {}", name))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Export { db, output, table } => {
            let store = SqliteCatalogStore::new(&db, 1)?;
            let json = match table {
                Some(name) => {
                    let kind = parse_table(&name)?;
                    serde_json::to_value(export_table(&store, kind)?)?
                }
                None => serde_json::to_value(export_snapshot(&store)?)?,
            };
            let file = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            serde_json::to_writer_pretty(file, &json)?;
            info!("Exported snapshot to {}", output.display());
        }
        Command::Import {
            db,
            input,
            table,
            replace,
        } => {
            if replace && table.is_none() {
                bail!("--replace is only valid together with --table");
            }
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let store = SqliteCatalogStore::new(&db, 1)?;
            match table {
                Some(name) => {
                    let kind = parse_table(&name)?;
                    let payload: serde_json::Value = serde_json::from_str(&raw)?;
                    let stats = import_table(&store, kind, &payload, replace)?;
                    info!(
                        "Imported {} {} records ({} skipped)",
                        stats.imported,
                        kind.name(),
                        stats.skipped
                    );
                    if stats.skipped > 0 {
                        warn!("{} records were skipped", stats.skipped);
                    }
                }
                None => {
                    let snapshot: Snapshot = serde_json::from_str(&raw)?;
                    let stats = import_snapshot(&store, &snapshot)?;
                    info!(
                        "Import complete: {} topics, {} tags, {} ranks, {} collections, {} lectures created",
                        stats.topics.created,
                        stats.tags.created,
                        stats.ranks.created,
                        stats.collections.created,
                        stats.lectures.created,
                    );
                    info!(
                        "{} relationship links and {} memberships added",
                        stats.links_added, stats.memberships_added
                    );
                }
            }
        }
    }

    Ok(())
}
