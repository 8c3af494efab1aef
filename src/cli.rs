//! Command-line operations against the allocation store
//!
//! Used by experimenters outside the participant flow: loading the pool,
//! assigning by hand, exporting payments.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use tracing::info;

use crate::assign::Assigner;
use crate::config::Config;
use crate::db::{allocations, pool, AllocationDb, ParticipantTotal, PoolRow};
use crate::error::Result;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Assign allocations to a recipient
    Assign {
        /// Recipient participant id
        recipient_id: String,
        /// Rows to hold (defaults to assignment.target_count)
        #[arg(short, long)]
        target: Option<u32>,
    },

    /// Print total allocated per participant
    Export {
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },

    /// Load dictator decisions from a JSON array of pool rows
    ImportPool {
        /// JSON file: [{"dictator_id": "...", "round_number": 1, "kept": 60}, ...]
        file: PathBuf,
    },

    /// Show pool occupancy
    PoolStatus,

    /// Delete every allocation held by a recipient
    Delete {
        recipient_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Run a one-shot command and return its printable output
pub fn execute_command(db: &AllocationDb, config: &Config, cmd: Commands) -> Result<String> {
    match cmd {
        Commands::Serve => Ok(String::new()),

        Commands::Assign { recipient_id, target } => {
            let assigner = Assigner::new(config.assignment.clone());
            let target = target.unwrap_or(config.assignment.target_count);
            let outcome = assigner.assign(db, &recipient_id, target)?;
            Ok(serde_json::to_string_pretty(&outcome)?)
        }

        Commands::Export { format } => {
            let totals = db.with_conn(allocations::export_totals)?;
            match format {
                ExportFormat::Json => Ok(serde_json::to_string_pretty(&totals)?),
                ExportFormat::Csv => Ok(totals_csv(&totals)),
            }
        }

        Commands::ImportPool { file } => {
            let content = std::fs::read_to_string(&file)?;
            let rows: Vec<PoolRow> = serde_json::from_str(&content)?;
            let inserted = db.with_conn_mut(|conn| pool::import_pool(conn, &rows))?;
            info!(file = %file.display(), inserted, "Pool imported");
            Ok(format!("Imported {} of {} pool rows", inserted, rows.len()))
        }

        Commands::PoolStatus => {
            let status = db.with_conn(pool::pool_status)?;
            Ok(serde_json::to_string_pretty(&status)?)
        }

        Commands::Delete { recipient_id } => {
            let deleted = db.with_conn(|conn| allocations::delete_for_recipient(conn, &recipient_id))?;
            Ok(format!("Deleted {} rows for {}", deleted, recipient_id))
        }
    }
}

fn totals_csv(totals: &[ParticipantTotal]) -> String {
    let mut out = String::from("participant_id,total_allocated\n");
    for t in totals {
        out.push_str(&csv_field(&t.participant_id));
        out.push(',');
        out.push_str(&t.total_allocated.to_string());
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
