use anyhow::{Context, Result};
use log::{error, info};
use segregation_common::Snapshot;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk encodings for recorded snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    /// A `u32` snapshot count followed by each snapshot, bincode-encoded.
    Bincode,
    MessagePack,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to JSON.
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => OutputFormat::Json,
            "bincode" => OutputFormat::Bincode,
            "messagepack" => OutputFormat::MessagePack,
            other => {
                error!("Unknown output format: {}. Using JSON instead.", other);
                OutputFormat::Json
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Bincode => "bin",
            OutputFormat::MessagePack => "msgpack",
        }
    }
}

pub fn snapshot_path(base_filename: &str, format: OutputFormat) -> PathBuf {
    PathBuf::from(format!("{}_snapshots.{}", base_filename, format.extension()))
}

pub fn history_path(base_filename: &str) -> PathBuf {
    PathBuf::from(format!("{}_history.csv", base_filename))
}

/// Writes the snapshots to `path` in the requested format.
pub fn write_snapshots(path: &Path, snapshots: &[Snapshot], format: OutputFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut writer, snapshots).context("Failed to serialize snapshots to JSON")?;
        }
        OutputFormat::Bincode => {
            // The visualizer reads the count first, then streams snapshots.
            bincode::serialize_into(&mut writer, &(snapshots.len() as u32))
                .context("Failed to write snapshot count")?;
            for snapshot in snapshots {
                bincode::serialize_into(&mut writer, snapshot)
                    .context("Failed to serialize snapshot to bincode")?;
            }
        }
        OutputFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, snapshots)
                .context("Failed to serialize snapshots to MessagePack")?;
        }
    }

    writer.flush()?;
    info!("{} snapshots saved to {} ({:?} format)", snapshots.len(), path.display(), format);
    Ok(())
}

/// Writes the segregation history as `step,segregation_index` rows, steps starting at 1.
pub fn write_history_csv(path: &Path, history: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create history file '{}'", path.display()))?;
    writer.write_record(["step", "segregation_index"])?;
    for (i, index) in history.iter().enumerate() {
        writer.write_record(&[(i + 1).to_string(), format!("{:.6}", index)])?;
    }
    writer.flush()?;
    info!("Segregation history ({} steps) saved to {}", history.len(), path.display());
    Ok(())
}
