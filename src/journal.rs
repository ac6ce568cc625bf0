//! Append-only CSV journal of closed trades.
//!
//! One row per closed position, written once, never updated in place.
//! Both the live tracker and replay reports can feed it.

use crate::lifecycle::TradeOutcome;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const HEADER: &str = "timestamp,direction,entry,exit,pnl,result,tag";

/// Durable trade history at a fixed path
#[derive(Debug, Clone)]
pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    /// Open (or create with header) the journal file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating journal dir {:?}", parent))?;
            }
        }
        if !path.exists() {
            std::fs::write(&path, format!("{}\n", HEADER))
                .with_context(|| format!("initializing journal {:?}", path))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one closed trade. Never rewrites existing rows.
    pub fn append(&self, outcome: &TradeOutcome) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening journal {:?}", self.path))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record([
            outcome.closed_at.to_rfc3339(),
            outcome.direction.to_string(),
            format!("{:.2}", outcome.entry),
            format!("{:.2}", outcome.exit_price),
            format!("{:.2}", outcome.pnl_points),
            outcome.result.to_string(),
            outcome.tag.clone(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}
