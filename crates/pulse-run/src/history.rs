use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::info;
use pulse_lib::session::SessionRecord;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Append-only CSV file of finished sessions, one row per record.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating history dir {}", parent.display()))?;
        }
        let has_rows = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening history {}", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(!has_rows).from_writer(file);
        writer
            .serialize(record)
            .with_context(|| format!("writing history {}", self.path.display()))?;
        writer.flush()?;
        info!("session appended to {}", self.path.display());
        Ok(())
    }

    /// All records, oldest first. A missing file is an empty history.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("opening history {}", self.path.display()))?;
        let mut records = Vec::new();
        for row in reader.deserialize::<SessionRecord>() {
            records.push(row.with_context(|| format!("parsing history {}", self.path.display()))?);
        }
        Ok(records)
    }

    pub fn latest(&self) -> Result<Option<SessionRecord>> {
        Ok(self.list()?.pop())
    }
}
