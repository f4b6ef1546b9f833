use crate::error::{Error, Result};
use crate::types::{Row, RowId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const FORMAT: &str = "jsondb-rows";
const VERSION: u32 = 1;

/// First line of a row file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub format: String,
    pub version: u32,
    pub root: Option<RowId>,
    pub next_id: u64,
    pub link_key: String,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub header: Header,
    /// Rows in tree order, so every parent precedes its children
    pub rows: Vec<Row>,
}

/// A committed document stored as JSON Lines: one header line, then one row per line
#[derive(Debug, Clone)]
pub struct RowFile {
    path: PathBuf,
}

impl RowFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RowFile {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Sibling written before the rename; never equal to the target
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write all rows, replacing the file atomically
    pub fn save(&self, root: Option<RowId>, next_id: u64, link_key: &str, rows: &[Row]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        let mut writer = BufWriter::new(File::create(&temp_path)?);

        let header = Header {
            format: FORMAT.to_string(),
            version: VERSION,
            root,
            next_id,
            link_key: link_key.to_string(),
        };
        writeln!(writer, "{}", serde_json::to_string(&header)?)?;
        for row in rows {
            writeln!(writer, "{}", serde_json::to_string(row)?)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Read the last committed rows; `None` when the file does not exist yet
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.exists() {
            return Ok(None);
        }

        let mut lines = BufReader::new(File::open(&self.path)?).lines();
        let header: Header = match lines.next() {
            Some(line) => serde_json::from_str(&line?)?,
            None => return Ok(None),
        };
        if header.format != FORMAT || header.version != VERSION {
            return Err(Error::Storage(format!(
                "{} is not a version {} row file",
                self.path.display(),
                VERSION
            )));
        }

        let mut rows = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }

        Ok(Some(Snapshot { header, rows }))
    }
}
