//! JSON-lines metadata sidecar: one `ChunkMeta` per line, aligned to vector rows by `id`.

use crate::error::{RagError, Result};
use crate::models::ChunkMeta;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix given to a sidecar that no longer matches its vector file
pub const QUARANTINE_SUFFIX: &str = "corrupt";
/// Suffix of the sidecar a compaction writes before swapping it in
pub const STAGED_SUFFIX: &str = "compacting";

#[derive(Debug, Clone)]
pub struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append entries as new lines in a single write
    pub fn append(&self, entries: &[ChunkMeta]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    /// Every parseable entry in file order; malformed lines are skipped
    pub fn read_all(&self) -> Result<Vec<ChunkMeta>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkMeta>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!("Skipping malformed metadata line {}: {}", lineno + 1, e),
            }
        }
        Ok(entries)
    }

    pub fn active_count(&self) -> Result<usize> {
        Ok(self.read_all()?.iter().filter(|m| !m.deleted).count())
    }

    /// Tombstone every live entry for `path`, returning how many were flipped.
    ///
    /// The whole file is rewritten through a temp file and renamed into place.
    /// Malformed lines do not survive the rewrite.
    pub fn soft_delete_path(&self, path: &str) -> Result<usize> {
        let mut entries = self.read_all()?;
        let mut flipped = 0;
        for entry in entries.iter_mut().filter(|m| m.path == path && !m.deleted) {
            entry.deleted = true;
            flipped += 1;
        }
        if flipped > 0 {
            self.rewrite(&entries)?;
        }
        Ok(flipped)
    }

    /// Replace the sidecar contents atomically
    pub fn rewrite(&self, entries: &[ChunkMeta]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| RagError::Store(format!("no parent directory for {}", self.path.display())))?;
        std::fs::create_dir_all(dir)?;

        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            for entry in entries {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| RagError::Io(e.error))?;
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    /// The `<name>.compacting` store a compaction fills before `commit_staged`
    pub fn staged(&self) -> MetaStore {
        MetaStore::new(self.sibling(STAGED_SUFFIX))
    }

    /// Rename the staged sidecar over this one
    pub fn commit_staged(&self) -> Result<()> {
        std::fs::rename(self.staged().path(), &self.path)?;
        Ok(())
    }

    /// Move the sidecar aside as `<name>.corrupt`, replacing an older quarantined copy
    pub fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.exists() {
            return Ok(None);
        }
        let target = self.sibling(QUARANTINE_SUFFIX);
        std::fs::rename(&self.path, &target)?;
        warn!("Metadata sidecar moved aside to {}", target.display());
        Ok(Some(target))
    }

    /// Delete the sidecar; missing is fine
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
