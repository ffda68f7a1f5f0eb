//! Storage traits and the JSON Lines file store.

use crate::error::{PersistenceError, PersistenceResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Append-only collection (e.g. trade history).
pub trait Persister<T>: Send + Sync {
    /// Load up to `limit` most recent records, oldest first.
    fn load_all(&self, limit: usize) -> PersistenceResult<Vec<T>>;

    fn save(&self, record: &T) -> PersistenceResult<()>;
}

/// Collection where only the latest record matters (e.g. parameters).
pub trait Repository<T>: Send + Sync {
    fn load_latest(&self) -> PersistenceResult<Option<T>>;

    fn save(&self, record: &T) -> PersistenceResult<()>;
}

struct ActiveWriter {
    writer: BufWriter<File>,
    records_written: usize,
}

/// One `.jsonl` file per collection, opened in append mode.
pub struct JsonLinesStore<T> {
    collection: String,
    path: PathBuf,
    writer: Mutex<Option<ActiveWriter>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLinesStore<T> {
    /// Open (or lazily create) `<dir>/<collection>.jsonl`.
    pub fn open(dir: impl AsRef<Path>, collection: &str) -> PersistenceResult<Self> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PersistenceError::InvalidCollection(collection.to_string()));
        }
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            collection: collection.to_string(),
            path: dir.as_ref().join(format!("{collection}.jsonl")),
            writer: Mutex::new(None),
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) -> PersistenceResult<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            info!(path = %self.path.display(), "Opening JSON Lines store (append mode)");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(ActiveWriter {
                writer: BufWriter::new(file),
                records_written: 0,
            });
        }
        if let Some(active) = guard.as_mut() {
            writeln!(active.writer, "{line}")?;
            active.writer.flush()?;
            active.records_written += 1;
        }
        Ok(())
    }
}

impl<T: DeserializeOwned> JsonLinesStore<T> {
    /// Parse every line of the file, skipping lines that fail to decode.
    fn read_all(&self) -> PersistenceResult<Vec<T>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    collection = %self.collection,
                    line = idx + 1,
                    error = %e,
                    "Skipping corrupt record"
                ),
            }
        }
        debug!(collection = %self.collection, records = records.len(), "Loaded records");
        Ok(records)
    }
}

impl<T> Persister<T> for JsonLinesStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load_all(&self, limit: usize) -> PersistenceResult<Vec<T>> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
        Ok(records)
    }

    fn save(&self, record: &T) -> PersistenceResult<()> {
        let json = serde_json::to_string(record)?;
        self.append_line(&json)
    }
}

impl<T> Repository<T> for JsonLinesStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load_latest(&self) -> PersistenceResult<Option<T>> {
        Ok(self.read_all()?.pop())
    }

    fn save(&self, record: &T) -> PersistenceResult<()> {
        Persister::save(self, record)
    }
}

impl<T> Drop for JsonLinesStore<T> {
    fn drop(&mut self) {
        if let Some(mut active) = self.writer.lock().take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush store on drop");
            }
            info!(
                collection = %self.collection,
                records = active.records_written,
                "Closed JSON Lines store"
            );
        }
    }
}
