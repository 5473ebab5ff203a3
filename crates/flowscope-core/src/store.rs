use crate::model::{FlowSnapshot, Snapshot, Timestamp, Timestamped};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TOPOLOGY_FILE: &str = "topology.jsonl";
pub const FLOWS_FILE: &str = "flows.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: bad record at offset {offset}: {source}")]
    Decode {
        path: PathBuf,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: index rejected: {reason}")]
    BadIndex { path: PathBuf, reason: String },
    #[error("no record at offset {0}")]
    MissingRecord(u64),
    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub timestamp: Timestamp,
    pub offset: u64,
}

/// Timestamp-sorted index over one data source.
pub trait TimeIndexedStore {
    type Record;

    /// Entries in non-decreasing timestamp order.
    fn entries(&self) -> &[IndexEntry];

    fn read_at(&self, offset: u64) -> Result<Self::Record, StoreError>;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn timestamp_at(&self, pos: usize) -> Option<Timestamp> {
        self.entries().get(pos).map(|e| e.timestamp)
    }

    /// Last position at or after `from` whose timestamp is `<= ts`.
    fn position_at_or_before(&self, ts: Timestamp, from: usize) -> Option<usize> {
        let entries = self.entries();
        let from = from.min(entries.len());
        let n = entries[from..].partition_point(|e| e.timestamp <= ts);
        if n == 0 {
            None
        } else {
            Some(from + n - 1)
        }
    }

    /// First position whose timestamp is `>= ts`.
    fn position_at_or_after(&self, ts: Timestamp) -> Option<usize> {
        let entries = self.entries();
        let pos = entries.partition_point(|e| e.timestamp < ts);
        (pos < entries.len()).then_some(pos)
    }

    fn read_position(&self, pos: usize) -> Result<Self::Record, StoreError> {
        let entry = self
            .entries()
            .get(pos)
            .ok_or(StoreError::MissingRecord(pos as u64))?;
        self.read_at(entry.offset)
    }
}

/// In-memory store; offsets are positions in the sorted record list.
#[derive(Debug, Clone)]
pub struct MemoryStore<T> {
    records: Vec<T>,
    entries: Vec<IndexEntry>,
}

impl<T: Timestamped> MemoryStore<T> {
    pub fn new(mut records: Vec<T>) -> Self {
        records.sort_by_key(|r| r.timestamp());
        let entries = records
            .iter()
            .enumerate()
            .map(|(i, r)| IndexEntry {
                timestamp: r.timestamp(),
                offset: i as u64,
            })
            .collect();
        Self { records, entries }
    }
}

impl<T: Timestamped + Clone> TimeIndexedStore for MemoryStore<T> {
    type Record = T;

    fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn read_at(&self, offset: u64) -> Result<T, StoreError> {
        usize::try_from(offset)
            .ok()
            .and_then(|i| self.records.get(i))
            .cloned()
            .ok_or(StoreError::MissingRecord(offset))
    }
}

pub fn index_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(".idx");
    PathBuf::from(name)
}

/// JSON-lines file with a byte-offset index.
///
/// Opening prefers the `.idx` sidecar written next to the data file and falls
/// back to scanning the data file line by line.
#[derive(Debug)]
pub struct JsonlStore<T> {
    path: PathBuf,
    entries: Vec<IndexEntry>,
    _record: PhantomData<fn() -> T>,
}

#[derive(Deserialize)]
struct Stamp {
    timestamp: Timestamp,
}

impl<T: DeserializeOwned> JsonlStore<T> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match load_sidecar(&path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "index unusable; scanning data file");
                scan(&path)?
            }
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "store opened");
        Ok(Self {
            path,
            entries,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: DeserializeOwned> TimeIndexedStore for JsonlStore<T> {
    type Record = T;

    fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn read_at(&self, offset: u64) -> Result<T, StoreError> {
        let mut file = File::open(&self.path).map_err(io_err(&self.path))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(io_err(&self.path))?;
        let mut line = String::new();
        let n = BufReader::new(file)
            .read_line(&mut line)
            .map_err(io_err(&self.path))?;
        if n == 0 {
            return Err(StoreError::MissingRecord(offset));
        }
        serde_json::from_str(&line).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            offset,
            source,
        })
    }
}

fn load_sidecar(data_path: &Path) -> Result<Vec<IndexEntry>, StoreError> {
    let idx = index_path(data_path);
    let data_len = fs::metadata(data_path).map_err(io_err(data_path))?.len();
    let file = File::open(&idx).map_err(io_err(&idx))?;

    let mut entries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(&idx))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: IndexEntry =
            serde_json::from_str(&line).map_err(|e| StoreError::BadIndex {
                path: idx.clone(),
                reason: format!("line {}: {e}", lineno + 1),
            })?;
        if entry.offset >= data_len {
            return Err(StoreError::BadIndex {
                path: idx,
                reason: format!("offset {} past end of data ({data_len} bytes)", entry.offset),
            });
        }
        if entries
            .last()
            .is_some_and(|prev: &IndexEntry| prev.timestamp > entry.timestamp)
        {
            return Err(StoreError::BadIndex {
                path: idx,
                reason: format!("timestamps go backwards at line {}", lineno + 1),
            });
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn scan(data_path: &Path) -> Result<Vec<IndexEntry>, StoreError> {
    let file = File::open(data_path).map_err(io_err(data_path))?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut skipped = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).map_err(io_err(data_path))?;
        if n == 0 {
            break;
        }
        if !line.trim().is_empty() {
            match serde_json::from_str::<Stamp>(&line) {
                Ok(stamp) => entries.push(IndexEntry {
                    timestamp: stamp.timestamp,
                    offset,
                }),
                Err(_) => skipped += 1,
            }
        }
        offset += n as u64;
    }

    if skipped > 0 {
        tracing::warn!(path = %data_path.display(), skipped, "skipped unreadable records");
    }
    entries.sort_by_key(|e| e.timestamp);
    Ok(entries)
}

/// Appends records to a JSON-lines file and keeps its `.idx` sidecar current.
#[derive(Debug)]
pub struct JsonlWriter<T> {
    path: PathBuf,
    data: File,
    index: File,
    next_offset: u64,
    last_timestamp: Option<Timestamp>,
    _record: PhantomData<fn(&T)>,
}

impl<T: Serialize + Timestamped> JsonlWriter<T> {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        let idx = index_path(&path);
        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&idx)
            .map_err(io_err(&idx))?;
        let next_offset = data.metadata().map_err(io_err(&path))?.len();
        Ok(Self {
            path,
            data,
            index,
            next_offset,
            last_timestamp: None,
            _record: PhantomData,
        })
    }

    pub fn append(&mut self, record: &T) -> Result<IndexEntry, StoreError> {
        let timestamp = record.timestamp();
        if self.last_timestamp.is_some_and(|last| timestamp < last) {
            tracing::warn!(
                path = %self.path.display(),
                timestamp,
                "record older than its predecessor; index will be rebuilt on open"
            );
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.data.write_all(&line).map_err(io_err(&self.path))?;
        self.data.flush().map_err(io_err(&self.path))?;

        let entry = IndexEntry {
            timestamp,
            offset: self.next_offset,
        };
        let mut idx_line = serde_json::to_vec(&entry)?;
        idx_line.push(b'\n');
        self.index
            .write_all(&idx_line)
            .map_err(io_err(&self.path))?;

        self.next_offset += line.len() as u64;
        self.last_timestamp = Some(timestamp);
        Ok(entry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Topology and flow stores of one recording directory.
pub fn open_recording(
    dir: &Path,
) -> Result<(JsonlStore<Snapshot>, JsonlStore<FlowSnapshot>), StoreError> {
    Ok((
        JsonlStore::open(dir.join(TOPOLOGY_FILE))?,
        JsonlStore::open(dir.join(FLOWS_FILE))?,
    ))
}
