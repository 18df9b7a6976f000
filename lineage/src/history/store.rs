use super::ProcessRecord;
use crate::config::StoreConfig;
use crate::identity::ProcessKey;
use crate::{Error, ErrorKind, Result};

use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Keeps `[A-Za-z0-9.-]` and writes every other byte as `_xx`, so distinct keys never
/// share a file and `@` stays free to separate pid from time.
fn escape(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for b in part.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' => escaped.push(b as char),
            _ => escaped.push_str(&format!("_{:02x}", b)),
        }
    }
    escaped
}

/// Associative storage behind the process history table.
pub trait HistoryStore {
    fn get(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>>;
    fn put(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()>;
    fn remove(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>>;
    fn clear(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<ProcessKey, ProcessRecord>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            Err(Error::from(ErrorKind::Closed))
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for MemoryStore {
    fn get(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.check()?;
        Ok(self.records.get(key).cloned())
    }

    fn put(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        self.check()?;
        self.records.insert(key, record);
        Ok(())
    }

    fn remove(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.check()?;
        Ok(self.records.remove(key))
    }

    fn clear(&mut self) -> Result<()> {
        self.check()?;
        self.records.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

const SPILL_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct Spilled {
    key: ProcessKey,
    record: ProcessRecord,
}

/// Keeps the most recently used records in memory and spills the rest to one JSON file
/// per key.
pub struct SpillStore {
    cache: LruCache<ProcessKey, ProcessRecord>,
    dir: PathBuf,
    closed: bool,
}

impl SpillStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let dir = config.spill_dir.clone().ok_or_else(|| {
            Error::new(ErrorKind::Config, "a spill directory is required to spill records")
        })?;
        Ok(Self {
            cache: LruCache::new(config.cache_capacity),
            dir,
            closed: false,
        })
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            Err(Error::from(ErrorKind::Closed))
        } else {
            Ok(())
        }
    }

    fn path(&self, key: &ProcessKey) -> PathBuf {
        let name = match &key.time {
            Some(time) => format!("{}@{}", escape(&key.pid), escape(time)),
            None => escape(&key.pid),
        };
        self.dir.join(format!("{}.{}", name, SPILL_EXTENSION))
    }

    fn spill(&self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        let path = self.path(&key);
        debug!("Spilling {} to {}", key, path.display());
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(writer, &Spilled { key, record })?;
        Ok(())
    }

    /// Takes the spilled record for `key` off the disk.
    fn unspill(&self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        let path = self.path(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let spilled: Spilled = serde_json::from_reader(BufReader::new(file))?;
        if spilled.key != *key {
            return Err(Error::new(
                ErrorKind::Store,
                format!(
                    "{} holds the record of {}, expected {}",
                    path.display(),
                    spilled.key,
                    key
                ),
            ));
        }
        fs::remove_file(&path)?;
        Ok(Some(spilled.record))
    }

    fn discard(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn cache(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        if !self.cache.contains(&key) && self.cache.len() == self.cache.cap() {
            if let Some((evicted, evicted_record)) = self.cache.pop_lru() {
                self.spill(evicted, evicted_record)?;
            }
        }
        self.cache.put(key, record);
        Ok(())
    }
}

impl HistoryStore for SpillStore {
    fn get(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.check()?;
        if let Some(record) = self.cache.get(key) {
            return Ok(Some(record.clone()));
        }
        match self.unspill(key)? {
            Some(record) => {
                self.cache(key.clone(), record.clone())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        self.check()?;
        if !self.cache.contains(&key) {
            Self::discard(&self.path(&key))?;
        }
        self.cache(key, record)
    }

    fn remove(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.check()?;
        match self.cache.pop(key) {
            Some(record) => Ok(Some(record)),
            None => self.unspill(key),
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.check()?;
        self.cache.clear();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == SPILL_EXTENSION) {
                Self::discard(&path)?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        while let Some((key, record)) = self.cache.pop_lru() {
            if let Err(e) = self.spill(key, record) {
                warn!("Failed to flush a record on close: {}", e);
                return Err(e);
            }
        }
        self.closed = true;
        Ok(())
    }
}
