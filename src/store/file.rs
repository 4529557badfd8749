//! JSON file store.
//!
//! The whole record lives in memory and is rewritten on every mutation via a
//! temp file in the same directory, so a crash mid-write leaves the previous
//! file intact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

use super::{KeyValueStore, Record};
use crate::error::Result;

pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Record>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Record::new(),
            Err(e) => return Err(e.into()),
        };
        log::debug!("Opened store {} ({} keys)", path.display(), data.len());
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, data: &Record) -> Result<()> {
        let parent_dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent_dir)?;

        let temp_file = NamedTempFile::new_in(parent_dir)?;
        {
            let mut writer = BufWriter::new(&temp_file);
            serde_json::to_writer_pretty(&mut writer, data)?;
            writer.flush()?;
        }
        temp_file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<Record> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, record: Record) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.extend(record);
        self.flush(&data)
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            data.remove(*key);
        }
        self.flush(&data)
    }
}
