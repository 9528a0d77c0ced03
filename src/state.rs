use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::metadata::FileStamp;

/// One successfully published audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub size: u64,
    pub mtime: f64,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    uploaded: BTreeMap<String, UploadRecord>,
}

/// Persisted mapping from audio path to its upload record.
///
/// Every mutation is written through to disk before `record` returns.
#[derive(Debug)]
pub struct UploadStore {
    path: PathBuf,
    state: StateFile,
}

impl UploadStore {
    /// Load the store, starting empty only when the file does not exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(UploadStore {
                    path,
                    state: StateFile::default(),
                });
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let state = match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(source) => return Err(StoreError::Parse { path, source }),
        };

        Ok(UploadStore { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.uploaded.is_empty()
    }

    pub fn get(&self, key: &Path) -> Option<&UploadRecord> {
        self.state.uploaded.get(&*key.to_string_lossy())
    }

    /// True iff a record exists for `key` with the same size and mtime
    pub fn is_uploaded(&self, key: &Path, stamp: FileStamp) -> bool {
        self.get(key)
            .map(|record| record.size == stamp.size && record.mtime == stamp.mtime)
            .unwrap_or(false)
    }

    /// Upsert the record for `key` and persist the whole store
    pub fn record(&mut self, key: &Path, stamp: FileStamp, video_id: &str) -> Result<(), StoreError> {
        let record = UploadRecord {
            size: stamp.size,
            mtime: stamp.mtime,
            video_id: video_id.to_string(),
            uploaded_at: Some(chrono::Utc::now().timestamp()),
        };
        self.state
            .uploaded
            .insert(key.to_string_lossy().into_owned(), record);
        self.save()
    }

    fn save(&self) -> Result<(), StoreError> {
        let mut json = serde_json::to_string_pretty(&self.state).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        json.push('\n');

        write_atomically(&self.path, json.as_bytes()).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Write to a sibling temp file, then rename over `path`
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
