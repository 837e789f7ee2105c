use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::ApplicationRecord;

pub type SharedRecordStore = Arc<Mutex<Box<dyn RecordStore>>>;

pub fn shared(store: impl RecordStore + 'static) -> SharedRecordStore {
    let store: Box<dyn RecordStore> = Box::new(store);
    Arc::new(Mutex::new(store))
}

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    SerdeJson(serde_json::Error),
    DuplicateId { id: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::SerdeJson(e) => write!(f, "json error: {e}"),
            Self::DuplicateId { id } => write!(f, "application id already stored: {id}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::SerdeJson(e) => Some(e),
            Self::DuplicateId { .. } => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(value)
    }
}

/// Append-only sequence of application records.
///
/// Callers share one store behind [`SharedRecordStore`]; holding the lock
/// across `append` is what keeps concurrent submissions from overwriting
/// each other.
pub trait RecordStore: Send {
    /// Creates the backing document if it is missing. Never overwrites.
    fn ensure_initialized(&mut self) -> Result<(), StoreError>;

    /// Every stored record in submission order. Unreadable storage yields an
    /// empty list.
    fn load_all(&self) -> Vec<ApplicationRecord>;

    fn append(&mut self, record: ApplicationRecord) -> Result<(), StoreError>;

    /// Pretty-printed JSON array of [`RecordStore::load_all`].
    fn export_document(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(&self.load_all())?)
    }
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Vec<ApplicationRecord>, StoreError> {
        let bytes = fs::read(&self.path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_document(&self, records: &[ApplicationRecord]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        replace_document(&self.path, &bytes)?;
        Ok(())
    }

    /// Moves an unreadable document out of the way so the next write does not
    /// destroy it.
    fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "applications.json".to_string());
        let target = self.path.with_file_name(format!("{file_name}.corrupt-{stamp}"));
        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}

impl RecordStore for JsonFileStore {
    fn ensure_initialized(&mut self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        self.write_document(&[])
    }

    fn load_all(&self) -> Vec<ApplicationRecord> {
        match self.read_document() {
            Ok(records) => records,
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable applications document");
                Vec::new()
            }
        }
    }

    fn append(&mut self, record: ApplicationRecord) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        let mut records = match self.read_document() {
            Ok(records) => records,
            Err(StoreError::SerdeJson(e)) => {
                let moved_to = self.quarantine()?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %moved_to.display(),
                    error = %e,
                    "applications document is corrupt; starting a new one"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateId { id: record.id });
        }
        records.push(record);
        self.write_document(&records)
    }
}

/// Store kept entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    records: Vec<ApplicationRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ApplicationRecord>) -> Self {
        Self { records }
    }
}

impl RecordStore for MemoryRecordStore {
    fn ensure_initialized(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_all(&self) -> Vec<ApplicationRecord> {
        self.records.clone()
    }

    fn append(&mut self, record: ApplicationRecord) -> Result<(), StoreError> {
        if self.records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateId { id: record.id });
        }
        self.records.push(record);
        Ok(())
    }
}

/// Writes the document beside `path` and renames it into place, so a reader
/// sees either the previous document or the new one. The temp file carries a
/// unique suffix and is removed again if any step fails.
fn replace_document(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "store path has no file name")
    })?;
    let tmp_path = dir.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        ulid::Ulid::new()
    ));

    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()
    });
    let result = written.and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
