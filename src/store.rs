use crate::models::Listing;
use crate::snapshot::{Snapshot, SnapshotError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid snapshot name {0:?}")]
    InvalidName(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to encode snapshot: {0}")]
    Encoding(String),
    #[error(transparent)]
    Malformed(#[from] SnapshotError),
}

/// Persistence of named snapshots.
///
/// `save` replaces the whole snapshot or nothing; readers never observe a
/// partially written snapshot.
pub trait SnapshotStore {
    fn describe(&self) -> String;
    fn load(&self, name: &str) -> Result<Option<Snapshot>, StoreError>;
    fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Csv,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Csv => "csv",
        }
    }
}

/// Snapshots as files in a local directory, one file per search name.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    format: SnapshotFormat,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, format: SnapshotFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, self.format.extension())))
    }
}

impl SnapshotStore for FileStore {
    fn describe(&self) -> String {
        format!("{} ({} files)", self.dir.display(), self.format.extension())
    }

    fn load(&self, name: &str) -> Result<Option<Snapshot>, StoreError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            debug!("Snapshot file does not exist: {}", path.display());
            return Ok(None);
        }

        let snapshot = match self.format {
            SnapshotFormat::Json => {
                let json = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                Snapshot::from_json_str(&json)?
            }
            SnapshotFormat::Csv => {
                let file = File::open(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                read_csv(file)?
            }
        };

        info!("Loaded {} listings from {}", snapshot.len(), path.display());
        Ok(Some(snapshot))
    }

    fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let contents = match self.format {
            SnapshotFormat::Json => snapshot
                .to_json_string()
                .map_err(|e| StoreError::Encoding(e.to_string()))?
                .into_bytes(),
            SnapshotFormat::Csv => write_csv(snapshot)?,
        };

        if path.exists() {
            let backup = backup_path(&path);
            fs::copy(&path, &backup).map_err(|source| StoreError::Io {
                path: backup.clone(),
                source,
            })?;
            debug!("Backed up previous snapshot to {}", backup.display());
        }

        write_atomically(&path, &contents)?;
        info!("Saved {} listings to {}", snapshot.len(), path.display());
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains(|c: char| c == '/' || c == '\\')
        || name == "."
        || name == ".."
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_csv<R: io::Read>(reader: R) -> Result<Snapshot, StoreError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut listings = Vec::new();

    for (index, record) in reader.deserialize::<Listing>().enumerate() {
        let listing = record.map_err(|e| SnapshotError::record(index, e))?;
        listings.push(listing);
    }

    Ok(Snapshot::new(listings))
}

fn write_csv(snapshot: &Snapshot) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for listing in snapshot {
        writer
            .serialize(listing)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::listing;
    use crate::models::{StatusFlag, COLUMNS};
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        let mut new = listing("Bar", "9万円", None);
        new.status_flag = StatusFlag::New;
        Snapshot::new(vec![listing("Foo, \"quoted\"", "8万円", Some("https://suumo.jp/a")), new])
    }

    #[test]
    fn absent_snapshot_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path(), SnapshotFormat::Json);
        assert!(store.load("南武線").unwrap().is_none());
    }

    #[test]
    fn json_snapshot_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path(), SnapshotFormat::Json);
        store.save("南武線", &sample()).unwrap();

        assert!(dir.path().join("南武線.json").exists());
        assert_eq!(store.load("南武線").unwrap(), Some(sample()));
    }

    #[test]
    fn csv_snapshot_round_trips_with_absent_url() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path(), SnapshotFormat::Csv);
        store.save("町田周辺", &sample()).unwrap();

        let raw = fs::read_to_string(dir.path().join("町田周辺.csv")).unwrap();
        assert_eq!(raw.lines().next().unwrap(), COLUMNS.join(","));
        assert_eq!(store.load("町田周辺").unwrap(), Some(sample()));
    }

    #[test]
    fn save_keeps_backup_of_previous_snapshot() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path(), SnapshotFormat::Json);
        let first = Snapshot::new(vec![listing("Foo", "8万円", None)]);
        store.save("x", &first).unwrap();
        store.save("x", &sample()).unwrap();

        let path = store.path_for("x").unwrap();
        let backup = fs::read_to_string(backup_path(&path)).unwrap();
        assert_eq!(Snapshot::from_json_str(&backup).unwrap(), first);
        assert!(!dir.path().join("x.json.tmp").exists());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("broken.json"), r#"[{"名前": "x"}]"#).unwrap();
        let store = FileStore::new(dir.path(), SnapshotFormat::Json);

        match store.load("broken") {
            Err(StoreError::Malformed(SnapshotError::MalformedSnapshot { index, .. })) => {
                assert_eq!(index, Some(0))
            }
            other => panic!("expected malformed snapshot, got {:?}", other),
        }
    }

    #[test]
    fn rejects_path_like_names() {
        let store = FileStore::new("data", SnapshotFormat::Json);
        for name in ["", "../etc", "a/b", " padded", ".."] {
            assert!(matches!(store.path_for(name), Err(StoreError::InvalidName(_))), "{:?}", name);
        }
    }
}
