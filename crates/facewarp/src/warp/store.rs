//! Persistence of calibrated scales.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use super::calibration::{Scale, ScaleKey};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access scale store '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("scale store '{}' is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Key-value storage for the personal scales.
pub trait ScaleStore: Send {
    fn load(&self, key: ScaleKey) -> Result<Option<Scale>, StoreError>;
    fn save(&mut self, key: ScaleKey, scale: Scale) -> Result<(), StoreError>;
}

/// Keeps scales in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    scales: HashMap<ScaleKey, Scale>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScaleStore for MemoryStore {
    fn load(&self, key: ScaleKey) -> Result<Option<Scale>, StoreError> {
        Ok(self.scales.get(&key).copied())
    }

    fn save(&mut self, key: ScaleKey, scale: Scale) -> Result<(), StoreError> {
        self.scales.insert(key, scale);
        Ok(())
    }
}

/// Stores all scales in one JSON object, keyed by [`ScaleKey`].
///
/// The file is read once when the store is opened and rewritten on every save.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    scales: BTreeMap<ScaleKey, Scale>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let scales = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no scale store at '{}' yet", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self { path, scales })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.scales).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        // Replace atomically, readers never see a truncated store.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl ScaleStore for JsonFileStore {
    fn load(&self, key: ScaleKey) -> Result<Option<Scale>, StoreError> {
        Ok(self.scales.get(&key).copied())
    }

    fn save(&mut self, key: ScaleKey, scale: Scale) -> Result<(), StoreError> {
        self.scales.insert(key, scale);
        self.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("facewarp-store-{}-{}", std::process::id(), fastrand::u64(..)))
            .join(name)
    }

    #[test]
    fn file_store_persists() {
        let path = temp_path("scales.json");
        let scale = Scale([0.9, 1.0, 1.1, 1.0, 1.0, 1.0]);

        let mut store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.load(ScaleKey::Pretty).unwrap(), None);
        store.save(ScaleKey::Pretty, scale).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load(ScaleKey::Pretty).unwrap(), Some(scale));
        assert_eq!(reopened.load(ScaleKey::Handsome).unwrap(), None);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn keys_are_independent() {
        let path = temp_path("scales.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.save(ScaleKey::Pretty, Scale::ONE).unwrap();
        store
            .save(ScaleKey::Handsome, Scale([0.8; 6]))
            .unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.load(ScaleKey::Pretty).unwrap(), Some(Scale::ONE));
        assert_eq!(
            reopened.load(ScaleKey::Handsome).unwrap(),
            Some(Scale([0.8; 6]))
        );

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn corrupt_file() {
        let path = temp_path("scales.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
