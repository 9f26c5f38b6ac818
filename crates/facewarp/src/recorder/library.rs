//! The user's media library, where recordings and photos end up.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use facewarp_gpu::PixelBuffer;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to encode photo: {0}")]
    Image(#[from] image::ImageError),
    #[error("collection '{0}' does not exist")]
    NoCollection(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LibraryError + '_ {
    move |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A store of photos and videos, organized into named collections (albums).
pub trait MediaLibrary: Send + Sync {
    /// Makes sure a collection exists, creating it if needed.
    ///
    /// Returns `true` if the collection was created by this call.
    fn ensure_collection(&self, name: &str) -> Result<bool, LibraryError>;

    /// Moves a finished recording into a collection and returns its new location.
    fn import(&self, collection: &str, recording: &Path) -> Result<PathBuf, LibraryError>;

    /// Saves a still image into a collection and returns its location.
    fn save_photo(&self, collection: &str, photo: &PixelBuffer) -> Result<PathBuf, LibraryError>;
}

/// A [`MediaLibrary`] on the filesystem, with one subdirectory per collection.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection(&self, name: &str) -> Result<PathBuf, LibraryError> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(LibraryError::NoCollection(name.to_string()));
        }
        Ok(dir)
    }

    /// Returns the first `<prefix>-<n><suffix>` in `dir` that is not taken.
    fn unused_name(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
        (1..)
            .map(|n| dir.join(format!("{prefix}-{n:04}{suffix}")))
            .find(|path| !path.exists())
            .unwrap_or_else(|| dir.join(format!("{prefix}{suffix}")))
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn ensure_collection(&self, name: &str) -> Result<bool, LibraryError> {
        let dir = self.root.join(name);
        if dir.is_dir() {
            return Ok(false);
        }
        log::info!("collection '{name}' does not exist, creating it");
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(true)
    }

    fn import(&self, collection: &str, recording: &Path) -> Result<PathBuf, LibraryError> {
        let dir = self.collection(collection)?;
        let suffix = recording
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let dest = Self::unused_name(&dir, "video", &suffix);
        if fs::rename(recording, &dest).is_err() {
            // Different filesystem, copy instead.
            copy_recursive(recording, &dest)?;
            remove_any(recording)?;
        }
        log::info!("imported '{}' as '{}'", recording.display(), dest.display());
        Ok(dest)
    }

    fn save_photo(&self, collection: &str, photo: &PixelBuffer) -> Result<PathBuf, LibraryError> {
        let dir = self.collection(collection)?;
        let dest = Self::unused_name(&dir, "photo", ".png");
        let res = photo.resolution();
        image::save_buffer(
            &dest,
            photo.data(),
            res.width(),
            res.height(),
            image::ColorType::Rgba8,
        )?;
        log::info!("saved {res} photo to '{}'", dest.display());
        Ok(dest)
    }
}

fn copy_recursive(from: &Path, to: &Path) -> Result<(), LibraryError> {
    if from.is_dir() {
        fs::create_dir_all(to).map_err(io_err(to))?;
        for entry in fs::read_dir(from).map_err(io_err(from))? {
            let entry = entry.map_err(io_err(from))?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to).map_err(io_err(from))?;
    }
    Ok(())
}

/// Removes a file or a directory tree.
pub(crate) fn remove_any(path: &Path) -> Result<(), LibraryError> {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(LibraryError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}
