//! Purpose: Key-value persistence media that snapshots are written to.
//! Exports: `Medium`, `MemoryMedium`, `FileMedium`.
//! Role: External boundary; the store only ever sees whole encoded snapshots.
//! Invariants: `set` is a full overwrite; readers never observe a partial value.
//! Invariants: `FileMedium` writes via temp file + rename under an exclusive lock.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::core::error::{Error, ErrorKind};

const FILE_EXTENSION: &str = "basalt";
const LOCK_FILE: &str = ".basalt.lock";

pub trait Medium {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&mut self, key: &str) -> Result<(), Error>;
}

impl<M: Medium + ?Sized> Medium for &mut M {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        (**self).remove(key)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryMedium {
    entries: BTreeMap<String, String>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Medium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for_key(key))
    }

    fn ensure_dir(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir).map_err(|err| io_error(err, "failed to create store directory", &self.dir))
    }

    fn lock(&self) -> Result<WriteLock, Error> {
        self.ensure_dir()?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| io_error(err, "failed to open lock file", &path))?;
        file.lock_exclusive()
            .map_err(|err| io_error(err, "failed to lock store directory", &path))?;
        Ok(WriteLock { file })
    }
}

struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Medium for FileMedium {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(err, "failed to read value", &path).with_key(key)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let _lock = self.lock()?;
        let path = self.path_for(key);
        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|err| io_error(err, "failed to create temp file", &self.dir))?;
        temp.write_all(value.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| io_error(err, "failed to write value", temp.path()).with_key(key))?;
        temp.persist(&path)
            .map_err(|err| io_error(err.error, "failed to replace value", &path).with_key(key))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        let _lock = self.lock()?;
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(err, "failed to remove value", &path).with_key(key)),
        }
    }
}

/// Plain keys map to `<key>.basalt`; anything else is hashed so keys never escape the directory.
fn file_name_for_key(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if plain {
        return format!("{key}.{FILE_EXTENSION}");
    }
    let digest = Sha256::digest(key.as_bytes());
    let hex = digest.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
    format!("h-{hex}.{FILE_EXTENSION}")
}

fn io_error(err: io::Error, message: &str, path: &Path) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(format!("{message} ({})", path.display()))
        .with_source(err)
}
