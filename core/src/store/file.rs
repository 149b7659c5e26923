use crate::prelude::{ReconError, ReconResult};
use crate::store::name_store::NameStore;
use async_trait::async_trait;
use log::debug;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

/// Directory-backed store holding one `<key>.json` file per key.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers observe either the old or the new document.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> ReconResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| {
            ReconError::StoreWrite(format!("creating store dir {}: {}", root.display(), err))
        })?;
        Ok(Self { root })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

fn read_document(path: &Path) -> ReconResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ReconError::StoreRead(format!(
            "reading {}: {}",
            path.display(),
            err
        ))),
    }
}

fn write_atomic(root: &Path, target: &Path, value: &str) -> ReconResult<()> {
    let mut temp = NamedTempFile::new_in(root)
        .map_err(|err| ReconError::StoreWrite(format!("creating temp file: {}", err)))?;
    temp.write_all(value.as_bytes())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|err| ReconError::StoreWrite(format!("writing {}: {}", target.display(), err)))?;
    temp.persist(target).map_err(|err| {
        ReconError::StoreWrite(format!("replacing {}: {}", target.display(), err.error))
    })?;
    debug!("stored {} bytes under {}", value.len(), target.display());
    Ok(())
}

// File I/O runs on the blocking pool, off the runtime workers.
#[async_trait]
impl NameStore for FileStore {
    async fn get(&self, key: &str) -> ReconResult<Option<String>> {
        let path = self.path_for(key);
        task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|err| ReconError::StoreRead(format!("read task failed: {}", err)))?
    }

    async fn set(&self, key: &str, value: &str) -> ReconResult<()> {
        let root = self.root.clone();
        let target = self.path_for(key);
        let value = value.to_string();
        task::spawn_blocking(move || write_atomic(&root, &target, &value))
            .await
            .map_err(|err| ReconError::StoreWrite(format!("write task failed: {}", err)))?
    }
}
