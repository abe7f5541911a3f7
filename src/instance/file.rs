// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use crate::instance::traits::{InstanceError, InstanceStore};

/// Instance slot kept in a small text file holding the owner's id.
pub struct FileInstanceStore {
    path: PathBuf,
}

impl FileInstanceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> InstanceError + '_ {
    move |source| InstanceError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn parent_dir(path: &Path) -> Result<PathBuf, InstanceError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(InstanceError::MissingDirectory(parent));
    }
    Ok(parent)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), InstanceError> {
    let mut temp = NamedTempFile::new_in(parent_dir(path)?).map_err(write_err(path))?;
    temp.write_all(contents.as_bytes()).map_err(write_err(path))?;
    temp.as_file().sync_all().map_err(write_err(path))?;
    temp.persist(path).map_err(|e| write_err(path)(e.error))?;
    Ok(())
}

/// Remove the slot if `instance_id` owns it.
///
/// The slot is first renamed aside, so a claim written after that point lands
/// in a fresh file and is never deleted here. A foreign id found in the parked
/// file is linked back unless a newer claim already took its place. While
/// parked, readers see an empty slot.
fn release(path: &Path, instance_id: &str) -> Result<bool, InstanceError> {
    let mut parked_name = path.file_name().unwrap_or_default().to_os_string();
    parked_name.push(format!(".release-{instance_id}"));
    let parked = path.with_file_name(parked_name);

    match fs::rename(path, &parked) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(source) => return Err(write_err(path)(source)),
    }

    let owner = fs::read_to_string(&parked).map_err(|source| InstanceError::Read {
        path: parked.clone(),
        source,
    })?;
    if owner.trim() == instance_id {
        fs::remove_file(&parked).map_err(write_err(&parked))?;
        return Ok(true);
    }

    match fs::hard_link(&parked, path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        // No hard links on this filesystem
        Err(_) => {
            return fs::rename(&parked, path)
                .map(|()| false)
                .map_err(write_err(path));
        }
    }
    fs::remove_file(&parked).map_err(write_err(&parked))?;
    Ok(false)
}

#[async_trait]
impl InstanceStore for FileInstanceStore {
    async fn load(&self) -> Result<Option<String>, InstanceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(InstanceError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn store(&self, instance_id: &str) -> Result<(), InstanceError> {
        debug!(path = %self.path.display(), instance_id, "Writing instance slot");
        let path = self.path.clone();
        let contents = format!("{instance_id}\n");
        tokio::task::spawn_blocking(move || write_atomic(&path, &contents)).await?
    }

    async fn clear(&self) -> Result<(), InstanceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(InstanceError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn clear_if_owner(&self, instance_id: &str) -> Result<bool, InstanceError> {
        let path = self.path.clone();
        let instance_id = instance_id.to_string();
        tokio::task::spawn_blocking(move || release(&path, &instance_id)).await?
    }
}
