//! Durable checkpoint blobs.
//!
//! Parameters and loss histories are stored as `bincode` blobs. Writes go to
//! a sibling `*.tmp` file that is renamed over the target, so a crash leaves
//! either the previous blob or the new one, never a torn file. Floats are
//! stored bit-for-bit; `+∞` losses survive a round trip.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::training::{callback::LossHistory, errors::PersistError};

pub fn save_params(path: &Path, params: &[f64]) -> Result<(), PersistError> {
    write_blob(path, params)
}

pub fn load_params(path: &Path) -> Result<Vec<f64>, PersistError> {
    read_blob(path)
}

pub fn save_history(path: &Path, history: &LossHistory) -> Result<(), PersistError> {
    write_blob(path, history)
}

pub fn load_history(path: &Path) -> Result<LossHistory, PersistError> {
    read_blob(path)
}

fn write_blob<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = bincode::serialize(value)
        .map_err(|source| PersistError::Encode { path: path.to_path_buf(), source })?;
    write_atomic(path, &bytes)
}

fn read_blob<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let bytes = fs::read(path).map_err(|source| PersistError::Io { path: path.to_path_buf(), source })?;
    bincode::deserialize(&bytes).map_err(|source| PersistError::Decode { path: path.to_path_buf(), source })
}

/// Write `bytes` to `path` through a temporary sibling file.
///
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| PersistError::Io { path, source }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
