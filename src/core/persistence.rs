//! On-disk persistence of the [`Store`]
//!
//! The store is written as pretty JSON next to a `.sha256` checksum file.
//! Writes go through a temp file that is renamed into place, so readers never
//! observe a half-written store. Writers serialize on an advisory lock over
//! `store.lock` in the same directory (see [`open_lock_file`]).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::Result;
use super::store::Store;

pub const STORE_FILE_NAME: &str = "store.json";
pub const LOCK_FILE_NAME: &str = "store.lock";

pub fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORE_FILE_NAME)
}

pub fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCK_FILE_NAME)
}

/// Opens (creating if needed) the file writers lock before touching the store.
pub fn open_lock_file(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).truncate(false).write(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut checksum_path = path.to_path_buf();
    checksum_path.set_extension("json.sha256");
    checksum_path
}

fn checksum(json: &str) -> String {
    format!("{:x}", Sha256::digest(json.as_bytes()))
}

/// Loads the store at `path`, or an empty store if the file does not exist.
///
/// A checksum mismatch is logged and otherwise ignored; the file may have
/// been edited by hand.
pub async fn load_store(path: &Path) -> Result<Store> {
    if !tokio::fs::try_exists(path).await? {
        tracing::debug!("No store at {}, starting empty", path.display());
        return Ok(Store::new());
    }

    let json = tokio::fs::read_to_string(path).await?;

    if let Ok(expected) = tokio::fs::read_to_string(checksum_path(path)).await {
        let actual = checksum(&json);
        if expected.trim() != actual {
            tracing::warn!(
                "Store {} checksum mismatch (expected: {}, got: {})",
                path.display(),
                expected.trim(),
                actual
            );
        }
    }

    Ok(serde_json::from_str(&json)?)
}

/// Atomically writes `store` to `path` and refreshes its checksum.
pub async fn save_store(path: &Path, store: &Store) -> Result<()> {
    let json = serde_json::to_string_pretty(store)?;

    let mut temp_path = path.to_path_buf();
    temp_path.set_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        tokio::fs::write(&temp_path, &json).await?;
    }

    tokio::fs::rename(&temp_path, path).await?;
    tokio::fs::write(checksum_path(path), checksum(&json)).await?;

    Ok(())
}
