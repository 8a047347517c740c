//! Transactional access to the store
//!
//! A [`Database`] owns the in-memory [`Store`] and the file it is persisted
//! to. Mutations run through [`Database::transaction`]: the closure gets a
//! working copy, and only an `Ok` result replaces the live store and is
//! written to disk. Any error leaves both untouched.
//!
//! Several processes may open the same data directory. A transaction holds
//! an exclusive lock on `store.lock` from the moment it re-reads the store
//! until the new state is on disk, so unique constraints are always checked
//! against the latest committed state.

use std::path::{Path, PathBuf};

use fd_lock::RwLock;

use super::error::Result;
use super::persistence::{load_store, lock_path, open_lock_file, save_store, store_path};
use super::store::Store;

#[derive(Debug)]
pub struct Database {
    store: Store,
    path: PathBuf,
    lock_path: PathBuf,
}

impl Database {
    /// Opens (or starts) the store under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let path = store_path(data_dir);
        let store = load_store(&path).await?;
        tracing::debug!("Opened store at {}", path.display());
        Ok(Self {
            store,
            path,
            lock_path: lock_path(data_dir),
        })
    }

    /// Read-only view of the committed state
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `work` against the latest committed store and commits on success.
    ///
    /// Blocks until no other writer holds the store lock. The in-memory store
    /// is replaced only after the new state has been persisted, so a failed
    /// write also leaves it unchanged.
    pub async fn transaction<T, F>(&mut self, name: &str, work: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> Result<T>,
    {
        tracing::info!("Executing {name}");

        let mut lock = RwLock::new(open_lock_file(&self.lock_path)?);
        let _guard = lock.write()?;

        let mut working = load_store(&self.path).await?;
        let value = match work(&mut working) {
            Ok(value) => value,
            Err(e) => {
                tracing::info!("{name} rolled back: {e}");
                return Err(e);
            }
        };

        save_store(&self.path, &working).await?;
        self.store = working;

        tracing::info!("Done");
        Ok(value)
    }
}
