//! Utility functions for directory management
//!
//! Directories follow the XDG Base Directory specification:
//!
//! - Config: `~/.config/fwpolicy/` - `config.json`
//! - Data: `~/.local/share/fwpolicy/` - `store.json` and its checksum
//! - State: `~/.local/state/fwpolicy/` - audit log and application log
//!
//! # Example
//!
//! ```no_run
//! use fwpolicy::utils::{ensure_dir, get_data_dir};
//!
//! if let Some(data_path) = get_data_dir() {
//!     ensure_dir(&data_path).expect("Failed to create data directory");
//! }
//! ```

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "fwpolicy", "fwpolicy")
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().and_then(|pd| pd.state_dir().map(Path::to_path_buf))
}

/// Creates `dir` and its parents, owner-only on Unix.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        DirBuilder::new().mode(0o700).recursive(true).create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}
