//! Cross-platform path helpers: `~`/`$HOME`-expansion and this workspace's
//! default on-disk locations for keys and settings.

use std::path::{Path, PathBuf};

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~` (or `~/...`) to the current user's home directory.
/// Paths without a leading `~` pass through unchanged.
pub fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) => home_dir().join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

/// Default directory for this server's persisted keypairs:
/// `~/.duskmesh/keys`.
pub fn default_keystore_dir() -> PathBuf {
    expand_path("~/.duskmesh/keys")
}

/// Default directory for this server's JSON configuration:
/// `~/.duskmesh/config`.
pub fn default_config_dir() -> PathBuf {
    expand_path("~/.duskmesh/config")
}

/// Join a file name onto a directory, creating the directory first if it
/// does not yet exist.
pub fn ensure_dir_for(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
