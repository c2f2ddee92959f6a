//! Persisted per-server identity keys (§4.L): the long-lived Ed25519
//! signing keypair and the Edwards-curve Diffie-Hellman keypair, stored as
//! raw 32-byte seeds with restrictive file permissions.

use std::fs;
use std::path::{Path, PathBuf};

use duskmesh_crypto::{random_bytes_32, EncryptionKeypair, SigningKeypair};
use thiserror::Error;
use tracing::info;

use crate::paths::{default_keystore_dir, ensure_dir_for};

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("failed to read key file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write key file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path:?} holds {len} bytes, expected 32")]
    BadLength { path: PathBuf, len: usize },
}

/// Default on-disk location for a named key, under [`default_keystore_dir`].
pub fn default_key_path(name: &str) -> PathBuf {
    default_keystore_dir().join(name)
}

fn load_or_generate(path: &Path) -> Result<[u8; 32], KeystoreError> {
    if path.exists() {
        let bytes = fs::read(path).map_err(|source| KeystoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let len = bytes.len();
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeystoreError::BadLength { path: path.to_path_buf(), len })?;
        Ok(array)
    } else {
        let bytes = random_bytes_32();
        save_keypair_bytes(path, &bytes)?;
        info!(path = %path.display(), "generated new keypair");
        Ok(bytes)
    }
}

/// Write `bytes` to `path`, creating the parent directory if needed and
/// restricting the file to owner-only read/write on Unix.
pub fn save_keypair_bytes(path: &Path, bytes: &[u8; 32]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir_for(parent).map_err(|source| KeystoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| KeystoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
            KeystoreError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }

    Ok(())
}

/// Load this server's Ed25519 signing keypair from `name` under the
/// default keystore directory, generating and persisting a fresh one if
/// none exists yet.
pub fn load_or_generate_signing_keypair(name: &str) -> Result<SigningKeypair, KeystoreError> {
    let bytes = load_or_generate(&default_key_path(name))?;
    Ok(SigningKeypair::from_bytes(&bytes))
}

/// Load this server's Diffie-Hellman keypair from `name` under the
/// default keystore directory, generating and persisting a fresh one if
/// none exists yet.
pub fn load_or_generate_dh_keypair(name: &str) -> Result<EncryptionKeypair, KeystoreError> {
    let bytes = load_or_generate(&default_key_path(name))?;
    Ok(EncryptionKeypair::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_shim::TempDir;

    mod tempfile_shim {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU32, Ordering};

        static COUNTER: AtomicU32 = AtomicU32::new(0);

        /// Minimal scratch-directory helper so these tests don't need a
        /// `tempfile` dev-dependency for one narrow use.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let n = COUNTER.fetch_add(1, Ordering::SeqCst);
                let dir = std::env::temp_dir()
                    .join(format!("duskmesh-keystore-test-{label}-{}-{n}", std::process::id()));
                std::fs::create_dir_all(&dir).unwrap();
                Self(dir)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn generates_and_reloads_a_consistent_signing_key() {
        let dir = TempDir::new("signing");
        let path = dir.path().join("signing.key");

        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_a_truncated_key_file() {
        let dir = TempDir::new("truncated");
        let path = dir.path().join("bad.key");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let result = load_or_generate(&path);
        assert!(matches!(result, Err(KeystoreError::BadLength { len: 10, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn persisted_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new("perms");
        let path = dir.path().join("signing.key");
        load_or_generate(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
