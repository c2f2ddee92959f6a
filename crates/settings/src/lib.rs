//! Deployment configuration (§6): the JSON server-record/group-record
//! schema a coordinator hands a server process at startup, plus the key
//! material paths this server's own keystore should be loaded from.
//!
//! ## Usage
//!
//! ```no_run
//! use duskmesh_settings::DeploymentConfig;
//!
//! let config = DeploymentConfig::load_or_default()?;
//! for server in &config.servers {
//!     println!("{}: {}", server.id, server.address);
//! }
//! # Ok::<(), duskmesh_settings::SettingsError>(())
//! ```

mod config;

pub use config::{DeploymentConfig, GroupRecord, ServerRecord};

use std::path::PathBuf;

use thiserror::Error;
use duskmesh_keystore::default_config_dir;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Default deployment-config file path.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("deployment.json")
}
