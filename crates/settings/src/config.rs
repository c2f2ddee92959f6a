//! Configuration types (§6)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use duskmesh_core::{GroupId, ServerId};

use crate::{default_settings_path, Result, SettingsError};

/// One server's network address and key material, as handed out by the
/// coordinator when a deployment is configured (§6 server record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub address: String,
    pub id: ServerId,
    /// This server's Ed25519 public signing key, hex-encoded.
    pub identity: String,
    /// This server's Ed25519 secret signing key, hex-encoded. Present only
    /// in a server's own copy of its record, never in peers' copies.
    #[serde(default)]
    pub private_identity: Option<String>,
    /// This server's public Diffie-Hellman key (Edwards curve), hex-encoded.
    pub public_key: String,
    /// This server's secret Diffie-Hellman key, hex-encoded. Present
    /// only in a server's own copy of its record.
    #[serde(default)]
    pub private_key: Option<String>,
    /// This server's share of a token-signing verification key, hex-encoded.
    pub verification_key: String,
    /// This server's share of the combined token-signing key, hex-encoded.
    /// Present only in a server's own copy of its record.
    #[serde(default)]
    pub signature_key: Option<String>,
}

/// One anytrust group's membership (§6 group record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub gid: GroupId,
    pub servers: Vec<ServerId>,
}

/// The full deployment configuration a server process loads at startup:
/// every server's record and every anytrust group's membership. This is a
/// thin descendant of the prototype's own server/group config records; it
/// intentionally does not reimplement the prototype's bin-size simulation
/// config or SSH-orchestration config, which remain external-collaborator
/// concerns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    /// Path this config was loaded from, if any; used by `save` to write
    /// back to the same location it came from. Not persisted.
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl DeploymentConfig {
    /// Load from the default path, or return an empty configuration if no
    /// file exists there yet.
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut config: DeploymentConfig =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            config.config_path = Some(path.clone());
            info!(path = %path.display(), "loaded deployment config");
            Ok(config)
        } else {
            let mut config = Self::default();
            config.config_path = Some(path.clone());
            Ok(config)
        }
    }

    /// Save to the path this config was loaded from, or the default path
    /// if it was constructed fresh.
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }
        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!(path = %path.display(), "saved deployment config");
        Ok(())
    }

    pub fn group_for(&self, gid: GroupId) -> Option<&GroupRecord> {
        self.groups.iter().find(|g| g.gid == gid)
    }

    pub fn server_for(&self, id: ServerId) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentConfig {
        DeploymentConfig {
            servers: vec![ServerRecord {
                address: "127.0.0.1:9001".into(),
                id: 0,
                identity: "aa".repeat(32),
                private_identity: None,
                public_key: "bb".repeat(32),
                private_key: None,
                verification_key: "cc".repeat(32),
                signature_key: None,
            }],
            groups: vec![GroupRecord { gid: 0, servers: vec![0] }],
            config_path: None,
        }
    }

    #[test]
    fn default_config_is_empty() {
        let config = DeploymentConfig::default();
        assert!(config.servers.is_empty());
        assert!(config.groups.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let config = sample();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DeploymentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.servers[0].address, config.servers[0].address);
        assert_eq!(parsed.groups[0].servers, config.groups[0].servers);
    }

    #[test]
    fn server_for_finds_matching_id() {
        let config = sample();
        assert!(config.server_for(0).is_some());
        assert!(config.server_for(7).is_none());
    }

    #[test]
    fn group_for_finds_matching_gid() {
        let config = sample();
        assert!(config.group_for(0).is_some());
        assert!(config.group_for(9).is_none());
    }
}
