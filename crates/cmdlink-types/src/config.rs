//! Configuration loaded from `cmdlink.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CmdlinkError, Result};

/// Default capacity of the inbound message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default TCP port for server and client modes.
pub const DEFAULT_PORT: u16 = 7777;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CmdlinkConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub permissions: PermissionSettings,
    #[serde(default)]
    pub session: SessionConfig,
}

impl CmdlinkConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: CmdlinkConfig =
            toml::from_str(text).map_err(|e| CmdlinkError::Config(format!("cmdlink.toml: {e}")))?;
        config.permissions.normalize();
        if config.network.queue_capacity == 0 {
            return Err(CmdlinkError::Config(
                "network.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Frame-layer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Ticks after which an unfinished assembly is dropped (0 = never).
    #[serde(default)]
    pub stale_assembly_ticks: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stale_assembly_ticks: 0,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// World/session state consulted by the permission guard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Guest mode denies every gated command regardless of admin level.
    #[serde(default)]
    pub guest_mode: bool,
    /// Admin level assigned to newly connected peers.
    #[serde(default)]
    pub default_admin_level: u8,
}

/// Command permission settings. Loaded once at startup, editable at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionSettings {
    #[serde(default = "yes")]
    pub security_enabled: bool,
    #[serde(default)]
    pub allow_unknown_client_commands: bool,
    /// Whether non-admin users may run a command, keyed by trigger name.
    #[serde(default, rename = "commands")]
    per_command_user_allowed: HashMap<String, bool>,
}

fn yes() -> bool {
    true
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            security_enabled: true,
            allow_unknown_client_commands: false,
            per_command_user_allowed: HashMap::new(),
        }
    }
}

impl PermissionSettings {
    /// Trigger names compare case-insensitively, so keys are stored lowercase.
    fn normalize(&mut self) {
        self.per_command_user_allowed = self
            .per_command_user_allowed
            .drain()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
    }

    /// Recorded user permission for a command, if any.
    pub fn command_allowed(&self, trigger: &str) -> Option<bool> {
        self.per_command_user_allowed
            .get(&trigger.to_lowercase())
            .copied()
    }

    pub fn set_command_allowed(&mut self, trigger: &str, allowed: bool) {
        self.per_command_user_allowed
            .insert(trigger.to_lowercase(), allowed);
    }

    /// Forget the recorded permission, reverting the command to default-deny.
    pub fn clear_command(&mut self, trigger: &str) -> bool {
        self.per_command_user_allowed
            .remove(&trigger.to_lowercase())
            .is_some()
    }

    pub fn set_security_enabled(&mut self, enabled: bool) {
        self.security_enabled = enabled;
    }

    pub fn set_allow_unknown_client_commands(&mut self, allow: bool) {
        self.allow_unknown_client_commands = allow;
    }

    /// All recorded entries, sorted by trigger name.
    pub fn entries(&self) -> Vec<(&str, bool)> {
        let mut entries: Vec<(&str, bool)> = self
            .per_command_user_allowed
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = CmdlinkConfig::from_toml_str("").unwrap();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.queue_capacity, 10);
        assert_eq!(config.network.stale_assembly_ticks, 0);
        assert!(config.permissions.security_enabled);
        assert!(!config.permissions.allow_unknown_client_commands);
        assert!(!config.session.guest_mode);
        assert_eq!(config.session.default_admin_level, 0);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[network]
port = 9100
queue_capacity = 4
stale_assembly_ticks = 30

[permissions]
security_enabled = false
allow_unknown_client_commands = true

[permissions.commands]
Kick = false
say = true

[session]
guest_mode = true
default_admin_level = 2
"#;
        let config = CmdlinkConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.network.port, 9100);
        assert_eq!(config.network.queue_capacity, 4);
        assert_eq!(config.network.stale_assembly_ticks, 30);
        assert!(!config.permissions.security_enabled);
        assert!(config.permissions.allow_unknown_client_commands);
        assert_eq!(config.permissions.command_allowed("kick"), Some(false));
        assert_eq!(config.permissions.command_allowed("SAY"), Some(true));
        assert!(config.session.guest_mode);
        assert_eq!(config.session.default_admin_level, 2);
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let err = CmdlinkConfig::from_toml_str("[network]\nqueue_capacity = 0\n").unwrap_err();
        assert!(matches!(err, CmdlinkError::Config(_)));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = CmdlinkConfig::from_toml_str("[network\nport = 1").unwrap_err();
        assert!(format!("{err}").contains("cmdlink.toml"));
    }

    #[test]
    fn runtime_edits() {
        let mut perms = PermissionSettings::default();
        assert_eq!(perms.command_allowed("tp"), None);
        perms.set_command_allowed("TP", true);
        assert_eq!(perms.command_allowed("tp"), Some(true));
        assert!(perms.clear_command("tp"));
        assert!(!perms.clear_command("tp"));
        assert_eq!(perms.command_allowed("tp"), None);
        perms.set_security_enabled(false);
        assert!(!perms.security_enabled);
    }

    #[test]
    fn entries_sorted() {
        let mut perms = PermissionSettings::default();
        perms.set_command_allowed("zeta", false);
        perms.set_command_allowed("alpha", true);
        assert_eq!(perms.entries(), vec![("alpha", true), ("zeta", false)]);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdlink.toml");
        std::fs::write(&path, "[session]\nguest_mode = true\n").unwrap();
        let config = CmdlinkConfig::load(&path).unwrap();
        assert!(config.session.guest_mode);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = CmdlinkConfig::load(Path::new("/nonexistent/cmdlink.toml")).unwrap_err();
        assert!(matches!(err, CmdlinkError::Io(_)));
    }
}
