//! Who may run what.

use std::collections::BTreeMap;

use cmdlink_types::config::PermissionSettings;
use cmdlink_types::error::{CmdlinkError, Result};
use cmdlink_types::message::PeerHandle;

/// Identity lookups the permission guard needs.
pub trait PeerDirectory {
    /// Admin level of a connected peer, or `None` if the peer is unknown.
    fn admin_level(&self, peer: PeerHandle) -> Option<u8>;

    /// Whether the world is locked down in guest mode.
    fn guest_mode(&self) -> bool {
        false
    }
}

/// Connected peers and their admin levels, plus the guest-mode flag.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: BTreeMap<PeerHandle, u8>,
    guest_mode: bool,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer, or update its admin level if already present.
    pub fn add(&mut self, peer: PeerHandle, admin_level: u8) {
        self.peers.insert(peer, admin_level);
    }

    pub fn remove(&mut self, peer: PeerHandle) -> bool {
        self.peers.remove(&peer).is_some()
    }

    /// Change an existing peer's admin level. Returns `false` if unknown.
    pub fn set_admin_level(&mut self, peer: PeerHandle, level: u8) -> bool {
        match self.peers.get_mut(&peer) {
            Some(l) => {
                *l = level;
                true
            },
            None => false,
        }
    }

    pub fn set_guest_mode(&mut self, enabled: bool) {
        self.guest_mode = enabled;
    }

    pub fn contains(&self, peer: PeerHandle) -> bool {
        self.peers.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers in handle order with their admin levels.
    pub fn iter(&self) -> impl Iterator<Item = (PeerHandle, u8)> + '_ {
        self.peers.iter().map(|(p, l)| (*p, *l))
    }
}

impl PeerDirectory for PeerTable {
    fn admin_level(&self, peer: PeerHandle) -> Option<u8> {
        self.peers.get(&peer).copied()
    }

    fn guest_mode(&self) -> bool {
        self.guest_mode
    }
}

/// Decides whether a sender may invoke a command.
#[derive(Debug, Clone, Default)]
pub struct PermissionGuard {
    settings: PermissionSettings,
}

impl PermissionGuard {
    pub fn new(settings: PermissionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PermissionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut PermissionSettings {
        &mut self.settings
    }

    /// Check `sender` against `command` (a canonical trigger name).
    ///
    /// Order: security off allows everything; unknown senders are denied;
    /// guest mode denies everyone; admins are allowed; everyone else gets
    /// the per-command setting, default deny.
    pub fn is_authorized(
        &self,
        sender: PeerHandle,
        command: &str,
        directory: &dyn PeerDirectory,
    ) -> bool {
        if !self.settings.security_enabled {
            return true;
        }
        let Some(level) = directory.admin_level(sender) else {
            log::debug!("denied '{command}' for unknown sender {sender}");
            return false;
        };
        if directory.guest_mode() {
            log::debug!("denied '{command}' for {sender}: guest mode");
            return false;
        }
        if level > 0 {
            return true;
        }
        let allowed = self.settings.command_allowed(command).unwrap_or(false);
        if !allowed {
            log::debug!("denied '{command}' for {sender}: not allowed for users");
        }
        allowed
    }

    /// Like [`PermissionGuard::is_authorized`], but as a `Result`.
    pub fn authorize(
        &self,
        sender: PeerHandle,
        command: &str,
        directory: &dyn PeerDirectory,
    ) -> Result<()> {
        if self.is_authorized(sender, command, directory) {
            Ok(())
        } else {
            Err(CmdlinkError::Permission(format!("{sender} may not run '{command}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: PeerHandle = PeerHandle(1);

    fn guard(security: bool) -> PermissionGuard {
        let mut settings = PermissionSettings::default();
        settings.set_security_enabled(security);
        settings.set_command_allowed("say", true);
        settings.set_command_allowed("kick", false);
        PermissionGuard::new(settings)
    }

    fn table(level: u8, guest: bool) -> PeerTable {
        let mut t = PeerTable::new();
        t.add(ALICE, level);
        t.set_guest_mode(guest);
        t
    }

    #[test]
    fn security_disabled_allows_everyone() {
        let g = guard(false);
        assert!(g.is_authorized(PeerHandle(99), "kick", &PeerTable::new()));
        assert!(g.is_authorized(ALICE, "anything", &table(0, true)));
    }

    #[test]
    fn unknown_sender_denied() {
        let g = guard(true);
        assert!(!g.is_authorized(PeerHandle(99), "say", &table(5, false)));
    }

    #[test]
    fn guest_mode_beats_admin_level() {
        let g = guard(true);
        assert!(!g.is_authorized(ALICE, "say", &table(5, true)));
        assert!(!g.is_authorized(ALICE, "kick", &table(5, true)));
    }

    #[test]
    fn admin_ignores_command_table() {
        let g = guard(true);
        assert!(g.is_authorized(ALICE, "kick", &table(5, false)));
        assert!(g.is_authorized(ALICE, "unlisted", &table(1, false)));
    }

    #[test]
    fn user_uses_command_table() {
        let g = guard(true);
        let t = table(0, false);
        assert!(g.is_authorized(ALICE, "say", &t));
        assert!(g.is_authorized(ALICE, "SAY", &t));
        assert!(!g.is_authorized(ALICE, "kick", &t));
        assert!(!g.is_authorized(ALICE, "unlisted", &t));
    }

    #[test]
    fn runtime_edit_takes_effect() {
        let mut g = guard(true);
        let t = table(0, false);
        g.settings_mut().set_command_allowed("kick", true);
        assert!(g.is_authorized(ALICE, "kick", &t));
        g.settings_mut().clear_command("kick");
        assert!(!g.is_authorized(ALICE, "kick", &t));
    }

    #[test]
    fn authorize_reports_denial() {
        let g = guard(true);
        let t = table(0, false);
        assert!(g.authorize(ALICE, "say", &t).is_ok());
        let err = g.authorize(ALICE, "kick", &t).unwrap_err();
        assert_eq!(err.to_string(), "permission denied: #1 may not run 'kick'");
    }

    #[test]
    fn peer_table_edits() {
        let mut t = PeerTable::new();
        assert!(!t.set_admin_level(ALICE, 3));
        t.add(ALICE, 0);
        assert!(t.set_admin_level(ALICE, 3));
        assert_eq!(t.admin_level(ALICE), Some(3));
        assert!(t.remove(ALICE));
        assert!(!t.contains(ALICE));
        assert!(t.is_empty());
    }
}
