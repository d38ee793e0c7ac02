//! Transient per-player session state
//!
//! Who is online, when they last logged in, and the per-session
//! overrides (ignore-trust and admin mode). Sessions are never
//! persisted; overrides reset on every login and logout.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use freehold_core::PlayerId;

#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub online: bool,
    pub last_login: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Bypass all trust checks (administrators working inside claims)
    pub ignore_trust: bool,
    /// Act with administrative rights on store operations
    pub admin_mode: bool,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<PlayerId, PlayerSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a player online with a fresh session
    pub fn login(&self, player: &PlayerId, now: DateTime<Utc>) {
        debug!(player = %player, "session login");
        self.sessions.insert(
            player.clone(),
            PlayerSession {
                online: true,
                last_login: now,
                last_seen: now,
                ignore_trust: false,
                admin_mode: false,
            },
        );
    }

    /// Mark a player offline, dropping session overrides
    pub fn logout(&self, player: &PlayerId, now: DateTime<Utc>) {
        if let Some(mut session) = self.sessions.get_mut(player) {
            debug!(player = %player, "session logout");
            session.online = false;
            session.last_seen = now;
            session.ignore_trust = false;
            session.admin_mode = false;
        }
    }

    pub fn is_online(&self, player: &PlayerId) -> bool {
        self.sessions
            .get(player)
            .map(|s| s.online)
            .unwrap_or(false)
    }

    /// Toggle the ignore-trust override; returns the new value, or
    /// `None` if the player has no session
    pub fn set_ignore_trust(&self, player: &PlayerId, enabled: bool) -> Option<bool> {
        let mut session = self.sessions.get_mut(player)?;
        session.ignore_trust = enabled;
        Some(session.ignore_trust)
    }

    pub fn set_admin_mode(&self, player: &PlayerId, enabled: bool) -> Option<bool> {
        let mut session = self.sessions.get_mut(player)?;
        session.admin_mode = enabled;
        Some(session.admin_mode)
    }

    /// Whether the player's active session bypasses trust checks
    pub fn ignores_trust(&self, player: &PlayerId) -> bool {
        self.sessions
            .get(player)
            .map(|s| s.online && s.ignore_trust)
            .unwrap_or(false)
    }

    /// Whether the player's active session carries administrative rights
    pub fn is_admin(&self, player: &PlayerId) -> bool {
        self.sessions
            .get(player)
            .map(|s| s.online && s.admin_mode)
            .unwrap_or(false)
    }

    pub fn last_login(&self, player: &PlayerId) -> Option<DateTime<Utc>> {
        self.sessions.get(player).map(|s| s.last_login)
    }

    /// Every player currently online
    pub fn online_players(&self) -> Vec<PlayerId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().online)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
