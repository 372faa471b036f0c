//! Session Manager - token issuance, validation, renewal and reclamation
//!
//! Sessions live in a sharded concurrent map. Validation, renewal and expiry
//! of a token all happen while holding that token's entry lock, so concurrent
//! calls and the background sweep observe a single order of events.

use super::types::{ConnectionId, Session, SessionToken};
use crate::auth::{Identity, LockoutTable};
use crate::time::{to_chrono, Clock};
use crate::{AaaError, AaaResult};
use chrono::Duration;
use dashmap::DashMap;
use hookline_core::{spawn_periodic, PeriodicJob, SessionSettings};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SweeperHandle = PeriodicJob;

/// Concurrent session table
pub struct SessionManager {
    /// Live sessions keyed by raw token
    sessions: DashMap<String, Session>,
    lockouts: Arc<LockoutTable>,
    idle_timeout: Duration,
    renewal_threshold: Duration,
    max_lifetime: Duration,
    bind_to_connection: bool,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        settings: &SessionSettings,
        lockouts: Arc<LockoutTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            lockouts,
            idle_timeout: to_chrono(settings.idle_timeout()),
            renewal_threshold: to_chrono(settings.renewal_threshold()),
            max_lifetime: to_chrono(settings.max_lifetime()),
            bind_to_connection: settings.bind_to_connection,
            clock,
        }
    }

    /// Issue a session for an authenticated identity
    pub fn create_session(
        &self,
        identity: &Identity,
        connection_id: ConnectionId,
    ) -> AaaResult<Session> {
        let now = self.clock.now();
        if let Some(until) = self.lockouts.locked_until(&identity.name, now) {
            warn!(identity = %identity.name, %until, "Refusing session for locked identity");
            return Err(AaaError::IdentityLocked { until });
        }

        let session = Session {
            token: SessionToken::generate(),
            identity: identity.name.clone(),
            created_at: now,
            last_activity: now,
            expires_at: now + std::cmp::min(self.idle_timeout, self.max_lifetime),
            connection_id,
        };

        info!(
            identity = %session.identity,
            session = %session.token,
            connection = %session.connection_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        self.sessions
            .insert(session.token.as_str().to_string(), session.clone());
        Ok(session)
    }

    /// Validate a token, recording activity and renewing it near expiry
    pub fn validate(&self, token: &str) -> AaaResult<Session> {
        self.validate_inner(token, None)
    }

    /// Validate a token presented on `connection_id`
    ///
    /// When connection binding is enabled a token presented on a different
    /// connection is rejected with `NoSession` and left untouched.
    pub fn validate_for(&self, token: &str, connection_id: &ConnectionId) -> AaaResult<Session> {
        self.validate_inner(token, Some(connection_id))
    }

    fn validate_inner(&self, token: &str, connection_id: Option<&ConnectionId>) -> AaaResult<Session> {
        let now = self.clock.now();

        let Some(mut entry) = self.sessions.get_mut(token) else {
            return Err(AaaError::SessionNotFound);
        };

        if entry.is_expired(now) {
            let session = entry.token.clone();
            drop(entry);
            self.sessions.remove_if(token, |_, s| s.is_expired(now));
            debug!(%session, "Rejected expired session");
            return Err(AaaError::SessionExpired);
        }

        if let Some(connection_id) = connection_id {
            if self.bind_to_connection && entry.connection_id != *connection_id {
                warn!(
                    session = %entry.token,
                    bound = %entry.connection_id,
                    presented = %connection_id,
                    "Session presented on a foreign connection"
                );
                return Err(AaaError::NoSession);
            }
        }

        let session = entry.value_mut();
        session.last_activity = now;

        if session.remaining(now) <= self.renewal_threshold {
            let ceiling = session.created_at + self.max_lifetime;
            let renewed = std::cmp::min(now + self.idle_timeout, ceiling);
            if renewed > session.expires_at {
                debug!(session = %session.token, expires_at = %renewed, "Session renewed");
                session.expires_at = renewed;
            }
        }

        Ok(session.clone())
    }

    /// Remove a session; revoking an unknown token is not an error
    pub fn revoke(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                info!(identity = %session.identity, session = %session.token, "Session revoked");
                true
            }
            None => false,
        }
    }

    /// Revoke every session owned by an identity
    pub fn revoke_identity(&self, identity: &str) -> usize {
        let mut revoked = 0;
        self.sessions.retain(|_, session| {
            let keep = session.identity != identity;
            if !keep {
                revoked += 1;
            }
            keep
        });

        if revoked > 0 {
            info!(identity, revoked, "Revoked all sessions of identity");
        }
        revoked
    }

    /// Remove every session past its expiry
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn sessions_for(&self, identity: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|entry| entry.identity == identity)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start the background expiry sweep
    ///
    /// The job holds only a weak reference and stops when the handle is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> SweeperHandle {
        let manager = Arc::downgrade(self);
        spawn_periodic("session_sweep", interval, move || {
            let manager = manager.clone();
            async move {
                if let Some(manager) = manager.upgrade() {
                    let removed = manager.sweep_expired();
                    if removed > 0 {
                        info!(removed, remaining = manager.len(), "Swept expired sessions");
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .finish()
    }
}
