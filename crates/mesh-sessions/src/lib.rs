//! The session store (C3): opaque session ids issued on a shared-key
//! handshake, validated on every subsequent call.
//!
//! A deliberately slimmed adaptation of `sa-sessions::store::SessionStore`:
//! same `RwLock<HashMap>` + `resolve_or_create`-style shape, scoped to
//! exactly the `Session` data model in spec §3 (session id, device name,
//! created-at). The teacher's identity resolution, usage accounting,
//! transcript directories, and session search have no counterpart in the
//! spec and are not carried here (see DESIGN.md).

use std::collections::HashMap;
use std::sync::RwLock;

use mesh_domain::session::Session;
use mesh_domain::{Error, Result};
use uuid::Uuid;

/// Process-wide session table, keyed by session id. Sessions never expire
/// in the core (spec §4.3: "expiry policy is an external concern").
pub struct SessionStore {
    shared_key: String,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(shared_key: impl Into<String>) -> Self {
        Self {
            shared_key: shared_key.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// `CreateSession(name, key)`: issues a new opaque session id if `key`
    /// matches the coordinator's configured shared key, else fails with
    /// `unauthenticated`.
    pub fn create_session(&self, device_name: &str, key: &str) -> Result<Session> {
        if key != self.shared_key {
            return Err(Error::unauthenticated("session key does not match"));
        }
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            device_name: device_name.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    /// `Heartbeat(session_id)`: validates presence without refreshing or
    /// mutating anything — the spec's `Session` has no expiry to bump.
    pub fn heartbeat(&self, session_id: &str) -> Result<()> {
        self.resolve(session_id).map(|_| ())
    }

    /// Resolve a session id, failing with `unauthenticated` on an unknown
    /// id — the contract every non-lifecycle RPC call in §4.7 relies on.
    pub fn resolve(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .read()
            .expect("session lock poisoned")
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::unauthenticated("unknown session"))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_with_correct_key_succeeds() {
        let store = SessionStore::new("dev");
        let session = store.create_session("laptop", "dev").unwrap();
        assert_eq!(session.device_name, "laptop");
        assert!(!session.session_id.is_empty());
    }

    #[test]
    fn create_session_with_wrong_key_is_unauthenticated() {
        let store = SessionStore::new("dev");
        let err = store.create_session("laptop", "wrong").unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::Unauthenticated);
    }

    #[test]
    fn heartbeat_on_unknown_session_is_unauthenticated() {
        let store = SessionStore::new("dev");
        let err = store.heartbeat("ghost").unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::Unauthenticated);
    }

    #[test]
    fn heartbeat_on_known_session_succeeds() {
        let store = SessionStore::new("dev");
        let session = store.create_session("laptop", "dev").unwrap();
        store.heartbeat(&session.session_id).unwrap();
    }

    #[test]
    fn every_session_id_is_unique() {
        let store = SessionStore::new("dev");
        let a = store.create_session("laptop", "dev").unwrap();
        let b = store.create_session("laptop", "dev").unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(store.len(), 2);
    }
}
