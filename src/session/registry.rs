use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{DeviceId, Session, SessionStatus};
use super::SessionError;

/// Shared handle to one session. The mutex serializes every per-device
/// mutation: tick appends, batch-clears, and stop drains.
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory registry of active collection sessions.
///
/// The registry map is the one piece of shared mutable state in the
/// collector; map-level operations hold the outer lock, per-session
/// mutations hold the session mutex, and no lock is held across IO.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<DeviceId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. The duplicate check and the insert happen
    /// under one write lock, so two concurrent starts for the same device
    /// cannot both succeed.
    pub fn insert(&self, session: Session) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.device_id) {
            return Err(SessionError::AlreadyActive(session.device_id));
        }
        let device_id = session.device_id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(device_id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, device_id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(device_id).cloned()
    }

    /// Remove a session from the registry, returning its handle for the
    /// caller to drain
    pub fn remove(&self, device_id: &str) -> Option<SessionHandle> {
        self.sessions.write().remove(device_id)
    }

    /// Remove every session at once (graceful-shutdown drain)
    pub fn remove_all(&self) -> Vec<SessionHandle> {
        let mut sessions = self.sessions.write();
        sessions.drain().map(|(_, handle)| handle).collect()
    }

    /// Snapshot the active sessions for iteration. Ticks iterate the
    /// snapshot so concurrent starts and stops never invalidate the loop.
    pub fn snapshot(&self) -> Vec<(DeviceId, SessionHandle)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn list(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn status(&self, device_id: &str) -> Option<SessionStatus> {
        self.get(device_id).map(|handle| handle.lock().status())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = SessionRegistry::new();
        registry
            .insert(Session::new("dev-a".to_string(), "hash".to_string()))
            .unwrap();

        assert!(registry.get("dev-a").is_some());
        assert!(registry.get("dev-b").is_none());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let registry = SessionRegistry::new();
        registry
            .insert(Session::new("dev-a".to_string(), "hash".to_string()))
            .unwrap();

        let err = registry
            .insert(Session::new("dev-a".to_string(), "hash".to_string()))
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive(_)));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_concurrent_insert_single_winner() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry
                    .insert(Session::new("dev-a".to_string(), "hash".to_string()))
                    .is_ok()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        registry
            .insert(Session::new("dev-a".to_string(), "hash".to_string()))
            .unwrap();

        assert!(registry.remove("dev-a").is_some());
        assert!(registry.remove("dev-a").is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = SessionRegistry::new();
        for id in ["dev-c", "dev-a", "dev-b"] {
            registry
                .insert(Session::new(id.to_string(), "hash".to_string()))
                .unwrap();
        }
        assert_eq!(registry.list(), vec!["dev-a", "dev-b", "dev-c"]);
    }

    #[test]
    fn test_status_reflects_buffer() {
        let registry = SessionRegistry::new();
        let handle = registry
            .insert(Session::new("dev-a".to_string(), "hash".to_string()))
            .unwrap();

        {
            let mut session = handle.lock();
            session.append(crate::session::Reading {
                device_id: "dev-a".to_string(),
                value: 21.5,
                unit: "celsius".to_string(),
                collected_at: chrono::Utc::now(),
                location: None,
            });
        }

        let status = registry.status("dev-a").unwrap();
        assert!(status.active);
        assert_eq!(status.buffer_size, 1);
        assert_eq!(status.batch_count, 0);
        assert!(status.last_reading_at.is_some());
    }
}
