use crate::config::RecordingDuration;
use crate::profile::Mode;
use crate::session::SessionState;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// A session guarded by an async mutex. Holding the guard for the length of
/// a turn is what serializes turns for that session.
pub type SharedSession = Arc<tokio::sync::Mutex<SessionState>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-key session store for serving more than one user from one process.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SharedSession>>,
    default_mode: Mode,
    default_duration: RecordingDuration,
}

impl SessionRegistry {
    pub fn new(default_mode: Mode, default_duration: RecordingDuration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            default_mode,
            default_duration,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SharedSession>> {
        match self.sessions.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("session registry lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        }
    }

    pub fn get_or_create(&self, id: &SessionId) -> SharedSession {
        let mut sessions = self.lock();
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(session = %id, "creating session");
            Arc::new(tokio::sync::Mutex::new(SessionState::new(
                self.default_mode,
                self.default_duration,
            )))
        });
        Arc::clone(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_yields_same_session() {
        let reg = SessionRegistry::default();
        let id = SessionId::new("alice");
        let a = reg.get_or_create(&id);
        let b = reg.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);

        a.lock().await.set_mode(Mode::LeadGeneration);
        assert_eq!(b.lock().await.mode(), Mode::LeadGeneration);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_key() {
        let duration = RecordingDuration::new(10).unwrap();
        let reg = SessionRegistry::new(Mode::LeadGeneration, duration);
        let a = reg.get_or_create(&SessionId::new("a"));
        let b = reg.get_or_create(&SessionId::new("b"));

        a.lock().await.set_mode(Mode::CustomerService);
        assert_eq!(b.lock().await.mode(), Mode::LeadGeneration);
        assert_eq!(b.lock().await.recording_duration(), duration);
    }

    #[test]
    fn remove_drops_the_entry() {
        let reg = SessionRegistry::default();
        let id = SessionId::new("x");
        reg.get_or_create(&id);
        assert!(reg.remove(&id).is_some());
        assert!(reg.get(&id).is_none());
        assert!(reg.is_empty());
    }
}
