//! Explicit session context with a load/save/clear lifecycle.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::User;
use crate::store::{KeyValueStore, StoreError, keys, load_json, save_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub usuario: User,
    pub iniciada_em: DateTime<Utc>,
}

impl UserSession {
    pub fn started_now(usuario: User) -> Self {
        Self {
            usuario,
            iniciada_em: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no user is logged in")]
    NotLoggedIn,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Holds the signed-in user in memory and mirrors it to the store.
#[derive(Debug)]
pub struct SessionContext {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<UserSession>>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Reads the persisted session into memory. A stored value with an
    /// unreadable shape is discarded rather than failing startup.
    pub fn load(&self) -> Result<Option<UserSession>, StoreError> {
        let loaded = match load_json::<UserSession>(self.store.as_ref(), keys::USUARIO) {
            Ok(session) => session,
            Err(StoreError::Shape { message, .. }) => {
                tracing::warn!(reason = %message, "discarding unreadable stored session");
                self.store.remove(keys::USUARIO)?;
                None
            }
            Err(error) => return Err(error),
        };
        self.replace(loaded.clone());
        Ok(loaded)
    }

    pub fn save(&self, session: UserSession) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), keys::USUARIO, &session)?;
        tracing::info!(email = %session.usuario.email, "session saved");
        self.replace(Some(session));
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(keys::USUARIO)?;
        self.replace(None);
        Ok(())
    }

    #[must_use]
    pub fn current(&self) -> Option<UserSession> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn email(&self) -> Option<String> {
        self.current().map(|session| session.usuario.email)
    }

    pub fn require(&self) -> Result<UserSession, SessionError> {
        self.current().ok_or(SessionError::NotLoggedIn)
    }

    fn replace(&self, session: Option<UserSession>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn user() -> User {
        User {
            email: "diretora@escola.org".to_string(),
            nome: "Diretora".to_string(),
            perfil: "gestor".to_string(),
            escola: Some("EE Centro".to_string()),
        }
    }

    #[test]
    fn save_then_load_in_a_fresh_context() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        SessionContext::new(Arc::clone(&store))
            .save(UserSession::started_now(user()))
            .expect("save");

        let context = SessionContext::new(store);
        assert!(context.current().is_none());
        let loaded = context.load().expect("load").expect("session");
        assert_eq!(loaded.usuario, user());
        assert_eq!(context.email().as_deref(), Some("diretora@escola.org"));
    }

    #[test]
    fn clear_removes_memory_and_store_copies() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let context = SessionContext::new(Arc::clone(&store));
        context.save(UserSession::started_now(user())).expect("save");

        context.clear().expect("clear");

        assert!(matches!(context.require(), Err(SessionError::NotLoggedIn)));
        assert_eq!(store.get(keys::USUARIO).expect("get"), None);
    }

    #[test]
    fn unreadable_stored_session_is_discarded() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(keys::USUARIO, json!({"nome": 3})).expect("set");

        let context = SessionContext::new(Arc::clone(&store));
        assert_eq!(context.load().expect("load"), None);
        assert_eq!(store.get(keys::USUARIO).expect("get"), None);
    }
}
