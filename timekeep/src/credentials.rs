use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::domain::UserId;

/// The authenticated user, as returned by login/register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(alias = "_id")]
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// A bearer token together with the user it was issued for.
///
/// The store holds `Option<Credential>`, so a token without a user (or the
/// reverse) cannot be represented.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub user: UserRef,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, user: UserRef) -> Self {
        Self {
            access_token: access_token.into(),
            user,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Durable side-store for the session, so it survives restarts.
pub trait SessionStorage: Send + Sync {
    fn load_credential(&self) -> anyhow::Result<Option<Credential>>;
    fn save_credential(&self, credential: &Credential) -> anyhow::Result<()>;
    /// Renewal cookies (`name`, `value`) the server set on the session.
    fn load_cookies(&self) -> anyhow::Result<Vec<(String, String)>>;
    fn save_cookies(&self, cookies: &[(String, String)]) -> anyhow::Result<()>;
    /// Remove both the credential and the cookies.
    fn clear(&self) -> anyhow::Result<()>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    credential: Mutex<Option<Credential>>,
    cookies: Mutex<Vec<(String, String)>>,
}

impl SessionStorage for MemoryStorage {
    fn load_credential(&self) -> anyhow::Result<Option<Credential>> {
        Ok(self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn load_cookies(&self) -> anyhow::Result<Vec<(String, String)>> {
        Ok(self
            .cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_cookies(&self, cookies: &[(String, String)]) -> anyhow::Result<()> {
        *self.cookies.lock().unwrap_or_else(PoisonError::into_inner) = cookies.to_vec();
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// Holder of the current session, shared by the transport and its callers.
///
/// Cloning is cheap and every clone observes the same state. Writes go to
/// memory first and are then persisted; a persistence failure is logged and
/// leaves the in-memory state in place.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<RwLock<Option<Credential>>>,
    storage: Arc<dyn SessionStorage>,
}

impl CredentialStore {
    /// Open a store backed by `storage`, picking up any persisted session.
    pub fn open(storage: Arc<dyn SessionStorage>) -> Self {
        let initial = match storage.load_credential() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!("Failed to load persisted session: {:#}", e);
                None
            }
        };

        Self {
            state: Arc::new(RwLock::new(initial)),
            storage,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStorage::default()))
    }

    pub fn get(&self) -> Option<Credential> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set(&self, credential: Credential) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.storage.save_credential(&credential) {
            tracing::error!("Failed to persist session: {:#}", e);
        }
        *state = Some(credential);
    }

    /// Swap the access token of the current session, keeping its user.
    ///
    /// Returns `None` (and changes nothing) when no session exists.
    pub fn replace_token(&self, access_token: impl Into<String>) -> Option<Credential> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let user = state.as_ref()?.user.clone();
        let credential = Credential::new(access_token, user);
        if let Err(e) = self.storage.save_credential(&credential) {
            tracing::error!("Failed to persist renewed session: {:#}", e);
        }
        *state = Some(credential.clone());
        Some(credential)
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = None;
        if let Err(e) = self.storage.clear() {
            tracing::error!("Failed to remove persisted session: {:#}", e);
        }
    }

    pub fn renewal_cookies(&self) -> Vec<(String, String)> {
        self.storage.load_cookies().unwrap_or_else(|e| {
            tracing::warn!("Failed to load renewal cookies: {:#}", e);
            Vec::new()
        })
    }

    pub fn set_renewal_cookies(&self, cookies: &[(String, String)]) {
        if let Err(e) = self.storage.save_cookies(cookies) {
            tracing::error!("Failed to persist renewal cookies: {:#}", e);
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn user() -> UserRef {
        UserRef {
            id: UserId::new("u1"),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn load_credential(&self) -> anyhow::Result<Option<Credential>> {
            anyhow::bail!("disk unavailable")
        }
        fn save_credential(&self, _: &Credential) -> anyhow::Result<()> {
            anyhow::bail!("disk unavailable")
        }
        fn load_cookies(&self) -> anyhow::Result<Vec<(String, String)>> {
            anyhow::bail!("disk unavailable")
        }
        fn save_cookies(&self, _: &[(String, String)]) -> anyhow::Result<()> {
            anyhow::bail!("disk unavailable")
        }
        fn clear(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk unavailable")
        }
    }

    #[test]
    fn set_then_get_returns_same_credential() {
        let store = CredentialStore::in_memory();
        store.set(Credential::new("t1", user()));
        assert_eq!(store.get(), Some(Credential::new("t1", user())));
        assert_eq!(store.access_token().as_deref(), Some("t1"));

        store.clear();
        assert_eq!(store.get(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn clones_share_state() {
        let store = CredentialStore::in_memory();
        let other = store.clone();
        store.set(Credential::new("t1", user()));
        assert!(other.is_authenticated());
        other.clear();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn session_survives_reopen() {
        let storage = Arc::new(MemoryStorage::default());
        let store = CredentialStore::open(storage.clone());
        store.set(Credential::new("t1", user()));
        store.set_renewal_cookies(&[("refreshToken".to_string(), "r1".to_string())]);

        let reopened = CredentialStore::open(storage.clone());
        assert_eq!(reopened.get(), Some(Credential::new("t1", user())));
        assert_eq!(reopened.renewal_cookies().len(), 1);

        reopened.clear();
        assert!(CredentialStore::open(storage).get().is_none());
    }

    #[test]
    fn replace_token_keeps_user() {
        let store = CredentialStore::in_memory();
        assert!(store.replace_token("t2").is_none());
        assert!(store.get().is_none());

        store.set(Credential::new("t1", user()));
        let renewed = store.replace_token("t2").unwrap();
        assert_eq!(renewed.access_token, "t2");
        assert_eq!(renewed.user, user());
        assert_eq!(store.get(), Some(renewed));
    }

    #[test]
    fn storage_failures_do_not_lose_memory_state() {
        let store = CredentialStore::open(Arc::new(BrokenStorage));
        assert!(store.get().is_none());

        store.set(Credential::new("t1", user()));
        assert_eq!(store.access_token().as_deref(), Some("t1"));
        assert!(store.renewal_cookies().is_empty());

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", Credential::new("secret-token", user()));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn credential_uses_service_field_names() {
        let json = serde_json::to_value(Credential::new("t1", user())).unwrap();
        assert_eq!(json["accessToken"], "t1");
        assert_eq!(json["user"]["username"], "ada");
    }
}
