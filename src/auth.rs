//! Credential checking and session tracking.
//!
//! The engine only stores password hashes; hashing and verification live
//! here. Sessions are in-memory tokens with a pluggable expiry policy, so
//! the embedding application decides whether logins time out.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::{Ms, Role};
use crate::observability;

#[derive(Debug)]
pub enum AuthError {
    UsernameTaken(String),
    /// Deliberately identical for unknown user and wrong password.
    InvalidCredentials,
    Validation(String),
    Engine(EngineError),
    Hash(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::UsernameTaken(u) => write!(f, "username already taken: {u}"),
            AuthError::InvalidCredentials => write!(f, "invalid username or password"),
            AuthError::Validation(msg) => write!(f, "validation error: {msg}"),
            AuthError::Engine(e) => write!(f, "store error: {e}"),
            AuthError::Hash(msg) => write!(f, "hash error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<EngineError> for AuthError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::AlreadyExists(u) => AuthError::UsernameTaken(u),
            other => AuthError::Engine(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub created_at: Ms,
}

/// Decides when a session stops being valid. Injected so callers choose the
/// policy instead of inheriting a hardcoded one.
pub trait ExpiryPolicy: Send + Sync {
    fn is_expired(&self, session: &Session, now: Ms) -> bool;
}

/// Sessions expire a fixed time after creation.
pub struct TtlExpiry {
    pub ttl_ms: Ms,
}

impl ExpiryPolicy for TtlExpiry {
    fn is_expired(&self, session: &Session, now: Ms) -> bool {
        now - session.created_at >= self.ttl_ms
    }
}

/// Sessions live until explicit logout.
pub struct NeverExpire;

impl ExpiryPolicy for NeverExpire {
    fn is_expired(&self, _session: &Session, _now: Ms) -> bool {
        false
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    policy: Box<dyn ExpiryPolicy>,
}

impl SessionStore {
    pub fn new(policy: Box<dyn ExpiryPolicy>) -> Self {
        Self {
            sessions: DashMap::new(),
            policy,
        }
    }

    fn insert(&self, session: Session) {
        self.sessions.insert(session.token.clone(), session);
    }

    /// Look up a token, evicting it if the policy says it's dead.
    pub fn validate(&self, token: &str, now: Ms) -> Option<Session> {
        let session = self.sessions.get(token)?.clone();
        if self.policy.is_expired(&session, now) {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct AuthService {
    engine: Arc<Engine>,
    sessions: SessionStore,
    /// bcrypt work factor. Tests dial this down; production uses the default.
    cost: u32,
}

impl AuthService {
    pub fn new(engine: Arc<Engine>, policy: Box<dyn ExpiryPolicy>) -> Self {
        Self::with_cost(engine, policy, bcrypt::DEFAULT_COST)
    }

    pub fn with_cost(engine: Arc<Engine>, policy: Box<dyn ExpiryPolicy>, cost: u32) -> Self {
        Self {
            engine,
            sessions: SessionStore::new(policy),
            cost,
        }
    }

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        if password.len() < 8 {
            return Err(AuthError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        let hash = bcrypt::hash(password, self.cost).map_err(|e| AuthError::Hash(e.to_string()))?;
        let id = self.engine.add_user(username, &hash, role).await?;
        info!(username, "user created");
        Ok(id)
    }

    /// Verify credentials and open a session. Unknown username and wrong
    /// password fail identically.
    pub fn login(&self, username: &str, password: &str, now: Ms) -> Result<Session, AuthError> {
        let Some(user) = self.engine.get_user_by_username(username) else {
            metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
            return Err(AuthError::InvalidCredentials);
        };
        let ok = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        if !ok {
            metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session {
            token: format!("sess-{}", ulid::Ulid::new()),
            user_id: user.id,
            username: user.username,
            role: user.role,
            created_at: now,
        };
        self.sessions.insert(session.clone());
        info!(username, "login ok");
        Ok(session)
    }

    pub fn validate(&self, token: &str, now: Ms) -> Option<Session> {
        self.sessions.validate(token, now)
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.remove(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // Low work factor: these tests hash a lot.
    const TEST_COST: u32 = 4;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_auth");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn service(name: &str, policy: Box<dyn ExpiryPolicy>) -> AuthService {
        let engine = Arc::new(Engine::open(test_wal_path(name)).unwrap());
        AuthService::with_cost(engine, policy, TEST_COST)
    }

    #[tokio::test]
    async fn create_login_validate_logout() {
        let auth = service("roundtrip.wal", Box::new(NeverExpire));
        auth.create_user("alice", "correct horse", Role::Admin)
            .await
            .unwrap();

        let session = auth.login("alice", "correct horse", 1_000).unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.role, Role::Admin);
        assert!(session.token.starts_with("sess-"));

        let found = auth.validate(&session.token, 2_000).unwrap();
        assert_eq!(found.user_id, session.user_id);

        assert!(auth.logout(&session.token));
        assert!(auth.validate(&session.token, 3_000).is_none());
        assert!(!auth.logout(&session.token));
    }

    #[tokio::test]
    async fn bad_password_and_unknown_user_fail_alike() {
        let auth = service("bad_creds.wal", Box::new(NeverExpire));
        auth.create_user("alice", "correct horse", Role::User)
            .await
            .unwrap();

        let wrong = auth.login("alice", "battery staple", 0).unwrap_err();
        let unknown = auth.login("mallory", "whatever", 0).unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn ttl_policy_expires_sessions() {
        let auth = service("ttl.wal", Box::new(TtlExpiry { ttl_ms: 1_000 }));
        auth.create_user("alice", "correct horse", Role::User)
            .await
            .unwrap();

        let session = auth.login("alice", "correct horse", 10_000).unwrap();
        assert!(auth.validate(&session.token, 10_500).is_some());
        // Expired tokens are evicted on lookup.
        assert!(auth.validate(&session.token, 11_000).is_none());
        assert!(auth.validate(&session.token, 10_500).is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let auth = service("dup_user.wal", Box::new(NeverExpire));
        auth.create_user("alice", "correct horse", Role::User)
            .await
            .unwrap();
        let err = auth
            .create_user("alice", "other password", Role::User)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let auth = service("short_pw.wal", Box::new(NeverExpire));
        let err = auth.create_user("alice", "short", Role::User).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
