//! In-memory doubles for the auth surface and the row directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{AuthApi, AuthChange, AuthEventKind, BackendError, RoleDirectory};
use crate::models::role::{Role, RoleRow};
use crate::models::user::{AuthUser, Session, UserMetadata};

struct Account {
    password: String,
    role_claim: Option<Role>,
    id: Uuid,
}

/// Mimics the hosted auth endpoints, including the session swap on
/// sign-up and refresh-token grants.
pub struct MockAuth {
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<Session>>,
    issued: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<AuthChange>,
    fail_sign_out: AtomicBool,
    fail_set_session: AtomicBool,
    set_session_delay_ms: AtomicU64,
    counter: AtomicU64,
}

impl MockAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            issued: RwLock::new(HashMap::new()),
            events,
            fail_sign_out: AtomicBool::new(false),
            fail_set_session: AtomicBool::new(false),
            set_session_delay_ms: AtomicU64::new(0),
            counter: AtomicU64::new(0),
        }
    }

    pub async fn seed_account(&self, email: &str, password: &str, role_claim: Option<Role>) {
        self.accounts.write().await.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                role_claim,
                id: Uuid::new_v4(),
            },
        );
    }

    /// Put a live session in place without emitting an event, as if a
    /// previous run left one behind.
    pub async fn force_sign_in(&self, email: &str) {
        let session = self.mint(email).await;
        *self.current.write().await = Some(session);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_session(&self, fail: bool) {
        self.fail_set_session.store(fail, Ordering::SeqCst);
    }

    pub fn set_session_delay(&self, delay: Duration) {
        self.set_session_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Re-announce the live session as a metadata update, the way the
    /// provider does after a profile edit.
    pub async fn emit_user_updated(&self) {
        let session = self.current.read().await.clone();
        let _ = self.events.send(AuthChange {
            event: AuthEventKind::UserUpdated,
            session,
        });
    }

    pub async fn current_email(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|s| s.user.email.clone())
    }

    async fn mint(&self, email: &str) -> Session {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.read().await;
        let account = accounts.get(email).expect("account must be seeded");
        let session = Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            user: AuthUser {
                id: account.id,
                email: email.to_string(),
                user_metadata: UserMetadata {
                    role: account.role_claim,
                },
            },
        };
        drop(accounts);
        self.issued
            .write()
            .await
            .insert(session.refresh_token.clone(), email.to_string());
        session
    }

    async fn adopt(&self, session: Session, event: AuthEventKind) -> Session {
        *self.current.write().await = Some(session.clone());
        let _ = self.events.send(AuthChange {
            event,
            session: Some(session.clone()),
        });
        session
    }
}

#[async_trait]
impl AuthApi for MockAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let ok = self
            .accounts
            .read()
            .await
            .get(email)
            .map(|a| a.password == password)
            .unwrap_or(false);
        if !ok {
            return Err(BackendError::Api {
                code: None,
                message: "Invalid login credentials".into(),
            });
        }
        let session = self.mint(email).await;
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Session, BackendError> {
        if self.accounts.read().await.contains_key(email) {
            return Err(BackendError::Api {
                code: None,
                message: "User already registered".into(),
            });
        }
        self.seed_account(email, password, Some(role)).await;
        let session = self.mint(email).await;
        // Like the real endpoint, the new identity replaces the live
        // session.
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: None,
                message: "logout rejected".into(),
            });
        }
        if self.current.read().await.is_none() {
            return Ok(());
        }
        *self.current.write().await = None;
        let _ = self.events.send(AuthChange {
            event: AuthEventKind::SignedOut,
            session: None,
        });
        Ok(())
    }

    async fn get_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    async fn set_session(
        &self,
        _access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, BackendError> {
        let delay = self.set_session_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_set_session.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: None,
                message: "Invalid Refresh Token".into(),
            });
        }
        let email = match self.issued.read().await.get(refresh_token).cloned() {
            Some(email) => email,
            None => {
                return Err(BackendError::Api {
                    code: None,
                    message: "Invalid Refresh Token".into(),
                })
            }
        };
        let session = self.mint(&email).await;
        Ok(self.adopt(session, AuthEventKind::TokenRefreshed).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

/// In-memory `user` + `pelanggan` lookups with failure knobs.
pub struct MockDirectory {
    roles: RwLock<HashMap<String, RoleRow>>,
    customer_names: RwLock<HashMap<String, String>>,
    inserted: RwLock<Vec<(String, Role)>>,
    fail_find_role: AtomicBool,
    fail_insert: AtomicBool,
    duplicate_on_insert: AtomicBool,
    lookups: AtomicU64,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            customer_names: RwLock::new(HashMap::new()),
            inserted: RwLock::new(Vec::new()),
            fail_find_role: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            duplicate_on_insert: AtomicBool::new(false),
            lookups: AtomicU64::new(0),
        }
    }

    pub async fn set_role(&self, email: &str, row: RoleRow) {
        self.roles.write().await.insert(email.to_string(), row);
    }

    pub async fn set_customer_name(&self, email: &str, nama: &str) {
        self.customer_names
            .write()
            .await
            .insert(email.to_string(), nama.to_string());
    }

    pub fn fail_find_role(&self, fail: bool) {
        self.fail_find_role.store(fail, Ordering::SeqCst);
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn duplicate_on_insert(&self, duplicate: bool) {
        self.duplicate_on_insert.store(duplicate, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub async fn inserted_accounts(&self) -> Vec<(String, Role)> {
        self.inserted.read().await.clone()
    }
}

#[async_trait]
impl RoleDirectory for MockDirectory {
    async fn find_role(&self, email: &str) -> Result<Option<RoleRow>, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_find_role.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: None,
                message: "directory unavailable".into(),
            });
        }
        Ok(self.roles.read().await.get(email).cloned())
    }

    async fn find_customer_name(&self, email: &str) -> Result<Option<String>, BackendError> {
        Ok(self.customer_names.read().await.get(email).cloned())
    }

    async fn insert_account(&self, email: &str, role: Role) -> Result<(), BackendError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: None,
                message: "insert rejected".into(),
            });
        }
        if self.duplicate_on_insert.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: Some("23505".into()),
                message: "duplicate key value violates unique constraint".into(),
            });
        }
        self.inserted
            .write()
            .await
            .push((email.to_string(), role));
        self.roles.write().await.insert(
            email.to_string(),
            RoleRow {
                role: role.to_string(),
                username: None,
            },
        );
        Ok(())
    }
}
