use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{AuthApi, AuthEventKind, RoleDirectory};
use crate::models::role::{resolve_role, Role};
use crate::models::user::AuthUser;

/// What the rest of the application reads off a store.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub role: Option<Role>,
    pub display_name: Option<String>,
    pub authenticated: bool,
}

/// Tagged sign-in/sign-up result — the store never propagates an Err
/// to its caller.
#[derive(Debug)]
pub enum AuthOutcome {
    Success { user: AuthUser },
    Failure { error: String },
}

/// How a sign-out ended. `ForceReload` is the last-resort recovery
/// when the external call failed and the server-side session state is
/// ambiguous: the client must navigate to the given location and start
/// over.
#[derive(Debug, PartialEq, Eq)]
pub enum SignOutRecovery {
    Clean,
    ForceReload { location: String },
}

/// Server-side mirror of the provider client's local credential
/// storage. Keys are namespaced by project ref; the purge heuristics
/// match anything that smells like an identity artifact.
#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: HashMap<String, String>,
}

impl CredentialCache {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove identity artifacts: namespaced keys plus anything whose
    /// name matches the auth/token/session heuristics.
    pub fn purge(&mut self, project_ref: &str) {
        self.entries.retain(|key, _| {
            let lower = key.to_lowercase();
            let hit = key.starts_with("sb-")
                || key.contains("supabase")
                || key.contains("auth")
                || lower.contains("access")
                || lower.contains("token")
                || lower.contains("refresh")
                || lower.contains("session");
            !hit
        });
        for key in [
            format!("sb-{project_ref}-auth-token"),
            format!("sb-{project_ref}-auth-token-code-verifier"),
        ] {
            self.entries.remove(&key);
        }
    }

    pub fn purge_all(&mut self) {
        self.entries.clear();
    }
}

/// Dropping or aborting the handle ends the subscription; callers must
/// release it on context teardown.
pub struct SubscriptionHandle {
    handle: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Single source of truth for "who is signed in and with what role"
/// within one browser context.
pub struct SessionStore {
    auth: Arc<dyn AuthApi>,
    directory: Arc<dyn RoleDirectory>,
    state: RwLock<SessionState>,
    cache: Mutex<CredentialCache>,
    loading_tx: watch::Sender<bool>,
    loading_rx: watch::Receiver<bool>,
    project_ref: String,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        directory: Arc<dyn RoleDirectory>,
        project_ref: impl Into<String>,
    ) -> Self {
        let (loading_tx, loading_rx) = watch::channel(true);
        Self {
            auth,
            directory,
            state: RwLock::new(SessionState::default()),
            cache: Mutex::new(CredentialCache::default()),
            loading_tx,
            loading_rx,
            project_ref: project_ref.into(),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading_rx.borrow()
    }

    fn set_loading(&self, loading: bool) {
        self.loading_tx.send_replace(loading);
    }

    /// Resolves once the store leaves `loading`. Never resolves if it
    /// never does — callers cap the wait themselves.
    pub async fn wait_until_ready(&self) {
        let mut rx = self.loading_rx.clone();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    async fn reset_state(&self) {
        *self.state.write().await = SessionState::default();
    }

    async fn purge_cached_credentials(&self) {
        self.cache.lock().await.purge(&self.project_ref);
    }

    async fn adopt_identity(&self, user: AuthUser) {
        let mut state = self.state.write().await;
        state.user = Some(user);
        state.authenticated = true;
    }

    async fn remember_token_pair(&self, access: &str, refresh: &str) {
        let key = format!("sb-{}-auth-token", self.project_ref);
        let value = serde_json::json!({
            "access_token": access,
            "refresh_token": refresh,
        });
        self.cache.lock().await.insert(key, value.to_string());
    }

    /// Fetch any live external session and adopt it. Always terminates
    /// by clearing the loading flag, on every path.
    pub async fn initialize(&self) {
        self.set_loading(true);
        match self.auth.get_session().await {
            Some(session) if !session.access_token.is_empty() => {
                self.remember_token_pair(&session.access_token, &session.refresh_token)
                    .await;
                self.adopt_identity(session.user.clone()).await;
                self.fetch_user_data(&session.user).await;
            }
            _ => {
                self.reset_state().await;
                self.purge_cached_credentials().await;
            }
        }
        self.set_loading(false);
    }

    /// Role + display-name resolution. Every failure path degrades to
    /// the claim fallback and then to `pelanggan`; this never errors.
    async fn fetch_user_data(&self, user: &AuthUser) {
        let claim = user.role_claim();
        let row = match self.directory.find_role(&user.email).await {
            Ok(row) => row,
            Err(e) => {
                warn!(email = %user.email, error = %e, "role lookup failed, falling back to claim");
                self.set_role(resolve_role(None, claim), None).await;
                return;
            }
        };

        let role = resolve_role(row.as_ref(), claim);
        let display_name = match (&row, role) {
            // Customers are named after their profile row when it exists.
            (Some(row), Role::Pelanggan) => {
                let profile_name = self
                    .directory
                    .find_customer_name(&user.email)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(email = %user.email, error = %e, "customer name lookup failed");
                        None
                    });
                profile_name.or_else(|| row.username.clone())
            }
            (Some(row), _) => row.username.clone(),
            (None, _) => None,
        };
        self.set_role(role, display_name).await;
    }

    async fn set_role(&self, role: Role, display_name: Option<String>) {
        let mut state = self.state.write().await;
        state.role = Some(role);
        state.display_name = display_name;
    }

    /// Consume the auth client's change stream until unsubscribed.
    pub fn subscribe_to_changes(self: Arc<Self>) -> SubscriptionHandle {
        let mut rx = self.auth.subscribe();
        let store = self;
        let handle = tokio::spawn(async move {
            loop {
                let change = match rx.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "auth change stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match (change.event, change.session) {
                    (AuthEventKind::SignedOut, _) => {
                        store.reset_state().await;
                        store.set_loading(false);
                        store.purge_cached_credentials().await;
                    }
                    (AuthEventKind::SignedIn, Some(session)) => {
                        store.adopt_identity(session.user.clone()).await;
                        store.set_loading(false);
                        store.fetch_user_data(&session.user).await;
                    }
                    (AuthEventKind::UserUpdated, Some(session)) => {
                        store.adopt_identity(session.user.clone()).await;
                        store.fetch_user_data(&session.user).await;
                    }
                    (AuthEventKind::TokenRefreshed, Some(session)) => {
                        // Same identity: keep everything, skip the
                        // redundant role refetch. A different (or
                        // missing) identity needs its role resolved,
                        // e.g. right after a session restore.
                        let same = store
                            .state
                            .read()
                            .await
                            .user
                            .as_ref()
                            .map(|u| u.id == session.user.id)
                            .unwrap_or(false);
                        if !same {
                            store.adopt_identity(session.user.clone()).await;
                            store.fetch_user_data(&session.user).await;
                        }
                    }
                    _ => {}
                }
            }
        });
        SubscriptionHandle { handle }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        self.set_loading(true);
        let outcome = match self.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                self.remember_token_pair(&session.access_token, &session.refresh_token)
                    .await;
                self.adopt_identity(session.user.clone()).await;
                self.fetch_user_data(&session.user).await;
                AuthOutcome::Success { user: session.user }
            }
            Err(e) => AuthOutcome::Failure {
                error: e.to_string(),
            },
        };
        self.set_loading(false);
        outcome
    }

    pub async fn sign_up(&self, email: &str, password: &str, role: Role) -> AuthOutcome {
        match self.auth.sign_up(email, password, role).await {
            Ok(session) => {
                if let Err(e) = self.directory.insert_account(email, role).await {
                    // The identity exists either way; the row can be
                    // backfilled on a later attempt.
                    warn!(email, error = %e, "account row insert failed after sign-up");
                }
                self.remember_token_pair(&session.access_token, &session.refresh_token)
                    .await;
                self.adopt_identity(session.user.clone()).await;
                self.fetch_user_data(&session.user).await;
                AuthOutcome::Success { user: session.user }
            }
            Err(e) => AuthOutcome::Failure {
                error: e.to_string(),
            },
        }
    }

    /// Optimistic local reset first; the external call may still fail,
    /// in which case the server-side session state is ambiguous and
    /// the only safe recovery is a full reload with a fresh cache.
    pub async fn sign_out(&self) -> SignOutRecovery {
        self.set_loading(true);
        self.reset_state().await;
        match self.auth.sign_out().await {
            Ok(()) => {
                self.purge_cached_credentials().await;
                self.set_loading(false);
                SignOutRecovery::Clean
            }
            Err(e) => {
                warn!(error = %e, "external sign-out failed, forcing full reload");
                self.reset_state().await;
                self.set_loading(false);
                self.cache.lock().await.purge_all();
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                SignOutRecovery::ForceReload {
                    location: format!("/?logout={}", Utc::now().timestamp_millis()),
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn cache_snapshot(&self) -> Vec<String> {
        let cache = self.cache.lock().await;
        let mut keys: Vec<String> = cache.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub async fn seed_cache(&self, key: &str, value: &str) {
        self.cache.lock().await.insert(key, value);
    }
}

/// One signed-in browser context: its auth client, its store, and the
/// change subscription keeping the two aligned.
pub struct SessionContext {
    pub auth: Arc<dyn AuthApi>,
    pub directory: Arc<dyn RoleDirectory>,
    pub store: Arc<SessionStore>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl SessionContext {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        directory: Arc<dyn RoleDirectory>,
        store: Arc<SessionStore>,
        subscription: SubscriptionHandle,
    ) -> Self {
        Self {
            auth,
            directory,
            store,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// The live access token, for user-scoped row requests.
    pub async fn access_token(&self) -> Option<String> {
        self.auth.get_session().await.map(|s| s.access_token)
    }

    pub async fn teardown(&self) {
        if let Some(sub) = self.subscription.lock().await.take() {
            sub.unsubscribe();
        }
    }
}

/// Cookie-keyed registry of live contexts. Last writer wins; there is
/// no extra mutual exclusion around interleaved sign-in/sign-out.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<SessionContext>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: String, ctx: Arc<SessionContext>) {
        self.inner.write().await.insert(token, ctx);
    }

    pub async fn get(&self, token: &str) -> Option<Arc<SessionContext>> {
        self.inner.read().await.get(token).cloned()
    }

    pub async fn remove(&self, token: &str) -> Option<Arc<SessionContext>> {
        self.inner.write().await.remove(token)
    }

    /// Reverse lookup by context identity.
    pub async fn find_token(&self, ctx: &Arc<SessionContext>) -> Option<String> {
        self.inner
            .read()
            .await
            .iter()
            .find(|(_, v)| Arc::ptr_eq(v, ctx))
            .map(|(k, _)| k.clone())
    }
}

/// Opaque cookie value identifying a browser context.
pub fn new_context_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{MockAuth, MockDirectory};
    use crate::models::role::RoleRow;

    fn store_with(
        auth: &Arc<MockAuth>,
        directory: &Arc<MockDirectory>,
    ) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(
            auth.clone() as Arc<dyn AuthApi>,
            directory.clone() as Arc<dyn RoleDirectory>,
            "testref",
        ))
    }

    async fn drain_events() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn initialize_without_session_resets_and_purges() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        let store = store_with(&auth, &directory);
        store.seed_cache("sb-testref-auth-token", "stale").await;
        store.seed_cache("theme", "dark").await;

        store.initialize().await;

        let snap = store.snapshot().await;
        assert!(!snap.authenticated);
        assert!(snap.user.is_none());
        assert!(!store.is_loading());
        // Identity artifacts gone, unrelated keys kept.
        assert_eq!(store.cache_snapshot().await, vec!["theme".to_string()]);
    }

    #[tokio::test]
    async fn initialize_with_session_resolves_role() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory
            .set_role(
                "admin@rental.test",
                RoleRow {
                    role: "admin".into(),
                    username: Some("Admin Rental".into()),
                },
            )
            .await;
        auth.seed_account("admin@rental.test", "secret", None).await;
        auth.force_sign_in("admin@rental.test").await;

        let store = store_with(&auth, &directory);
        store.initialize().await;

        let snap = store.snapshot().await;
        assert!(snap.authenticated);
        assert_eq!(snap.role, Some(Role::Admin));
        assert_eq!(snap.display_name.as_deref(), Some("Admin Rental"));
    }

    #[tokio::test]
    async fn missing_role_row_defaults_to_pelanggan() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        auth.seed_account("nobody@rental.test", "secret", None).await;
        auth.force_sign_in("nobody@rental.test").await;

        let store = store_with(&auth, &directory);
        store.initialize().await;

        assert_eq!(store.snapshot().await.role, Some(Role::Pelanggan));
    }

    #[tokio::test]
    async fn role_lookup_failure_degrades_to_claim() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory.fail_find_role(true);
        auth.seed_account("staff@rental.test", "secret", Some(Role::Petugas))
            .await;
        auth.force_sign_in("staff@rental.test").await;

        let store = store_with(&auth, &directory);
        store.initialize().await;

        assert_eq!(store.snapshot().await.role, Some(Role::Petugas));
    }

    #[tokio::test]
    async fn pelanggan_display_name_comes_from_profile_table() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory
            .set_role(
                "budi@rental.test",
                RoleRow {
                    role: "pelanggan".into(),
                    username: Some("budi93".into()),
                },
            )
            .await;
        directory
            .set_customer_name("budi@rental.test", "Budi Santoso")
            .await;
        auth.seed_account("budi@rental.test", "secret", None).await;
        auth.force_sign_in("budi@rental.test").await;

        let store = store_with(&auth, &directory);
        store.initialize().await;

        assert_eq!(
            store.snapshot().await.display_name.as_deref(),
            Some("Budi Santoso")
        );
    }

    #[tokio::test]
    async fn sign_in_failure_is_a_tagged_outcome() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        let store = store_with(&auth, &directory);
        store.initialize().await;

        match store.sign_in("ghost@rental.test", "wrong").await {
            AuthOutcome::Failure { error } => assert!(!error.is_empty()),
            AuthOutcome::Success { .. } => panic!("expected failure"),
        }
        assert!(!store.is_loading());
        assert!(!store.snapshot().await.authenticated);
    }

    #[tokio::test]
    async fn token_refresh_with_same_id_skips_role_refetch() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory
            .set_role(
                "admin@rental.test",
                RoleRow {
                    role: "admin".into(),
                    username: None,
                },
            )
            .await;
        auth.seed_account("admin@rental.test", "secret", None).await;

        let store = store_with(&auth, &directory);
        store.initialize().await;
        let _sub = Arc::clone(&store).subscribe_to_changes();

        match store.sign_in("admin@rental.test", "secret").await {
            AuthOutcome::Success { .. } => {}
            AuthOutcome::Failure { error } => panic!("sign-in failed: {error}"),
        }
        // Let the subscription drain the sign-in event first.
        drain_events().await;
        let before = directory.lookup_count();

        let session = auth.get_session().await.expect("live session");
        auth.set_session(&session.access_token, &session.refresh_token)
            .await
            .expect("refresh");
        drain_events().await;

        assert_eq!(directory.lookup_count(), before);
        assert!(store.snapshot().await.authenticated);
    }

    #[tokio::test]
    async fn token_refresh_after_sign_out_resolves_role_again() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory
            .set_role(
                "admin@rental.test",
                RoleRow {
                    role: "admin".into(),
                    username: None,
                },
            )
            .await;
        auth.seed_account("admin@rental.test", "secret", None).await;

        let store = store_with(&auth, &directory);
        store.initialize().await;
        let _sub = Arc::clone(&store).subscribe_to_changes();
        store.sign_in("admin@rental.test", "secret").await;
        drain_events().await;
        let session = auth.get_session().await.expect("live session");

        // Sign-out wipes the identity, then a refresh grant brings
        // the same person back.
        auth.sign_out().await.expect("sign out");
        drain_events().await;
        assert!(!store.snapshot().await.authenticated);

        auth.set_session(&session.access_token, &session.refresh_token)
            .await
            .expect("refresh");
        drain_events().await;

        let snap = store.snapshot().await;
        assert!(snap.authenticated);
        assert_eq!(snap.role, Some(Role::Admin));
    }

    #[tokio::test]
    async fn user_updated_event_refetches_role() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        directory
            .set_role(
                "staff@rental.test",
                RoleRow {
                    role: "pelanggan".into(),
                    username: None,
                },
            )
            .await;
        auth.seed_account("staff@rental.test", "secret", None).await;

        let store = store_with(&auth, &directory);
        store.initialize().await;
        let _sub = Arc::clone(&store).subscribe_to_changes();
        store.sign_in("staff@rental.test", "secret").await;
        drain_events().await;
        assert_eq!(store.snapshot().await.role, Some(Role::Pelanggan));

        // A promotion lands in the directory and the provider
        // re-announces the identity.
        directory
            .set_role(
                "staff@rental.test",
                RoleRow {
                    role: "petugas".into(),
                    username: None,
                },
            )
            .await;
        auth.emit_user_updated().await;
        drain_events().await;

        assert_eq!(store.snapshot().await.role, Some(Role::Petugas));
    }

    #[tokio::test]
    async fn signed_out_event_resets_and_purges() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        auth.seed_account("admin@rental.test", "secret", Some(Role::Admin))
            .await;

        let store = store_with(&auth, &directory);
        store.initialize().await;
        let _sub = Arc::clone(&store).subscribe_to_changes();
        store.sign_in("admin@rental.test", "secret").await;

        auth.sign_out().await.expect("sign out");
        drain_events().await;

        let snap = store.snapshot().await;
        assert!(!snap.authenticated);
        assert!(snap.role.is_none());
        assert!(store.cache_snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sign_out_forces_reload_with_logout_marker() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        auth.seed_account("admin@rental.test", "secret", Some(Role::Admin))
            .await;

        let store = store_with(&auth, &directory);
        store.initialize().await;
        store.sign_in("admin@rental.test", "secret").await;
        store.seed_cache("theme", "dark").await;
        auth.fail_sign_out(true);

        match store.sign_out().await {
            SignOutRecovery::ForceReload { location } => {
                assert!(location.starts_with("/?logout="));
            }
            SignOutRecovery::Clean => panic!("expected forced reload"),
        }
        // Force-purge wipes everything, not just namespaced keys.
        assert!(store.cache_snapshot().await.is_empty());
        assert!(!store.snapshot().await.authenticated);
    }

    #[test]
    fn purge_heuristics_hit_identity_artifacts_only() {
        let mut cache = CredentialCache::default();
        cache.insert("sb-testref-auth-token", "x");
        cache.insert("supabase.auth.token", "x");
        cache.insert("my_access_key", "x");
        cache.insert("REFRESH_at", "x");
        cache.insert("user-session-blob", "x");
        cache.insert("theme", "dark");
        cache.insert("locale", "id");

        cache.purge("testref");

        assert_eq!(cache.len(), 2);
        assert!(cache.contains_key("theme"));
        assert!(cache.contains_key("locale"));
    }

    #[test]
    fn context_tokens_are_long_and_unique() {
        let a = new_context_token();
        let b = new_context_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
