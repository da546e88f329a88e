use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};

use super::{api_error, Backend, BackendError};
use crate::models::role::Role;
use crate::models::user::Session;

/// External auth state change kinds, mirroring what the hosted provider
/// notifies its clients about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    UserUpdated,
    TokenRefreshed,
}

#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthEventKind,
    pub session: Option<Session>,
}

/// The auth surface of the hosted backend. Object safe so the session
/// store and the staff saga can run against a test double.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// Creating an account also makes the new identity the live
    /// session — the side effect the staff saga works around.
    async fn sign_up(&self, email: &str, password: &str, role: Role)
        -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn get_session(&self) -> Option<Session>;

    /// Resubmit a previously captured token pair.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, BackendError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// GoTrue-style HTTP client. Holds the live session for one browser
/// context and broadcasts every change it causes.
pub struct HttpAuthClient {
    backend: Backend,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl HttpAuthClient {
    pub fn new(backend: Backend) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            backend,
            current: RwLock::new(None),
            events,
        }
    }

    async fn adopt(&self, session: Session, event: AuthEventKind) -> Session {
        *self.current.write().await = Some(session.clone());
        let _ = self.events.send(AuthChange {
            event,
            session: Some(session.clone()),
        });
        session
    }

    async fn post_auth(
        &self,
        path_and_query: &str,
        body: serde_json::Value,
    ) -> Result<Session, BackendError> {
        let resp = self
            .backend
            .http
            .post(format!("{}{}", self.backend.base_url, path_and_query))
            .header("apikey", &self.backend.anon_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json::<Session>().await?)
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let session = self
            .post_auth(
                "/auth/v1/token?grant_type=password",
                json!({ "email": email, "password": password }),
            )
            .await?;
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Session, BackendError> {
        let session = self
            .post_auth(
                "/auth/v1/signup",
                json!({
                    "email": email,
                    "password": password,
                    "data": { "role": role },
                }),
            )
            .await?;
        // The provider switches the live session to the new identity.
        Ok(self.adopt(session, AuthEventKind::SignedIn).await)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let access = match self.current.read().await.as_ref() {
            Some(s) => s.access_token.clone(),
            None => return Ok(()),
        };
        let resp = self
            .backend
            .http
            .post(format!("{}/auth/v1/logout", self.backend.base_url))
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&access)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
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
        let session = self
            .post_auth(
                "/auth/v1/token?grant_type=refresh_token",
                json!({ "refresh_token": refresh_token }),
            )
            .await?;
        Ok(self.adopt(session, AuthEventKind::TokenRefreshed).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}
