use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::backend::{AuthApi, BackendError, RoleDirectory};
use crate::models::role::Role;

/// Grace period after signing the freshly created identity out, so the
/// provider settles before the refresh-token grant.
pub const SIGN_OUT_SETTLE: Duration = Duration::from_millis(200);

/// Cap on restoring the operator's session; past it the saga gives up
/// and asks the client to reload.
pub const RESTORE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum StaffCreationError {
    #[error("Tidak ada session aktif. Silakan login ulang.")]
    NoActiveSession,
    #[error("Gagal membuat akun: {0}")]
    SignUp(BackendError),
    #[error("Gagal menyimpan data akun: {0}")]
    AccountRow(BackendError),
}

/// Whether the operator kept their session or has to start over.
#[derive(Debug, PartialEq, Eq)]
pub enum StaffCreationOutcome {
    Completed,
    /// The account exists but the operator's session could not be
    /// restored; the client must reload and sign in again.
    ReloadRequired,
}

/// Creating a staff account through the public auth endpoint swaps the
/// live session to the new identity. This saga captures the operator's
/// tokens first, runs the swap-inducing steps, then restores the
/// operator.
pub struct StaffSaga {
    auth: Arc<dyn AuthApi>,
    directory: Arc<dyn RoleDirectory>,
}

impl StaffSaga {
    pub fn new(auth: Arc<dyn AuthApi>, directory: Arc<dyn RoleDirectory>) -> Self {
        Self { auth, directory }
    }

    pub async fn create_staff_account(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<StaffCreationOutcome, StaffCreationError> {
        // Step 1: capture the operator's tokens before anything can
        // swap the session.
        let operator = self
            .auth
            .get_session()
            .await
            .ok_or(StaffCreationError::NoActiveSession)?;

        // Step 2: create the identity. From here on the live session
        // belongs to the new account.
        self.auth
            .sign_up(email, password, role)
            .await
            .map_err(StaffCreationError::SignUp)?;

        // Step 3: the role row. A duplicate means a previous attempt
        // already wrote it, which is fine.
        if let Err(e) = self.directory.insert_account(email, role).await {
            if e.is_unique_violation() {
                info!(email, "account row already present, continuing");
            } else {
                warn!(email, error = %e, "account row insert failed");
                self.restore_operator(&operator).await;
                return Err(StaffCreationError::AccountRow(e));
            }
        }

        // Step 4: drop the new identity's session. A failure here is
        // harmless, restoring the operator overwrites it anyway.
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "sign-out of new account failed, continuing");
        }

        // Step 5: let the provider settle before the refresh grant.
        sleep(SIGN_OUT_SETTLE).await;

        // Step 6: restore the operator, capped.
        if self.restore_operator(&operator).await {
            Ok(StaffCreationOutcome::Completed)
        } else {
            Ok(StaffCreationOutcome::ReloadRequired)
        }
    }

    /// Best-effort session restore with verification that the live
    /// session really is the operator again.
    async fn restore_operator(&self, operator: &crate::models::user::Session) -> bool {
        let restored = match timeout(
            RESTORE_TIMEOUT,
            self.auth
                .set_session(&operator.access_token, &operator.refresh_token),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(error = %e, "operator session restore failed");
                return false;
            }
            Err(_) => {
                warn!("operator session restore timed out");
                return false;
            }
        };
        if restored.user.email != operator.user.email {
            warn!(
                expected = %operator.user.email,
                got = %restored.user.email,
                "restored session belongs to the wrong identity"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{MockAuth, MockDirectory};
    use crate::middleware::{render_guard, GuardDecision};
    use crate::models::role::RoleRow;
    use crate::session::SessionStore;

    async fn saga_with_operator() -> (Arc<MockAuth>, Arc<MockDirectory>, StaffSaga) {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        auth.seed_account("admin@rental.test", "secret", Some(Role::Admin))
            .await;
        auth.sign_in_with_password("admin@rental.test", "secret")
            .await
            .expect("operator sign-in");
        let saga = StaffSaga::new(
            auth.clone() as Arc<dyn AuthApi>,
            directory.clone() as Arc<dyn RoleDirectory>,
        );
        (auth, directory, saga)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_restores_the_operator() {
        let (auth, directory, saga) = saga_with_operator().await;

        let outcome = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .expect("saga");

        assert_eq!(outcome, StaffCreationOutcome::Completed);
        assert_eq!(
            auth.current_email().await.as_deref(),
            Some("admin@rental.test")
        );
        assert_eq!(
            directory.inserted_accounts().await,
            vec![("petugas@rental.test".to_string(), Role::Petugas)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completed_saga_leaves_the_operator_authorized() {
        let (auth, directory, saga) = saga_with_operator().await;
        directory
            .set_role(
                "admin@rental.test",
                RoleRow {
                    role: "admin".into(),
                    username: None,
                },
            )
            .await;

        // The operator's store rides along on the same auth client,
        // seeing the saga's sign-in/sign-out/refresh churn.
        let store = Arc::new(SessionStore::new(
            auth.clone() as Arc<dyn AuthApi>,
            directory.clone() as Arc<dyn RoleDirectory>,
            "testref",
        ));
        store.initialize().await;
        let _sub = Arc::clone(&store).subscribe_to_changes();

        let outcome = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .expect("saga");
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(outcome, StaffCreationOutcome::Completed);
        // The very next back-office request must still pass the guard.
        let snap = store.snapshot().await;
        assert!(snap.authenticated);
        assert_eq!(snap.role, Some(Role::Admin));
        assert_eq!(
            render_guard(&store, &[Role::Admin]).await,
            GuardDecision::Render
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_account_row_is_tolerated() {
        let (auth, directory, saga) = saga_with_operator().await;
        directory.duplicate_on_insert(true);

        let outcome = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .expect("saga");

        assert_eq!(outcome, StaffCreationOutcome::Completed);
        assert_eq!(
            auth.current_email().await.as_deref(),
            Some("admin@rental.test")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restore_reports_reload_with_account_created() {
        let (auth, directory, saga) = saga_with_operator().await;
        auth.fail_set_session(true);

        let outcome = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .expect("saga");

        assert_eq!(outcome, StaffCreationOutcome::ReloadRequired);
        // The account itself was still created.
        assert_eq!(directory.inserted_accounts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_restore_hits_the_timeout() {
        let (auth, _directory, saga) = saga_with_operator().await;
        auth.set_session_delay(RESTORE_TIMEOUT + Duration::from_secs(2));

        let outcome = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .expect("saga");

        assert_eq!(outcome, StaffCreationOutcome::ReloadRequired);
    }

    #[tokio::test]
    async fn no_operator_session_is_an_error_before_any_side_effect() {
        let auth = Arc::new(MockAuth::new());
        let directory = Arc::new(MockDirectory::new());
        let saga = StaffSaga::new(
            auth.clone() as Arc<dyn AuthApi>,
            directory.clone() as Arc<dyn RoleDirectory>,
        );

        let err = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .unwrap_err();

        assert!(matches!(err, StaffCreationError::NoActiveSession));
        assert!(directory.inserted_accounts().await.is_empty());
        assert!(auth.get_session().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_account_row_insert_surfaces_after_restore_attempt() {
        let (auth, directory, saga) = saga_with_operator().await;
        directory.fail_insert(true);

        let err = saga
            .create_staff_account("petugas@rental.test", "rahasia1", Role::Petugas)
            .await
            .unwrap_err();

        assert!(matches!(err, StaffCreationError::AccountRow(_)));
        // The operator got their session back on the error path too.
        assert_eq!(
            auth.current_email().await.as_deref(),
            Some("admin@rental.test")
        );
    }
}
