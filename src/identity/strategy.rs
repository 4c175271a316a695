//! Login prompt strategies. Each turns one kind of evidence into either an
//! account id or a protocol-level denial.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::account::{SharedAccountStore, StoreError};
use super::password::{verify_against_dummy, verify_password};
use crate::biometric::{BiometricVerifier, CapturePayload, DeviceIdentity, MatchPolicy, ProviderRequest};

pub type AccountId = String;

pub const ACCESS_DENIED: &str = "access_denied";
pub const BAD_CREDENTIALS: &str = "Username or password is incorrect.";
pub const FACE_VERIFICATION_FAILED: &str = "Face verification failed.";

/// Authentication refused for a reason the authorization engine should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub error: String,
    pub description: String,
}

impl Denial {
    pub fn access_denied(description: &str) -> Self {
        Self { error: ACCESS_DENIED.to_string(), description: description.to_string() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthnError {
    #[error("denied: {}", .0.description)]
    Denied(Denial),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("authentication worker failed: {0}")]
    Worker(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    type Evidence: Send;

    /// Short label for logs.
    fn kind(&self) -> &'static str;

    async fn authenticate(&self, evidence: Self::Evidence) -> Result<AccountId, AuthnError>;
}

#[derive(Debug, Clone)]
pub struct PasswordEvidence {
    pub username: String,
    pub password: String,
}

pub struct PasswordStrategy {
    accounts: SharedAccountStore,
}

impl PasswordStrategy {
    pub fn new(accounts: SharedAccountStore) -> Self { Self { accounts } }
}

#[async_trait]
impl Authenticator for PasswordStrategy {
    type Evidence = PasswordEvidence;

    fn kind(&self) -> &'static str { "password" }

    async fn authenticate(&self, evidence: PasswordEvidence) -> Result<AccountId, AuthnError> {
        let stored = self.accounts.get(&evidence.username).await?.map(|a| a.password_hash);
        let password = evidence.password;
        let matched = tokio::task::spawn_blocking(move || match stored {
            Some(hash) => verify_password(&hash, &password),
            None => verify_against_dummy(&password),
        })
        .await
        .map_err(|e| AuthnError::Worker(e.to_string()))?;
        if matched {
            Ok(evidence.username)
        } else {
            info!(account = %evidence.username, "login.password.denied");
            Err(AuthnError::Denied(Denial::access_denied(BAD_CREDENTIALS)))
        }
    }
}

/// Face capture plus the device identity it was produced on.
#[derive(Debug, Clone)]
pub struct BiometricAssertion {
    pub capture: CapturePayload,
    pub device: DeviceIdentity,
    /// Absent for verification-only flows, which cannot bind a login.
    pub claimed_account_id: Option<String>,
}

pub struct BiometricStrategy {
    accounts: SharedAccountStore,
    verifier: Arc<dyn BiometricVerifier>,
    policy: MatchPolicy,
    timeout: Duration,
}

impl BiometricStrategy {
    pub fn new(
        accounts: SharedAccountStore,
        verifier: Arc<dyn BiometricVerifier>,
        policy: MatchPolicy,
        timeout: Duration,
    ) -> Self {
        Self { accounts, verifier, policy, timeout }
    }

    fn denied() -> AuthnError {
        AuthnError::Denied(Denial::access_denied(FACE_VERIFICATION_FAILED))
    }
}

#[async_trait]
impl Authenticator for BiometricStrategy {
    type Evidence = BiometricAssertion;

    fn kind(&self) -> &'static str { "biometric" }

    async fn authenticate(&self, evidence: BiometricAssertion) -> Result<AccountId, AuthnError> {
        let Some(claimed) = evidence.claimed_account_id.filter(|c| !c.is_empty()) else {
            info!("login.face.denied: no claimed account");
            return Err(Self::denied());
        };
        let Some(account) = self.accounts.get(&claimed).await? else {
            info!(account = %claimed, "login.face.denied: unknown account");
            return Err(Self::denied());
        };
        // Only a reference minted by enroll_face may be matched against.
        let Some(reference) = account.biometric_reference_id.clone().filter(|r| !r.is_empty()) else {
            info!(account = %claimed, "login.face.denied: account not enrolled");
            return Err(Self::denied());
        };
        if !evidence.capture.is_well_formed() {
            info!(account = %claimed, "login.face.denied: malformed capture");
            return Err(Self::denied());
        }

        let request = ProviderRequest { capture: evidence.capture, external_database_ref_id: reference };
        let call = self.verifier.match_capture(&request, &evidence.device);
        let decision = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!(account = %claimed, error = %e, "login.face.upstream_failure");
                return Err(Self::denied());
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(account = %claimed, timeout_ms, "login.face.upstream_timeout");
                return Err(Self::denied());
            }
        };
        if let Err(rejection) = self.policy.evaluate_match(&decision) {
            info!(account = %claimed, reason = %rejection, "login.face.denied");
            return Err(Self::denied());
        }
        info!(account = %claimed, match_level = decision.match_level, "login.face.matched");
        Ok(account.username)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("{}", .0.description)]
    Denied(Denial),
    #[error("face enrollment failed: {0}")]
    Rejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("authentication worker failed: {0}")]
    Worker(String),
}

impl From<AuthnError> for EnrollmentError {
    fn from(e: AuthnError) -> Self {
        match e {
            AuthnError::Denied(d) => EnrollmentError::Denied(d),
            AuthnError::Store(s) => EnrollmentError::Store(s),
            AuthnError::Worker(w) => EnrollmentError::Worker(w),
        }
    }
}

/// Binds a face reference to an account after re-checking its password.
/// The existing reference id is reused, so retries converge on one enrollment.
pub async fn enroll_face(
    accounts: &SharedAccountStore,
    verifier: &dyn BiometricVerifier,
    policy: MatchPolicy,
    timeout: Duration,
    credentials: PasswordEvidence,
    capture: CapturePayload,
    device: &DeviceIdentity,
) -> Result<String, EnrollmentError> {
    let username = PasswordStrategy::new(accounts.clone()).authenticate(credentials).await?;
    let Some(mut account) = accounts.get(&username).await? else {
        return Err(EnrollmentError::Denied(Denial::access_denied(BAD_CREDENTIALS)));
    };
    if !capture.is_well_formed() {
        return Err(EnrollmentError::Rejected("malformed capture".into()));
    }
    let reference = account
        .biometric_reference_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = ProviderRequest { capture, external_database_ref_id: reference.clone() };

    let decision = match tokio::time::timeout(timeout, verifier.enroll_capture(&request, device)).await {
        Ok(Ok(d)) => d,
        Ok(Err(e)) => {
            warn!(account = %username, error = %e, "enroll.face.upstream_failure");
            return Err(EnrollmentError::Rejected(e.to_string()));
        }
        Err(_) => {
            warn!(account = %username, "enroll.face.upstream_timeout");
            return Err(EnrollmentError::Rejected("provider timed out".into()));
        }
    };
    policy
        .evaluate_processing(&decision)
        .map_err(|r| EnrollmentError::Rejected(r.to_string()))?;

    if account.biometric_reference_id.as_deref() != Some(reference.as_str()) {
        account.biometric_reference_id = Some(reference.clone());
        accounts.set(&username, account).await?;
    }
    info!(account = %username, reference = %reference, "enroll.face.stored");
    Ok(reference)
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod strategy_tests;
