use std::sync::Arc;

use tracing::{debug, info, warn};

use super::consent::{accumulate, ConsentDelta};
use super::engine::{EngineError, SessionEngine};
use super::types::{FinalizeOptions, GrantId, InteractionResult, PendingInteraction, PromptKind, Resolution};
use super::view::{consent_view, login_view, PromptView};
use crate::error::AppError;
use crate::identity::{AuthnError, Authenticator};

/// Attempts at the grant read-modify-write before giving up on a contended grant.
const MAX_GRANT_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("interaction {0} not found")]
    NotFound(String),
    #[error("Interaction prompt type must be `{expected}`.")]
    WrongPrompt { expected: &'static str, actual: String },
    #[error("interaction {0} has no authenticated session")]
    NoSession(String),
    #[error("prompt `{0}` is not implemented")]
    Unsupported(String),
    #[error("consent details are malformed: {0}")]
    InvalidDetails(String),
    #[error("grant {0} stayed contended after {1} attempts")]
    GrantContention(GrantId, usize),
    #[error("session engine: {0}")]
    Engine(EngineError),
    #[error("authentication fault")]
    Fault(#[source] AuthnError),
}

impl From<EngineError> for InteractionError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InteractionNotFound(uid) => InteractionError::NotFound(uid),
            other => InteractionError::Engine(other),
        }
    }
}

impl From<InteractionError> for AppError {
    fn from(e: InteractionError) -> Self {
        let message = e.to_string();
        match e {
            InteractionError::NotFound(_) => AppError::not_found("interaction_not_found", "interaction not found"),
            InteractionError::WrongPrompt { .. } => AppError::user("wrong_prompt".to_string(), message),
            InteractionError::NoSession(_) => {
                AppError::user("no_session", "Interaction has no authenticated session.")
            }
            InteractionError::Unsupported(_) => {
                AppError::not_implemented("unsupported_prompt", "Not implemented.")
            }
            // Faults keep their whole cause chain for the log line.
            other => AppError::from(anyhow::Error::new(other)),
        }
    }
}

/// Resolves one pending interaction per call. Holds no per-interaction state;
/// every operation re-reads the interaction from the engine.
#[derive(Clone)]
pub struct InteractionService {
    engine: Arc<dyn SessionEngine>,
}

impl InteractionService {
    pub fn new(engine: Arc<dyn SessionEngine>) -> Self { Self { engine } }

    pub fn engine(&self) -> &Arc<dyn SessionEngine> { &self.engine }

    /// Authenticates `evidence` with `authenticator` and finalizes the login
    /// prompt. Returns `None` without side effects when the interaction is not
    /// at the login prompt.
    pub async fn resolve_login<A: Authenticator>(
        &self,
        uid: &str,
        authenticator: &A,
        evidence: A::Evidence,
    ) -> Result<Option<Resolution>, InteractionError> {
        let pending = self.engine.pending_interaction(uid).await?;
        if pending.prompt.name != PromptKind::Login {
            debug!(uid, prompt = pending.prompt.name.name(), "login.skipped: not at login prompt");
            return Ok(None);
        }
        let result = match authenticator.authenticate(evidence).await {
            Ok(account_id) => {
                info!(uid, account = %account_id, strategy = authenticator.kind(), "login.accepted");
                InteractionResult::login(account_id)
            }
            Err(AuthnError::Denied(denial)) => {
                info!(uid, strategy = authenticator.kind(), "login.denied");
                InteractionResult::denied(denial)
            }
            Err(fault) => return Err(InteractionError::Fault(fault)),
        };
        self.finish(uid, result, FinalizeOptions::REPLACE).await.map(Some)
    }

    /// Applies the consent prompt's missing scope/claims/resource deltas to the
    /// interaction's grant and finalizes, merging with the earlier login.
    pub async fn resolve_consent(&self, uid: &str) -> Result<Resolution, InteractionError> {
        let pending = self.engine.pending_interaction(uid).await?;
        if pending.prompt.name != PromptKind::Consent {
            return Err(InteractionError::WrongPrompt {
                expected: "consent",
                actual: pending.prompt.name.name().to_string(),
            });
        }
        let delta = ConsentDelta::from_details(&pending.prompt.details)
            .map_err(|e| InteractionError::InvalidDetails(e.to_string()))?;
        let grant_id = self.accumulate_grant(&pending, &delta).await?;
        info!(uid, grant = %grant_id, "consent.granted");
        self.finish(uid, InteractionResult::consent(grant_id), FinalizeOptions::MERGE).await
    }

    /// Ends the interaction with an access_denied result, whatever the prompt.
    pub async fn abort_interaction(&self, uid: &str) -> Result<Resolution, InteractionError> {
        info!(uid, "interaction.aborted");
        self.finish(uid, InteractionResult::aborted(), FinalizeOptions::REPLACE).await
    }

    pub async fn describe_interaction(&self, uid: &str) -> Result<PromptView, InteractionError> {
        let pending = self.engine.pending_interaction(uid).await?;
        match &pending.prompt.name {
            PromptKind::Login => Ok(login_view(&pending)),
            PromptKind::Consent => Ok(consent_view(&pending)),
            PromptKind::Unsupported(name) => Err(InteractionError::Unsupported(name.clone())),
        }
    }

    async fn finish(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinalizeOptions,
    ) -> Result<Resolution, InteractionError> {
        let finalized = self.engine.finalize_interaction(uid, result.clone(), options).await?;
        Ok(Resolution { result, options, redirect_to: finalized.redirect_to })
    }

    /// Read-modify-write of the grant. A stale revision means another round
    /// saved first; re-reading and re-applying the delta is safe because the
    /// merge is a set union.
    async fn accumulate_grant(
        &self,
        pending: &PendingInteraction,
        delta: &ConsentDelta,
    ) -> Result<GrantId, InteractionError> {
        let account_id = pending
            .session
            .as_ref()
            .map(|s| s.account_id.clone())
            .ok_or_else(|| InteractionError::NoSession(pending.uid.clone()))?;
        let client_id = pending.params.client_id.as_str();

        for attempt in 1..=MAX_GRANT_ATTEMPTS {
            let existing = match &pending.grant_id {
                Some(id) => {
                    let found = self.engine.find_grant(id).await?;
                    if found.is_none() {
                        warn!(uid = %pending.uid, grant = %id, "consent.grant_missing: starting a new grant");
                    }
                    found
                }
                None => None,
            };
            let base = match existing {
                Some(g) => g,
                None => self.engine.create_grant(&account_id, client_id).await?,
            };
            let grant = accumulate(Some(base), &account_id, client_id, delta);
            match self.engine.save_grant(&grant).await {
                Ok(id) => return Ok(id),
                Err(EngineError::Conflict(id)) => {
                    debug!(uid = %pending.uid, grant = %id, attempt, "consent.grant_conflict");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(InteractionError::GrantContention(pending.grant_id.clone().unwrap_or_default(), MAX_GRANT_ATTEMPTS))
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
