//! The authorization session engine seam, plus an in-process engine used by
//! the server binary and tests. The in-process engine emulates how an OIDC
//! provider re-evaluates a request after each finalize: login moves on to
//! consent, consent or an error completes the interaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::consent::Grant;
use super::types::{
    ConsentOutcome, FinalizeOptions, Finalized, GrantId, InteractionResult, LoginOutcome, PendingInteraction,
    Prompt, PromptKind, RequestParams, SessionInfo,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("interaction {0} not found")]
    InteractionNotFound(String),
    #[error("grant {0} not found")]
    GrantNotFound(GrantId),
    #[error("grant {0} was modified concurrently")]
    Conflict(GrantId),
    #[error("session engine failure: {0}")]
    Backend(String),
}

/// Consumed interface of the authorization session engine. `uid` is the
/// request context: it selects the interaction the user agent is bound to.
#[async_trait]
pub trait SessionEngine: Send + Sync {
    async fn pending_interaction(&self, uid: &str) -> Result<PendingInteraction, EngineError>;
    async fn finalize_interaction(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinalizeOptions,
    ) -> Result<Finalized, EngineError>;
    async fn find_grant(&self, grant_id: &str) -> Result<Option<Grant>, EngineError>;
    /// Returns an unsaved grant; it has no id until `save_grant`.
    async fn create_grant(&self, account_id: &str, client_id: &str) -> Result<Grant, EngineError>;
    /// Persists `grant`. Fails with `Conflict` if the stored revision moved on
    /// since `grant` was read.
    async fn save_grant(&self, grant: &Grant) -> Result<GrantId, EngineError>;
}

/// Accumulated finalize results for one interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub login: Option<LoginOutcome>,
    pub consent: Option<ConsentOutcome>,
    pub error: Option<(String, String)>,
}

impl Submission {
    fn overlay(&mut self, result: &InteractionResult) {
        match result {
            InteractionResult::Login { login } => self.login = Some(login.clone()),
            InteractionResult::Consent { consent } => self.consent = Some(consent.clone()),
            InteractionResult::Error { error, error_description } => {
                self.error = Some((error.clone(), error_description.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeRecord {
    pub uid: String,
    pub result: InteractionResult,
    pub options: FinalizeOptions,
    pub submission: Submission,
}

struct InteractionRecord {
    pending: PendingInteraction,
    last_submission: Option<Submission>,
}

/// Latest finalize for a uid, kept for the resume route until it expires.
struct Outcome {
    record: FinalizeRecord,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct EngineState {
    interactions: HashMap<String, InteractionRecord>,
    grants: HashMap<GrantId, Grant>,
    finalized: HashMap<String, Outcome>,
}

pub struct MemorySessionEngine {
    issuer: String,
    ttl: ChronoDuration,
    state: Mutex<EngineState>,
}

impl MemorySessionEngine {
    pub fn new(issuer: impl Into<String>, ttl: std::time::Duration) -> Self {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1));
        Self { issuer: issuer.into(), ttl, state: Mutex::new(EngineState::default()) }
    }

    /// Starts a new authorization attempt at the login prompt.
    pub fn begin(&self, params: RequestParams) -> PendingInteraction {
        let pending = PendingInteraction {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            prompt: Prompt { name: PromptKind::Login, details: json!({}) },
            params,
            session: None,
            grant_id: None,
            expires_at: Utc::now() + self.ttl,
        };
        self.insert(pending.clone());
        pending
    }

    /// Registers an interaction as-is, replacing any with the same uid.
    pub fn insert(&self, pending: PendingInteraction) {
        let uid = pending.uid.clone();
        self.state.lock().interactions.insert(uid, InteractionRecord { pending, last_submission: None });
    }

    /// Unexpired finalize records, one per uid, ordered by uid.
    pub fn finalizations(&self) -> Vec<FinalizeRecord> {
        let now = Utc::now();
        let mut records: Vec<FinalizeRecord> = self
            .state
            .lock()
            .finalized
            .values()
            .filter(|o| o.expires_at > now)
            .map(|o| o.record.clone())
            .collect();
        records.sort_by(|a, b| a.uid.cmp(&b.uid));
        records
    }

    /// Most recent finalize for `uid`, if any and not yet expired.
    pub fn last_finalization(&self, uid: &str) -> Option<FinalizeRecord> {
        let state = self.state.lock();
        let outcome = state.finalized.get(uid)?;
        (outcome.expires_at > Utc::now()).then(|| outcome.record.clone())
    }

    pub fn is_pending(&self, uid: &str) -> bool {
        self.state.lock().interactions.get(uid).is_some_and(|r| r.pending.expires_at > Utc::now())
    }

    pub fn grant(&self, grant_id: &str) -> Option<Grant> {
        self.state.lock().grants.get(grant_id).cloned()
    }

    /// Drops expired interactions and finalize records; returns how many
    /// entries were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock();
        let before = state.interactions.len() + state.finalized.len();
        state.interactions.retain(|_, r| r.pending.expires_at > now);
        state.finalized.retain(|_, o| o.expires_at > now);
        before - state.interactions.len() - state.finalized.len()
    }

    pub fn live_interactions(&self) -> usize {
        let now = Utc::now();
        self.state.lock().interactions.values().filter(|r| r.pending.expires_at > now).count()
    }

    fn resume_url(&self, uid: &str) -> String {
        format!("{}/auth/{}", self.issuer.trim_end_matches('/'), uid)
    }
}

/// Moves the interaction to consent after a login, or reports it complete.
fn advance_after_login(state: &mut EngineState, uid: &str, account_id: &str) -> bool {
    let grants = &state.grants;
    let Some(record) = state.interactions.get_mut(uid) else { return true };
    let client_id = record.pending.params.client_id.clone();
    let existing = grants
        .values()
        .find(|g| g.account_id == account_id && g.client_id == client_id);
    let missing: Vec<String> = record
        .pending
        .params
        .scope_tokens()
        .filter(|s| existing.map_or(true, |g| !g.has_scope(s)))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        return true;
    }
    record.pending.session = Some(SessionInfo { account_id: account_id.to_string() });
    record.pending.grant_id = existing.and_then(|g| g.id.clone());
    record.pending.prompt = Prompt {
        name: PromptKind::Consent,
        details: json!({ "missingOIDCScope": missing }),
    };
    false
}

#[async_trait]
impl SessionEngine for MemorySessionEngine {
    async fn pending_interaction(&self, uid: &str) -> Result<PendingInteraction, EngineError> {
        let mut state = self.state.lock();
        let expired = match state.interactions.get(uid) {
            None => return Err(EngineError::InteractionNotFound(uid.to_string())),
            Some(r) => r.pending.expires_at <= Utc::now(),
        };
        if expired {
            state.interactions.remove(uid);
            debug!(uid, "interaction.expired");
            return Err(EngineError::InteractionNotFound(uid.to_string()));
        }
        Ok(state.interactions[uid].pending.clone())
    }

    async fn finalize_interaction(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinalizeOptions,
    ) -> Result<Finalized, EngineError> {
        let mut state = self.state.lock();
        let record = state
            .interactions
            .get_mut(uid)
            .ok_or_else(|| EngineError::InteractionNotFound(uid.to_string()))?;
        let mut submission = if options.merge_with_last_submission {
            record.last_submission.clone().unwrap_or_default()
        } else {
            Submission::default()
        };
        submission.overlay(&result);
        record.last_submission = Some(submission.clone());

        let complete = match &result {
            InteractionResult::Login { login } => advance_after_login(&mut state, uid, &login.account_id),
            InteractionResult::Consent { .. } | InteractionResult::Error { .. } => true,
        };
        if complete {
            state.interactions.remove(uid);
        }
        debug!(
            uid,
            result = result.label(),
            merge = options.merge_with_last_submission,
            complete,
            "interaction.finalized"
        );
        let record = FinalizeRecord { uid: uid.to_string(), result, options, submission };
        state.finalized.insert(uid.to_string(), Outcome { record, expires_at: Utc::now() + self.ttl });
        Ok(Finalized { redirect_to: self.resume_url(uid) })
    }

    async fn find_grant(&self, grant_id: &str) -> Result<Option<Grant>, EngineError> {
        Ok(self.state.lock().grants.get(grant_id).cloned())
    }

    async fn create_grant(&self, account_id: &str, client_id: &str) -> Result<Grant, EngineError> {
        Ok(Grant::new(account_id, client_id))
    }

    async fn save_grant(&self, grant: &Grant) -> Result<GrantId, EngineError> {
        let mut state = self.state.lock();
        let mut stored = grant.clone();
        let id = match &grant.id {
            None => uuid::Uuid::new_v4().to_string(),
            Some(id) => {
                let current = state.grants.get(id).ok_or_else(|| EngineError::GrantNotFound(id.clone()))?;
                if current.revision != grant.revision {
                    return Err(EngineError::Conflict(id.clone()));
                }
                id.clone()
            }
        };
        stored.id = Some(id.clone());
        stored.revision = grant.revision + 1;
        state.grants.insert(id.clone(), stored);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> MemorySessionEngine {
        MemorySessionEngine::new("http://localhost:3000/", Duration::from_secs(3600))
    }

    fn params(scope: &str) -> RequestParams {
        RequestParams { client_id: "app".into(), scope: scope.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn login_advances_to_consent_with_missing_scopes() {
        let e = engine();
        let p = e.begin(params("openid profile"));
        let fin = e
            .finalize_interaction(&p.uid, InteractionResult::login("alice"), FinalizeOptions::REPLACE)
            .await
            .unwrap();
        assert_eq!(fin.redirect_to, format!("http://localhost:3000/auth/{}", p.uid));

        let next = e.pending_interaction(&p.uid).await.unwrap();
        assert_eq!(next.prompt.name, PromptKind::Consent);
        assert_eq!(next.session.unwrap().account_id, "alice");
        assert_eq!(next.prompt.details, json!({"missingOIDCScope": ["openid", "profile"]}));
    }

    #[tokio::test]
    async fn error_result_completes_interaction() {
        let e = engine();
        let p = e.begin(params("openid"));
        e.finalize_interaction(&p.uid, InteractionResult::aborted(), FinalizeOptions::REPLACE)
            .await
            .unwrap();
        assert!(matches!(e.pending_interaction(&p.uid).await, Err(EngineError::InteractionNotFound(_))));
        assert!(matches!(
            e.finalize_interaction(&p.uid, InteractionResult::aborted(), FinalizeOptions::REPLACE).await,
            Err(EngineError::InteractionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn merge_keeps_previous_login() {
        let e = engine();
        let p = e.begin(params("openid"));
        e.finalize_interaction(&p.uid, InteractionResult::login("alice"), FinalizeOptions::REPLACE)
            .await
            .unwrap();
        e.finalize_interaction(&p.uid, InteractionResult::consent("g1"), FinalizeOptions::MERGE)
            .await
            .unwrap();
        assert_eq!(e.finalizations().len(), 1);
        let last = e.last_finalization(&p.uid).unwrap();
        assert_eq!(last.submission.login.unwrap().account_id, "alice");
        assert_eq!(last.submission.consent.unwrap().grant_id, "g1");
    }

    #[tokio::test]
    async fn finalize_records_expire_and_are_swept() {
        let e = MemorySessionEngine::new("http://localhost:3000", Duration::from_millis(500));
        for _ in 0..20 {
            let p = e.begin(params("openid"));
            e.finalize_interaction(&p.uid, InteractionResult::aborted(), FinalizeOptions::REPLACE)
                .await
                .unwrap();
        }
        let last = e.finalizations().pop().unwrap();
        assert_eq!(e.finalizations().len(), 20);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(e.last_finalization(&last.uid).is_none());
        assert!(e.finalizations().is_empty());
        assert_eq!(e.sweep_expired(), 20);
        assert_eq!(e.sweep_expired(), 0);
    }

    #[tokio::test]
    async fn save_grant_detects_stale_revision() {
        let e = engine();
        let g = e.create_grant("alice", "app").await.unwrap();
        let id = e.save_grant(&g).await.unwrap();
        let fresh = e.find_grant(&id).await.unwrap().unwrap();
        assert_eq!(fresh.revision, 1);

        e.save_grant(&fresh).await.unwrap();
        assert!(matches!(e.save_grant(&fresh).await, Err(EngineError::Conflict(_))));
    }

    #[tokio::test]
    async fn expired_interaction_is_gone() {
        let e = engine();
        let mut p = e.begin(params("openid"));
        p.expires_at = Utc::now() - ChronoDuration::seconds(1);
        e.insert(p.clone());
        assert_eq!(e.live_interactions(), 0);
        assert_eq!(e.sweep_expired(), 1);
        assert!(!e.is_pending(&p.uid));
        assert!(matches!(e.pending_interaction(&p.uid).await, Err(EngineError::InteractionNotFound(_))));
    }
}
