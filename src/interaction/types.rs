use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::identity::Denial;

pub type GrantId = String;

/// Which user input the engine is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PromptKind {
    Login,
    Consent,
    Unsupported(String),
}

impl PromptKind {
    pub fn name(&self) -> &str {
        match self {
            PromptKind::Login => "login",
            PromptKind::Consent => "consent",
            PromptKind::Unsupported(name) => name.as_str(),
        }
    }
}

impl From<String> for PromptKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "login" => PromptKind::Login,
            "consent" => PromptKind::Consent,
            _ => PromptKind::Unsupported(name),
        }
    }
}

impl From<PromptKind> for String {
    fn from(kind: PromptKind) -> Self { kind.name().to_string() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: PromptKind,
    /// Opaque to everything but the consent path, which reads the missing-* deltas.
    #[serde(default)]
    pub details: JsonValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub client_id: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl RequestParams {
    pub fn scope_tokens(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "accountId")]
    pub account_id: String,
}

/// One in-flight authorization attempt, owned by the session engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInteraction {
    pub uid: String,
    pub prompt: Prompt,
    pub params: RequestParams,
    #[serde(default)]
    pub session: Option<SessionInfo>,
    #[serde(default, rename = "grantId")]
    pub grant_id: Option<GrantId>,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    #[serde(rename = "accountId")]
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentOutcome {
    #[serde(rename = "grantId")]
    pub grant_id: GrantId,
}

/// Outcome handed back to the engine. Serializes to exactly one of
/// `{login:{accountId}}`, `{consent:{grantId}}` or `{error, error_description}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionResult {
    Login { login: LoginOutcome },
    Consent { consent: ConsentOutcome },
    Error { error: String, error_description: String },
}

pub const ABORTED_DESCRIPTION: &str = "End-User aborted interaction";

impl InteractionResult {
    pub fn login(account_id: impl Into<String>) -> Self {
        InteractionResult::Login { login: LoginOutcome { account_id: account_id.into() } }
    }

    pub fn consent(grant_id: impl Into<String>) -> Self {
        InteractionResult::Consent { consent: ConsentOutcome { grant_id: grant_id.into() } }
    }

    pub fn error(error: impl Into<String>, description: impl Into<String>) -> Self {
        InteractionResult::Error { error: error.into(), error_description: description.into() }
    }

    pub fn denied(denial: Denial) -> Self {
        InteractionResult::Error { error: denial.error, error_description: denial.description }
    }

    pub fn aborted() -> Self {
        Self::error(crate::identity::ACCESS_DENIED, ABORTED_DESCRIPTION)
    }

    pub fn label(&self) -> &'static str {
        match self {
            InteractionResult::Login { .. } => "login",
            InteractionResult::Consent { .. } => "consent",
            InteractionResult::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOptions {
    pub merge_with_last_submission: bool,
}

impl FinalizeOptions {
    pub const REPLACE: FinalizeOptions = FinalizeOptions { merge_with_last_submission: false };
    pub const MERGE: FinalizeOptions = FinalizeOptions { merge_with_last_submission: true };
}

/// Engine acknowledgement of a finalize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalized {
    /// Where the user agent goes next so the engine can resume the request.
    pub redirect_to: String,
}

/// What an orchestrator operation delivered to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub result: InteractionResult,
    pub options: FinalizeOptions,
    pub redirect_to: String,
}
