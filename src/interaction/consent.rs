//! Grant accumulation across consent rounds. Pure set-union, no I/O.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::types::GrantId;

/// Authorized scope/claims/resource access of one account for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Assigned by the grant store on first save.
    #[serde(default)]
    pub id: Option<GrantId>,
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub claims: BTreeSet<String>,
    #[serde(default, rename = "resourceScopes")]
    pub resource_scopes: BTreeMap<String, BTreeSet<String>>,
    /// Optimistic concurrency token, bumped by the store on every save.
    #[serde(default)]
    pub revision: u64,
}

impl Grant {
    pub fn new(account_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), client_id: client_id.into(), ..Default::default() }
    }

    pub fn has_scope(&self, scope: &str) -> bool { self.scopes.contains(scope) }
}

/// What the engine still needs granted this round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDelta {
    #[serde(default, rename = "missingOIDCScope")]
    pub missing_oidc_scope: Vec<String>,
    #[serde(default, rename = "missingOIDCClaims")]
    pub missing_oidc_claims: Vec<String>,
    #[serde(default, rename = "missingResourceScopes")]
    pub missing_resource_scopes: BTreeMap<String, Vec<String>>,
}

impl ConsentDelta {
    /// Reads the delta out of consent prompt details. Absent keys are empty.
    pub fn from_details(details: &JsonValue) -> Result<Self, serde_json::Error> {
        if details.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(details.clone())
    }

    pub fn scopes(scopes: &[&str]) -> Self {
        Self { missing_oidc_scope: scopes.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    pub fn claims(claims: &[&str]) -> Self {
        Self { missing_oidc_claims: claims.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_oidc_scope.is_empty()
            && self.missing_oidc_claims.is_empty()
            && self.missing_resource_scopes.is_empty()
    }
}

// entries may be space-delimited scope strings
fn tokens<'a>(entries: &'a [String]) -> impl Iterator<Item = String> + 'a {
    entries.iter().flat_map(|e| e.split_whitespace()).map(str::to_string)
}

/// Merges `delta` into `existing`, or into a fresh grant for
/// `(account_id, client_id)` when there is none. Never removes entries.
pub fn accumulate(existing: Option<Grant>, account_id: &str, client_id: &str, delta: &ConsentDelta) -> Grant {
    let mut grant = existing.unwrap_or_else(|| Grant::new(account_id, client_id));
    grant.scopes.extend(tokens(&delta.missing_oidc_scope));
    grant.claims.extend(delta.missing_oidc_claims.iter().cloned());
    for (indicator, scopes) in &delta.missing_resource_scopes {
        grant
            .resource_scopes
            .entry(indicator.clone())
            .or_default()
            .extend(tokens(scopes));
    }
    grant
}
