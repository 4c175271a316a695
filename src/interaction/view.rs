use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::types::{PendingInteraction, RequestParams};

/// Key -> JSON text listing shown in the debug panel of both pages.
pub type DebugEntries = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub params: DebugEntries,
    pub prompt: DebugEntries,
}

/// Render data for the current prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "prompt", rename_all = "snake_case")]
pub enum PromptView {
    Login {
        uid: String,
        title: &'static str,
        details: JsonValue,
        params: RequestParams,
        session: Option<DebugEntries>,
        dbg: DebugInfo,
    },
    Consent {
        uid: String,
        title: &'static str,
        #[serde(rename = "clientId")]
        client_id: String,
        /// Requested scopes, comma separated for display.
        scope: String,
        session: Option<DebugEntries>,
        dbg: DebugInfo,
    },
}

fn debug_entries<T: Serialize>(value: &T) -> DebugEntries {
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => map.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
        _ => DebugEntries::new(),
    }
}

fn debug_info(pending: &PendingInteraction) -> DebugInfo {
    DebugInfo { params: debug_entries(&pending.params), prompt: debug_entries(&pending.prompt) }
}

pub fn login_view(pending: &PendingInteraction) -> PromptView {
    PromptView::Login {
        uid: pending.uid.clone(),
        title: "Sign-In",
        details: pending.prompt.details.clone(),
        params: pending.params.clone(),
        session: pending.session.as_ref().map(debug_entries),
        dbg: debug_info(pending),
    }
}

pub fn consent_view(pending: &PendingInteraction) -> PromptView {
    PromptView::Consent {
        uid: pending.uid.clone(),
        title: "Authorize",
        client_id: pending.params.client_id.clone(),
        scope: pending.params.scope.replace(' ', ", "),
        session: pending.session.as_ref().map(debug_entries),
        dbg: debug_info(pending),
    }
}
