use serde::{Deserialize, Serialize};

/// Capture produced by the client-side face SDK. Opaque to us apart from the
/// requirement that `face_scan` is present and base64.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    #[serde(default)]
    pub face_scan: String,
    #[serde(default)]
    pub audit_trail_image: Option<String>,
    #[serde(default)]
    pub low_quality_audit_trail_image: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl CapturePayload {
    pub fn is_well_formed(&self) -> bool {
        use base64::Engine;
        let scan = self.face_scan.trim();
        !scan.is_empty() && base64::engine::general_purpose::STANDARD.decode(scan).is_ok()
    }
}

/// Identity headers the SDK attaches to every provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_key: String,
    pub user_agent_token: String,
}

/// Body of a `/match-3d-3d` or `/enrollment-3d` call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest {
    #[serde(flatten)]
    pub capture: CapturePayload,
    #[serde(rename = "externalDatabaseRefID")]
    pub external_database_ref_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityChecks {
    #[serde(default)]
    pub audit_trail_verification_check_succeeded: bool,
    #[serde(default)]
    pub face_scan_liveness_check_succeeded: bool,
    #[serde(default)]
    pub replay_check_succeeded: bool,
    #[serde(default)]
    pub session_token_check_succeeded: bool,
}

impl SecurityChecks {
    /// Name of the first failing check, if any.
    pub fn first_failure(&self) -> Option<&'static str> {
        if !self.audit_trail_verification_check_succeeded {
            Some("auditTrailVerification")
        } else if !self.face_scan_liveness_check_succeeded {
            Some("faceScanLiveness")
        } else if !self.replay_check_succeeded {
            Some("replay")
        } else if !self.session_token_check_succeeded {
            Some("sessionToken")
        } else {
            None
        }
    }
}

/// Provider verdict. Missing fields decode to their failing value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchDecision {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub was_processed: bool,
    #[serde(default = "default_error")]
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub match_level: u8,
    #[serde(default)]
    pub face_scan_security_checks: SecurityChecks,
    #[serde(default)]
    pub scan_result_blob: Option<String>,
}

fn default_error() -> bool { true }

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("provider did not process the capture")]
    NotProcessed,
    #[error("provider reported an error: {0}")]
    ProviderError(String),
    #[error("provider reported no success")]
    Unsuccessful,
    #[error("security check failed: {0}")]
    SecurityCheckFailed(&'static str),
    #[error("match level {got} below required {min}")]
    MatchLevelTooLow { got: u8, min: u8 },
}

/// Acceptance rule for provider verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub min_match_level: u8,
}

impl Default for MatchPolicy {
    fn default() -> Self { Self { min_match_level: 3 } }
}

impl MatchPolicy {
    /// Checks processing flags and security checks. Enrollment stops here.
    pub fn evaluate_processing(&self, d: &MatchDecision) -> Result<(), Rejection> {
        if d.error {
            return Err(Rejection::ProviderError(
                d.error_message.clone().unwrap_or_else(|| "unspecified".into()),
            ));
        }
        if !d.was_processed {
            return Err(Rejection::NotProcessed);
        }
        if let Some(check) = d.face_scan_security_checks.first_failure() {
            return Err(Rejection::SecurityCheckFailed(check));
        }
        if !d.success {
            return Err(Rejection::Unsuccessful);
        }
        Ok(())
    }

    /// Full rule for a 3D-3D match: processing rules plus the match level floor.
    pub fn evaluate_match(&self, d: &MatchDecision) -> Result<(), Rejection> {
        self.evaluate_processing(d)?;
        if d.match_level < self.min_match_level {
            return Err(Rejection::MatchLevelTooLow { got: d.match_level, min: self.min_match_level });
        }
        Ok(())
    }
}
