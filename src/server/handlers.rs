use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AppState;
use crate::biometric::{CapturePayload, DeviceIdentity, DEVICE_KEY_HEADER, USER_AGENT_HEADER};
use crate::error::{AppError, AppResult, SERVER_ERROR_CODE};
use crate::identity::{
    enroll_face, register_account, BiometricAssertion, EnrollmentError, PasswordEvidence, RegistrationError,
};
use crate::interaction::{Resolution, RequestParams};

/// Runs a handler body, turning errors and panics into responses without
/// taking down the connection task.
async fn guarded<F, T>(route: &'static str, fut: F) -> Response
where
    F: Future<Output = AppResult<T>>,
    T: IntoResponse,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => value.into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", route, "HTTP handler panic: {}", msg);
            AppError::internal(SERVER_ERROR_CODE, "handler panic").into_response()
        }
    }
}

fn see_other(resolution: Resolution) -> Redirect {
    Redirect::to(&resolution.redirect_to)
}

fn device_identity(headers: &HeaderMap) -> AppResult<DeviceIdentity> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    match (read(DEVICE_KEY_HEADER), read(USER_AGENT_HEADER)) {
        (Some(device_key), Some(user_agent_token)) => Ok(DeviceIdentity { device_key, user_agent_token }),
        _ => Err(AppError::user(
            "missing_device_headers",
            "X-Device-Key and X-User-Agent headers are required.",
        )),
    }
}

impl From<RegistrationError> for AppError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::MissingField => AppError::user("missing_field".to_string(), e.to_string()),
            RegistrationError::Store(s) => AppError::internal(SERVER_ERROR_CODE.to_string(), s.to_string()),
        }
    }
}

impl From<EnrollmentError> for AppError {
    fn from(e: EnrollmentError) -> Self {
        let message = e.to_string();
        match e {
            EnrollmentError::Denied(d) => AppError::user(d.error, d.description),
            EnrollmentError::Rejected(_) => AppError::upstream("face_enrollment_failed".to_string(), message),
            _ => AppError::internal(SERVER_ERROR_CODE.to_string(), message),
        }
    }
}

pub async fn root() -> &'static str {
    "facegate ok"
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl From<Credentials> for PasswordEvidence {
    fn from(c: Credentials) -> Self {
        PasswordEvidence { username: c.username, password: c.password }
    }
}

pub async fn register(State(state): State<AppState>, Json(body): Json<Credentials>) -> Response {
    guarded("register", async move {
        register_account(state.accounts.as_ref(), &body.username, &body.password).await?;
        Ok((StatusCode::OK, "User successfully created."))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentBody {
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub capture: CapturePayload,
}

/// `username` is what later face logins send back; the provider reference is
/// informational only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReceipt {
    pub username: String,
    pub biometric_reference_id: String,
}

pub async fn enroll(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EnrollmentBody>,
) -> Response {
    guarded("enroll", async move {
        let device = device_identity(&headers)?;
        let reference = enroll_face(
            &state.accounts,
            state.verifier.as_ref(),
            state.policy,
            state.biometric_timeout,
            PasswordEvidence { username: username.clone(), password: body.password },
            body.capture,
            &device,
        )
        .await?;
        Ok(Json(EnrollmentReceipt { username, biometric_reference_id: reference }))
    })
    .await
}

pub async fn login(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Form(form): Form<Credentials>,
) -> Response {
    guarded("login", async move {
        let resolved = state
            .interactions
            .resolve_login(&uid, state.passwords.as_ref(), form.into())
            .await?;
        Ok(match resolved {
            Some(resolution) => see_other(resolution),
            // Not at the login prompt: show whatever the interaction is waiting for.
            None => Redirect::to(&format!("/interaction/{uid}")),
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    #[serde(flatten)]
    pub capture: CapturePayload,
    /// Account the face is claimed to belong to.
    #[serde(default)]
    pub username: Option<String>,
}

pub async fn verify(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<VerifyBody>,
) -> Response {
    guarded("verify", async move {
        let device = device_identity(&headers)?;
        let assertion = BiometricAssertion {
            capture: body.capture,
            device,
            claimed_account_id: body.username,
        };
        let resolved = state
            .interactions
            .resolve_login(&uid, state.biometrics.as_ref(), assertion)
            .await?;
        Ok(match resolved {
            Some(resolution) => see_other(resolution),
            None => Redirect::to(&format!("/interaction/{uid}")),
        })
    })
    .await
}

pub async fn confirm(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    guarded("confirm", async move {
        let resolution = state.interactions.resolve_consent(&uid).await?;
        Ok(see_other(resolution))
    })
    .await
}

pub async fn abort(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    guarded("abort", async move {
        let resolution = state.interactions.abort_interaction(&uid).await?;
        Ok(see_other(resolution))
    })
    .await
}

pub async fn interaction(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    guarded("interaction", async move {
        let view = state.interactions.describe_interaction(&uid).await?;
        Ok(Json(view))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub client_id: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Starts an authorization attempt on the in-process engine.
pub async fn begin(State(state): State<AppState>, Query(q): Query<AuthQuery>) -> Response {
    let params = RequestParams {
        client_id: q.client_id,
        scope: q.scope.unwrap_or_else(|| "openid".to_string()),
        redirect_uri: q.redirect_uri,
        ..Default::default()
    };
    let pending = state.engine.begin(params);
    info!(uid = %pending.uid, client = %pending.params.client_id, "interaction.started");
    Redirect::to(&format!("/interaction/{}", pending.uid)).into_response()
}

/// Resume target the engine hands back after each finalize.
pub async fn resume(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    if state.engine.is_pending(&uid) {
        return Redirect::to(&format!("/interaction/{uid}")).into_response();
    }
    match state.engine.last_finalization(&uid) {
        Some(record) => Json(record).into_response(),
        None => AppError::not_found("interaction_not_found", "interaction not found").into_response(),
    }
}
