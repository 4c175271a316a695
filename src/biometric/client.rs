use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use tracing::debug;

use super::decision::{DeviceIdentity, MatchDecision, ProviderRequest};

pub const DEVICE_KEY_HEADER: &str = "x-device-key";
pub const USER_AGENT_HEADER: &str = "x-user-agent";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid provider url: {0}")]
    Url(String),
    #[error("invalid device identity header: {0}")]
    Header(String),
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("provider response was not a match decision: {0}")]
    Decode(String),
}

/// Gateway to the remote 3D face matching service.
#[async_trait]
pub trait BiometricVerifier: Send + Sync {
    /// 3D-3D match of a fresh capture against an enrolled reference.
    async fn match_capture(
        &self,
        request: &ProviderRequest,
        device: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError>;
    /// Stores a capture as the enrolled reference for `externalDatabaseRefID`.
    async fn enroll_capture(
        &self,
        request: &ProviderRequest,
        device: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError>;
}

/// FaceTec-style REST provider client.
#[derive(Clone)]
pub struct FaceTecClient {
    base: Url,
    client: reqwest::Client,
}

impl FaceTecClient {
    pub fn new(base: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        // join() drops the last segment unless the base ends with '/'
        let normalized = if base.ends_with('/') { base.to_string() } else { format!("{base}/") };
        let base = Url::parse(&normalized).map_err(|e| TransportError::Url(e.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { base, client })
    }

    fn headers(device: &DeviceIdentity) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            DEVICE_KEY_HEADER,
            HeaderValue::from_str(&device.device_key).map_err(|e| TransportError::Header(e.to_string()))?,
        );
        headers.insert(
            USER_AGENT_HEADER,
            HeaderValue::from_str(&device.user_agent_token).map_err(|e| TransportError::Header(e.to_string()))?,
        );
        Ok(headers)
    }

    async fn post(
        &self,
        endpoint: &str,
        request: &ProviderRequest,
        device: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError> {
        let url = self.base.join(endpoint).map_err(|e| TransportError::Url(e.to_string()))?;
        debug!(%url, reference = %request.external_database_ref_id, "biometric.request");
        let resp = self
            .client
            .post(url)
            .headers(Self::headers(device)?)
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice::<MatchDecision>(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BiometricVerifier for FaceTecClient {
    async fn match_capture(
        &self,
        request: &ProviderRequest,
        device: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError> {
        self.post("match-3d-3d", request, device).await
    }

    async fn enroll_capture(
        &self,
        request: &ProviderRequest,
        device: &DeviceIdentity,
    ) -> Result<MatchDecision, TransportError> {
        self.post("enrollment-3d", request, device).await
    }
}
