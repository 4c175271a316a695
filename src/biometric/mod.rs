//! Remote 3D face matching: wire types, acceptance policy and the HTTP client.

mod client;
mod decision;

pub use client::{BiometricVerifier, FaceTecClient, TransportError, DEVICE_KEY_HEADER, USER_AGENT_HEADER};
pub use decision::{
    CapturePayload, DeviceIdentity, MatchDecision, MatchPolicy, ProviderRequest, Rejection, SecurityChecks,
};
