//! Provider payload parsers producing [`CanonicalEvent`]s

pub mod codehub;
pub mod github;
pub mod gitlab;

use axum::http::HeaderMap;

use crate::error::{Result, SyncError};
use crate::event::{CanonicalEvent, Provider};
use crate::utils::verify_token;

/// Outcome of normalizing one raw webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(CanonicalEvent),
    /// The provider sent an event type nothing here acts on (comments, pipelines, ...).
    NotRecognized(String),
}

/// Capability every provider parser implements.
pub trait HookParser: Send + Sync {
    /// Header carrying the event type hint.
    fn event_header(&self) -> &'static str;

    /// Header carrying the shared secret or signature.
    fn secret_header(&self) -> &'static str;

    /// Parse a raw payload; unknown hints yield [`Normalized::NotRecognized`].
    fn parse(&self, event_type: &str, payload: &[u8]) -> Result<Normalized>;

    /// Check the delivery against the configured secret.
    /// Plain token equality unless the provider signs its payloads.
    fn verify(&self, secret: &str, headers: &HeaderMap, _payload: &[u8]) -> bool {
        let token = header_str(headers, self.secret_header()).unwrap_or("");
        verify_token(secret, token)
    }
}

pub fn parser_for(provider: Provider) -> &'static dyn HookParser {
    match provider {
        Provider::Codehub => &codehub::CodehubParser,
        Provider::Gitlab => &gitlab::GitlabParser,
        Provider::Github => &github::GithubParser,
    }
}

/// Read the event type hint for `provider` from the request headers.
pub fn event_type(provider: Provider, headers: &HeaderMap) -> String {
    header_str(headers, parser_for(provider).event_header())
        .unwrap_or("")
        .to_string()
}

/// Returns `true` when the delivery passes the secret gate.
/// An empty configured secret disables the check.
pub fn authenticate(provider: Provider, secret: &str, headers: &HeaderMap, payload: &[u8]) -> bool {
    if secret.is_empty() {
        return true;
    }
    parser_for(provider).verify(secret, headers, payload)
}

pub fn normalize(provider: Provider, event_type: &str, payload: &[u8]) -> Result<Normalized> {
    parser_for(provider).parse(event_type, payload)
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(event: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| SyncError::Parse {
        event: event.to_string(),
        message: e.to_string(),
    })
}
