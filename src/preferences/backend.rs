//! Preferences endpoint client.
//!
//! # Responsibilities
//! - Fetch the whole preference document (`GET`)
//! - Replace the whole preference document (`POST`)
//! - Map HTTP outcomes onto `PreferenceError`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::preferences::types::{PreferenceError, PreferenceSet};

/// Server-side authority for the preference document.
#[async_trait]
pub trait PreferencesBackend: Send + Sync {
    /// Fetch the full document.
    async fn fetch(&self) -> Result<PreferenceSet, PreferenceError>;

    /// Replace the full document. There is no partial update.
    async fn replace(&self, document: &PreferenceSet) -> Result<(), PreferenceError>;
}

/// HTTP implementation of [`PreferencesBackend`].
#[derive(Clone)]
pub struct HttpPreferencesBackend {
    client: Client,
    url: String,
    session_token: Option<String>,
}

impl HttpPreferencesBackend {
    pub fn new(client: Client, url: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            session_token,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), PreferenceError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::UNAUTHORIZED {
        Err(PreferenceError::Unauthorized)
    } else {
        Err(PreferenceError::Status(status.as_u16()))
    }
}

/// Decode a response body into a preference document.
///
/// An empty body or `null` is treated as an empty document.
pub fn decode_document(body: &[u8]) -> Result<PreferenceSet, PreferenceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PreferenceSet::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(PreferenceSet::new()),
        Ok(other) => Err(PreferenceError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(PreferenceError::Malformed(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl PreferencesBackend for HttpPreferencesBackend {
    async fn fetch(&self) -> Result<PreferenceSet, PreferenceError> {
        let response = self
            .authorize(self.client.get(&self.url))
            .send()
            .await
            .map_err(|e| PreferenceError::Network(e.to_string()))?;

        check_status(response.status())?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PreferenceError::Network(e.to_string()))?;
        decode_document(&body)
    }

    async fn replace(&self, document: &PreferenceSet) -> Result<(), PreferenceError> {
        let response = self
            .authorize(self.client.post(&self.url))
            .json(document)
            .send()
            .await
            .map_err(|e| PreferenceError::Network(e.to_string()))?;

        check_status(response.status())
    }
}
