//! Stateless HTTP helper for content sources and button actions.

use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {reason}{}", body_suffix(.body))]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {body}")
    }
}

/// Basic-auth credentials. Only used when both halves are present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// POST a JSON body and return the response text.
    pub async fn fetch_text(
        &self,
        url: &str,
        body: &Value,
        auth: Option<&BasicAuth>,
    ) -> Result<String, HttpError> {
        let request = with_auth(self.client.post(url).json(body), auth);
        let response = checked(request.send().await?).await?;
        Ok(response.text().await?)
    }

    /// POST a JSON body. A body that is not JSON reads as `{}`.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        auth: Option<&BasicAuth>,
    ) -> Result<Value, HttpError> {
        let request = with_auth(self.client.post(url).json(body), auth);
        let response = checked(request.send().await?).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({})))
    }

    /// GET raw bytes.
    pub async fn get_bytes(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<Vec<u8>, HttpError> {
        let request = with_auth(self.client.get(url), auth);
        let response = checked(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn with_auth(
    request: reqwest::RequestBuilder,
    auth: Option<&BasicAuth>,
) -> reqwest::RequestBuilder {
    match auth {
        Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
        None => request,
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "content request rejected");
    Err(HttpError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        body,
    })
}
