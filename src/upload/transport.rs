use super::types::{FileDescriptor, UploadTarget};
use crate::session::CookieSource;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// One multipart upload request.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub file: FileDescriptor,
    pub collection_name: UploadTarget,
    /// Omitted from the payload entirely when `None`.
    pub session_id: Option<String>,
}

impl UploadForm {
    /// Field names in the order they are written to the multipart body.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = vec!["file", "collection_name"];
        if self.session_id.is_some() {
            names.push("session_id");
        }
        names
    }

    fn into_multipart(self) -> Form {
        let part = Part::bytes(self.file.content).file_name(self.file.name);
        let form = Form::new()
            .part("file", part)
            .text("collection_name", self.collection_name.as_str().to_string());
        match self.session_id {
            Some(session_id) => form.text("session_id", session_id),
            None => form,
        }
    }
}

/// Only `success` is binding. The other fields are free-form and kept for the reason text.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl UploadResponse {
    pub fn reason(&self) -> String {
        [&self.error, &self.message]
            .into_iter()
            .flatten()
            .find_map(describe)
            .unwrap_or_else(|| "server reported success=false".into())
    }
}

fn describe(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("upload endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(&self, form: UploadForm) -> Result<UploadResponse, TransportError>;
}

/// Posts forms to the host's upload endpoint with the browser's cookies attached.
pub struct HttpUploadTransport {
    client: Client,
    endpoint: Url,
    cookies: Arc<dyn CookieSource>,
}

impl HttpUploadTransport {
    pub fn new(client: Client, endpoint: Url, cookies: Arc<dyn CookieSource>) -> Self {
        Self {
            client,
            endpoint,
            cookies,
        }
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn send(&self, form: UploadForm) -> Result<UploadResponse, TransportError> {
        let mut req = self.client.post(self.endpoint.clone()).multipart(form.into_multipart());
        // A missing jar only drops credentials; the server decides what that means.
        if let Ok(cookie) = self.cookies.cookie_header().await {
            if !cookie.is_empty() {
                req = req.header(COOKIE, cookie);
            }
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Join an API path onto the host app's base URL.
pub fn api_url(base: &str, path: &str) -> anyhow::Result<Url> {
    let base = Url::parse(base)?;
    Ok(base.join(path)?)
}
