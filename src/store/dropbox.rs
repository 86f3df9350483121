//! Dropbox store using the HTTP API v2 with a bearer token.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{object_path, DestinationStore, UploadStatus};
use crate::config::DROPBOX_TOKEN_ENV;
use crate::error::StoreError;

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Page size requested from `files/list_folder`.
const LIST_LIMIT: u32 = 2000;

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<ListEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_summary: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    email: Option<String>,
}

/// Dropbox destination store.
pub struct DropboxStore {
    client: Client,
    token: String,
}

impl DropboxStore {
    /// Create a store authenticated with `token`.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StoreError::Unauthorized("access token is empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.trim().to_string(),
        })
    }

    /// Create a store from the `DROPBOX_ACCESS_TOKEN` environment variable.
    pub fn from_env(timeout: Duration) -> Result<Self, StoreError> {
        let token = std::env::var(DROPBOX_TOKEN_ENV).map_err(|_| {
            StoreError::Unauthorized(format!("{} is not set", DROPBOX_TOKEN_ENV))
        })?;
        Self::new(token, timeout)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// POST a JSON argument to an RPC endpoint.
    async fn rpc(&self, endpoint: &str, arg: &serde_json::Value) -> Result<Response, StoreError> {
        let response = self
            .client
            .post(format!("{}/{}", API_BASE, endpoint))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, "application/json")
            .body(arg.to_string())
            .send()
            .await?;
        Ok(response)
    }

    async fn list_page(
        &self,
        endpoint: &str,
        arg: serde_json::Value,
    ) -> Result<Option<ListFolderResponse>, StoreError> {
        let response = self.rpc(endpoint, &arg).await?;
        let status = response.status();
        if status.is_success() {
            let page = response
                .json::<ListFolderResponse>()
                .await
                .map_err(|e| StoreError::Parse(e.to_string()))?;
            return Ok(Some(page));
        }

        let summary = error_summary(response).await;
        if status == StatusCode::CONFLICT && summary.starts_with("path/not_found") {
            return Ok(None);
        }
        Err(classify(status, summary))
    }
}

#[async_trait]
impl DestinationStore for DropboxStore {
    fn name(&self) -> &str {
        "dropbox"
    }

    async fn verify(&self) -> Result<(), StoreError> {
        let response = self
            .rpc("users/get_current_account", &serde_json::Value::Null)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify(status, error_summary(response).await));
        }

        let account = response
            .json::<Account>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        info!(
            "Dropbox authenticated{}",
            account
                .email
                .map(|e| format!(" as {}", e))
                .unwrap_or_default()
        );
        Ok(())
    }

    async fn list_existing_names(&self, folder: &str) -> Result<HashSet<String>, StoreError> {
        let mut names = HashSet::new();
        let path = api_folder_path(folder);

        let mut page = match self
            .list_page(
                "files/list_folder",
                json!({ "path": path, "recursive": false, "limit": LIST_LIMIT }),
            )
            .await?
        {
            Some(page) => page,
            None => {
                debug!("Dropbox folder {} does not exist yet", folder);
                return Ok(names);
            }
        };

        loop {
            names.extend(
                page.entries
                    .into_iter()
                    .filter(|e| e.tag == "file")
                    .map(|e| e.name),
            );
            if !page.has_more {
                break;
            }
            page = self
                .list_page(
                    "files/list_folder/continue",
                    json!({ "cursor": page.cursor }),
                )
                .await?
                .ok_or_else(|| StoreError::Parse("folder vanished while listing".to_string()))?;
        }

        Ok(names)
    }

    async fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<UploadStatus, StoreError> {
        let arg = json!({
            "path": object_path(folder, name),
            "mode": "add",
            "autorename": false,
            "mute": true,
        });

        let response = self
            .client
            .post(format!("{}/files/upload", CONTENT_BASE))
            .header(AUTHORIZATION, self.bearer())
            .header("Dropbox-API-Arg", header_safe_json(&arg))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(UploadStatus::Created);
        }

        let summary = error_summary(response).await;
        if status == StatusCode::CONFLICT && summary.contains("/conflict") {
            return Ok(UploadStatus::AlreadyExists);
        }
        Err(classify(status, summary))
    }
}

/// The API addresses the root folder as "" rather than "/".
fn api_folder_path(folder: &str) -> String {
    let trimmed = folder.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        trimmed.to_string()
    }
}

async fn error_summary(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error_summary)
        .unwrap_or(text)
}

/// Map a non-success status and error summary onto the store error taxonomy.
fn classify(status: StatusCode, summary: String) -> StoreError {
    match status.as_u16() {
        401 | 403 => StoreError::Unauthorized(summary),
        507 => StoreError::InsufficientSpace(summary),
        409 if summary.contains("insufficient_space") => StoreError::InsufficientSpace(summary),
        429 => StoreError::Transient(format!("rate limited: {}", summary)),
        s if s >= 500 => StoreError::Transient(format!("HTTP {}: {}", s, summary)),
        s => StoreError::Rejected(format!("HTTP {}: {}", s, summary)),
    }
}

/// JSON for the `Dropbox-API-Arg` header. Header values must be ASCII, so
/// everything outside it (and DEL) is written as `\uXXXX` escapes.
fn header_safe_json(value: &serde_json::Value) -> String {
    let json = value.to_string();
    let mut out = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for c in json.chars() {
        if c.is_ascii() && c != '\x7f' {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
