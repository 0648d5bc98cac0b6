use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tally::RemoteFileStore;
use tally_api::{ContainerId, FileHandle, RemoteVersionToken, StoreError};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DriveConfig;
use crate::models::{
    CreateFileRequest, DriveFile, FileList, RevisionMeta, APP_DATA_FOLDER, FILE_MIME_TYPE,
    FOLDER_MIME_TYPE,
};

const MAX_ERROR_BODY: usize = 500;

/// The client could not be constructed
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("No access token configured (set access_token or TALLY_ACCESS_TOKEN)")]
    MissingAccessToken,

    #[error("Access token is not a valid header value")]
    InvalidAccessToken,

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Drive v3 client scoped to the application data folder
pub struct DriveClient {
    config: DriveConfig,
    client: reqwest::Client,
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Result<Self, DriveError> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(DriveError::MissingAccessToken)?;
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| DriveError::InvalidAccessToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.config.api_base)
    }

    fn file_url(&self, file: &FileHandle) -> String {
        format!("{}/files/{}", self.config.api_base, file)
    }

    fn upload_url(&self) -> String {
        format!("{}/files", self.config.upload_base)
    }

    fn upload_file_url(&self, file: &FileHandle) -> String {
        format!("{}/files/{}", self.config.upload_base, file)
    }

    /// Map a transport error to a message that says what to check
    fn format_reqwest_error(e: reqwest::Error, url: &str, operation: &str) -> StoreError {
        let message = if e.is_timeout() {
            format!(
                "Failed to {} for {}: timeout - request took too long (check network or increase timeout_secs)",
                operation, url
            )
        } else if e.is_connect() {
            format!(
                "Failed to {} for {}: connection error - check network connectivity and DNS. Error: {}",
                operation, url, e
            )
        } else if e.is_request() {
            format!(
                "Failed to {} for {}: request error - invalid URL or malformed request. Error: {}",
                operation, url, e
            )
        } else {
            format!("Failed to {} for {}: {}", operation, url, e)
        };
        StoreError::Network { message }
    }

    /// Return the body of a successful response, or the error it describes.
    ///
    /// `resource` names what a 404 refers to.
    async fn handle_response(
        response: reqwest::Response,
        url: &str,
        resource: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::format_reqwest_error(e, url, "read response body"))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                id: resource.to_string(),
            });
        }
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let body = if text.chars().count() > MAX_ERROR_BODY {
                format!(
                    "{}... (truncated)",
                    text.chars().take(MAX_ERROR_BODY).collect::<String>()
                )
            } else {
                text.into_owned()
            };
            return Err(StoreError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        Ok(body.to_vec())
    }

    async fn send(
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
        resource: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let response = request.send().await.map_err(|e| {
            let err = Self::format_reqwest_error(e, url, operation);
            error!("[DriveClient] {}", err);
            err
        })?;
        Self::handle_response(response, url, resource)
            .await
            .inspect_err(|e| error!("[DriveClient] Failed to {}: {}", operation, e))
    }

    fn parse_json<T: DeserializeOwned>(body: &[u8], url: &str) -> Result<T, StoreError> {
        serde_json::from_slice(body).map_err(|e| StoreError::UnexpectedResponse {
            message: format!("Failed to parse response from {}: {}", url, e),
        })
    }

    fn head_revision(
        meta: RevisionMeta,
        file: &FileHandle,
    ) -> Result<RemoteVersionToken, StoreError> {
        meta.head_revision_id
            .map(RemoteVersionToken::new)
            .ok_or_else(|| StoreError::UnexpectedResponse {
                message: format!("No headRevisionId returned for {}", file),
            })
    }

    async fn list(&self, query: String) -> Result<Vec<DriveFile>, StoreError> {
        let url = self.files_url();
        debug!("[DriveClient] Listing files: q={}", query);
        let request = self.client.get(&url).query(&[
            ("q", query.as_str()),
            ("spaces", APP_DATA_FOLDER),
            ("fields", "files(id, name)"),
        ]);
        let body = Self::send(request, &url, "list files", "files").await?;
        Ok(Self::parse_json::<FileList>(&body, &url)?.files)
    }
}

/// Quote a literal for a Drive search query
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `multipart/related` body carrying file metadata and content in one request
fn multipart_body(boundary: &str, metadata: &[u8], content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(
        format!("\r\n--{}\r\nContent-Type: {}\r\n\r\n", boundary, FILE_MIME_TYPE).as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    body
}

#[async_trait]
impl RemoteFileStore for DriveClient {
    fn store_name(&self) -> &str {
        "drive"
    }

    #[tracing::instrument(name = "drive.find_container", skip(self))]
    async fn find_container(&self, name: &str) -> Result<Option<ContainerId>, StoreError> {
        let query = format!(
            "name={} and mimeType={} and {} in parents and trashed=false",
            quote(name),
            quote(FOLDER_MIME_TYPE),
            quote(APP_DATA_FOLDER)
        );
        let files = self.list(query).await?;
        Ok(files.into_iter().next().map(|f| ContainerId::new(f.id)))
    }

    #[tracing::instrument(name = "drive.create_container", skip(self))]
    async fn create_container(&self, name: &str) -> Result<ContainerId, StoreError> {
        let url = self.files_url();
        let request = self
            .client
            .post(&url)
            .query(&[("fields", "id")])
            .json(&CreateFileRequest {
                name,
                mime_type: FOLDER_MIME_TYPE,
                parents: [APP_DATA_FOLDER],
            });
        let body = Self::send(request, &url, "create folder", name).await?;
        let created: DriveFile = Self::parse_json(&body, &url)?;
        info!("[DriveClient] Created folder {} ({})", name, created.id);
        Ok(ContainerId::new(created.id))
    }

    #[tracing::instrument(name = "drive.find_file", skip(self))]
    async fn find_file(
        &self,
        container: &ContainerId,
        name: &str,
    ) -> Result<Option<FileHandle>, StoreError> {
        let query = format!(
            "name={} and {} in parents and trashed=false",
            quote(name),
            quote(container.as_str())
        );
        let files = self.list(query).await?;
        Ok(files.into_iter().next().map(|f| FileHandle::new(f.id)))
    }

    #[tracing::instrument(name = "drive.create_file", skip(self, content), fields(bytes = content.len()))]
    async fn create_file(
        &self,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, StoreError> {
        let url = self.upload_url();
        let metadata = serde_json::to_vec(&CreateFileRequest {
            name,
            mime_type: FILE_MIME_TYPE,
            parents: [container.as_str()],
        })?;
        let boundary = format!("tally-{}", Uuid::new_v4().simple());
        let request = self
            .client
            .post(&url)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(multipart_body(&boundary, &metadata, &content));

        let body = Self::send(request, &url, "create file", name).await?;
        let created: DriveFile = Self::parse_json(&body, &url)?;
        info!("[DriveClient] Created file {} ({})", name, created.id);
        Ok(FileHandle::new(created.id))
    }

    #[tracing::instrument(name = "drive.version_token", skip(self))]
    async fn version_token(&self, file: &FileHandle) -> Result<RemoteVersionToken, StoreError> {
        let url = self.file_url(file);
        let request = self.client.get(&url).query(&[("fields", "headRevisionId")]);
        let body = Self::send(request, &url, "fetch revision", file.as_str()).await?;
        Self::head_revision(Self::parse_json(&body, &url)?, file)
    }

    #[tracing::instrument(name = "drive.read", skip(self))]
    async fn read(&self, file: &FileHandle) -> Result<(Vec<u8>, RemoteVersionToken), StoreError> {
        // token first: a write landing in between only causes a spurious conflict
        let token = self.version_token(file).await?;
        let url = self.file_url(file);
        let request = self.client.get(&url).query(&[("alt", "media")]);
        let content = Self::send(request, &url, "download file", file.as_str()).await?;
        debug!(
            "[DriveClient] Downloaded {} bytes (revision {})",
            content.len(),
            token
        );
        Ok((content, token))
    }

    #[tracing::instrument(name = "drive.write", skip(self, content), fields(bytes = content.len()))]
    async fn write(
        &self,
        file: &FileHandle,
        content: Vec<u8>,
    ) -> Result<RemoteVersionToken, StoreError> {
        let url = self.upload_file_url(file);
        let request = self
            .client
            .patch(&url)
            .query(&[("uploadType", "media"), ("fields", "headRevisionId")])
            .header(CONTENT_TYPE, FILE_MIME_TYPE)
            .body(content);
        let body = Self::send(request, &url, "upload file", file.as_str()).await?;
        Self::head_revision(Self::parse_json(&body, &url)?, file)
    }
}
