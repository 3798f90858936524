use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use thiserror::Error;

use crate::quiz::config::UploadSettings;
use crate::quiz::rows::QuizRow;

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("YouTube API error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("YouTube did not return an upload location")]
    MissingLocation,
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to YouTube failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    pub made_for_kids: bool,
}

impl VideoMetadata {
    pub fn for_row(row: &QuizRow, settings: &UploadSettings) -> Self {
        let title: String = format!("{}{}", row.question, settings.title_suffix)
            .chars()
            .take(settings.title_max_chars)
            .collect();
        Self {
            title,
            description: settings.description.replace("{question}", &row.question),
            tags: settings.tags.clone(),
            category_id: settings.category_id.clone(),
            privacy_status: settings.privacy_status.clone(),
            made_for_kids: settings.made_for_kids,
        }
    }

    /// Request body for `videos.insert` with `part=snippet,status`.
    pub fn to_resource(&self) -> Value {
        json!({
            "snippet": {
                "title": self.title,
                "description": self.description,
                "tags": self.tags,
                "categoryId": self.category_id,
            },
            "status": {
                "privacyStatus": self.privacy_status,
                "selfDeclaredMadeForKids": self.made_for_kids,
            }
        })
    }
}

/// Somewhere videos can be published. Returns the new video's id.
#[async_trait]
pub trait VideoHost: Send + Sync {
    async fn upload(&self, path: &Path, metadata: &VideoMetadata) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct InsertedVideo {
    id: String,
}

pub struct YouTubeClient {
    client: Client,
    access_token: String,
}

impl YouTubeClient {
    pub fn new(client: Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }

    async fn start_session(&self, metadata: &VideoMetadata, size: u64) -> Result<String, UploadError> {
        let resp = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header("X-Upload-Content-Length", size)
            .header("X-Upload-Content-Type", "video/mp4")
            .json(&metadata.to_resource())
            .send()
            .await?;

        let resp = check_status(resp).await?;
        resp.headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(UploadError::MissingLocation)
    }
}

#[async_trait]
impl VideoHost for YouTubeClient {
    async fn upload(&self, path: &Path, metadata: &VideoMetadata) -> Result<String, UploadError> {
        let io_error = |source: std::io::Error| UploadError::Io {
            path: path.display().to_string(),
            source,
        };
        let bytes = tokio::fs::read(path).await.map_err(io_error)?;
        let session = self.start_session(metadata, bytes.len() as u64).await?;

        let resp = self
            .client
            .put(&session)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, bytes.len())
            .body(bytes)
            .send()
            .await?;

        let video: InsertedVideo = check_status(resp).await?.json().await?;
        Ok(video.id)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(UploadError::Api {
        status,
        message: api_error_message(&text),
    })
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
