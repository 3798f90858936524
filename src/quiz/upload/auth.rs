//! OAuth credentials for the YouTube upload scope.
//!
//! `token.json` is Google's "authorized user" file. Only refreshing an
//! existing token happens here; obtaining the first one is a separate
//! browser consent step.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::quiz::config::QuizConfig;
use crate::ui::prelude::{Level, emit};

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(
        "no credentials at {}; complete the YouTube consent step to create token.json",
        .0.display()
    )]
    MissingCredentials(PathBuf),
    #[error("malformed credentials in {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },
    #[error("could not refresh the access token: {0}")]
    RefreshFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unset means the secrets file or Google's default endpoint decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    /// Fields written by other tools, preserved on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: Option<ClientInfo>,
    web: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
struct ClientInfo {
    client_id: String,
    client_secret: String,
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::MissingCredentials(path.to_path_buf()));
            }
            Err(err) => {
                return Err(AuthError::Malformed {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
            }
        };
        serde_json::from_str(&contents).map_err(|err| AuthError::Malformed {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        let malformed = |message: String| AuthError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| malformed(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| malformed(e.to_string()))
    }

    /// Fill in a missing client id/secret from `client_secrets.json`.
    pub fn fill_client_from(&mut self, secrets_path: &Path) -> Result<(), AuthError> {
        if self.client_id.is_some() && self.client_secret.is_some() {
            return Ok(());
        }
        if !secrets_path.is_file() {
            return Ok(());
        }

        let malformed = |message: String| AuthError::Malformed {
            path: secrets_path.to_path_buf(),
            message,
        };
        let contents =
            std::fs::read_to_string(secrets_path).map_err(|e| malformed(e.to_string()))?;
        let secrets: ClientSecrets =
            serde_json::from_str(&contents).map_err(|e| malformed(e.to_string()))?;
        let info = secrets
            .installed
            .or(secrets.web)
            .ok_or_else(|| malformed("expected an 'installed' or 'web' client".to_string()))?;

        self.client_id.get_or_insert(info.client_id);
        self.client_secret.get_or_insert(info.client_secret);
        if self.token_uri.is_none() {
            self.token_uri = info.token_uri;
        }
        Ok(())
    }

    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_deref().and_then(parse_expiry)
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        match self.expires_at() {
            Some(expiry) => expiry - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => false,
        }
    }

    pub async fn refresh(&mut self, client: &Client) -> Result<(), AuthError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            self.refresh_token.as_deref(),
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        ) else {
            return Err(AuthError::RefreshFailed(
                "token.json lacks a refresh token or client credentials".to_string(),
            ));
        };

        let resp = client
            .post(self.token_uri())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!("{status}: {}", text.trim())));
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        self.apply_refresh(body, Utc::now());
        Ok(())
    }

    fn apply_refresh(&mut self, body: RefreshResponse, now: DateTime<Utc>) {
        self.token = Some(body.access_token);
        self.expiry = body.expires_in.map(|secs| {
            (now + ChronoDuration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Micros, true)
        });
    }
}

/// google-auth writes expiries as RFC 3339, older versions without an offset.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Load credentials, refreshing and persisting them when they are stale.
pub async fn authenticate(config: &QuizConfig, client: &Client) -> Result<String, AuthError> {
    let token_path = config.token_path();
    let mut credentials = Credentials::load(&token_path)?;

    if !credentials.scopes.is_empty() && !credentials.scopes.iter().any(|s| s == UPLOAD_SCOPE) {
        emit(
            Level::Warn,
            "upload.auth.scope",
            &format!("token.json was not granted {UPLOAD_SCOPE}; uploads may be rejected"),
            None,
        );
    }

    if credentials.needs_refresh(Utc::now()) {
        emit(
            Level::Info,
            "upload.auth.refresh",
            "Access token expired, refreshing",
            None,
        );
        credentials.fill_client_from(&config.client_secrets_path())?;
        credentials.refresh(client).await?;
        credentials.save(&token_path)?;
    }

    credentials
        .token
        .ok_or_else(|| AuthError::RefreshFailed("no access token after refresh".to_string()))
}
