//! External collaborators consulted by the session service.
//!
//! The users service owns profiles (name, avatar) and hands out user IDs.
//! The polygon service knows which team a user belongs to. Both are reached
//! over HTTP; in-memory versions back tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::models::auth::Profile;

/// Errors from collaborator calls.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("{0}")]
    Other(String),
}

/// The profile store that owns user records.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn create_profile(
        &self,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<Profile, CollaboratorError>;
}

/// Resolves the team a user currently belongs to.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn team_of(&self, user_id: &str) -> Result<Option<String>, CollaboratorError>;
}

#[derive(Serialize)]
struct CreateProfileBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    id: String,
    name: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct TeamBody {
    id: String,
}

#[derive(Deserialize)]
struct UserTeamBody {
    #[serde(default)]
    team: Option<TeamBody>,
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CollaboratorError::Status { status, body })
}

/// Users service client: `POST {base}/v1/users`.
#[derive(Debug, Clone)]
pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProfileDirectory {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn create_profile(
        &self,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<Profile, CollaboratorError> {
        let url = self.base_url.join("v1/users")?;
        let resp = self
            .client
            .post(url)
            .json(&CreateProfileBody { name, avatar })
            .send()
            .await?;
        let body: ProfileBody = error_for_status(resp).await?.json().await?;
        Ok(Profile {
            id: body.id,
            name: body.name,
            avatar_url: body.avatar_url,
        })
    }
}

/// Polygon service client: `GET {base}/v1/users/{id}/team`.
///
/// A 404 means the user has no team.
#[derive(Debug, Clone)]
pub struct HttpTeamDirectory {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTeamDirectory {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl TeamDirectory for HttpTeamDirectory {
    async fn team_of(&self, user_id: &str) -> Result<Option<String>, CollaboratorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::Other("base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(["v1", "users", user_id, "team"]);
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: UserTeamBody = error_for_status(resp).await?.json().await?;
        Ok(body.team.map(|t| t.id).filter(|id| !id.is_empty()))
    }
}

/// In-memory profile store assigning random UUIDs.
#[derive(Debug, Default)]
pub struct MemoryProfileDirectory {
    profiles: Mutex<Vec<Profile>>,
}

impl MemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProfileDirectory for MemoryProfileDirectory {
    async fn create_profile(
        &self,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<Profile, CollaboratorError> {
        let profile = Profile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            avatar_url: avatar.map(str::to_string),
        };
        self.profiles
            .lock()
            .map_err(|_| CollaboratorError::Other("profile directory poisoned".into()))?
            .push(profile.clone());
        Ok(profile)
    }
}

/// Fixed user → team assignments.
#[derive(Debug, Default)]
pub struct StaticTeamDirectory {
    teams: Mutex<HashMap<String, String>>,
}

impl StaticTeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, user_id: &str, team_id: &str) {
        if let Ok(mut teams) = self.teams.lock() {
            teams.insert(user_id.to_string(), team_id.to_string());
        }
    }
}

#[async_trait]
impl TeamDirectory for StaticTeamDirectory {
    async fn team_of(&self, user_id: &str) -> Result<Option<String>, CollaboratorError> {
        let teams = self
            .teams
            .lock()
            .map_err(|_| CollaboratorError::Other("team directory poisoned".into()))?;
        Ok(teams.get(user_id).cloned())
    }
}
