use crate::config::{ConfigFile, DEFAULT_ENDPOINT};
use crate::errors::*;
use crate::http;
use chrono::prelude::*;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum::{AsRefStr, Display, EnumString};
use url::Url;

const REF_PREFIXES: &[&str] = &["refs/heads/", "refs/tags/"];

/// Turn user input into a reference that is safe to hand to the fetcher,
/// compiler and packager. Webhook style `refs/heads/...` prefixes are
/// stripped.
pub fn normalize_ref(input: &str) -> std::result::Result<String, BuildError> {
    let mut git_ref = input.trim();
    for prefix in REF_PREFIXES {
        if let Some(stripped) = git_ref.strip_prefix(prefix) {
            git_ref = stripped;
            break;
        }
    }

    if git_ref.is_empty() {
        return Err(BuildError::Validation("reference must not be empty".into()));
    }
    if git_ref.starts_with('-') {
        return Err(BuildError::Validation(format!(
            "reference must not start with a dash: {:?}",
            git_ref
        )));
    }
    if git_ref.contains("..") {
        return Err(BuildError::Validation(format!(
            "reference must not contain '..': {:?}",
            git_ref
        )));
    }
    if let Some(c) = git_ref
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(*c))
    {
        return Err(BuildError::Validation(format!(
            "reference contains invalid character {:?}: {:?}",
            c, git_ref
        )));
    }

    Ok(git_ref.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed)
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Running)
                | (Status::Running, Status::Succeeded)
                | (Status::Running, Status::Failed)
        )
    }

    pub fn fancy(&self) -> String {
        match self {
            Status::Pending => "PENDING  ".normal().to_string(),
            Status::Running => "RUNNING  ".yellow().to_string(),
            Status::Succeeded => "SUCCEEDED".green().to_string(),
            Status::Failed => "FAILED   ".red().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub id: i32,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub status: Status,
    pub diagnostic: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BuildEvent {
    pub fn new(id: i32, git_ref: String) -> BuildEvent {
        let now = Utc::now().naive_utc();
        BuildEvent {
            id,
            git_ref,
            status: Status::Pending,
            diagnostic: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: Status, diagnostic: Option<String>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            bail!(
                "Refusing to move build event #{} from {} to {}",
                self.id,
                self.status,
                next
            );
        }
        self.status = next;
        self.diagnostic = diagnostic;
        self.updated_at = Utc::now().naive_utc();
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(Status::Running, None)
    }

    pub fn succeed(&mut self) -> Result<()> {
        self.transition(Status::Succeeded, None)
    }

    pub fn fail(&mut self, diagnostic: String) -> Result<()> {
        self.transition(Status::Failed, Some(diagnostic))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEvents {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub branch: String,
    pub os: String,
    pub arch: String,
    pub variant: String,
    pub archive: String,
    pub last_build: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct Client {
    endpoint: Url,
    client: http::Client,
}

impl Client {
    pub fn new(config: ConfigFile, endpoint: Option<String>) -> Result<Client> {
        let endpoint = endpoint
            .or(config.http.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let mut endpoint = endpoint
            .parse::<Url>()
            .with_context(|| anyhow!("Failed to parse endpoint as url: {:?}", endpoint))?;

        // If the url ends with a slash, remove it
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow!("Given endpoint url cannot be base"))?
            .pop_if_empty();

        debug!("Setting crossbuild endpoint to {:?}", endpoint.as_str());
        let client = http::client()?;
        Ok(Client { endpoint, client })
    }

    fn url_join(&self, route: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Given endpoint url cannot be base"))?;
            for segment in route.split('/') {
                path.push(segment);
            }
        }
        Ok(url)
    }

    pub fn get(&self, path: Cow<'static, str>) -> Result<http::RequestBuilder> {
        Ok(self.client.get(self.url_join(&path)?))
    }

    pub fn post(&self, path: Cow<'static, str>) -> Result<http::RequestBuilder> {
        Ok(self.client.post(self.url_join(&path)?))
    }

    pub async fn request_build(&self, git_ref: &str) -> Result<BuildEvent> {
        let res = self
            .post(Cow::Borrowed("hook"))?
            .json(&BuildRequest {
                git_ref: git_ref.to_string(),
            })
            .send()
            .await?;

        if res.status() == http::StatusCode::BAD_REQUEST {
            let err = res.json::<ErrorResponse>().await?;
            bail!("Build request was rejected: {}", err.error);
        }

        let event = res.error_for_status()?.json().await?;
        Ok(event)
    }

    pub async fn list_events(&self, list: &ListEvents) -> Result<Vec<BuildEvent>> {
        let events = self
            .get(Cow::Borrowed("api/v0/events"))?
            .query(list)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(events)
    }

    pub async fn get_event(&self, id: i32) -> Result<BuildEvent> {
        let event = self
            .get(Cow::Owned(format!("api/v0/events/{}", id)))?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(event)
    }

    pub async fn list_targets(&self) -> Result<Vec<TargetStatus>> {
        let targets = self
            .get(Cow::Borrowed("api/v0/targets"))?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(targets)
    }
}
