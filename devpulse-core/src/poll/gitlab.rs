//! GitLab REST v4 provider

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderName;
use serde::Deserialize;

use super::client::ApiClient;
use super::provider::{decode_items, Identity, RemoteProject, SourceProvider};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::format::parse_timestamp;
use crate::types::{Event, Source};

#[derive(Debug, Deserialize)]
struct User {
    username: String,
    #[serde(default)]
    public_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: u64,
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    id: String,
    #[serde(default)]
    authored_date: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    author_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    merge_commit_sha: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

/// Polls gitlab.com (or a self-managed instance) with a personal access token.
pub struct GitLabProvider {
    client: ApiClient,
    configured: bool,
}

impl GitLabProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config.resolved_token();
        let client = ApiClient::new(
            &config.api_url,
            HeaderName::from_static("private-token"),
            token.clone(),
            "application/json",
            std::time::Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            client,
            configured: token.is_some(),
        })
    }
}

fn commit_event(
    project: &RemoteProject,
    item: serde_json::Value,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Event> {
    let commit: Commit = serde_json::from_value(item.clone())?;
    let timestamp = commit
        .authored_date
        .as_deref()
        .or(commit.created_at.as_deref())
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let author = commit
        .author_email
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| identity.author());

    Ok(
        Event::commit(Source::Gitlab, &project.full_name, commit.id, timestamp)
            .with_author(Some(author))
            .with_raw_data(item),
    )
}

fn merged_event(
    project: &RemoteProject,
    item: serde_json::Value,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Event> {
    let mr: MergeRequest = serde_json::from_value(item.clone())?;
    let timestamp = mr
        .merged_at
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| mr.updated_at.as_deref().and_then(parse_timestamp))
        .unwrap_or(now);

    Ok(Event::pr_merged(
        Source::Gitlab,
        &project.full_name,
        mr.iid,
        mr.merge_commit_sha.or(mr.sha),
        timestamp,
    )
    .with_author(Some(identity.author()))
    .with_raw_data(item))
}

#[async_trait]
impl SourceProvider for GitLabProvider {
    fn source(&self) -> Source {
        Source::Gitlab
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn current_user(&self) -> Result<Identity> {
        let user: User = self.client.get_json("/user").await?;
        Ok(Identity {
            username: user.username,
            email: user.public_email.filter(|e| !e.is_empty()),
        })
    }

    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let projects: Vec<Project> = self
            .client
            .get_paged("/projects?membership=true", |_| true)
            .await?;

        Ok(projects
            .into_iter()
            .map(|p| RemoteProject {
                id: p.id.to_string(),
                full_name: p.path_with_namespace,
            })
            .collect())
    }

    async fn fetch_commits(
        &self,
        project: &RemoteProject,
        author: &Identity,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let path = format!(
            "/projects/{}/repository/commits?since={}&author={}",
            project.id,
            urlencoding::encode(&since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            urlencoding::encode(&author.username),
        );
        let items: Vec<serde_json::Value> = self.client.get_paged(&path, |_| true).await?;

        let now = Utc::now();
        Ok(decode_items(project, items, |item| {
            commit_event(project, item, author, now).map(Some)
        }))
    }

    async fn fetch_merged(
        &self,
        project: &RemoteProject,
        author: &Identity,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let path = format!(
            "/projects/{}/merge_requests?author_username={}&updated_after={}&state=merged",
            project.id,
            urlencoding::encode(&author.username),
            urlencoding::encode(&since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        let items: Vec<serde_json::Value> = self.client.get_paged(&path, |_| true).await?;

        let now = Utc::now();
        Ok(decode_items(project, items, |item| {
            merged_event(project, item, author, now).map(Some)
        }))
    }
}
