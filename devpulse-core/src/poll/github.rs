//! GitHub REST v3 provider

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::client::ApiClient;
use super::provider::{decode_items, Identity, RemoteProject, SourceProvider};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::format::parse_timestamp;
use crate::types::{Event, Source};

const REPOS_QUERY: &str =
    "visibility=all&affiliation=owner,collaborator,organization_member&sort=pushed";

#[derive(Debug, Deserialize)]
struct User {
    login: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<GitSignature>,
}

#[derive(Debug, Deserialize)]
struct GitSignature {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    merge_commit_sha: Option<String>,
    #[serde(default)]
    user: Option<PullUser>,
}

#[derive(Debug, Deserialize)]
struct PullUser {
    login: String,
}

/// Polls github.com (or an Enterprise API URL) with a personal access token.
pub struct GitHubProvider {
    client: ApiClient,
    configured: bool,
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config.resolved_token();
        let client = ApiClient::new(
            &config.api_url,
            AUTHORIZATION,
            token.as_ref().map(|t| format!("Bearer {}", t)),
            "application/vnd.github+json",
            std::time::Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            client,
            configured: token.is_some(),
        })
    }
}

fn commit_event(
    repo: &RemoteProject,
    item: serde_json::Value,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<Event> {
    let commit: CommitItem = serde_json::from_value(item.clone())?;
    let author = commit.commit.author.as_ref();
    let timestamp = author
        .and_then(|a| a.date.as_deref())
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let email = author
        .and_then(|a| a.email.clone())
        .unwrap_or_else(|| identity.author());

    Ok(
        Event::commit(Source::Github, &repo.full_name, commit.sha, timestamp)
            .with_author(Some(email))
            .with_raw_data(item),
    )
}

/// Merged pull request by `identity` at or after `since`, as an event.
fn merged_event(
    repo: &RemoteProject,
    item: serde_json::Value,
    identity: &Identity,
    since: DateTime<Utc>,
) -> Result<Option<Event>> {
    let pull: PullRequest = serde_json::from_value(item.clone())?;

    let by_identity = pull
        .user
        .as_ref()
        .is_some_and(|u| u.login == identity.username);
    let Some(merged_at) = pull.merged_at.as_deref().and_then(parse_timestamp) else {
        return Ok(None);
    };
    if !by_identity || merged_at < since {
        return Ok(None);
    }

    Ok(Some(
        Event::pr_merged(
            Source::Github,
            &repo.full_name,
            pull.number,
            pull.merge_commit_sha,
            merged_at,
        )
        .with_author(Some(identity.author()))
        .with_raw_data(item),
    ))
}

/// Whether a page of pulls sorted by `updated_at` descending may still be
/// followed by pulls updated at or after `since`.
fn reaches_since(page: &[serde_json::Value], since: DateTime<Utc>) -> bool {
    page.last()
        .and_then(|pull| pull.get("updated_at"))
        .and_then(serde_json::Value::as_str)
        .and_then(parse_timestamp)
        .map_or(true, |updated| updated >= since)
}

#[async_trait]
impl SourceProvider for GitHubProvider {
    fn source(&self) -> Source {
        Source::Github
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn current_user(&self) -> Result<Identity> {
        let user: User = self.client.get_json("/user").await?;
        Ok(Identity {
            username: user.login,
            email: user.email.filter(|e| !e.is_empty()),
        })
    }

    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let repos: Vec<Repository> = self
            .client
            .get_paged(&format!("/user/repos?{}", REPOS_QUERY), |_| true)
            .await?;

        Ok(repos
            .into_iter()
            .map(|r| RemoteProject {
                id: r.full_name.clone(),
                full_name: r.full_name,
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
            "/repos/{}/commits?author={}&since={}",
            project.id,
            urlencoding::encode(&author.username),
            urlencoding::encode(&since.to_rfc3339_opts(SecondsFormat::Secs, true)),
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
            "/repos/{}/pulls?state=closed&sort=updated&direction=desc",
            project.id
        );
        let items: Vec<serde_json::Value> = self
            .client
            .get_paged(&path, |page| reaches_since(page, since))
            .await?;

        Ok(decode_items(project, items, |item| {
            merged_event(project, item, author, since)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn repo() -> RemoteProject {
        RemoteProject {
            id: "acme/api".to_string(),
            full_name: "acme/api".to_string(),
        }
    }

    fn identity() -> Identity {
        Identity {
            username: "octocat".to_string(),
            email: None,
        }
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_commit_uses_author_date_and_email() {
        let item = json!({
            "sha": "abc",
            "commit": {"author": {"email": "o@cat.dev", "date": "2026-10-14T10:00:00Z"}}
        });

        let event = commit_event(&repo(), item, &identity(), since()).unwrap();
        assert_eq!(event.service, "acme/api");
        assert_eq!(event.details.commit_sha(), Some("abc"));
        assert_eq!(event.author.as_deref(), Some("o@cat.dev"));
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_commit_falls_back_to_now_and_identity() {
        let item = json!({"sha": "abc", "commit": {}});
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 1, 0, 0).unwrap();

        let event = commit_event(&repo(), item, &identity(), now).unwrap();
        assert_eq!(event.timestamp, now);
        assert_eq!(event.author.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_merged_filters_author_and_window() {
        let mine = json!({
            "number": 1, "merged_at": "2026-10-14T09:00:00Z",
            "merge_commit_sha": "m1", "user": {"login": "octocat"}
        });
        let theirs = json!({
            "number": 2, "merged_at": "2026-10-14T09:00:00Z", "user": {"login": "hubot"}
        });
        let too_old = json!({
            "number": 3, "merged_at": "2026-10-13T09:00:00Z", "user": {"login": "octocat"}
        });
        let unmerged = json!({"number": 4, "merged_at": null, "user": {"login": "octocat"}});

        let event = merged_event(&repo(), mine, &identity(), since())
            .unwrap()
            .unwrap();
        assert_eq!(event.details.pr_number(), Some(1));
        assert_eq!(event.details.commit_sha(), Some("m1"));

        for item in [theirs, too_old, unmerged] {
            assert!(merged_event(&repo(), item, &identity(), since())
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_merged_rejects_malformed_item() {
        let item = json!({"number": "not a number", "user": {"login": "octocat"}});
        assert!(merged_event(&repo(), item, &identity(), since()).is_err());
    }

    #[test]
    fn test_pull_paging_stops_before_since() {
        let recent = json!({"number": 1, "updated_at": "2026-10-14T09:00:00Z"});
        let old = json!({"number": 2, "updated_at": "2026-10-13T09:00:00Z"});

        assert!(reaches_since(&[recent.clone(), recent.clone()], since()));
        assert!(!reaches_since(&[recent.clone(), old], since()));
        // Unknown age keeps paging
        assert!(reaches_since(&[json!({"number": 3})], since()));
    }

    #[test]
    fn test_unconfigured_without_token() {
        let config = ProviderConfig {
            token: None,
            token_env: "DEVPULSE_TEST_UNSET_GITHUB_TOKEN".to_string(),
            ..ProviderConfig::github()
        };
        let provider = GitHubProvider::new(&config).unwrap();
        assert!(!provider.is_configured());

        let config = ProviderConfig {
            token: Some("ghp_test".to_string()),
            ..ProviderConfig::github()
        };
        assert!(GitHubProvider::new(&config).unwrap().is_configured());
    }
}
