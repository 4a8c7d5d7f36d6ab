//! Repository statistics from the GitHub, GitLab and Bitbucket APIs.

use chrono::{TimeZone, Utc};
use mmpm_types::NA;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Below this many remaining GitHub requests a warning is printed.
const GITHUB_LOW_REMAINING: u64 = 10;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{0} is not hosted on GitHub, GitLab or Bitbucket")]
    Unsupported(String),
    #[error("No GitHub API requests remaining, the count resets at {0}")]
    RateLimited(String),
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forge {
    GitHub,
    GitLab,
    Bitbucket,
}

/// Where a repository lives and what it is called there.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteRepository {
    pub forge: Forge,
    pub owner: String,
    pub project: String,
}

impl RemoteRepository {
    /// Recognize `https://host/owner/project(.git)` and `git@host:owner/project.git`.
    pub fn parse(repository: &str) -> Option<Self> {
        let lowered = repository.to_lowercase();
        let forge = if lowered.contains("github") {
            Forge::GitHub
        } else if lowered.contains("gitlab") {
            Forge::GitLab
        } else if lowered.contains("bitbucket") {
            Forge::Bitbucket
        } else {
            return None;
        };

        let repository = repository.trim();
        let path = repository.split_once("://").map_or(repository, |(_, rest)| rest);
        let mut segments = path
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .filter(|s| !s.is_empty());
        let project = segments.next()?.trim_end_matches(".git").to_string();
        let owner = segments.next()?.to_string();

        if project.is_empty() {
            return None;
        }

        Some(Self { forge, owner, project })
    }

    pub fn api_url(&self) -> String {
        match self.forge {
            Forge::GitHub => format!(
                "https://api.github.com/repos/{}/{}",
                self.owner, self.project
            ),
            Forge::GitLab => format!(
                "https://gitlab.com/api/v4/projects/{}%2F{}",
                self.owner, self.project
            ),
            Forge::Bitbucket => format!(
                "https://api.bitbucket.org/2.0/repositories/{}/{}",
                self.owner, self.project
            ),
        }
    }
}

/// Popularity and activity of a repository. Unknown counts are `None`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemoteDetails {
    pub stars: Option<u64>,
    pub forks: Option<u64>,
    pub issues: Option<u64>,
    pub created: String,
    pub updated: String,
}

impl RemoteDetails {
    /// Labelled values in display order.
    pub fn fields(&self) -> [(&'static str, String); 5] {
        let count = |n: Option<u64>| n.map_or_else(|| NA.to_string(), |n| n.to_string());
        [
            ("Stars", count(self.stars)),
            ("Forks", count(self.forks)),
            ("Issues", count(self.issues)),
            ("Created", self.created.clone()),
            ("Updated", self.updated.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    stargazers_count: u64,
    forks_count: u64,
    open_issues_count: u64,
    created_at: String,
    updated_at: String,
}

impl From<GitHubRepo> for RemoteDetails {
    fn from(repo: GitHubRepo) -> Self {
        Self {
            stars: Some(repo.stargazers_count),
            forks: Some(repo.forks_count),
            issues: Some(repo.open_issues_count),
            created: day(&repo.created_at),
            updated: day(&repo.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    star_count: u64,
    forks_count: u64,
    // absent when the issue tracker is disabled
    open_issues_count: Option<u64>,
    created_at: String,
    last_activity_at: String,
}

impl From<GitLabProject> for RemoteDetails {
    fn from(project: GitLabProject) -> Self {
        Self {
            stars: Some(project.star_count),
            forks: Some(project.forks_count),
            issues: project.open_issues_count,
            created: day(&project.created_at),
            updated: day(&project.last_activity_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BitbucketRepo {
    created_on: String,
    updated_on: String,
}

/// A paginated Bitbucket listing; only its size matters here.
#[derive(Debug, Deserialize)]
struct BitbucketPage {
    size: Option<u64>,
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

impl BitbucketPage {
    fn count(&self) -> u64 {
        self.size.unwrap_or(self.values.len() as u64)
    }
}

/// Date part of an ISO 8601 timestamp.
fn day(timestamp: &str) -> String {
    timestamp.split('T').next().unwrap_or(timestamp).to_string()
}

/// GitHub's request budget, read from its response headers.
#[derive(Debug, PartialEq, Eq)]
struct RateLimit {
    remaining: u64,
    reset: String,
}

impl RateLimit {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<i64>().ok();
        let remaining = u64::try_from(header("x-ratelimit-remaining")?).ok()?;
        let reset = header("x-ratelimit-reset")
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map_or_else(
                || "an unknown time".to_string(),
                |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            );

        Some(Self { remaining, reset })
    }

    fn warning(&self) -> Option<String> {
        (self.remaining < GITHUB_LOW_REMAINING).then(|| {
            format!(
                "{} GitHub API requests remaining. Request count will reset at {}",
                self.remaining, self.reset
            )
        })
    }
}

/// Client for the forge APIs, which all insist on a user agent.
pub fn client() -> Result<Client, RemoteError> {
    Ok(Client::builder()
        .user_agent(concat!("mmpm/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()?)
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, RemoteError> {
    debug!("Requesting {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();

    if url.starts_with("https://api.github.com") {
        if let Some(limit) = RateLimit::from_headers(response.headers()) {
            if limit.remaining == 0 && !status.is_success() {
                return Err(RemoteError::RateLimited(limit.reset));
            }
            if let Some(message) = limit.warning() {
                warn!("{}", message);
            }
        }
    }

    if !status.is_success() {
        return Err(RemoteError::Status {
            url: url.to_string(),
            status,
        });
    }

    Ok(response.json().await?)
}

/// Fetch statistics for `repository` from whichever forge hosts it.
pub async fn fetch(client: &Client, repository: &str) -> Result<RemoteDetails, RemoteError> {
    let remote = RemoteRepository::parse(repository)
        .ok_or_else(|| RemoteError::Unsupported(repository.to_string()))?;
    let url = remote.api_url();

    match remote.forge {
        Forge::GitHub => Ok(get_json::<GitHubRepo>(client, &url).await?.into()),
        Forge::GitLab => Ok(get_json::<GitLabProject>(client, &url).await?.into()),
        Forge::Bitbucket => {
            let repo: BitbucketRepo = get_json(client, &url).await?;
            let count = |listing: &'static str| {
                let url = format!("{}/{}", url, listing);
                async move {
                    match get_json::<BitbucketPage>(client, &url).await {
                        Ok(page) => Some(page.count()),
                        Err(e) => {
                            debug!("No {} for {}: {}", listing, repository, e);
                            None
                        }
                    }
                }
            };

            let (stars, forks, issues) =
                tokio::join!(count("watchers"), count("forks"), count("issues"));

            Ok(RemoteDetails {
                stars,
                forks,
                issues,
                created: day(&repo.created_on),
                updated: day(&repo.updated_on),
            })
        }
    }
}
