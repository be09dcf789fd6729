// src/core/fetcher.rs
//! Repository tree retrieval
//!
//! [`RepositoryHost`] is the seam to the external hosting API; [`GitHubClient`]
//! is the production implementation. [`TreeFetcher`] drives the two calls and
//! filters the result down to the files worth graphing.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FilterConfig, GitHubConfig};
use crate::error::{RepographError, Result};
use super::model::{FileEntry, RepoMetadata, Stage};

/// Kind of a tree entry as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodules and anything else we do not graph
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Recursive listing of one branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawTree {
    pub tree: Vec<TreeEntry>,
    /// Set by the host when the listing was cut short
    #[serde(default)]
    pub truncated: bool,
}

/// Read-only access to a repository hosting service
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn repo_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata>;

    async fn tree(&self, owner: &str, repo: &str, branch: &str) -> Result<RawTree>;

    fn host_name(&self) -> &str;
}

/// GitHub REST API client
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    default_branch: String,
    #[serde(default)]
    stargazers_count: Option<u64>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| RepographError::Config(format!("Invalid GitHub API base URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| RepographError::Config(format!("Invalid user agent: {}", e)))?,
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RepographError::Config(format!("Invalid GitHub token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RepographError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, api_base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RepographError::Config("GitHub API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, owner: &str, repo: &str) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RepographError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(match status {
            StatusCode::NOT_FOUND => RepographError::NotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
            },
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => RepographError::RateLimited {
                reset_in_minutes: minutes_until_reset(response.headers()),
            },
            s if s.is_server_error() => RepographError::UpstreamUnavailable,
            s => RepographError::UpstreamStatus(s.as_u16()),
        })
    }
}

/// Minutes until the `X-RateLimit-Reset` epoch timestamp, rounded up
fn minutes_until_reset(headers: &HeaderMap) -> Option<i64> {
    let reset: i64 = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    let seconds = reset - chrono::Utc::now().timestamp();
    Some(((seconds as f64) / 60.0).ceil().max(0.0) as i64)
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn repo_metadata(&self, owner: &str, repo: &str) -> Result<RepoMetadata> {
        let url = self.endpoint(&["repos", owner, repo])?;
        let response = self.get(url, owner, repo).await?;
        let data: RepoResponse = response
            .json()
            .await
            .map_err(|e| RepographError::UnexpectedResponse(format!("repository metadata: {}", e)))?;

        Ok(RepoMetadata {
            name: data.name,
            default_branch: data.default_branch,
            star_count: data.stargazers_count.unwrap_or(0),
            language: data.language,
            html_url: data.html_url,
        })
    }

    async fn tree(&self, owner: &str, repo: &str, branch: &str) -> Result<RawTree> {
        let mut url = self.endpoint(&["repos", owner, repo, "git", "trees", branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self.get(url, owner, repo).await?;
        response
            .json()
            .await
            .map_err(|e| RepographError::UnexpectedResponse(format!("file tree: {}", e)))
    }

    fn host_name(&self) -> &str {
        self.api_base.host_str().unwrap_or("github")
    }
}

/// Drops dependency directories, build output and lockfiles
#[derive(Debug, Clone)]
pub struct PathFilter {
    dir_prefixes: Vec<String>,
    file_names: Vec<String>,
}

impl PathFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (dir_prefixes, file_names) = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .partition(|p| p.ends_with('/'));
        Self { dir_prefixes, file_names }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.excluded_paths.iter().cloned())
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let in_excluded_dir = self
            .dir_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || path.contains(&format!("/{}", prefix)));
        if in_excluded_dir {
            return true;
        }

        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.file_names.iter().any(|name| name == file_name || name == path)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub entries: Vec<FileEntry>,
    pub default_branch: String,
    pub metadata: RepoMetadata,
    /// The host cut the listing short; the graph covers only part of the repository
    pub truncated: bool,
    /// Entries returned by the host before filtering
    pub raw_count: usize,
}

/// Fetches and filters a repository's file list
pub struct TreeFetcher {
    host: Arc<dyn RepositoryHost>,
    filter: PathFilter,
}

impl TreeFetcher {
    pub fn new(host: Arc<dyn RepositoryHost>, filter: PathFilter) -> Self {
        Self { host, filter }
    }

    /// Metadata call, then a recursive tree call on the default branch
    ///
    /// Everything that survives filtering is returned; size limits are the
    /// caller's business.
    pub async fn fetch<F>(&self, owner: &str, repo: &str, mut on_progress: F) -> Result<FetchResult>
    where
        F: FnMut(Stage, &str),
    {
        on_progress(Stage::Fetching, "Loading repository metadata...");
        let metadata = self.host.repo_metadata(owner, repo).await?;
        info!(
            "Found repository {}/{} on {} ({} branch)",
            owner,
            metadata.name,
            self.host.host_name(),
            metadata.default_branch
        );
        on_progress(
            Stage::Fetching,
            &format!("Found repository \"{}\" ({} branch)", metadata.name, metadata.default_branch),
        );

        on_progress(Stage::Fetching, "Loading file tree...");
        let raw = self.host.tree(owner, repo, &metadata.default_branch).await?;

        if raw.truncated {
            warn!("Tree for {}/{} was truncated by the host", owner, repo);
            on_progress(
                Stage::Fetching,
                "Warning: repository is very large, tree was truncated by GitHub.",
            );
        }

        on_progress(Stage::Parsing, "Filtering file entries...");
        let raw_count = raw.tree.len();
        let entries: Vec<FileEntry> = raw
            .tree
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Blob && !self.filter.is_excluded(&entry.path))
            .map(|entry| FileEntry::new(entry.path, entry.size))
            .collect();

        debug!("Kept {} of {} tree entries", entries.len(), raw_count);
        on_progress(
            Stage::Parsing,
            &format!("Found {} files (filtered from {} entries)", entries.len(), raw_count),
        );

        Ok(FetchResult {
            entries,
            default_branch: metadata.default_branch.clone(),
            metadata,
            truncated: raw.truncated,
            raw_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> GitHubClient {
        let config = GitHubConfig {
            api_base: server.uri(),
            token: token.map(String::from),
            ..GitHubConfig::default()
        };
        GitHubClient::new(&config).unwrap()
    }

    fn repo_body() -> serde_json::Value {
        serde_json::json!({
            "name": "widgets",
            "default_branch": "main",
            "stargazers_count": 42,
            "language": "TypeScript",
            "html_url": "https://github.com/acme/widgets"
        })
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::default();

        assert!(filter.is_excluded("node_modules/react/index.js"));
        assert!(filter.is_excluded("packages/web/node_modules/x.js"));
        assert!(filter.is_excluded("dist/bundle.js"));
        assert!(filter.is_excluded("package-lock.json"));
        assert!(filter.is_excluded("apps/web/yarn.lock"));

        assert!(!filter.is_excluded("src/index.ts"));
        assert!(!filter.is_excluded("src/builder/mod.rs"));
        assert!(!filter.is_excluded("package.json"));
    }

    #[tokio::test]
    async fn test_fetch_filters_tree() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [
                    { "path": "src", "type": "tree" },
                    { "path": "src/index.ts", "type": "blob", "size": 120 },
                    { "path": "src/App.tsx", "type": "blob", "size": 4000 },
                    { "path": "node_modules/left-pad/index.js", "type": "blob", "size": 10 },
                    { "path": "yarn.lock", "type": "blob", "size": 99999 },
                    { "path": "vendored", "type": "commit" },
                    { "path": "README.md", "type": "blob" }
                ],
                "truncated": false
            })))
            .mount(&server)
            .await;

        let fetcher = TreeFetcher::new(Arc::new(client_for(&server, Some("secret"))), PathFilter::default());
        let mut stages = Vec::new();
        let result = fetcher
            .fetch("acme", "widgets", |stage, _| stages.push(stage))
            .await
            .unwrap();

        assert_eq!(result.default_branch, "main");
        assert_eq!(result.metadata.star_count, 42);
        assert_eq!(result.metadata.language.as_deref(), Some("TypeScript"));
        assert_eq!(result.raw_count, 7);
        assert!(!result.truncated);
        assert_eq!(
            result.entries,
            vec![
                FileEntry::new("src/index.ts", Some(120)),
                FileEntry::new("src/App.tsx", Some(4000)),
                FileEntry::new("README.md", None),
            ]
        );
        assert_eq!(stages.first(), Some(&Stage::Fetching));
        assert_eq!(stages.last(), Some(&Stage::Parsing));
    }

    #[tokio::test]
    async fn test_truncated_tree_is_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [{ "path": "a.rs", "type": "blob", "size": 1 }],
                "truncated": true
            })))
            .mount(&server)
            .await;

        let fetcher = TreeFetcher::new(Arc::new(client_for(&server, None)), PathFilter::default());
        let mut details = Vec::new();
        let result = fetcher
            .fetch("acme", "widgets", |_, detail| details.push(detail.to_string()))
            .await
            .unwrap();

        assert!(result.truncated);
        assert_eq!(result.entries.len(), 1);
        assert!(details.iter().any(|d| d.contains("truncated")));
    }

    #[tokio::test]
    async fn test_branch_names_are_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "widgets",
                "default_branch": "release/v1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/release%2Fv1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tree": [] })))
            .mount(&server)
            .await;

        let fetcher = TreeFetcher::new(Arc::new(client_for(&server, None)), PathFilter::default());
        let result = fetcher.fetch("acme", "widgets", |_, _| {}).await.unwrap();
        assert_eq!(result.default_branch, "release/v1");
        assert!(result.entries.is_empty());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp() + 150;
        Mock::given(method("GET"))
            .and(path("/repos/acme/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/limited"))
            .respond_with(
                ResponseTemplate::new(403).insert_header("X-RateLimit-Reset", reset.to_string().as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/down"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/odd"))
            .respond_with(ResponseTemplate::new(418))
            .mount(&server)
            .await;

        let client = client_for(&server, None);

        assert!(matches!(
            client.repo_metadata("acme", "missing").await,
            Err(RepographError::NotFound { .. })
        ));
        match client.repo_metadata("acme", "limited").await {
            Err(RepographError::RateLimited { reset_in_minutes: Some(m) }) => assert!((2..=3).contains(&m)),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(matches!(
            client.repo_metadata("acme", "down").await,
            Err(RepographError::UpstreamUnavailable)
        ));
        assert!(matches!(
            client.repo_metadata("acme", "odd").await,
            Err(RepographError::UpstreamStatus(418))
        ));
    }

    #[tokio::test]
    async fn test_malformed_tree_is_unexpected_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "sha": "abc" })))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        assert!(matches!(
            client.tree("acme", "widgets", "main").await,
            Err(RepographError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_network_failure() {
        let config = GitHubConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            request_timeout_secs: 2,
            ..GitHubConfig::default()
        };
        let client = GitHubClient::new(&config).unwrap();
        let err = client.repo_metadata("acme", "widgets").await.unwrap_err();
        assert!(matches!(err, RepographError::Network(_)));
        assert!(err.is_retryable());
    }
}
