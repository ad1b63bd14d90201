//! Native GitHub API integration
//!
//! Opens the pull request for a pushed rule-improvement branch. The token
//! comes from `GITHUB_TOKEN`; owner and repo come from the git remote.

use crate::publish::ProposalHost;
use anyhow::{Context, Result};
use git2::Repository;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_TIMEOUT_SECS: u64 = 60;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Get the GitHub token from the environment, or None if unset/empty.
pub fn get_stored_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
}

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "auth",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let truncated = crate::util::truncate(body, MAX_ERROR_BODY_LEN);

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }

    truncated
}

/// Extract owner and repo from a git remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git
/// - https://github.com/owner/repo.git
/// - https://github.com/owner/repo
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let split = |path: &str| -> Option<(String, String)> {
        let path = path.trim_start_matches('/').trim_end_matches(".git");
        let (owner, repo) = path.split_once('/')?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some((owner.to_string(), repo.to_string()))
    };

    // SSH format: git@github.com:owner/repo.git
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        return split(rest);
    }

    // HTTPS format: https://github.com/owner/repo.git
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.host_str() == Some("github.com") {
            return split(parsed.path());
        }
    }

    None
}

/// Get the owner and repo from the named remote.
pub fn get_remote_info(repo_path: &Path, remote_name: &str) -> Result<(String, String)> {
    let repo = Repository::open(repo_path).context("Failed to open repository")?;
    let remote = repo
        .find_remote(remote_name)
        .with_context(|| format!("Remote '{}' not found", remote_name))?;
    let url = remote
        .url()
        .ok_or_else(|| anyhow::anyhow!("Remote '{}' has no URL", remote_name))?;
    parse_remote_url(url).ok_or_else(|| {
        anyhow::anyhow!(
            "Remote '{}' ({}) does not point to github.com",
            remote_name,
            url
        )
    })
}

#[derive(Serialize)]
struct CreatePrRequest {
    title: String,
    body: String,
    head: String,
    base: String,
}

#[derive(Deserialize)]
struct CreatePrResponse {
    html_url: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Create a pull request on GitHub.
///
/// Returns the URL of the created PR.
pub async fn create_pull_request(
    owner: &str,
    repo: &str,
    base: &str,
    head: &str,
    title: &str,
    body: &str,
) -> Result<String> {
    let token = get_stored_token()
        .ok_or_else(|| anyhow::anyhow!("GITHUB_TOKEN is not set; cannot open a pull request"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(API_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client")?;

    let url = format!("https://api.github.com/repos/{}/{}/pulls", owner, repo);

    let request = CreatePrRequest {
        title: title.to_string(),
        body: body.to_string(),
        head: head.to_string(),
        base: base.to_string(),
    };

    let resp = client
        .post(&url)
        .header("Accept", "application/vnd.github+json")
        .header("Authorization", format!("Bearer {}", token))
        .header("User-Agent", "rulemend")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .json(&request)
        .send()
        .await
        .context("Failed to send PR creation request")?;

    let status = resp.status();
    if status.is_success() {
        let pr: CreatePrResponse = resp.json().await.context("Failed to parse PR response")?;
        Ok(pr.html_url)
    } else {
        let error_body = resp.text().await.unwrap_or_default();
        Err(anyhow::anyhow!("{}", describe_api_error(status, &error_body)))
    }
}

fn describe_api_error(status: reqwest::StatusCode, error_body: &str) -> String {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(error_body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();

        return if detail.is_empty() {
            format!("GitHub API error: {}", api_error.message)
        } else {
            format!("GitHub API error: {}: {}", api_error.message, detail)
        };
    }

    format!(
        "GitHub API error ({}): {}",
        status,
        sanitize_error_body(error_body)
    )
}

/// Opens pull requests against the GitHub repository behind a local remote.
pub struct GitHubHost {
    repo_path: PathBuf,
    remote: String,
}

impl GitHubHost {
    pub fn new(repo_path: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: remote.into(),
        }
    }
}

impl ProposalHost for GitHubHost {
    fn open_proposal(&self, base: &str, head: &str, title: &str, body: &str) -> Result<String> {
        let (owner, repo) = get_remote_info(&self.repo_path, &self.remote)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        runtime.block_on(create_pull_request(&owner, &repo, base, head, title, body))
    }
}
