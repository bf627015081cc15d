//! Commit-status client for the Gitea API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use judge_common::traits::StatusReporter;
use judge_common::types::Verdict;

const STATUS_CONTEXT: &str = "continuous-integration/judge";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Commit-status states known to the Gitea API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    state: StatusState,
    #[serde(skip_serializing_if = "str::is_empty")]
    target_url: &'a str,
    description: &'a str,
    context: &'a str,
}

pub struct GiteaClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl GiteaClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    async fn create_commit_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        target_url: &str,
        state: StatusState,
        description: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/api/v1/repos/{owner}/{repo}/statuses/{sha}",
            self.base_url
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .json(&StatusRequest {
                state,
                target_url,
                description,
                context: STATUS_CONTEXT,
            })
            .send()
            .await
            .context("failed to send status request")?;

        if !response.status().is_success() {
            bail!("gitea API returned status code {}", response.status());
        }
        Ok(())
    }
}

/// Commit status for a submission that is still being judged. A `None`
/// verdict keeps the status at pending; a final verdict here means the
/// judge gave up before producing a result.
fn starting_state(verdict: Verdict) -> StatusState {
    match verdict {
        Verdict::None => StatusState::Pending,
        Verdict::Passed => StatusState::Success,
        Verdict::Failed => StatusState::Failure,
        Verdict::Error => StatusState::Error,
    }
}

/// Final commit status. Zero discovered test cases is reported as
/// success, not failure.
fn result_state(verdict: Verdict) -> (StatusState, &'static str) {
    match verdict {
        Verdict::None => (StatusState::Success, "No test cases found"),
        Verdict::Passed => (StatusState::Success, "Judge successful"),
        Verdict::Failed => (StatusState::Failure, "Judge failed"),
        Verdict::Error => (StatusState::Error, "Judge error"),
    }
}

#[async_trait]
impl StatusReporter for GiteaClient {
    async fn post_starting(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        target_url: &str,
        verdict: Verdict,
        message: &str,
    ) -> Result<()> {
        self.create_commit_status(owner, repo, commit, target_url, starting_state(verdict), message)
            .await
    }

    async fn post_result(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        target_url: &str,
        verdict: Verdict,
    ) -> Result<()> {
        let (state, description) = result_state(verdict);
        self.create_commit_status(owner, repo, commit, target_url, state, description)
            .await
    }
}
