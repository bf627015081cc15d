//! Capability interfaces between the judging pipeline and its
//! collaborators. The dispatch pool and submission executor depend only
//! on these traits, never on a concrete source-control SDK or storage
//! engine, so tests can substitute fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    LeaderboardEntry, Submission, TestCaseResult, TestResult, UserProgress, Verdict,
    WorkshopStats,
};

/// Runs one submission to completion: clone, detect changes, load
/// fixtures, execute sandboxed test cases and aggregate verdicts.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn execute(&self, submission: &Submission) -> Result<TestResult>;
}

/// Posts commit-status updates to the source-control host. Failures are
/// logged by callers, never retried.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn post_starting(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        target_url: &str,
        verdict: Verdict,
        message: &str,
    ) -> Result<()>;

    async fn post_result(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        target_url: &str,
        verdict: Verdict,
    ) -> Result<()>;
}

/// Key-value persistence for rendered result summaries, keyed by
/// commit ID.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put_summary(&self, commit_id: &str, summary: &str) -> Result<()>;

    async fn get_summary(&self, commit_id: &str) -> Result<Option<String>>;
}

/// Scoreboard persistence. `process_test_results` is called only when at
/// least one test case was discovered; it records, per exercise the
/// submitter fully passed, a timestamped submission keyed by user and by
/// exercise.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn process_test_results(
        &self,
        submission: &Submission,
        results: &[TestCaseResult],
    ) -> Result<()>;

    async fn get_user_progress(&self, username: &str) -> Result<Option<UserProgress>>;

    async fn get_workshop_stats(
        &self,
        workshop: &str,
        task: &str,
    ) -> Result<Option<WorkshopStats>>;

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}
