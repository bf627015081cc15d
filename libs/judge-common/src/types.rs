use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::StatusReporter;

/// Outcome of a test case or a whole submission.
///
/// `None` means zero test cases were discovered (exercise not touched or
/// not runnable) and is explicitly not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    None,
    Passed,
    Failed,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::None => "none",
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::Error => "error",
        };
        f.write_str(s)
    }
}

/// One push event to judge. Created by the webhook handler and owned
/// exclusively by the worker processing it until completion.
#[derive(Clone)]
pub struct Submission {
    pub repo_full_name: String,
    pub commit_id: String,
    pub branch_ref: String,
    pub clone_url: String,
    pub reporter: Arc<dyn StatusReporter>,
}

impl Submission {
    /// Splits `owner/repo` into its two parts. Returns `None` unless the
    /// full name has exactly two non-empty segments.
    pub fn split_repo(&self) -> Option<(&str, &str)> {
        let (owner, repo) = self.repo_full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some((owner, repo))
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("repo_full_name", &self.repo_full_name)
            .field("commit_id", &self.commit_id)
            .field("branch_ref", &self.branch_ref)
            .field("clone_url", &self.clone_url)
            .finish_non_exhaustive()
    }
}

/// Identifies one exercise as a two-level `workshop/task` directory path,
/// both in the fixture tree and in the submitted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solution {
    pub workshop: String,
    pub task: String,
}

impl Solution {
    /// Validates both segments before any filesystem access: non-empty,
    /// no traversal sequences, no path separators.
    pub fn new(workshop: &str, task: &str) -> Result<Self> {
        for segment in [workshop, task] {
            if segment.is_empty()
                || segment.contains("..")
                || segment.contains('/')
                || segment.contains('\\')
            {
                bail!("invalid path component: {segment:?}");
            }
        }
        Ok(Self {
            workshop: workshop.to_string(),
            task: task.to_string(),
        })
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workshop, self.task)
    }
}

/// One input/expected-output pair as authored in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub input: String,
    pub expected: String,
}

/// Declarative fixture descriptor for one exercise
/// (`testRoot/<workshop>/<task>/config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCaseConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cases: Vec<Case>,
    #[serde(default)]
    pub hidden_cases: Vec<Case>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// A runnable unit: one fixture case tagged with the checked-out
/// repository and the exercise it belongs to. Never mutated after
/// creation; consumed by the sandbox engine.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
    pub is_hidden: bool,
    pub repository_dir: PathBuf,
    pub solution: Solution,
}

/// Raw outcome of one sandboxed run.
///
/// When `internal_error` is set the exit code carries no information and
/// must not be trusted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub output: String,
    pub internal_error: Option<String>,
    pub exit_code: i64,
    pub execution_time: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_number: usize,
    pub solution: Solution,
    pub verdict: Verdict,
    pub detail: String,
    pub execution_time: Duration,
    pub is_hidden: bool,
}

/// Aggregated result of one submission. The rendered summary outlives the
/// submission: it is handed to the result store keyed by commit ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub verdict: Verdict,
    pub test_cases: Vec<TestCaseResult>,
    pub summary: String,
}

impl TestResult {
    /// Result for a submission with zero discovered test cases.
    pub fn none() -> Self {
        Self {
            verdict: Verdict::None,
            test_cases: Vec::new(),
            summary: String::new(),
        }
    }
}

/// One recorded scoreboard submission for a fully-passed exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubmission {
    pub repo_name: String,
    pub commit_id: String,
    pub clone_url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub workshop: String,
    pub task: String,
    pub submission: UserSubmission,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub user: String,
    #[serde(default)]
    pub submissions: Vec<TaskSubmission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkshopStats {
    pub total_users: usize,
    pub completed_at: Vec<DateTime<Utc>>,
    pub latest_submit: Option<DateTime<Utc>>,
    pub submissions: Vec<UserSubmission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub completed_tasks: usize,
    pub last_submission: Option<DateTime<Utc>>,
    pub latest_repo_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StatusReporter;
    use async_trait::async_trait;

    struct NoopReporter;

    #[async_trait]
    impl StatusReporter for NoopReporter {
        async fn post_starting(
            &self,
            _owner: &str,
            _repo: &str,
            _commit: &str,
            _target_url: &str,
            _verdict: Verdict,
            _message: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn post_result(
            &self,
            _owner: &str,
            _repo: &str,
            _commit: &str,
            _target_url: &str,
            _verdict: Verdict,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn submission(repo_full_name: &str) -> Submission {
        Submission {
            repo_full_name: repo_full_name.to_string(),
            commit_id: "c0ffee".to_string(),
            branch_ref: "refs/heads/main".to_string(),
            clone_url: "http://localhost:3000/acme/alice.git".to_string(),
            reporter: Arc::new(NoopReporter),
        }
    }

    #[test]
    fn test_split_repo() {
        assert_eq!(submission("acme/alice").split_repo(), Some(("acme", "alice")));
        assert_eq!(submission("alice").split_repo(), None);
        assert_eq!(submission("acme/alice/extra").split_repo(), None);
        assert_eq!(submission("/alice").split_repo(), None);
        assert_eq!(submission("acme/").split_repo(), None);
    }

    #[test]
    fn test_solution_validation() {
        assert!(Solution::new("workshop1", "hello_world").is_ok());
        assert!(Solution::new("", "task").is_err());
        assert!(Solution::new("workshop", "").is_err());
        assert!(Solution::new("..", "task").is_err());
        assert!(Solution::new("workshop", "../etc").is_err());
        assert!(Solution::new("work/shop", "task").is_err());
        assert!(Solution::new("work\\shop", "task").is_err());
    }

    #[test]
    fn test_solution_display() {
        let solution = Solution::new("workshop1", "pascal_triangle").unwrap();
        assert_eq!(solution.to_string(), "workshop1/pascal_triangle");
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::Passed).unwrap(), "\"passed\"");
        assert_eq!(serde_json::to_string(&Verdict::None).unwrap(), "\"none\"");
        let v: Verdict = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(v, Verdict::Failed);
    }
}
