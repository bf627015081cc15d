//! Runs one submission end to end: clone at the pushed commit, work out
//! which exercises the commit touched, load their fixtures and feed each
//! test case through the sandbox, one at a time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use judge_common::traits::Judge;
use judge_common::types::{Solution, Submission, TestCase, TestResult};

use crate::config::Config;
use crate::engine::DockerEngine;
use crate::evaluator::{overall_verdict, render_summary, Comparator};
use crate::git;
use crate::runtime_env::RuntimeEnv;
use crate::testcases;

pub struct SubmissionExecutor {
    engine: DockerEngine,
    comparator: Comparator,
    env: RuntimeEnv,
    test_path: PathBuf,
    gitea_token: String,
    clone_timeout: Duration,
}

impl SubmissionExecutor {
    pub fn new(cfg: &Config, env: RuntimeEnv) -> Result<Self> {
        Ok(Self {
            engine: DockerEngine::new(cfg, env.clone())?,
            comparator: Comparator::new(),
            env,
            test_path: cfg.test_path.clone(),
            gitea_token: cfg.gitea_token.clone(),
            clone_timeout: cfg.clone_timeout,
        })
    }

    /// Collects the test cases for every exercise the commit touched.
    /// Exercises with no fixture config, or with one that fails to load,
    /// are skipped without failing the submission.
    fn collect_cases(&self, solutions: &[Solution], repo_dir: &Path) -> Vec<TestCase> {
        let mut cases = Vec::new();
        for solution in solutions {
            let task_dir = self.test_path.join(&solution.workshop).join(&solution.task);
            let fixtures = match testcases::load_test_cases(&task_dir) {
                Ok(fixtures) => fixtures,
                Err(e) => {
                    warn!(solution = %solution, error = %e, "skipping exercise, fixtures failed to load");
                    continue;
                }
            };
            if fixtures.is_empty() {
                info!(solution = %solution, "no test cases configured, skipping");
                continue;
            }
            cases.extend(fixtures.into_iter().map(|f| TestCase {
                input: f.input,
                expected: f.expected,
                is_hidden: f.is_hidden,
                repository_dir: repo_dir.to_path_buf(),
                solution: solution.clone(),
            }));
        }
        cases
    }
}

#[async_trait]
impl Judge for SubmissionExecutor {
    async fn execute(&self, submission: &Submission) -> Result<TestResult> {
        // Removed on drop, on every exit path.
        let repo_dir = self
            .env
            .scratch_dir("repo-")
            .context("failed to create clone dir")?;

        git::clone_at_commit(
            &submission.clone_url,
            &submission.branch_ref,
            &submission.commit_id,
            repo_dir.path(),
            &self.gitea_token,
            self.clone_timeout,
        )
        .await?;

        let Some(paths) = git::changed_files(repo_dir.path(), self.clone_timeout).await? else {
            info!(commit = %submission.commit_id, "root commit, nothing to diff against");
            return Ok(TestResult::none());
        };

        let solutions = solutions_from_paths(&paths);
        if solutions.is_empty() {
            info!(commit = %submission.commit_id, "no exercise directories touched");
            return Ok(TestResult::none());
        }

        let cases = self.collect_cases(&solutions, repo_dir.path());
        if cases.is_empty() {
            return Ok(TestResult::none());
        }

        info!(
            commit = %submission.commit_id,
            solutions = solutions.len(),
            cases = cases.len(),
            "judging submission"
        );

        let mut results = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            let exec = match self.engine.run(case).await {
                Ok(exec) => exec,
                // Sandbox infrastructure failures count against this
                // case only, as an internal error.
                Err(e) => {
                    warn!(solution = %case.solution, error = %e, "sandbox run failed");
                    judge_common::types::ExecutionResult {
                        internal_error: Some(format!("{e:#}")),
                        ..Default::default()
                    }
                }
            };
            results.push(self.comparator.judge_case(i + 1, case, &exec));
        }

        let verdict = overall_verdict(&results);
        let summary = render_summary(verdict, &results);

        Ok(TestResult {
            verdict,
            test_cases: results,
            summary,
        })
    }
}

/// Maps changed file paths to the exercises they belong to. Only paths
/// nested exactly two directories deep (`workshop/task/file`) qualify;
/// order of first appearance is preserved and duplicates collapse.
pub fn solutions_from_paths(paths: &[String]) -> Vec<Solution> {
    let mut solutions: Vec<Solution> = Vec::new();
    for path in paths {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 3 {
            continue;
        }
        let Ok(solution) = Solution::new(segments[0], segments[1]) else {
            continue;
        };
        if !solutions.contains(&solution) {
            solutions.push(solution);
        }
    }
    solutions
}
