//! Redis-backed result and scoreboard stores.
//!
//! The username credited for a submission is the repository name, since
//! every participant pushes to a repository named after themselves.
//! Progress is keyed per user and per exercise; an exercise counts only
//! when every one of its test cases in the submission passed.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;

use judge_common::redis::{get_json, put_json, scan_keys, store_summary, user_key, workshop_key};
use judge_common::traits::{ResultStore, ScoreStore};
use judge_common::types::{
    LeaderboardEntry, Solution, Submission, TaskSubmission, TestCaseResult, UserProgress,
    UserSubmission, Verdict, WorkshopStats,
};

pub struct RedisResultStore {
    conn: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisResultStore {
    pub fn new(conn: ConnectionManager, ttl: Option<Duration>) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put_summary(&self, commit_id: &str, summary: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        store_summary(&mut conn, commit_id, summary, self.ttl).await
    }

    async fn get_summary(&self, commit_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        judge_common::redis::get_summary(&mut conn, commit_id).await
    }
}

pub struct RedisScoreboard {
    conn: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisScoreboard {
    pub fn new(conn: ConnectionManager, ttl: Option<Duration>) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl ScoreStore for RedisScoreboard {
    async fn process_test_results(
        &self,
        submission: &Submission,
        results: &[TestCaseResult],
    ) -> Result<()> {
        let (_, username) = submission
            .split_repo()
            .ok_or_else(|| anyhow!("invalid repository name: {}", submission.repo_full_name))?;

        let mut conn = self.conn.clone();
        for solution in passed_solutions(results) {
            let record = UserSubmission {
                repo_name: submission.repo_full_name.clone(),
                commit_id: submission.commit_id.clone(),
                clone_url: submission.clone_url.clone(),
                timestamp: Utc::now(),
            };

            let key = user_key(username);
            let mut progress = get_json::<UserProgress>(&mut conn, &key)
                .await?
                .unwrap_or_else(|| UserProgress {
                    user: username.to_string(),
                    submissions: Vec::new(),
                });
            upsert_task(&mut progress, &solution, record.clone());
            put_json(&mut conn, &key, &progress, self.ttl).await?;

            let key = workshop_key(&solution.workshop, &solution.task);
            let mut stats = get_json::<WorkshopStats>(&mut conn, &key)
                .await?
                .unwrap_or_default();
            let now = record.timestamp;
            stats.total_users += 1;
            stats.completed_at.push(now);
            stats.latest_submit = Some(now);
            stats.submissions.push(record);
            put_json(&mut conn, &key, &stats, self.ttl).await?;
        }
        Ok(())
    }

    async fn get_user_progress(&self, username: &str) -> Result<Option<UserProgress>> {
        let mut conn = self.conn.clone();
        get_json(&mut conn, &user_key(username)).await
    }

    async fn get_workshop_stats(&self, workshop: &str, task: &str) -> Result<Option<WorkshopStats>> {
        let mut conn = self.conn.clone();
        get_json(&mut conn, &workshop_key(workshop, task)).await
    }

    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", judge_common::redis::USER_PREFIX);
        let keys = scan_keys(&mut conn, &pattern).await?;

        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(progress) = get_json::<UserProgress>(&mut conn, &key).await? {
                users.push(progress);
            }
        }
        Ok(rank_leaderboard(users, limit))
    }
}

/// Exercises this submission fully passed: every test case belonging to
/// the exercise has verdict `Passed`.
pub fn passed_solutions(results: &[TestCaseResult]) -> Vec<Solution> {
    let mut solutions: Vec<(Solution, bool)> = Vec::new();
    for result in results {
        let passed = result.verdict == Verdict::Passed;
        match solutions.iter_mut().find(|(s, _)| *s == result.solution) {
            Some((_, all_passed)) => *all_passed &= passed,
            None => solutions.push((result.solution.clone(), passed)),
        }
    }
    solutions
        .into_iter()
        .filter_map(|(solution, passed)| passed.then_some(solution))
        .collect()
}

/// Records one passed exercise in a user's progress, replacing any
/// earlier submission for the same exercise.
pub fn upsert_task(progress: &mut UserProgress, solution: &Solution, record: UserSubmission) {
    for entry in &mut progress.submissions {
        if entry.workshop == solution.workshop && entry.task == solution.task {
            entry.submission = record;
            return;
        }
    }
    progress.submissions.push(TaskSubmission {
        workshop: solution.workshop.clone(),
        task: solution.task.clone(),
        submission: record,
    });
}

/// Ranks users by completed exercise count, breaking ties by most recent
/// submission.
pub fn rank_leaderboard(users: Vec<UserProgress>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = users
        .into_iter()
        .map(|progress| {
            let latest = progress
                .submissions
                .iter()
                .max_by_key(|s| s.submission.timestamp);
            LeaderboardEntry {
                username: progress.user,
                completed_tasks: progress.submissions.len(),
                last_submission: latest.map(|s| s.submission.timestamp),
                latest_repo_name: latest.map(|s| s.submission.repo_name.clone()).unwrap_or_default(),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.completed_tasks
            .cmp(&a.completed_tasks)
            .then_with(|| b.last_submission.cmp(&a.last_submission))
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn case(workshop: &str, task: &str, verdict: Verdict) -> TestCaseResult {
        TestCaseResult {
            test_number: 1,
            solution: Solution::new(workshop, task).unwrap(),
            verdict,
            detail: String::new(),
            execution_time: Duration::from_millis(10),
            is_hidden: false,
        }
    }

    fn record(repo: &str, at: DateTime<Utc>) -> UserSubmission {
        UserSubmission {
            repo_name: repo.to_string(),
            commit_id: "c0ffee".to_string(),
            clone_url: format!("http://localhost:3000/{repo}.git"),
            timestamp: at,
        }
    }

    fn progress(user: &str, tasks: &[(&str, &str, DateTime<Utc>, &str)]) -> UserProgress {
        UserProgress {
            user: user.to_string(),
            submissions: tasks
                .iter()
                .map(|(workshop, task, at, repo)| TaskSubmission {
                    workshop: workshop.to_string(),
                    task: task.to_string(),
                    submission: record(repo, *at),
                })
                .collect(),
        }
    }

    #[test]
    fn test_passed_solutions_requires_all_cases() {
        let results = vec![
            case("w1", "t1", Verdict::Passed),
            case("w1", "t1", Verdict::Failed),
            case("w1", "t2", Verdict::Passed),
            case("w2", "t1", Verdict::Passed),
            case("w2", "t1", Verdict::Passed),
        ];
        let passed = passed_solutions(&results);
        assert_eq!(
            passed,
            vec![
                Solution::new("w1", "t2").unwrap(),
                Solution::new("w2", "t1").unwrap(),
            ]
        );
    }

    #[test]
    fn test_passed_solutions_error_counts_as_not_passed() {
        let results = vec![
            case("w1", "t1", Verdict::Passed),
            case("w1", "t1", Verdict::Error),
        ];
        assert!(passed_solutions(&results).is_empty());
    }

    #[test]
    fn test_upsert_task_replaces_same_exercise() {
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 11, 12, 0, 0).unwrap();
        let mut progress = progress("alice", &[("w1", "t1", at, "acme/alice")]);
        let solution = Solution::new("w1", "t1").unwrap();

        upsert_task(&mut progress, &solution, record("acme/alice", later));
        assert_eq!(progress.submissions.len(), 1);
        assert_eq!(progress.submissions[0].submission.timestamp, later);

        let other = Solution::new("w1", "t2").unwrap();
        upsert_task(&mut progress, &other, record("acme/alice", later));
        assert_eq!(progress.submissions.len(), 2);
    }

    #[test]
    fn test_leaderboard_ranks_by_completed_then_recency() {
        let early = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 12, 12, 0, 0).unwrap();

        let users = vec![
            progress("alice", &[("w1", "t1", early, "acme/alice")]),
            progress(
                "bob",
                &[
                    ("w1", "t1", early, "acme/bob"),
                    ("w1", "t2", late, "acme/bob"),
                ],
            ),
            progress("carol", &[("w1", "t1", late, "acme/carol")]),
        ];

        let board = rank_leaderboard(users, 10);
        assert_eq!(board[0].username, "bob");
        assert_eq!(board[0].completed_tasks, 2);
        assert_eq!(board[0].latest_repo_name, "acme/bob");
        // carol ties alice on count but submitted later
        assert_eq!(board[1].username, "carol");
        assert_eq!(board[2].username, "alice");
    }

    #[test]
    fn test_leaderboard_limit() {
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let users = vec![
            progress("alice", &[("w1", "t1", at, "acme/alice")]),
            progress("bob", &[]),
        ];
        assert_eq!(rank_leaderboard(users.clone(), 1).len(), 1);
        assert_eq!(rank_leaderboard(users, 10).len(), 2);
    }
}
