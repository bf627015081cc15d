//! Bounded dispatch pool.
//!
//! A fixed number of workers pull submissions off one shared FIFO queue
//! and run each to completion before pulling the next. Enqueueing blocks
//! only when the queue is full, as backpressure on the webhook side.
//! `stop` closes intake and drains everything already accepted.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use judge_common::traits::{Judge, ResultStore, ScoreStore};
use judge_common::types::{Submission, Verdict};

const QUEUE_CAPACITY: usize = 1000;

pub struct DispatchPool {
    sender: Mutex<Option<mpsc::Sender<Submission>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    pub fn start(
        workers: usize,
        judge: Arc<dyn Judge>,
        results: Arc<dyn ResultStore>,
        scores: Arc<dyn ScoreStore>,
        base_url: String,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Submission>(QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let judge = Arc::clone(&judge);
                let results = Arc::clone(&results);
                let scores = Arc::clone(&scores);
                let base_url = base_url.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, rx, judge, results, scores, base_url).await;
                })
            })
            .collect();

        info!(workers, capacity = QUEUE_CAPACITY, "dispatch pool started");

        Self {
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        }
    }

    /// Enqueues one submission. Blocks only while the queue is full;
    /// fails once the pool has been stopped.
    pub async fn submit(&self, submission: Submission) -> Result<()> {
        let sender = match &*self.sender.lock().unwrap() {
            Some(sender) => sender.clone(),
            None => bail!("dispatch pool is stopped"),
        };
        if sender.send(submission).await.is_err() {
            bail!("dispatch pool is stopped");
        }
        Ok(())
    }

    /// Closes intake and waits for all accepted submissions to finish.
    /// In-flight work is never cancelled.
    pub async fn stop(&self) {
        drop(self.sender.lock().unwrap().take());
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        info!("dispatch pool draining");
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("dispatch pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Submission>>>,
    judge: Arc<dyn Judge>,
    results: Arc<dyn ResultStore>,
    scores: Arc<dyn ScoreStore>,
    base_url: String,
) {
    loop {
        // Hold the queue lock only for the pull itself.
        let submission = rx.lock().await.recv().await;
        let Some(submission) = submission else {
            info!(worker_id, "queue closed, worker exiting");
            return;
        };

        info!(
            worker_id,
            repo = %submission.repo_full_name,
            commit = %submission.commit_id,
            "processing submission"
        );
        process_submission(&submission, &*judge, &*results, &*scores, &base_url).await;
    }
}

async fn process_submission(
    submission: &Submission,
    judge: &dyn Judge,
    results: &dyn ResultStore,
    scores: &dyn ScoreStore,
    base_url: &str,
) {
    let Some((owner, repo)) = submission.split_repo() else {
        warn!(repo = %submission.repo_full_name, "malformed repository name, dropping submission");
        return;
    };
    let commit = submission.commit_id.as_str();
    let target_url = format!("{base_url}/results/{commit}");

    if let Err(e) = submission
        .reporter
        .post_starting(owner, repo, commit, &target_url, Verdict::None, "Judge started")
        .await
    {
        warn!(commit, error = %e, "failed to post starting status");
    }

    let result = match judge.execute(submission).await {
        Ok(result) => result,
        // Report and move on to the next submission; never crash the
        // worker.
        Err(e) => {
            error!(commit, error = format!("{e:#}"), "submission failed");
            if let Err(e) = submission
                .reporter
                .post_starting(owner, repo, commit, &target_url, Verdict::Error, "Internal server error")
                .await
            {
                warn!(commit, error = %e, "failed to post error status");
            }
            return;
        }
    };

    if let Err(e) = results.put_summary(commit, &result.summary).await {
        error!(commit, error = %e, "failed to store result summary");
    }

    // Verdict None means zero discovered test cases and never touches the
    // scoreboard.
    if result.verdict != Verdict::None {
        if let Err(e) = scores.process_test_results(submission, &result.test_cases).await {
            error!(commit, error = %e, "failed to update scoreboard");
        }
    }

    if let Err(e) = submission
        .reporter
        .post_result(owner, repo, commit, &target_url, result.verdict)
        .await
    {
        warn!(commit, error = %e, "failed to post result status");
    }

    info!(commit, verdict = %result.verdict, "submission judged");
}
