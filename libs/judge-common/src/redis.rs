//! Redis key scheme and storage operations.
//!
//! Defines the key layout shared by the server and any tooling so keys
//! stay deterministic: rendered summaries under `judge:result:<commit>`,
//! per-user progress under `judge:user:<username>` and per-exercise
//! stats under `judge:workshop:<workshop>:<task>`.

use anyhow::{Context, Result};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const RESULT_PREFIX: &str = "judge:result";
pub const USER_PREFIX: &str = "judge:user";
pub const WORKSHOP_PREFIX: &str = "judge:workshop";

pub fn result_key(commit_id: &str) -> String {
    format!("{}:{}", RESULT_PREFIX, commit_id)
}

pub fn user_key(username: &str) -> String {
    format!("{}:{}", USER_PREFIX, username)
}

pub fn workshop_key(workshop: &str, task: &str) -> String {
    format!("{}:{}:{}", WORKSHOP_PREFIX, workshop, task)
}

/// Store a rendered result summary keyed by commit ID, with an optional
/// time-to-live.
pub async fn store_summary(
    conn: &mut ConnectionManager,
    commit_id: &str,
    summary: &str,
    ttl: Option<Duration>,
) -> Result<()> {
    let key = result_key(commit_id);
    match ttl {
        Some(ttl) => {
            let () = conn
                .set_ex(&key, summary, ttl.as_secs() as _)
                .await
                .context("failed to store result summary")?;
        }
        None => {
            let () = conn
                .set(&key, summary)
                .await
                .context("failed to store result summary")?;
        }
    }
    Ok(())
}

pub async fn get_summary(
    conn: &mut ConnectionManager,
    commit_id: &str,
) -> Result<Option<String>> {
    conn.get(result_key(commit_id))
        .await
        .context("failed to fetch result summary")
}

/// Fetch and deserialize a JSON value, `None` when the key is absent.
pub async fn get_json<T: DeserializeOwned>(
    conn: &mut ConnectionManager,
    key: &str,
) -> Result<Option<T>> {
    let payload: Option<String> = conn
        .get(key)
        .await
        .with_context(|| format!("failed to fetch {key}"))?;
    match payload {
        Some(data) => {
            let value = serde_json::from_str(&data)
                .with_context(|| format!("failed to decode {key}"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and store a JSON value, with an optional time-to-live.
pub async fn put_json<T: Serialize>(
    conn: &mut ConnectionManager,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let payload = serde_json::to_string(value)
        .with_context(|| format!("failed to encode {key}"))?;
    match ttl {
        Some(ttl) => {
            let () = conn
                .set_ex(key, payload, ttl.as_secs() as _)
                .await
                .with_context(|| format!("failed to store {key}"))?;
        }
        None => {
            let () = conn
                .set(key, payload)
                .await
                .with_context(|| format!("failed to store {key}"))?;
        }
    }
    Ok(())
}

/// Collect all keys matching a pattern via SCAN.
pub async fn scan_keys(conn: &mut ConnectionManager, pattern: &str) -> Result<Vec<String>> {
    let mut iter: redis::AsyncIter<String> = conn
        .scan_match(pattern)
        .await
        .with_context(|| format!("failed to scan {pattern}"))?;
    let mut keys = Vec::new();
    while let Some(key) = iter.next_item().await {
        keys.push(key);
    }
    Ok(keys)
}
