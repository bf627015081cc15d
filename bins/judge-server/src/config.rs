// Environment-driven server configuration
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Public base URL used to build result page links in commit statuses.
    pub base_url: String,
    pub max_parallel_judges: usize,
    /// Root of the fixture tree (`<root>/<workshop>/<task>/config.yaml`).
    pub test_path: PathBuf,
    pub redis_url: String,
    /// TTL for stored summaries and scoreboard entries; `None` keeps them
    /// forever.
    pub result_ttl: Option<Duration>,
    pub gitea_url: String,
    pub gitea_token: String,
    pub docker_image: String,
    /// Network mode for judge containers; "none" disables network access.
    pub docker_network: String,
    /// Wall-clock budget for one container run.
    pub docker_timeout: Duration,
    pub clone_timeout: Duration,
    pub pull_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so the parsing logic
    /// is testable without touching process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required =
            |key: &str| lookup(key).with_context(|| format!("{key} must be set"));
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let parse_u64 = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("{key} must be an integer, got {value:?}")),
                None => Ok(default),
            }
        };

        let ttl_hours = parse_u64("RESULT_TTL_HOURS", 0)?;

        Ok(Self {
            server_address: or_default("SERVER_ADDRESS", "0.0.0.0:3000"),
            base_url: or_default("BASE_URL", "http://localhost:3000"),
            max_parallel_judges: parse_u64("MAX_PARALLEL_JUDGES", 5)? as usize,
            test_path: PathBuf::from(or_default("TESTS_PATH", "test_cases")),
            redis_url: or_default("REDIS_URL", "redis://127.0.0.1:6379"),
            result_ttl: (ttl_hours != 0).then(|| Duration::from_secs(ttl_hours * 3600)),
            gitea_url: required("GITEA_URL")?,
            gitea_token: required("GITEA_TOKEN")?,
            docker_image: or_default("DOCKER_IMAGE", "ghcr.io/gitjudge/judge:latest"),
            docker_network: or_default("DOCKER_NETWORK", "none"),
            docker_timeout: Duration::from_secs(parse_u64("DOCKER_TIMEOUT", 30)?),
            clone_timeout: Duration::from_secs(parse_u64("CLONE_TIMEOUT", 120)?),
            pull_timeout: Duration::from_secs(parse_u64("PULL_TIMEOUT", 300)?),
        })
    }
}
