//! Sandboxed execution of one test case inside a Docker container.
//!
//! The engine knows how to run code under resource caps and a hard
//! wall-clock timeout; it never evaluates correctness. One container per
//! test case; concurrent containers only happen across dispatch pool
//! workers, each bound to its own container.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use judge_common::types::{ExecutionResult, TestCase};

use crate::config::Config as AppConfig;
use crate::runtime_env::RuntimeEnv;

const MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;
const CPU_PERIOD_USEC: i64 = 100_000;
// Half a core.
const CPU_QUOTA_USEC: i64 = 50_000;

pub struct DockerEngine {
    docker: Docker,
    image: String,
    network: String,
    timeout: Duration,
    pull_timeout: Duration,
    env: RuntimeEnv,
}

/// Container cleanup guard: forces removal on drop so resource usage stays
/// bounded across repeated invocations, whatever the outcome.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();

        tokio::spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&container_id, Some(options)).await {
                warn!(container_id = %container_id, error = %e, "failed to remove container");
            }
        });
    }
}

impl DockerEngine {
    pub fn new(cfg: &AppConfig, env: RuntimeEnv) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;

        Ok(Self {
            docker,
            image: cfg.docker_image.clone(),
            network: cfg.docker_network.clone(),
            timeout: cfg.docker_timeout,
            pull_timeout: cfg.pull_timeout,
            env,
        })
    }

    /// Ensure the judge image is available locally, pulling synchronously
    /// on a cache miss.
    async fn ensure_image(&self) -> Result<()> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            debug!(image = %self.image, "image cache hit");
            return Ok(());
        }

        warn!(image = %self.image, "image not found locally, pulling");

        let options = Some(CreateImageOptions {
            from_image: self.image.as_str(),
            ..Default::default()
        });

        let pull = async {
            let mut stream = self.docker.create_image(options, None, None);
            while let Some(result) = stream.next().await {
                result.context("failed to pull image")?;
            }
            Ok::<(), anyhow::Error>(())
        };

        tokio::time::timeout(self.pull_timeout, pull)
            .await
            .map_err(|_| anyhow::anyhow!("image pull timed out after {:?}", self.pull_timeout))??;

        info!(image = %self.image, "image pulled");
        Ok(())
    }

    /// Runs one test case in a fresh container.
    ///
    /// Infrastructure failures (scratch dir, image pull, create, start)
    /// surface as `Err`; the caller maps them to an internal error for
    /// this case only. Timeouts and container-level failures come back as
    /// `Ok` with `internal_error` set and an untrusted exit code.
    pub async fn run(&self, test_case: &TestCase) -> Result<ExecutionResult> {
        let workdir = self
            .env
            .scratch_dir("judge-")
            .context("failed to create judge work dir")?;

        tokio::fs::write(workdir.path().join("input.txt"), &test_case.input)
            .await
            .context("failed to write input")?;
        tokio::fs::write(workdir.path().join("expected.txt"), &test_case.expected)
            .await
            .context("failed to write expected output")?;

        self.ensure_image()
            .await
            .with_context(|| format!("failed to ensure image '{}' is available", self.image))?;

        let workdir_host = self.env.host_path(workdir.path());
        let repo_host = self.env.host_path(&test_case.repository_dir);

        let config = Config {
            image: Some(self.image.clone()),
            env: Some(vec![
                format!("JUDGE_WORKSHOP={}", test_case.solution.workshop),
                format!("JUDGE_TASK={}", test_case.solution.task),
            ]),
            working_dir: Some("/judge".to_string()),
            host_config: Some(HostConfig {
                binds: Some(vec![
                    format!("{}:/judge", workdir_host.display()),
                    format!("{}:/repo:ro", repo_host.display()),
                ]),
                network_mode: Some(self.network.clone()),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::NO),
                    maximum_retry_count: None,
                }),
                memory: Some(MEMORY_LIMIT_BYTES),
                cpu_period: Some(CPU_PERIOD_USEC),
                cpu_quota: Some(CPU_QUOTA_USEC),
                ..Default::default()
            }),
            ..Default::default()
        };

        let name = format!("judge-{}", uuid::Uuid::new_v4());
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .context("failed to create container")?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

        let started = Instant::now();
        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start container")?;

        debug!(container_id = %container_id, solution = %test_case.solution, "container started");

        let mut result = ExecutionResult::default();

        let wait = async {
            let mut stream = self.docker.wait_container(
                &container_id,
                Some(WaitContainerOptions {
                    condition: "not-running",
                }),
            );
            stream.next().await
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Err(_) => {
                result.execution_time = started.elapsed();
                result.internal_error = Some("execution timeout".to_string());
                warn!(container_id = %container_id, timeout = ?self.timeout, "execution timeout");
                return Ok(result);
            }
            Ok(None) => {
                result.execution_time = started.elapsed();
                result.internal_error = Some("container wait returned no status".to_string());
                return Ok(result);
            }
            // bollard reports a non-zero exit through the error channel.
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => {
                result.execution_time = started.elapsed();
                result.exit_code = code;
            }
            Ok(Some(Err(e))) => {
                result.execution_time = started.elapsed();
                result.internal_error = Some(format!("execution error: {e}"));
                return Ok(result);
            }
            Ok(Some(Ok(response))) => {
                result.execution_time = started.elapsed();
                if let Some(message) = response.error.and_then(|e| e.message) {
                    result.internal_error = Some(format!("container error: {message}"));
                    return Ok(result);
                }
                result.exit_code = response.status_code;
            }
        }

        // Combined stdout+stderr, in arrival order.
        let mut logs = self.docker.logs(
            &container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut output = String::new();
        while let Some(chunk) = logs.next().await {
            match chunk.context("failed to read container logs")? {
                LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                _ => {}
            }
        }
        result.output = output;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_common::types::Solution;
    use std::time::Duration;

    fn test_engine(image: &str, timeout: Duration) -> Result<DockerEngine> {
        Ok(DockerEngine {
            docker: Docker::connect_with_local_defaults()?,
            image: image.to_string(),
            network: "none".to_string(),
            timeout,
            pull_timeout: Duration::from_secs(300),
            env: RuntimeEnv::host_native(),
        })
    }

    #[tokio::test]
    #[ignore] // requires a Docker daemon
    async fn test_run_captures_exit_and_output() {
        let engine = test_engine("alpine:latest", Duration::from_secs(30)).unwrap();
        let repo = tempfile::tempdir().unwrap();

        let test_case = TestCase {
            input: "5".to_string(),
            expected: "120".to_string(),
            is_hidden: false,
            repository_dir: repo.path().to_path_buf(),
            solution: Solution::new("workshop1", "hello_world").unwrap(),
        };

        let result = engine.run(&test_case).await.unwrap();
        assert!(result.internal_error.is_none());
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    #[ignore] // requires a Docker daemon
    async fn test_timeout_reports_internal_error() {
        // alpine's default command exits immediately, so use a short
        // timeout against an image that sleeps.
        let engine = test_engine("alpine:latest", Duration::from_millis(1)).unwrap();
        let repo = tempfile::tempdir().unwrap();

        let test_case = TestCase {
            input: String::new(),
            expected: String::new(),
            is_hidden: false,
            repository_dir: repo.path().to_path_buf(),
            solution: Solution::new("workshop1", "hello_world").unwrap(),
        };

        let result = engine.run(&test_case).await.unwrap();
        assert_eq!(result.internal_error.as_deref(), Some("execution timeout"));
        assert!(result.execution_time >= Duration::from_millis(1));
    }
}
