//! Hosting-environment detection.
//!
//! When the judge itself runs inside a Docker container, scratch
//! directories must live under a volume the host can see, because bind
//! mounts handed to the daemon are resolved host-side. This state is
//! resolved once at startup and injected into the engine and executor
//! instead of living in process-wide globals.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bollard::Docker;
use tempfile::TempDir;
use tracing::{debug, info};

/// Volume that must be mounted into the judge container so the daemon can
/// reach our scratch directories.
pub const REPO_MOUNT: &str = "/repos";

#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    /// Host-side source of the [`REPO_MOUNT`] volume, when containerized.
    host_repo_path: Option<PathBuf>,
    scratch_root: PathBuf,
}

impl RuntimeEnv {
    /// Environment for a judge running directly on the host.
    pub fn host_native() -> Self {
        Self {
            host_repo_path: None,
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Detects whether we run inside a Docker container and, if so,
    /// resolves the host path backing [`REPO_MOUNT`] via the daemon.
    pub async fn detect() -> Result<Self> {
        let Some(container_id) = detect_container_id() else {
            debug!("no container environment detected, using local temp dir");
            return Ok(Self::host_native());
        };

        let host = resolve_mount_source(&container_id, REPO_MOUNT)
            .await
            .with_context(|| format!("failed to inspect own container {container_id}"))?
            .ok_or_else(|| {
                anyhow!("{REPO_MOUNT} volume must be mounted when the judge runs inside Docker")
            })?;

        info!(
            container_id = %container_id,
            host_path = %host.display(),
            "docker environment detected"
        );

        Ok(Self {
            host_repo_path: Some(host),
            scratch_root: PathBuf::from(REPO_MOUNT),
        })
    }

    /// Fresh exclusively-owned scratch directory, removed on drop.
    pub fn scratch_dir(&self, prefix: &str) -> io::Result<TempDir> {
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.scratch_root)
    }

    /// Translates a local scratch path into the path the Docker daemon can
    /// bind-mount. Identity when running directly on the host.
    pub fn host_path(&self, local: &Path) -> PathBuf {
        match &self.host_repo_path {
            None => local.to_path_buf(),
            Some(root) => root.join(local.file_name().unwrap_or_default()),
        }
    }
}

fn detect_container_id() -> Option<String> {
    let mountinfo = fs::read_to_string("/proc/self/mountinfo").ok()?;
    let id = container_id_from_mountinfo(&mountinfo);
    if id.is_none() && Path::new("/.dockerenv").exists() {
        debug!("/.dockerenv present but container ID not found in mountinfo");
    }
    id
}

/// Extracts the short container ID from a `/proc/self/mountinfo` dump.
fn container_id_from_mountinfo(mountinfo: &str) -> Option<String> {
    for line in mountinfo.lines() {
        if let Some((_, rest)) = line.split_once("/docker/containers/") {
            let id = rest.split('/').next().unwrap_or("");
            if id.len() >= 12 {
                return Some(id[..12].to_string());
            }
        }
    }
    None
}

async fn resolve_mount_source(container_id: &str, destination: &str) -> Result<Option<PathBuf>> {
    let docker =
        Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
    let inspect = docker.inspect_container(container_id, None).await?;
    for mount in inspect.mounts.unwrap_or_default() {
        if mount.destination.as_deref() == Some(destination) {
            return Ok(mount.source.map(PathBuf::from));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_from_mountinfo() {
        let mountinfo = "\
2050 2014 0:167 / / rw,relatime master:634 - overlay overlay rw,lowerdir=/var/lib/docker/overlay2/l/ABC\n\
2054 2050 254:1 /var/lib/docker/containers/0123456789abcdef0123456789abcdef/resolv.conf /etc/resolv.conf rw,relatime - ext4 /dev/vda1 rw\n";
        assert_eq!(
            container_id_from_mountinfo(mountinfo),
            Some("0123456789ab".to_string())
        );
    }

    #[test]
    fn test_container_id_not_found() {
        assert_eq!(container_id_from_mountinfo(""), None);
        assert_eq!(
            container_id_from_mountinfo("36 25 0:32 / /sys rw,nosuid - sysfs sysfs rw\n"),
            None
        );
    }

    #[test]
    fn test_container_id_too_short() {
        let mountinfo = "x /docker/containers/abc/resolv.conf y\n";
        assert_eq!(container_id_from_mountinfo(mountinfo), None);
    }

    #[test]
    fn test_host_path_native_is_identity() {
        let env = RuntimeEnv::host_native();
        let local = PathBuf::from("/tmp/jrepo-12345");
        assert_eq!(env.host_path(&local), local);
    }

    #[test]
    fn test_host_path_maps_into_volume() {
        let env = RuntimeEnv {
            host_repo_path: Some(PathBuf::from("/srv/judge/repos")),
            scratch_root: PathBuf::from(REPO_MOUNT),
        };
        assert_eq!(
            env.host_path(Path::new("/repos/judge-42")),
            PathBuf::from("/srv/judge/repos/judge-42")
        );
    }

    #[test]
    fn test_scratch_dir_is_removed_on_drop() {
        let env = RuntimeEnv::host_native();
        let path = {
            let dir = env.scratch_dir("jrepo-").unwrap();
            assert!(dir.path().exists());
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
