//! Runtime configuration, deserializable from a TOML file and overridable
//! section by section.

use super::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub container: ContainerConfig,
    pub call_cache: CallCacheConfig,
    pub download_cache: DownloadCacheConfig,
    pub task: TaskConfig,
}

impl Config {
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::io(format!("reading config {}", path.display()), e))?;
        toml::from_str(&text).map_err(|e| RuntimeError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }
}

/// Process-wide CPU/memory pool sizing. `None` means detect from the host
/// (or container backend).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub host_cpu: Option<u32>,
    pub host_memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub backend: ContainerBackend,
    /// Image used when a task's runtime section names none.
    pub default_image: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            backend: ContainerBackend::Process,
            default_image: "ubuntu:20.04".to_string(),
        }
    }
}

/// Which container backend executes task commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerBackend {
    /// Run commands as host subprocesses (no isolation; development and
    /// tests).
    Process,
    /// Docker engine via its API socket.
    Docker,
}

impl Default for ContainerBackend {
    fn default() -> Self {
        ContainerBackend::Process
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallCacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CallCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadCacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// When non-empty, only URIs with one of these prefixes are cached.
    pub allow_prefix: Vec<String>,
    /// URIs with any of these prefixes are never cached.
    pub deny_prefix: Vec<String>,
    /// Treat URIs differing only in query string as the same cache entry.
    pub disregard_query: bool,
}

impl Default for DownloadCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_cache_dir(),
            allow_prefix: vec![],
            deny_prefix: vec![],
            disregard_query: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Retries when the runtime section names none.
    pub default_max_retries: u32,
    /// Remove the working directory after a successful run.
    pub delete_work: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 0,
            delete_work: false,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("sluice")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.container.backend, ContainerBackend::Process);
        assert!(!c.call_cache.enabled);
        assert_eq!(c.task.default_max_retries, 0);
    }

    #[test]
    fn load_partial_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(
            &path,
            r#"
            [container]
            backend = "docker"
            default_image = "debian:12"

            [scheduler]
            host_cpu = 8

            [task]
            default_max_retries = 2
            "#,
        )
        .unwrap();
        let c = Config::load(&path).unwrap();
        assert_eq!(c.container.backend, ContainerBackend::Docker);
        assert_eq!(c.container.default_image, "debian:12");
        assert_eq!(c.scheduler.host_cpu, Some(8));
        assert_eq!(c.task.default_max_retries, 2);
        // untouched sections fall back to defaults
        assert!(!c.download_cache.enabled);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "[container]\nbackend = \"warp\"").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(RuntimeError::Config { .. })
        ));
    }
}
