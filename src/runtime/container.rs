//! Abstract container backend interface plus the built-in process backend.
//!
//! Backends receive a fully-prepared [`ContainerSpec`]: the run directory
//! scaffold exists, the command script is written, and every input file has
//! an assigned mount. A backend's job is only to execute
//! `bash ../command >> ../stdout.txt 2>> ../stderr.txt` in the working
//! directory with the prescribed mounts and resource limits, polling the
//! termination flag, and to report the exit status.

pub mod docker;

use super::config::Config;
use super::error::{RuntimeError, RuntimeResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Mount point inside the container for the task scratch directory.
pub const CONTAINER_TASK_DIR: &str = "/mnt/sluice_task";

/// Shell line executed inside the working directory.
pub const COMMAND_SHELL: &str = "bash ../command >> ../stdout.txt 2>> ../stderr.txt";

#[derive(Debug, Clone)]
pub struct Mount {
    pub host: PathBuf,
    pub container: PathBuf,
    pub read_only: bool,
}

/// Everything a backend needs to execute one task attempt.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub run_id: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    /// Container-side working directory (the task `work/`).
    pub work_dir: PathBuf,
    pub cpu_limit: u32,
    pub memory_limit: u64,
    pub env: Vec<(String, String)>,
    /// Host-side scratch directory (for backends that run without mounts).
    pub host_dir: PathBuf,
    /// Host capture file names (attempt-suffixed on retries). Containerized
    /// backends mount these as `stdout.txt`/`stderr.txt`; the process
    /// backend redirects to them directly.
    pub stdout_name: String,
    pub stderr_name: String,
}

pub trait ContainerRuntime: Send + Sync {
    /// Idempotent one-time setup (connectivity probe etc).
    fn global_init(&self, _config: &Config) -> RuntimeResult<()> {
        Ok(())
    }

    /// Maximum CPUs and memory bytes available for task execution.
    fn detect_resource_limits(&self) -> RuntimeResult<(u32, u64)>;

    /// Whether task files are addressed by in-container paths under
    /// [`CONTAINER_TASK_DIR`] (false for backends executing directly on the
    /// host).
    fn maps_paths(&self) -> bool;

    /// Execute the attempt; blocks until exit or termination.
    fn run(&self, spec: &ContainerSpec, terminating: &AtomicBool) -> RuntimeResult<i32>;
}

/// Runs task commands as plain host subprocesses. No isolation; intended
/// for development, tests, and trusted environments without a container
/// engine.
pub struct ProcessRuntime;

impl ProcessRuntime {
    pub fn new() -> Self {
        ProcessRuntime
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for ProcessRuntime {
    fn detect_resource_limits(&self) -> RuntimeResult<(u32, u64)> {
        let cpu = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Ok((cpu, host_memory_bytes()))
    }

    fn maps_paths(&self) -> bool {
        false
    }

    fn run(&self, spec: &ContainerSpec, terminating: &AtomicBool) -> RuntimeResult<i32> {
        let work_dir = spec.host_dir.join(work_dir_name(&spec.work_dir));
        info!(run_id = %spec.run_id, work = %work_dir.display(), "starting subprocess task");
        let shell_line = format!(
            "bash ../command >> ../{} 2>> ../{}",
            spec.stdout_name, spec.stderr_name
        );
        let mut command = std::process::Command::new("/bin/bash");
        command
            .arg("-c")
            .arg(shell_line)
            .current_dir(&work_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        for (k, v) in &spec.env {
            command.env(k, v);
        }
        let mut child = command
            .spawn()
            .map_err(|e| RuntimeError::io("spawning task shell", e))?;

        loop {
            if terminating.load(Ordering::SeqCst) {
                debug!(run_id = %spec.run_id, "killing task subprocess on termination");
                let _ = child.kill();
                let _ = child.wait();
                return Err(RuntimeError::Terminated);
            }
            match child
                .try_wait()
                .map_err(|e| RuntimeError::io("polling task subprocess", e))?
            {
                Some(status) => {
                    let code = status.code().unwrap_or(-1);
                    debug!(run_id = %spec.run_id, exit_status = code, "task subprocess exited");
                    return Ok(code);
                }
                None => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }
}

/// The final component of the container work dir, used to locate the
/// corresponding host directory (`work`, `work2`, ...).
fn work_dir_name(container_work: &std::path::Path) -> String {
    container_work
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "work".to_string())
}

fn host_memory_bytes() -> u64 {
    const FALLBACK: u64 = 4 << 30;
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return FALLBACK;
    };
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(FALLBACK >> 10);
            return kb * 1024;
        }
    }
    FALLBACK
}

/// Instantiate the configured backend.
pub fn create_backend(
    config: &Config,
) -> RuntimeResult<std::sync::Arc<dyn ContainerRuntime>> {
    use super::config::ContainerBackend;
    match config.container.backend {
        ContainerBackend::Process => Ok(std::sync::Arc::new(ProcessRuntime::new())),
        ContainerBackend::Docker => Ok(std::sync::Arc::new(docker::DockerRuntime::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_in(host_dir: &std::path::Path) -> ContainerSpec {
        ContainerSpec {
            run_id: "test".to_string(),
            image: String::new(),
            mounts: vec![],
            work_dir: host_dir.join("work"),
            cpu_limit: 1,
            memory_limit: 1 << 20,
            env: vec![],
            host_dir: host_dir.to_path_buf(),
            stdout_name: "stdout.txt".to_string(),
            stderr_name: "stderr.txt".to_string(),
        }
    }

    fn scaffold(dir: &std::path::Path, command: &str) {
        std::fs::create_dir_all(dir.join("work")).unwrap();
        std::fs::write(dir.join("command"), command).unwrap();
        std::fs::write(dir.join("stdout.txt"), "").unwrap();
        std::fs::write(dir.join("stderr.txt"), "").unwrap();
    }

    #[test]
    fn detect_limits() {
        let (cpu, mem) = ProcessRuntime::new().detect_resource_limits().unwrap();
        assert!(cpu >= 1);
        assert!(mem > 0);
    }

    #[test]
    fn runs_command_and_captures_streams() {
        let dir = tempfile::TempDir::new().unwrap();
        scaffold(dir.path(), "echo out-line\necho err-line >&2\nexit 0\n");
        let terminating = AtomicBool::new(false);
        let status = ProcessRuntime::new()
            .run(&spec_in(dir.path()), &terminating)
            .unwrap();
        assert_eq!(status, 0);
        let stdout = std::fs::read_to_string(dir.path().join("stdout.txt")).unwrap();
        let stderr = std::fs::read_to_string(dir.path().join("stderr.txt")).unwrap();
        assert_eq!(stdout.trim(), "out-line");
        assert_eq!(stderr.trim(), "err-line");
    }

    #[test]
    fn nonzero_exit_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        scaffold(dir.path(), "exit 3\n");
        let terminating = AtomicBool::new(false);
        let status = ProcessRuntime::new()
            .run(&spec_in(dir.path()), &terminating)
            .unwrap();
        assert_eq!(status, 3);
    }

    #[test]
    fn command_runs_in_work_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        scaffold(dir.path(), "pwd\ntouch made_here.txt\n");
        let terminating = AtomicBool::new(false);
        ProcessRuntime::new()
            .run(&spec_in(dir.path()), &terminating)
            .unwrap();
        assert!(dir.path().join("work").join("made_here.txt").exists());
    }

    #[test]
    fn termination_kills_subprocess() {
        let dir = tempfile::TempDir::new().unwrap();
        scaffold(dir.path(), "sleep 30\n");
        let terminating = std::sync::Arc::new(AtomicBool::new(false));
        let spec = spec_in(dir.path());
        let t2 = std::sync::Arc::clone(&terminating);
        let handle = std::thread::spawn(move || ProcessRuntime::new().run(&spec, &t2));
        std::thread::sleep(Duration::from_millis(200));
        terminating.store(true, Ordering::SeqCst);
        match handle.join().unwrap() {
            Err(RuntimeError::Terminated) => {}
            other => panic!("expected Terminated, got {:?}", other),
        }
    }
}
