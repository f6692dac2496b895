//! Docker backend over the bollard API client.
//!
//! The task runner is synchronous; this backend owns a small tokio runtime
//! and blocks on it for each operation. Image pulls are serialized under a
//! process-wide mutex so concurrent tasks do not race to download the same
//! layers.

use super::{ContainerRuntime, ContainerSpec, COMMAND_SHELL};
use crate::runtime::config::Config;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use bollard::container::{
    Config as CreateConfig, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Mount as DockerMount, MountTypeEnum};
use bollard::Docker;
use futures_util::stream::StreamExt;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

static IMAGE_PULL_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct DockerRuntime {
    rt: tokio::runtime::Runtime,
}

impl DockerRuntime {
    pub fn new() -> RuntimeResult<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RuntimeError::io("starting tokio runtime for docker", e))?;
        Ok(Self { rt })
    }

    fn connect() -> RuntimeResult<Docker> {
        Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::container(format!("cannot connect to Docker daemon: {}", e)))
    }

    async fn ensure_image(client: &Docker, image: &str) -> RuntimeResult<()> {
        if client.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        // serialize pulls so only one task downloads a given image
        let _guard = IMAGE_PULL_MUTEX.lock().unwrap();
        if client.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!(image, "pulling container image");
        let mut stream = client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| {
                RuntimeError::container(format!("pulling image {}: {}", image, e))
            })?;
        }
        Ok(())
    }

    async fn run_async(
        client: &Docker,
        spec: &ContainerSpec,
        terminating: &AtomicBool,
    ) -> RuntimeResult<i32> {
        Self::ensure_image(client, &spec.image).await?;

        let mounts: Vec<DockerMount> = spec
            .mounts
            .iter()
            .map(|m| DockerMount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(m.host.to_string_lossy().to_string()),
                target: Some(m.container.to_string_lossy().to_string()),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            nano_cpus: Some(spec.cpu_limit as i64 * 1_000_000_000),
            memory_reservation: Some(spec.memory_limit as i64),
            ..Default::default()
        };

        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let create = CreateConfig {
            image: Some(spec.image.clone()),
            cmd: Some(vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                COMMAND_SHELL.to_string(),
            ]),
            working_dir: Some(spec.work_dir.to_string_lossy().to_string()),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("sluice_{}", spec.run_id.replace(['/', ':', ' '], "_"));
        let created = client
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                create,
            )
            .await
            .map_err(|e| RuntimeError::container(format!("creating container: {}", e)))?;
        let id = created.id;
        debug!(container = %id, image = %spec.image, "created container");

        let result = Self::drive_container(client, &id, spec, terminating).await;

        let _ = client
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;
        result
    }

    async fn drive_container(
        client: &Docker,
        id: &str,
        spec: &ContainerSpec,
        terminating: &AtomicBool,
    ) -> RuntimeResult<i32> {
        client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::container(format!("starting container: {}", e)))?;
        info!(container = %id, run_id = %spec.run_id, "container started");

        // poll for exit, honoring the termination flag
        loop {
            if terminating.load(Ordering::SeqCst) {
                warn!(container = %id, "stopping container on termination signal");
                let _ = client.stop_container(id, None).await;
                return Err(RuntimeError::Terminated);
            }
            let state = client
                .inspect_container(id, None)
                .await
                .map_err(|e| RuntimeError::container(format!("inspecting container: {}", e)))?
                .state;
            match state {
                Some(state) if state.running == Some(false) => {
                    let code = state.exit_code.unwrap_or(-1) as i32;
                    Self::log_stderr_tail(client, id).await;
                    debug!(container = %id, exit_status = code, "container exited");
                    return Ok(code);
                }
                Some(_) => tokio::time::sleep(Duration::from_millis(500)).await,
                None => {
                    return Err(RuntimeError::Interrupted {
                        message: "container state disappeared".to_string(),
                    })
                }
            }
        }
    }

    async fn log_stderr_tail(client: &Docker, id: &str) {
        let mut logs = client.logs::<String>(
            id,
            Some(LogsOptions {
                stderr: true,
                stdout: false,
                tail: "20".to_string(),
                ..Default::default()
            }),
        );
        while let Some(Ok(chunk)) = logs.next().await {
            let text = String::from_utf8_lossy(&chunk.into_bytes()).trim_end().to_string();
            if !text.is_empty() {
                debug!(container = %id, "stderr: {}", text);
            }
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    fn global_init(&self, _config: &Config) -> RuntimeResult<()> {
        self.rt.block_on(async {
            let client = Self::connect()?;
            client
                .ping()
                .await
                .map_err(|e| RuntimeError::container(format!("Docker ping failed: {}", e)))?;
            Ok(())
        })
    }

    fn detect_resource_limits(&self) -> RuntimeResult<(u32, u64)> {
        self.rt.block_on(async {
            let client = Self::connect()?;
            let info = client
                .info()
                .await
                .map_err(|e| RuntimeError::container(format!("Docker info failed: {}", e)))?;
            let cpu = info.ncpu.unwrap_or(1).max(1) as u32;
            let memory = info.mem_total.unwrap_or(1 << 30).max(1) as u64;
            Ok((cpu, memory))
        })
    }

    fn maps_paths(&self) -> bool {
        true
    }

    fn run(&self, spec: &ContainerSpec, terminating: &AtomicBool) -> RuntimeResult<i32> {
        self.rt.block_on(async {
            let client = Self::connect()?;
            Self::run_async(&client, spec, terminating).await
        })
    }
}
