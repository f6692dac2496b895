//! Local execution runtime: configuration, container backends, the
//! resource scheduler, call/download caches, the workflow state machine and
//! driver, and the task runner.

pub mod cache;
pub mod config;
pub mod container;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod plan;
pub mod resources;
pub mod task;
pub mod workflow;

pub use cache::CallCache;
pub use config::{Config, ContainerBackend};
pub use container::{create_backend, ContainerRuntime};
pub use error::{RuntimeError, RuntimeResult};
pub use plan::Plan;
pub use resources::ResourceScheduler;
pub use task::{run_task, TaskHook};
pub use workflow::{run_workflow, CallNow, StateMachine};

use crate::env::Bindings;
use crate::error::WdlError;
use crate::tree::{Document, Task, Workflow};
use crate::types::Type;
use crate::value::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

/// Shared context threaded through workflow and task execution.
pub struct RunContext {
    pub config: Arc<Config>,
    pub backend: Arc<dyn ContainerRuntime>,
    pub scheduler: Arc<ResourceScheduler>,
    pub cache: Arc<CallCache>,
    pub terminating: Arc<AtomicBool>,
    /// Task lifecycle extensions, called in order around every task run.
    pub hooks: Arc<Vec<Box<dyn task::TaskHook>>>,
}

impl RunContext {
    /// Build a context from configuration: instantiate the backend, size
    /// the resource pool (config overrides, else backend detection), and
    /// open the caches.
    pub fn new(config: Config) -> RuntimeResult<Self> {
        let backend = create_backend(&config)?;
        backend.global_init(&config)?;
        let (detected_cpu, detected_memory) = backend.detect_resource_limits()?;
        let cpu = config.scheduler.host_cpu.unwrap_or(detected_cpu);
        let memory = config.scheduler.host_memory_bytes.unwrap_or(detected_memory);
        let scheduler = ResourceScheduler::new(cpu, memory);
        let cache = Arc::new(CallCache::new(
            config.call_cache.clone(),
            config.download_cache.clone(),
        ));
        Ok(RunContext {
            config: Arc::new(config),
            backend,
            scheduler,
            cache,
            terminating: Arc::new(AtomicBool::new(false)),
            hooks: Arc::new(Vec::new()),
        })
    }

    /// Run a workflow in a freshly provisioned run directory under
    /// `parent_dir`, returning `(run_dir, outputs)`.
    pub fn run_workflow(
        &self,
        doc: &Document,
        wf: &Workflow,
        inputs: Bindings<Value>,
        parent_dir: &Path,
    ) -> RuntimeResult<(PathBuf, Bindings<Value>)> {
        let (run_id, run_dir) = fs_utils::provision_run_dir(parent_dir, &wf.name)?;
        let outputs = workflow::run_workflow(self, doc, wf, inputs, &run_id, &run_dir)?;
        Ok((run_dir, outputs))
    }

    /// Run a single task in a freshly provisioned run directory.
    pub fn run_task(
        &self,
        task: &Task,
        inputs: Bindings<Value>,
        parent_dir: &Path,
    ) -> RuntimeResult<(PathBuf, Bindings<Value>)> {
        let (run_id, run_dir) = fs_utils::provision_run_dir(parent_dir, &task.name)?;
        let outputs = task::run_task(self, task, inputs, &run_id, &run_dir)?;
        Ok((run_dir, outputs))
    }
}

/// Serialize an environment to a JSON object, preserving binding order.
pub fn env_to_json(env: &Bindings<Value>) -> serde_json::Value {
    let mut entries: Vec<(&str, serde_json::Value)> =
        env.iter().map(|b| (b.name(), b.value().to_json())).collect();
    entries.reverse();
    let obj: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    serde_json::Value::Object(obj)
}

/// Rehydrate an environment from a JSON object against known binding types.
/// Absent optional bindings come back null; absent required bindings are an
/// error; unknown keys are ignored.
pub fn env_from_json(
    json: &serde_json::Value,
    types: &Bindings<Type>,
) -> Result<Bindings<Value>, WdlError> {
    let obj = json
        .as_object()
        .ok_or_else(|| WdlError::input("expected a JSON object"))?;
    let mut out = Bindings::new();
    for b in types.iter().collect::<Vec<_>>().into_iter().rev() {
        match obj.get(b.name()) {
            Some(j) => {
                let v = Value::from_json_typed(b.value(), j.clone())?;
                out = out.bind(b.name().to_string(), v, None);
            }
            None if b.value().is_optional() => {
                out = out.bind(b.name().to_string(), Value::null(), None);
            }
            None => {
                return Err(WdlError::input(format!("missing value for {}", b.name())))
            }
        }
    }
    Ok(out)
}

/// Arrange for SIGTERM/SIGINT/SIGHUP/SIGQUIT to set the termination flag,
/// which every blocking wait in the runtime polls.
pub fn install_signal_handlers(flag: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(error = %e, "cannot install signal handlers");
                    return;
                }
            };
            rt.block_on(async move {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
                let mut sigint = signal(SignalKind::interrupt()).expect("sigint handler");
                let mut sighup = signal(SignalKind::hangup()).expect("sighup handler");
                let mut sigquit = signal(SignalKind::quit()).expect("sigquit handler");
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                    _ = sighup.recv() => {}
                    _ = sigquit.recv() => {}
                }
                warn!("termination signal received; cancelling run");
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            });
        })
        .expect("spawning signal listener");
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_json_round_trip() {
        let env = Bindings::new()
            .bind("a".to_string(), Value::int(1), None)
            .bind("b".to_string(), Value::string("x"), None);
        let json = env_to_json(&env);
        assert_eq!(json["a"], serde_json::json!(1));
        assert_eq!(json["b"], serde_json::json!("x"));
        // binding order preserved in the object
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);

        let types = Bindings::new()
            .bind("a".to_string(), Type::int(false), None)
            .bind("b".to_string(), Type::string(false), None);
        let back = env_from_json(&json, &types).unwrap();
        assert_eq!(back.resolve("a").unwrap().as_int(), Some(1));
    }

    #[test]
    fn env_from_json_handles_optionals() {
        let types = Bindings::new()
            .bind("req".to_string(), Type::int(false), None)
            .bind("opt".to_string(), Type::int(true), None);
        let ok = env_from_json(&serde_json::json!({"req": 3}), &types).unwrap();
        assert!(ok.resolve("opt").unwrap().is_null());
        assert!(env_from_json(&serde_json::json!({"opt": 1}), &types).is_err());
    }
}
