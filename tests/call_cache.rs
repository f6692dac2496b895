//! Call cache behavior observed end-to-end: a second identical run must
//! not reach the container backend, and edits to the task definition or
//! inputs must invalidate prior entries.

use sluice::runtime::config::{CallCacheConfig, Config, DownloadCacheConfig};
use sluice::runtime::container::{ContainerRuntime, ContainerSpec, ProcessRuntime};
use sluice::runtime::{CallCache, ResourceScheduler, RunContext, RuntimeResult};
use sluice::{inputs_from_json, parse_and_check, Bindings, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Delegates to the process backend while counting invocations.
struct CountingBackend {
    inner: ProcessRuntime,
    runs: Arc<AtomicUsize>,
}

impl ContainerRuntime for CountingBackend {
    fn detect_resource_limits(&self) -> RuntimeResult<(u32, u64)> {
        self.inner.detect_resource_limits()
    }

    fn maps_paths(&self) -> bool {
        self.inner.maps_paths()
    }

    fn run(&self, spec: &ContainerSpec, terminating: &AtomicBool) -> RuntimeResult<i32> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.run(spec, terminating)
    }
}

fn counting_context(dir: &tempfile::TempDir) -> (RunContext, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let config = Config {
        call_cache: CallCacheConfig {
            enabled: true,
            dir: dir.path().join("call_cache"),
        },
        download_cache: DownloadCacheConfig {
            enabled: false,
            dir: dir.path().join("dl"),
            allow_prefix: vec![],
            deny_prefix: vec![],
            disregard_query: false,
        },
        ..Config::default()
    };
    let ctx = RunContext {
        cache: Arc::new(CallCache::new(
            config.call_cache.clone(),
            config.download_cache.clone(),
        )),
        config: Arc::new(config),
        backend: Arc::new(CountingBackend {
            inner: ProcessRuntime::new(),
            runs: Arc::clone(&runs),
        }),
        scheduler: ResourceScheduler::new(2, 1 << 30),
        terminating: Arc::new(AtomicBool::new(false)),
        hooks: Arc::new(Vec::new()),
    };
    (ctx, runs)
}

const HELLO: &str = r#"version 1.0
task hello {
    input { String who }
    command { echo "Hello, ~{who}!" }
    output { String out = read_string(stdout()) }
}"#;

fn hello_inputs(who: &str) -> Bindings<Value> {
    inputs_from_json(
        &serde_json::json!({ "who": who }),
        "hello",
        &parse_and_check(HELLO, "h.wdl", true)
            .unwrap()
            .task("hello")
            .unwrap()
            .available_inputs(),
    )
    .unwrap()
}

#[test]
fn second_identical_run_skips_backend() {
    let dir = tempfile::TempDir::new().unwrap();
    let (ctx, runs) = counting_context(&dir);
    let doc = parse_and_check(HELLO, "h.wdl", true).unwrap();
    let task = doc.task("hello").unwrap();

    let (_d1, out1) = ctx
        .run_task(task, hello_inputs("Alyssa"), &dir.path().join("runs"))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let (_d2, out2) = ctx
        .run_task(task, hello_inputs("Alyssa"), &dir.path().join("runs"))
        .unwrap();
    // backend not invoked again; outputs identical
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        out1.resolve("out").unwrap().as_string(),
        out2.resolve("out").unwrap().as_string(),
    );
}

#[test]
fn different_inputs_miss() {
    let dir = tempfile::TempDir::new().unwrap();
    let (ctx, runs) = counting_context(&dir);
    let doc = parse_and_check(HELLO, "h.wdl", true).unwrap();
    let task = doc.task("hello").unwrap();

    ctx.run_task(task, hello_inputs("Alyssa"), &dir.path().join("runs"))
        .unwrap();
    ctx.run_task(task, hello_inputs("Ben"), &dir.path().join("runs"))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn edited_command_invalidates() {
    let dir = tempfile::TempDir::new().unwrap();
    let (ctx, runs) = counting_context(&dir);
    let doc = parse_and_check(HELLO, "h.wdl", true).unwrap();
    ctx.run_task(
        doc.task("hello").unwrap(),
        hello_inputs("Alyssa"),
        &dir.path().join("runs"),
    )
    .unwrap();

    let edited_src = HELLO.replace("Hello,", "Howdy,");
    let edited = parse_and_check(&edited_src, "h.wdl", true).unwrap();
    let (_d, out) = ctx
        .run_task(
            edited.task("hello").unwrap(),
            hello_inputs("Alyssa"),
            &dir.path().join("runs"),
        )
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(
        out.resolve("out").unwrap().as_string(),
        Some("Howdy, Alyssa!")
    );
}

#[test]
fn cached_workflow_calls() {
    let dir = tempfile::TempDir::new().unwrap();
    let (ctx, runs) = counting_context(&dir);
    let source = r#"version 1.0
        task double {
            input { Int n }
            command { echo $(( ~{n} * 2 )) }
            output { Int m = read_int(stdout()) }
        }
        workflow w {
            input { Array[Int] ns }
            scatter (n in ns) {
                call double { input: n = n }
            }
            output { Array[Int] ms = double.m }
        }"#;
    let doc = parse_and_check(source, "w.wdl", true).unwrap();
    let wf = doc.workflow.as_ref().unwrap();
    let inputs = inputs_from_json(
        &serde_json::json!({"ns": [1, 2]}),
        "w",
        &wf.available_inputs(),
    )
    .unwrap();
    let (_d, outputs) = ctx
        .run_workflow(&doc, wf, inputs.clone(), &dir.path().join("runs"))
        .unwrap();
    let ms: Vec<i64> = outputs
        .resolve("ms")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_int().unwrap())
        .collect();
    assert_eq!(ms, vec![2, 4]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // a full re-run is entirely cache-served
    let (_d2, outputs2) = ctx
        .run_workflow(&doc, wf, inputs, &dir.path().join("runs"))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let ms2: Vec<i64> = outputs2
        .resolve("ms")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_int().unwrap())
        .collect();
    assert_eq!(ms2, ms);
}
