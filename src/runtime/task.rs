//! Task execution: provision the sandbox directory, map input files into
//! the container, evaluate inputs and the command template, dispatch the
//! container backend, and bind declared outputs back to host paths.
//!
//! Each attempt gets `work/` (`work2/`, `work3/`, ... on retry),
//! `stdout.txt`/`stderr.txt` captures, and the rendered `command` script
//! inside the task's host directory. Input files are grouped by host parent
//! directory and mounted read-only under `work/_sluice_inputs/<n>/`;
//! `write_*` products join the same map. Output evaluation translates
//! container paths back to host paths, rejecting anything outside the
//! working directory that is not a declared input.

use super::cache::{input_digest, task_digest};
use super::container::{ContainerSpec, Mount, CONTAINER_TASK_DIR};
use super::download;
use super::error::{RuntimeError, RuntimeResult};
use super::fs_utils::{contained_in, has_uplevels, write_atomic};
use super::RunContext;
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::Expression;
use crate::stdlib::{FileAccess, StdLib};
use crate::tree::{Declaration, Task};
use crate::types::Type;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Extension points invoked around each task run, in registration order:
/// after inputs are bound, after the command renders, and after outputs are
/// collected. A hook error fails the task.
#[allow(unused_variables)]
pub trait TaskHook: Send + Sync {
    fn pre_inputs(&self, task: &Task, inputs: &Bindings<Value>) -> RuntimeResult<()> {
        Ok(())
    }

    fn pre_command(&self, task: &Task, command: &str) -> RuntimeResult<()> {
        Ok(())
    }

    fn post_outputs(&self, task: &Task, outputs: &Bindings<Value>) -> RuntimeResult<()> {
        Ok(())
    }
}

/// Host→container mapping for every file and directory the task may read.
#[derive(Debug)]
pub struct InputPathMap {
    /// False for backends executing directly on the host (identity paths).
    maps: bool,
    container_work: PathBuf,
    host_to_container: IndexMap<PathBuf, PathBuf>,
    group_of_dir: IndexMap<PathBuf, usize>,
    next_group: usize,
}

impl InputPathMap {
    fn new(maps: bool, container_work: PathBuf) -> Self {
        Self {
            maps,
            container_work,
            host_to_container: IndexMap::new(),
            group_of_dir: IndexMap::new(),
            next_group: 0,
        }
    }

    /// Register a host path, returning the path the task sees.
    pub fn add(&mut self, host: &Path) -> PathBuf {
        if let Some(c) = self.host_to_container.get(host) {
            return c.clone();
        }
        if !self.maps {
            self.host_to_container
                .insert(host.to_path_buf(), host.to_path_buf());
            return host.to_path_buf();
        }
        let parent = host.parent().unwrap_or(Path::new("/")).to_path_buf();
        let group = match self.group_of_dir.get(&parent) {
            Some(g) => *g,
            None => {
                let g = self.next_group;
                self.next_group += 1;
                self.group_of_dir.insert(parent, g);
                g
            }
        };
        let basename = host.file_name().unwrap_or_default();
        let container = self
            .container_work
            .join("_sluice_inputs")
            .join(group.to_string())
            .join(basename);
        self.host_to_container
            .insert(host.to_path_buf(), container.clone());
        container
    }

    /// Reverse-map a task-visible path to its host path.
    pub fn host_for(&self, seen: &str) -> Option<PathBuf> {
        let seen = Path::new(seen);
        self.host_to_container
            .iter()
            .find(|(_, c)| c.as_path() == seen)
            .map(|(h, _)| h.clone())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &PathBuf)> {
        self.host_to_container.iter()
    }
}

/// Input-evaluation file policy: only mapped input files are readable, and
/// `write_*` products register themselves into the map.
struct InputAccess {
    map: Arc<Mutex<InputPathMap>>,
}

impl FileAccess for InputAccess {
    fn readable_path(&self, pos: &SourcePosition, path: &str) -> Result<PathBuf, WdlError> {
        self.map.lock().unwrap().host_for(path).ok_or_else(|| {
            WdlError::eval(
                pos.clone(),
                format!("file {} is not among the task inputs", path),
            )
        })
    }

    fn register_written(
        &self,
        _pos: &SourcePosition,
        host_path: &Path,
    ) -> Result<String, WdlError> {
        let container = self.map.lock().unwrap().add(host_path);
        Ok(container.to_string_lossy().to_string())
    }

    fn glob(&self, pos: &SourcePosition, _pattern: &str) -> Result<Vec<String>, WdlError> {
        Err(WdlError::eval(
            pos.clone(),
            "glob() is only available in task output evaluation",
        ))
    }

    fn size(&self, pos: &SourcePosition, path: &str) -> Result<u64, WdlError> {
        let host = self.readable_path(pos, path)?;
        std::fs::metadata(&host)
            .map(|m| m.len())
            .map_err(|e| WdlError::eval(pos.clone(), format!("size({}): {}", path, e)))
    }
}

/// Output-evaluation file policy: the finished working directory, the
/// captured streams, and the input map are all readable; `glob` patterns
/// expand relative to the working directory.
struct OutputAccess {
    resolver: Arc<OutputResolver>,
}

/// Translates task-visible paths back to host paths after the command has
/// run.
pub struct OutputResolver {
    maps: bool,
    host_dir: PathBuf,
    host_work: PathBuf,
    container_work: PathBuf,
    stdout_name: String,
    stderr_name: String,
    map: Arc<Mutex<InputPathMap>>,
}

impl OutputResolver {
    /// The path value `stdout()` yields during output evaluation. Inside a
    /// container the capture is always mounted as `stdout.txt`, whatever
    /// the attempt-suffixed host file is named.
    fn stdout_path(&self) -> String {
        if self.maps {
            format!("{}/stdout.txt", CONTAINER_TASK_DIR)
        } else {
            self.host_dir.join(&self.stdout_name).to_string_lossy().to_string()
        }
    }

    fn stderr_path(&self) -> String {
        if self.maps {
            format!("{}/stderr.txt", CONTAINER_TASK_DIR)
        } else {
            self.host_dir.join(&self.stderr_name).to_string_lossy().to_string()
        }
    }

    /// Host path for a task-visible path, with sandbox containment checks.
    pub fn to_host(&self, seen: &str) -> Result<PathBuf, RuntimeError> {
        if has_uplevels(seen) {
            return Err(RuntimeError::output(format!(
                "output path uses .. uplevels: {}",
                seen
            )));
        }
        // captured streams
        if seen == self.stdout_path() {
            return Ok(self.host_dir.join(&self.stdout_name));
        }
        if seen == self.stderr_path() {
            return Ok(self.host_dir.join(&self.stderr_name));
        }
        // input files (incl. write_ products)
        if let Some(host) = self.map.lock().unwrap().host_for(seen) {
            return Ok(host);
        }
        let candidate = if Path::new(seen).is_absolute() {
            let work_prefix = if self.maps {
                self.container_work.clone()
            } else {
                self.host_work.clone()
            };
            match Path::new(seen).strip_prefix(&work_prefix) {
                Ok(rel) => self.host_work.join(rel),
                Err(_) => {
                    return Err(RuntimeError::output(format!(
                        "output path is outside the task working directory: {}",
                        seen
                    )))
                }
            }
        } else {
            self.host_work.join(seen)
        };
        if !candidate.exists() {
            return Err(RuntimeError::output(format!(
                "declared output file not found: {}",
                seen
            )));
        }
        if !contained_in(&self.host_work, &candidate) {
            return Err(RuntimeError::output(format!(
                "output path escapes the task working directory (symlink?): {}",
                seen
            )));
        }
        Ok(candidate)
    }
}

impl FileAccess for OutputAccess {
    fn readable_path(&self, pos: &SourcePosition, path: &str) -> Result<PathBuf, WdlError> {
        self.resolver
            .to_host(path)
            .map_err(|e| WdlError::eval(pos.clone(), e.to_string()))
    }

    fn register_written(
        &self,
        _pos: &SourcePosition,
        host_path: &Path,
    ) -> Result<String, WdlError> {
        let container = self.resolver.map.lock().unwrap().add(host_path);
        Ok(container.to_string_lossy().to_string())
    }

    fn stdout(&self, _pos: &SourcePosition) -> Result<String, WdlError> {
        Ok(self.resolver.stdout_path())
    }

    fn stderr(&self, _pos: &SourcePosition) -> Result<String, WdlError> {
        Ok(self.resolver.stderr_path())
    }

    fn glob(&self, pos: &SourcePosition, pattern: &str) -> Result<Vec<String>, WdlError> {
        let full = self.resolver.host_work.join(pattern);
        let matches = glob::glob(&full.to_string_lossy())
            .map_err(|e| WdlError::eval(pos.clone(), format!("bad glob pattern: {}", e)))?;
        let mut out = Vec::new();
        for m in matches {
            let host = m.map_err(|e| WdlError::eval(pos.clone(), format!("glob: {}", e)))?;
            if !host.is_file() {
                continue;
            }
            let rel = host
                .strip_prefix(&self.resolver.host_work)
                .unwrap_or(&host)
                .to_path_buf();
            let seen = if self.resolver.maps {
                self.resolver.container_work.join(rel)
            } else {
                host.clone()
            };
            out.push(seen.to_string_lossy().to_string());
        }
        Ok(out)
    }

    fn size(&self, pos: &SourcePosition, path: &str) -> Result<u64, WdlError> {
        let host = self.readable_path(pos, path)?;
        std::fs::metadata(&host)
            .map(|m| m.len())
            .map_err(|e| WdlError::eval(pos.clone(), format!("size({}): {}", path, e)))
    }
}

/// Normalized task runtime requirements.
#[derive(Debug, Clone)]
pub struct RuntimeAttrs {
    pub image: String,
    pub cpu: u32,
    pub memory_bytes: u64,
    pub max_retries: u32,
    pub return_codes: ReturnCodes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnCodes {
    Any,
    Codes(HashSet<i64>),
}

impl ReturnCodes {
    pub fn accepts(&self, code: i64) -> bool {
        match self {
            ReturnCodes::Any => true,
            ReturnCodes::Codes(set) => set.contains(&code),
        }
    }
}

/// Parse a memory quantity: integer bytes or `"4 GB"`, `"100M"`, `"1 GiB"`.
pub fn parse_memory(value: &Value) -> RuntimeResult<u64> {
    if let Some(n) = value.as_int() {
        return Ok(n.max(0) as u64);
    }
    let text = value
        .as_string()
        .ok_or_else(|| RuntimeError::input(format!("unusable memory specification {}", value)))?
        .trim()
        .to_string();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let quantity: f64 = number
        .trim()
        .parse()
        .map_err(|_| RuntimeError::input(format!("unusable memory specification {:?}", text)))?;
    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => 1e3,
        "M" | "MB" => 1e6,
        "G" | "GB" => 1e9,
        "T" | "TB" => 1e12,
        "KI" | "KIB" => 1024.0,
        "MI" | "MIB" => 1048576.0,
        "GI" | "GIB" => 1073741824.0,
        "TI" | "TIB" => 1099511627776.0,
        other => {
            return Err(RuntimeError::input(format!(
                "unknown memory unit {:?} in {:?}",
                other, text
            )))
        }
    };
    Ok((quantity * multiplier) as u64)
}

/// Evaluate and normalize the task's runtime section.
pub fn evaluate_runtime(
    task: &Task,
    env: &Bindings<Value>,
    stdlib: &StdLib,
    ctx: &RunContext,
) -> RuntimeResult<RuntimeAttrs> {
    let mut attrs = RuntimeAttrs {
        image: ctx.config.container.default_image.clone(),
        cpu: 1,
        memory_bytes: 0,
        max_retries: ctx.config.task.default_max_retries,
        return_codes: ReturnCodes::Codes([0].into_iter().collect()),
    };
    for (key, expr) in &task.runtime {
        let value = expr.eval(env, stdlib).map_err(RuntimeError::Language)?;
        match key.as_str() {
            "docker" | "container" => {
                // may be a single image or an array of acceptable images
                attrs.image = match value.as_array() {
                    Some(items) if !items.is_empty() => items[0]
                        .coerce(&Type::string(false))
                        .map_err(RuntimeError::Language)?
                        .as_string()
                        .unwrap()
                        .to_string(),
                    _ => value
                        .coerce(&Type::string(false))
                        .map_err(RuntimeError::Language)?
                        .as_string()
                        .unwrap()
                        .to_string(),
                };
            }
            "cpu" => {
                let n = value
                    .as_int()
                    .or_else(|| value.as_float().map(|f| f.ceil() as i64))
                    .or_else(|| {
                        value
                            .as_string()
                            .and_then(|s| s.trim().parse::<i64>().ok())
                    })
                    .ok_or_else(|| {
                        RuntimeError::input(format!("unusable cpu specification {}", value))
                    })?;
                attrs.cpu = n.clamp(1, u32::MAX as i64) as u32;
            }
            "memory" => attrs.memory_bytes = parse_memory(&value)?,
            "maxRetries" | "max_retries" | "preemptible" => {
                if key != "preemptible" {
                    attrs.max_retries = value.as_int().unwrap_or(0).max(0) as u32;
                }
            }
            "returnCodes" | "return_codes" => {
                attrs.return_codes = if value.as_string() == Some("*") {
                    ReturnCodes::Any
                } else if let Some(items) = value.as_array() {
                    ReturnCodes::Codes(items.iter().filter_map(|v| v.as_int()).collect())
                } else {
                    ReturnCodes::Codes(value.as_int().into_iter().collect())
                };
            }
            _ => debug!(key, "ignoring unrecognized runtime attribute"),
        }
    }
    Ok(attrs)
}

/// Strip the minimum common leading whitespace from the command's non-blank
/// lines.
pub fn dedent_command(command: &str) -> String {
    let lines: Vec<&str> = command.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out: Vec<String> = lines
        .iter()
        .map(|l| if l.len() >= indent { l[indent..].to_string() } else { l.trim_start().to_string() })
        .collect();
    while out.first().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.remove(0);
    }
    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

/// Evaluate task declarations (inputs plus private decls) into a value
/// environment, honoring supplied input values and defaults, in dependency
/// order.
fn evaluate_decl_env(
    decls: &[&Declaration],
    given: &Bindings<Value>,
    stdlib: &StdLib,
) -> RuntimeResult<Bindings<Value>> {
    let mut env = Bindings::new();
    let mut pending: Vec<&Declaration> = decls.to_vec();
    let decl_names: HashSet<&str> = decls.iter().map(|d| d.name.as_str()).collect();
    for _round in 0..=decls.len() {
        let mut progressed = false;
        let mut still: Vec<&Declaration> = Vec::new();
        for d in pending {
            // supplied value wins over any default expression
            if let Some(v) = given.resolve(&d.name) {
                let v = v.coerce(&d.decl_type).map_err(RuntimeError::Language)?;
                env = env.bind(d.name.clone(), v, None);
                progressed = true;
                continue;
            }
            let ready = match &d.expr {
                Some(expr) => {
                    let mut refs = Vec::new();
                    expr.referenced_names(&mut refs);
                    refs.iter().all(|r| {
                        let first = r.split('.').next().unwrap_or(r);
                        !decl_names.contains(first) || env.has_binding(first)
                    })
                }
                None => true,
            };
            if !ready {
                still.push(d);
                continue;
            }
            let value = match &d.expr {
                Some(expr) => expr
                    .eval(&env, stdlib)
                    .and_then(|v| v.coerce(&d.decl_type))
                    .map_err(RuntimeError::Language)?,
                None if d.decl_type.is_optional() => Value::null(),
                None => {
                    return Err(RuntimeError::input(format!(
                        "missing required task input {}",
                        d.name
                    )))
                }
            };
            env = env.bind(d.name.clone(), value, None);
            progressed = true;
        }
        pending = still;
        if pending.is_empty() {
            return Ok(env);
        }
        if !progressed {
            break;
        }
    }
    Err(RuntimeError::Language(WdlError::runtime(
        "task declarations could not be ordered (internal)",
    )))
}

/// Run one task to completion (including retries), returning its outputs
/// with `File`/`Directory` values as host paths.
pub fn run_task(
    ctx: &RunContext,
    task: &Task,
    inputs: Bindings<Value>,
    run_id: &str,
    host_dir: &Path,
) -> RuntimeResult<Bindings<Value>> {
    std::fs::create_dir_all(host_dir)
        .map_err(|e| RuntimeError::io(format!("creating {}", host_dir.display()), e))?;
    info!(task = %task.name, run_id, dir = %host_dir.display(), "task starting");

    // reject unknown input names up front
    let known = task.available_inputs();
    for b in inputs.iter() {
        if !known.has_binding(b.name()) {
            return Err(RuntimeError::input(format!(
                "no such input {} for task {}",
                b.name(),
                task.name
            )));
        }
    }

    // localize any remote File inputs through the download subsystem
    let inputs = download::localize_inputs(ctx, &inputs, host_dir)?;

    for hook in ctx.hooks.iter() {
        hook.pre_inputs(task, &inputs)?;
    }

    // consult the call cache
    let td = task_digest(task);
    let idg = input_digest(&inputs);
    if let Some(outputs) = ctx.cache.get(&td, &idg, &task.effective_outputs()) {
        info!(task = %task.name, run_id, "call cache hit; skipping execution");
        return Ok(outputs);
    }

    write_atomic(
        &host_dir.join("inputs.json"),
        super::env_to_json(&inputs).to_string().as_bytes(),
    )?;

    let mut attrs: Option<RuntimeAttrs> = None;
    let mut attempt: u32 = 1;
    loop {
        match run_attempt(ctx, task, &inputs, run_id, host_dir, attempt, &mut attrs) {
            Ok(outputs) => {
                write_atomic(
                    &host_dir.join("outputs.json"),
                    super::env_to_json(&outputs).to_string().as_bytes(),
                )?;
                ctx.cache.put(&td, &idg, &outputs)?;
                if ctx.config.task.delete_work {
                    let work = host_dir.join(work_name(attempt));
                    let _ = std::fs::remove_dir_all(work);
                }
                info!(task = %task.name, run_id, attempt, "task finished");
                return Ok(outputs);
            }
            Err(e) => {
                let retries_allowed = attrs
                    .as_ref()
                    .map(|a| a.max_retries)
                    .unwrap_or(ctx.config.task.default_max_retries);
                if e.retryable() && attempt <= retries_allowed {
                    warn!(task = %task.name, run_id, attempt, error = %e, "task attempt failed; retrying");
                    attempt += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}

fn work_name(attempt: u32) -> String {
    if attempt <= 1 {
        "work".to_string()
    } else {
        format!("work{}", attempt)
    }
}

fn run_attempt(
    ctx: &RunContext,
    task: &Task,
    inputs: &Bindings<Value>,
    run_id: &str,
    host_dir: &Path,
    attempt: u32,
    attrs_out: &mut Option<RuntimeAttrs>,
) -> RuntimeResult<Bindings<Value>> {
    let maps = ctx.backend.maps_paths();
    let work = work_name(attempt);
    let (stdout_name, stderr_name) = if attempt <= 1 {
        ("stdout.txt".to_string(), "stderr.txt".to_string())
    } else {
        (format!("stdout{}.txt", attempt), format!("stderr{}.txt", attempt))
    };

    let host_work = host_dir.join(&work);
    std::fs::create_dir_all(&host_work)
        .map_err(|e| RuntimeError::io(format!("creating {}", host_work.display()), e))?;

    let container_work = PathBuf::from(CONTAINER_TASK_DIR).join(&work);
    let path_map = Arc::new(Mutex::new(InputPathMap::new(maps, container_work.clone())));

    // register every File/Directory input and rewrite values to the paths
    // the task will see
    let task_inputs = {
        let mut map = path_map.lock().unwrap();
        let mut rewrite = |p: &str, _is_dir: bool| -> Result<String, WdlError> {
            Ok(map.add(Path::new(p)).to_string_lossy().to_string())
        };
        let mut out = Bindings::new();
        for b in inputs.iter().collect::<Vec<_>>().into_iter().rev() {
            out = out.bind(
                b.name().to_string(),
                b.value().map_paths(&mut rewrite)?,
                None,
            );
        }
        out
    };

    // input-flavored stdlib for defaults and the command
    let input_stdlib = StdLib::with_access(
        &task.wdl_version,
        Box::new(InputAccess {
            map: Arc::clone(&path_map),
        }),
        host_dir.join("write_"),
    );

    let decls: Vec<&Declaration> = task
        .inputs
        .iter()
        .flatten()
        .chain(task.postinputs.iter())
        .collect();
    let env = evaluate_decl_env(&decls, &task_inputs, &input_stdlib)?;

    let attrs = evaluate_runtime(task, &env, &input_stdlib, ctx)?;
    *attrs_out = Some(attrs.clone());

    // render and dedent the command script
    let rendered = task
        .command
        .eval(&env, &input_stdlib)
        .map_err(RuntimeError::Language)?;
    let script = dedent_command(rendered.as_string().unwrap_or_default());
    for hook in ctx.hooks.iter() {
        hook.pre_command(task, &script)?;
    }
    std::fs::write(host_dir.join("command"), &script)
        .map_err(|e| RuntimeError::io("writing command script", e))?;
    for name in [&stdout_name, &stderr_name] {
        std::fs::write(host_dir.join(name), "")
            .map_err(|e| RuntimeError::io("creating capture file", e))?;
    }

    // mounts: command ro, captures and work rw, every input ro
    let mut mounts = vec![
        Mount {
            host: host_dir.join("command"),
            container: PathBuf::from(CONTAINER_TASK_DIR).join("command"),
            read_only: true,
        },
        Mount {
            host: host_dir.join(&stdout_name),
            container: PathBuf::from(CONTAINER_TASK_DIR).join("stdout.txt"),
            read_only: false,
        },
        Mount {
            host: host_dir.join(&stderr_name),
            container: PathBuf::from(CONTAINER_TASK_DIR).join("stderr.txt"),
            read_only: false,
        },
        Mount {
            host: host_work.clone(),
            container: container_work.clone(),
            read_only: false,
        },
    ];
    {
        let map = path_map.lock().unwrap();
        for (host, container) in map.entries() {
            if host != container {
                mounts.push(Mount {
                    host: host.clone(),
                    container: container.clone(),
                    read_only: true,
                });
            }
        }
    }

    let claim = ctx
        .scheduler
        .acquire(attrs.cpu, attrs.memory_bytes, &ctx.terminating)?;

    let spec = ContainerSpec {
        run_id: format!("{}-{}", run_id, attempt),
        image: attrs.image.clone(),
        mounts,
        work_dir: container_work.clone(),
        cpu_limit: claim.cpu(),
        memory_limit: claim.memory().max(attrs.memory_bytes),
        env: vec![],
        host_dir: host_dir.to_path_buf(),
        stdout_name: stdout_name.clone(),
        stderr_name: stderr_name.clone(),
    };
    let exit_status = ctx.backend.run(&spec, &ctx.terminating)?;
    drop(claim);

    if !attrs.return_codes.accepts(exit_status as i64) {
        let stderr_tail = read_tail(&host_dir.join(&stderr_name), 1024);
        return Err(RuntimeError::CommandFailed {
            exit_status,
            stderr_tail,
        });
    }

    // evaluate outputs under the output-flavored stdlib
    let resolver = Arc::new(OutputResolver {
        maps,
        host_dir: host_dir.to_path_buf(),
        host_work: host_work.clone(),
        container_work,
        stdout_name,
        stderr_name,
        map: Arc::clone(&path_map),
    });
    let output_stdlib = StdLib::with_access(
        &task.wdl_version,
        Box::new(OutputAccess {
            resolver: Arc::clone(&resolver),
        }),
        host_dir.join("write_"),
    );

    let mut out_env = env;
    let mut outputs = Bindings::new();
    for d in &task.outputs {
        let expr = d.expr.as_ref().ok_or_else(|| {
            RuntimeError::Language(WdlError::validation(
                d.pos.clone(),
                format!("task output {} has no expression", d.name),
            ))
        })?;
        let value = expr
            .eval(&out_env, &output_stdlib)
            .and_then(|v| v.coerce(&d.decl_type))
            .map_err(RuntimeError::Language)?;
        let value = map_output_paths(&value, &resolver)?;
        out_env = out_env.bind(d.name.clone(), value.clone(), None);
        outputs = outputs.bind(d.name.clone(), value, None);
    }
    for hook in ctx.hooks.iter() {
        hook.post_outputs(task, &outputs)?;
    }
    Ok(outputs)
}

/// Rewrite every File/Directory in an output value from task-visible paths
/// to host paths, enforcing sandbox containment.
fn map_output_paths(
    value: &Value,
    resolver: &OutputResolver,
) -> RuntimeResult<Value> {
    let mut failure: Option<RuntimeError> = None;
    let mapped = value.map_paths(&mut |p, _is_dir| match resolver.to_host(p) {
        Ok(host) => Ok(host.to_string_lossy().to_string()),
        Err(e) => {
            let msg = e.to_string();
            failure = Some(e);
            Err(WdlError::runtime(msg))
        }
    });
    match (mapped, failure) {
        (_, Some(e)) => Err(e),
        (Ok(v), None) => Ok(v),
        (Err(e), None) => Err(RuntimeError::Language(e)),
    }
}

fn read_tail(path: &Path, max_bytes: usize) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(max_bytes);
            String::from_utf8_lossy(&bytes[start..]).to_string()
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_and_check;
    use crate::runtime::test_support::test_context;

    fn get_task(source: &str, name: &str) -> Task {
        let doc = parse_and_check(source, "t.wdl", true).unwrap();
        doc.task(name).unwrap().clone()
    }

    #[test]
    fn dedent() {
        let s = "\n        echo a\n          echo b\n        ";
        assert_eq!(dedent_command(s), "echo a\n  echo b");
        assert_eq!(dedent_command("echo x"), "echo x");
    }

    #[test]
    fn memory_parsing() {
        assert_eq!(parse_memory(&Value::string("4 GB")).unwrap(), 4_000_000_000);
        assert_eq!(parse_memory(&Value::string("100M")).unwrap(), 100_000_000);
        assert_eq!(parse_memory(&Value::string("1 GiB")).unwrap(), 1_073_741_824);
        assert_eq!(parse_memory(&Value::int(2048)).unwrap(), 2048);
        assert!(parse_memory(&Value::string("fourscore")).is_err());
    }

    #[test]
    fn return_codes() {
        let any = ReturnCodes::Any;
        assert!(any.accepts(7));
        let only0: ReturnCodes = ReturnCodes::Codes([0].into_iter().collect());
        assert!(only0.accepts(0));
        assert!(!only0.accepts(1));
    }

    #[test]
    fn path_map_groups_by_parent() {
        let mut m = InputPathMap::new(true, PathBuf::from("/c/work"));
        let a = m.add(Path::new("/data/a/ref.fa"));
        let b = m.add(Path::new("/data/a/ref.fa.fai"));
        let c = m.add(Path::new("/data/b/ref.fa"));
        assert_eq!(a, PathBuf::from("/c/work/_sluice_inputs/0/ref.fa"));
        assert_eq!(b, PathBuf::from("/c/work/_sluice_inputs/0/ref.fa.fai"));
        // same basename in a different host dir lands in a fresh group
        assert_eq!(c, PathBuf::from("/c/work/_sluice_inputs/1/ref.fa"));
        assert_eq!(m.host_for("/c/work/_sluice_inputs/1/ref.fa").unwrap(), PathBuf::from("/data/b/ref.fa"));
    }

    #[test]
    fn identity_map_when_not_containerized() {
        let mut m = InputPathMap::new(false, PathBuf::from("/unused"));
        let p = m.add(Path::new("/data/x.txt"));
        assert_eq!(p, PathBuf::from("/data/x.txt"));
        assert!(m.host_for("/data/x.txt").is_some());
        assert!(m.host_for("/data/other.txt").is_none());
    }

    #[test]
    fn hello_task_end_to_end() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task hello {
                input { String who }
                command { echo "Hello, ~{who}!" }
                output { String out = read_string(stdout()) }
            }"#,
            "hello",
        );
        let inputs = Bindings::new().bind("who".to_string(), Value::string("Alyssa"), None);
        let outputs = run_task(&ctx, &task, inputs, "hello-1", &dir.path().join("run")).unwrap();
        assert_eq!(
            outputs.resolve("out").unwrap().as_string(),
            Some("Hello, Alyssa!")
        );
    }

    #[test]
    fn command_failure_and_retry_exhaustion() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task fail {
                command { exit 9 }
                output {}
            }"#,
            "fail",
        );
        match run_task(&ctx, &task, Bindings::new(), "fail-1", &dir.path().join("run")) {
            Err(RuntimeError::CommandFailed { exit_status, .. }) => assert_eq!(exit_status, 9),
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn accepted_return_codes() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task flaky {
                command { exit 3 }
                runtime { returnCodes: [0, 3] }
                output { String status = "done" }
            }"#,
            "flaky",
        );
        let outputs = run_task(&ctx, &task, Bindings::new(), "flaky-1", &dir.path().join("run")).unwrap();
        assert_eq!(outputs.resolve("status").unwrap().as_string(), Some("done"));
    }

    #[test]
    fn file_outputs_resolve_to_work_dir() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task maker {
                command {
                    mkdir -p out
                    echo alpha > out/a.txt
                    echo beta > out/b.txt
                }
                output {
                    Array[File] files = glob("out/*.txt")
                    File first = "out/a.txt"
                }
            }"#,
            "maker",
        );
        let outputs = run_task(&ctx, &task, Bindings::new(), "maker-1", &dir.path().join("run")).unwrap();
        let files = outputs.resolve("files").unwrap().as_array().unwrap().to_vec();
        assert_eq!(files.len(), 2);
        for f in &files {
            assert!(Path::new(f.as_string().unwrap()).is_file());
        }
        let first = outputs.resolve("first").unwrap();
        assert!(std::fs::read_to_string(first.as_string().unwrap())
            .unwrap()
            .starts_with("alpha"));
    }

    #[test]
    fn escaping_output_rejected() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task sneaky {
                command {}
                output { File pw = "/etc/passwd" }
            }"#,
            "sneaky",
        );
        match run_task(&ctx, &task, Bindings::new(), "sneaky-1", &dir.path().join("run")) {
            Err(RuntimeError::Output { .. }) => {}
            other => panic!("expected Output error, got {:?}", other),
        }
    }

    #[test]
    fn missing_output_file_rejected() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task absent {
                command {}
                output { File f = "never_written.txt" }
            }"#,
            "absent",
        );
        assert!(matches!(
            run_task(&ctx, &task, Bindings::new(), "absent-1", &dir.path().join("run")),
            Err(RuntimeError::Output { .. })
        ));
    }

    #[test]
    fn write_lines_feeds_command() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task counter {
                input { Array[String] items }
                File listing = write_lines(items)
                command { wc -l < ~{listing} }
                output { Int n = read_int(stdout()) }
            }"#,
            "counter",
        );
        let inputs = Bindings::new().bind(
            "items".to_string(),
            Value::array(
                Type::string(false),
                vec![Value::string("a"), Value::string("b"), Value::string("c")],
            ),
            None,
        );
        let outputs = run_task(&ctx, &task, inputs, "counter-1", &dir.path().join("run")).unwrap();
        assert_eq!(outputs.resolve("n").unwrap().as_int(), Some(3));
    }

    #[test]
    fn hooks_observe_lifecycle() {
        struct Recorder {
            events: Arc<Mutex<Vec<String>>>,
        }
        impl TaskHook for Recorder {
            fn pre_inputs(&self, task: &Task, _inputs: &Bindings<Value>) -> RuntimeResult<()> {
                self.events.lock().unwrap().push(format!("inputs {}", task.name));
                Ok(())
            }
            fn pre_command(&self, _task: &Task, command: &str) -> RuntimeResult<()> {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("command {}", command.lines().count()));
                Ok(())
            }
            fn post_outputs(&self, _task: &Task, outputs: &Bindings<Value>) -> RuntimeResult<()> {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("outputs {}", outputs.len()));
                Ok(())
            }
        }

        let (mut ctx, dir) = test_context();
        let events = Arc::new(Mutex::new(Vec::new()));
        ctx.hooks = Arc::new(vec![Box::new(Recorder {
            events: Arc::clone(&events),
        }) as Box<dyn TaskHook>]);

        let task = get_task(
            r#"version 1.0
            task hello {
                input { String who }
                command { echo "hi ~{who}" }
                output { String out = read_string(stdout()) }
            }"#,
            "hello",
        );
        let inputs = Bindings::new().bind("who".to_string(), Value::string("x"), None);
        run_task(&ctx, &task, inputs, "hello-hooked", &dir.path().join("run")).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], "inputs hello");
        assert!(events[1].starts_with("command "));
        assert_eq!(events[2], "outputs 1");
    }

    #[test]
    fn unknown_input_rejected() {
        let (ctx, dir) = test_context();
        let task = get_task(
            r#"version 1.0
            task t {
                input { Int x }
                command {}
                output {}
            }"#,
            "t",
        );
        let inputs = Bindings::new()
            .bind("x".to_string(), Value::int(1), None)
            .bind("bogus".to_string(), Value::int(2), None);
        assert!(matches!(
            run_task(&ctx, &task, inputs, "t-1", &dir.path().join("run")),
            Err(RuntimeError::Input { .. })
        ));
    }
}
