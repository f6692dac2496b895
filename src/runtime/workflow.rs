//! Workflow execution: the cooperative scheduling state machine over the
//! plan, and the local driver loop that dispatches ready calls onto worker
//! threads.
//!
//! The state machine is purely synchronous and performs no I/O beyond
//! expression evaluation. [`StateMachine::step`] advances through ready
//! declaration/section/gather nodes by itself and hands each ready call
//! back to the driver as a [`CallNow`]; the driver executes the callee
//! (task attempt, or recursively a sub-workflow) and feeds the result back
//! through [`StateMachine::call_finished`]. Many calls may be in flight at
//! once.

use super::error::{RuntimeError, RuntimeResult};
use super::fs_utils::write_atomic;
use super::plan::{Plan, PlanNodeKind, SectionPlan};
use super::task::run_task;
use super::RunContext;
use crate::env::{merge, Bindings};
use crate::error::{SourcePosition, WdlError};
use crate::stdlib::arrays::unify_value_types;
use crate::stdlib::{HostAccess, StdLib};
use crate::tree::{Call, CalleeKind, Declaration, Document, Workflow};
use crate::types::Type;
use crate::value::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use tracing::{debug, info};

/// Instruction to the driver: launch this callee now.
#[derive(Debug)]
pub struct CallNow {
    /// Job ID, unique within the workflow (used as the sub-run directory).
    pub id: String,
    pub call: Call,
    pub inputs: Bindings<Value>,
}

#[derive(Debug, Clone)]
enum JobKind {
    Decl {
        decl: Declaration,
        /// May this declaration be satisfied directly by workflow inputs?
        from_inputs: bool,
    },
    Call(Call),
    Section {
        plan: SectionPlan,
        /// Unsuffixed plan node ID, for deriving instance suffixes.
        base_id: String,
    },
    Gather {
        /// Multiplexed referee job IDs in scatter index order.
        referees: Vec<String>,
        names: Vec<String>,
        scatter: bool,
    },
    Outputs,
}

#[derive(Debug, Clone)]
struct Job {
    id: String,
    deps: BTreeSet<String>,
    kind: JobKind,
    /// Environment snapshot for section-instance jobs (scatter variable and
    /// captured outer values).
    extra_env: Bindings<Value>,
}

pub struct StateMachine {
    inputs: Bindings<Value>,
    jobs: HashMap<String, Job>,
    waiting: BTreeSet<String>,
    running: HashSet<String>,
    finished: HashSet<String>,
    job_outputs: HashMap<String, Bindings<Value>>,
    stdlib: StdLib,
}

impl StateMachine {
    /// Initialize from a compiled plan and the workflow-level inputs.
    pub fn new(plan: &Plan, inputs: Bindings<Value>, version: &str) -> Self {
        let mut machine = StateMachine {
            inputs,
            jobs: HashMap::new(),
            waiting: BTreeSet::new(),
            running: HashSet::new(),
            finished: HashSet::new(),
            job_outputs: HashMap::new(),
            stdlib: StdLib::base(version),
        };
        for node in &plan.nodes {
            let kind = match &node.kind {
                PlanNodeKind::Decl(d) => JobKind::Decl {
                    decl: d.clone(),
                    // output-section declarations never bind from run inputs
                    from_inputs: !node.id.starts_with("output-"),
                },
                PlanNodeKind::Call(c) => JobKind::Call(c.clone()),
                PlanNodeKind::Section(s) => JobKind::Section {
                    plan: s.clone(),
                    base_id: node.id.clone(),
                },
                PlanNodeKind::Outputs(_) => JobKind::Outputs,
            };
            machine.schedule(Job {
                id: node.id.clone(),
                deps: node.deps.clone(),
                kind,
                extra_env: Bindings::new(),
            });
        }
        debug_assert!(machine.jobs.contains_key("outputs"));
        machine
    }

    /// Replace the expression-evaluation stdlib (e.g. to route `write_*`
    /// files into the run directory).
    pub fn with_stdlib(mut self, stdlib: StdLib) -> Self {
        self.stdlib = stdlib;
        self
    }

    fn schedule(&mut self, job: Job) {
        debug_assert!(!self.jobs.contains_key(&job.id), "duplicate job {}", job.id);
        self.waiting.insert(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    /// The workflow outputs, once everything has finished.
    pub fn outputs(&self) -> Option<&Bindings<Value>> {
        if self.finished.len() < self.jobs.len() {
            return None;
        }
        self.job_outputs.get("outputs")
    }

    /// Whether no further progress is possible without external call
    /// completions.
    pub fn quiescent(&self) -> bool {
        self.running.is_empty()
    }

    /// Advance until a call is ready (returned for the driver to execute)
    /// or no further progress can be made without one.
    pub fn step(&mut self) -> Result<Option<CallNow>, WdlError> {
        loop {
            let ready = self
                .waiting
                .iter()
                .find(|id| {
                    let job = &self.jobs[*id];
                    job.deps.iter().all(|d| self.finished.contains(d))
                })
                .cloned();
            let Some(id) = ready else {
                return Ok(None);
            };
            self.waiting.remove(&id);
            self.running.insert(id.clone());
            let job = self.jobs[&id].clone();

            // merge the outputs of all dependencies with the instance
            // environment snapshot
            let dep_envs: Vec<&Bindings<Value>> = job
                .deps
                .iter()
                .filter_map(|d| self.job_outputs.get(d))
                .collect();
            let mut envs: Vec<&Bindings<Value>> = dep_envs;
            envs.push(&job.extra_env);
            let env = merge(&envs);

            match &job.kind {
                JobKind::Decl { decl, from_inputs } => {
                    let value = self.evaluate_decl(decl, *from_inputs, &env)?;
                    let out = Bindings::new().bind(decl.name.clone(), value, None);
                    self.finish(&id, out);
                }
                JobKind::Call(call) => {
                    let inputs = self.evaluate_call_inputs(call, &env)?;
                    debug!(job = %id, callee = %call.callee_id.join("."), "call ready");
                    return Ok(Some(CallNow {
                        id,
                        call: call.clone(),
                        inputs,
                    }));
                }
                JobKind::Section { plan, base_id } => {
                    self.instantiate_section(&id, base_id, plan, &env)?;
                    self.finish(&id, Bindings::new());
                }
                JobKind::Gather {
                    referees,
                    names,
                    scatter,
                } => {
                    let out = self.gather(referees, names, *scatter);
                    self.finish(&id, out);
                }
                JobKind::Outputs => {
                    debug!("workflow outputs assembled");
                    self.finish(&id, env);
                }
            }
        }
    }

    /// Deliver a completed call's outputs.
    pub fn call_finished(&mut self, id: &str, outputs: Bindings<Value>) {
        assert!(self.running.contains(id), "call {} is not running", id);
        let call_name = match &self.jobs[id].kind {
            JobKind::Call(c) => c.name().to_string(),
            _ => panic!("call_finished on non-call job {}", id),
        };
        self.job_outputs
            .insert(id.to_string(), outputs.wrap_namespace(&call_name));
        self.running.remove(id);
        self.finished.insert(id.to_string());
    }

    fn finish(&mut self, id: &str, outputs: Bindings<Value>) {
        self.job_outputs.insert(id.to_string(), outputs);
        self.running.remove(id);
        self.finished.insert(id.to_string());
    }

    fn evaluate_decl(
        &self,
        decl: &Declaration,
        from_inputs: bool,
        env: &Bindings<Value>,
    ) -> Result<Value, WdlError> {
        if from_inputs {
            if let Some(v) = self.inputs.resolve(&decl.name) {
                return v.coerce(&decl.decl_type);
            }
        }
        match &decl.expr {
            Some(expr) => expr.eval(env, &self.stdlib)?.coerce(&decl.decl_type),
            None if decl.decl_type.is_optional() => Ok(Value::null()),
            None => Err(WdlError::eval(
                decl.pos.clone(),
                format!("missing required workflow input {}", decl.name),
            )),
        }
    }

    fn evaluate_call_inputs(
        &self,
        call: &Call,
        env: &Bindings<Value>,
    ) -> Result<Bindings<Value>, WdlError> {
        let mut out = Bindings::new();
        for (name, expr) in call.inputs.iter().rev() {
            let v = expr.eval(env, &self.stdlib)?;
            out = out.bind(name.clone(), v, None);
        }
        // workflow-level inputs may address a call's optional inputs by
        // namespace (`t.threads`)
        for b in self.inputs.enter_namespace(call.name()).iter() {
            if !out.has_binding(b.name()) {
                out = out.bind(b.name().to_string(), b.value().clone(), None);
            }
        }
        Ok(out)
    }

    fn instantiate_section(
        &mut self,
        job_id: &str,
        base_id: &str,
        plan: &SectionPlan,
        env: &Bindings<Value>,
    ) -> Result<(), WdlError> {
        let inst_suffix = job_id
            .strip_prefix(base_id)
            .unwrap_or_default()
            .to_string();

        let section_value = plan.expr.eval(env, &self.stdlib)?;
        let instances: Vec<Option<Value>> = match &plan.scatter_variable {
            Some(_) => {
                let arr = section_value.coerce(&Type::array(Type::any(), false, false))?;
                arr.as_array()
                    .unwrap()
                    .iter()
                    .map(|v| Some(v.clone()))
                    .collect()
            }
            None => {
                let b = section_value
                    .coerce(&Type::boolean(false))?
                    .as_bool()
                    .unwrap();
                if b {
                    vec![None]
                } else {
                    vec![]
                }
            }
        };
        let n = instances.len();
        info!(section = %job_id, instances = n, "section expanded");

        // body-local IDs (nodes plus their sections' gathers): dependencies
        // on these multiplex per instance, anything else was captured in
        // the environment snapshot
        let mut local: BTreeSet<String> = BTreeSet::new();
        for node in &plan.body {
            local.insert(node.id.clone());
            if let PlanNodeKind::Section(s) = &node.kind {
                for g in &s.gathers {
                    local.insert(g.id.clone());
                }
            }
        }

        for (i, element_value) in instances.iter().enumerate() {
            let mut extra = env.clone();
            if let (Some(var), Some(v)) = (&plan.scatter_variable, element_value) {
                extra = extra.bind(var.clone(), v.clone(), None);
            }
            for node in &plan.body {
                let kind = match &node.kind {
                    PlanNodeKind::Decl(d) => JobKind::Decl {
                        decl: d.clone(),
                        from_inputs: false,
                    },
                    PlanNodeKind::Call(c) => JobKind::Call(c.clone()),
                    // nested sections keep their bare plan ID as base so
                    // the accumulated instance suffix can be recovered
                    PlanNodeKind::Section(s) => JobKind::Section {
                        plan: s.clone(),
                        base_id: node.id.clone(),
                    },
                    PlanNodeKind::Outputs(_) => unreachable!("outputs inside section"),
                };
                let deps: BTreeSet<String> = node
                    .deps
                    .iter()
                    .filter(|d| local.contains(*d))
                    .map(|d| format!("{}{}-{}", d, inst_suffix, i))
                    .collect();
                self.schedule(Job {
                    id: format!("{}{}-{}", node.id, inst_suffix, i),
                    deps,
                    kind,
                    extra_env: extra.clone(),
                });
            }
        }

        for gather in &plan.gathers {
            let referees: Vec<String> = (0..n)
                .map(|i| format!("{}{}-{}", gather.referee, inst_suffix, i))
                .collect();
            self.schedule(Job {
                id: format!("{}{}", gather.id, inst_suffix),
                deps: referees.iter().cloned().collect(),
                kind: JobKind::Gather {
                    referees,
                    names: gather.names.clone(),
                    scatter: gather.scatter,
                },
                extra_env: Bindings::new(),
            });
        }
        Ok(())
    }

    fn gather(&self, referees: &[String], names: &[String], scatter: bool) -> Bindings<Value> {
        let instance_envs: Vec<&Bindings<Value>> = referees
            .iter()
            .filter_map(|r| self.job_outputs.get(r))
            .collect();
        let mut out = Bindings::new();
        for name in names.iter().rev() {
            let value = if scatter {
                let values: Vec<Value> = instance_envs
                    .iter()
                    .map(|env| env.resolve(name).cloned().unwrap_or(Value::Null))
                    .collect();
                let item_type = unify_value_types(&values);
                Value::array(item_type, values)
            } else {
                match instance_envs.first() {
                    Some(env) => env.resolve(name).cloned().unwrap_or(Value::Null),
                    None => Value::Null,
                }
            };
            out = out.bind(name.clone(), value, None);
        }
        out
    }
}

/// Validate workflow-level inputs: required inputs present, no unknown
/// names (dotted names addressing a call's inputs are accepted).
pub fn validate_workflow_inputs(
    wf: &Workflow,
    inputs: &Bindings<Value>,
) -> RuntimeResult<()> {
    for d in wf.required_inputs() {
        if !inputs.has_binding(&d.name) {
            return Err(RuntimeError::input(format!(
                "missing required workflow input {}",
                d.name
            )));
        }
    }
    let declared = wf.available_inputs();
    let call_names: HashSet<String> = wf.calls().iter().map(|c| c.name().to_string()).collect();
    for b in inputs.iter() {
        let name = b.name();
        if declared.has_binding(name) {
            continue;
        }
        match name.split_once('.') {
            Some((call, _)) if call_names.contains(call) => continue,
            _ => {
                return Err(RuntimeError::input(format!(
                    "unknown workflow input {}",
                    name
                )))
            }
        }
    }
    Ok(())
}

/// Run a workflow locally, dispatching calls onto worker threads.
pub fn run_workflow(
    ctx: &RunContext,
    doc: &Document,
    wf: &Workflow,
    inputs: Bindings<Value>,
    run_id: &str,
    run_dir: &Path,
) -> RuntimeResult<Bindings<Value>> {
    validate_workflow_inputs(wf, &inputs)?;
    info!(workflow = %wf.name, run_id, dir = %run_dir.display(), "workflow started");

    write_atomic(
        &run_dir.join("inputs.json"),
        super::env_to_json(&inputs).to_string().as_bytes(),
    )?;

    let plan = Plan::compile(wf, doc)?;
    let stdlib = StdLib::with_access(
        &wf.wdl_version,
        Box::new(HostAccess),
        run_dir.join("write_"),
    );
    let mut state = StateMachine::new(&plan, inputs, &wf.wdl_version).with_stdlib(stdlib);

    let (tx, rx) = mpsc::channel::<(String, RuntimeResult<Bindings<Value>>)>();

    let outputs = std::thread::scope(|scope| -> RuntimeResult<Bindings<Value>> {
        let mut in_flight: usize = 0;
        loop {
            if ctx.terminating.load(Ordering::SeqCst) {
                return Err(RuntimeError::Terminated);
            }

            // drain all ready calls, launching each on its own thread
            while let Some(call_now) = state.step().map_err(RuntimeError::Language)? {
                let tx = tx.clone();
                let sub_dir = run_dir.to_path_buf();
                let callee = call_now.call.callee.clone().ok_or_else(|| {
                    RuntimeError::Language(WdlError::runtime(format!(
                        "call {} was not resolved",
                        call_now.id
                    )))
                })?;
                in_flight += 1;
                scope.spawn(move || {
                    let result = execute_call(ctx, doc, &callee, &call_now, &sub_dir);
                    let _ = tx.send((call_now.id, result));
                });
            }

            if let Some(outs) = state.outputs() {
                let outs = outs.clone();
                write_atomic(
                    &run_dir.join("outputs.json"),
                    super::env_to_json(&outs).to_string().as_bytes(),
                )?;
                info!(workflow = %wf.name, run_id, "workflow finished");
                return Ok(outs);
            }

            if in_flight == 0 {
                // spec invariant: with nothing running and no ready node,
                // the workflow would deadlock
                return Err(RuntimeError::Language(WdlError::runtime(
                    "workflow deadlocked: no runnable nodes and no calls in flight",
                )));
            }

            let (id, result) = rx
                .recv()
                .expect("call worker channel closed unexpectedly");
            in_flight -= 1;
            match result {
                Ok(outs) => state.call_finished(&id, outs),
                Err(e) => {
                    // stop scheduling; ask in-flight jobs to terminate
                    ctx.terminating.store(true, Ordering::SeqCst);
                    while in_flight > 0 {
                        let _ = rx.recv();
                        in_flight -= 1;
                    }
                    return Err(e);
                }
            }
        }
    })?;

    Ok(outputs)
}

fn execute_call(
    ctx: &RunContext,
    doc: &Document,
    callee: &crate::tree::Callee,
    call_now: &CallNow,
    parent_dir: &Path,
) -> RuntimeResult<Bindings<Value>> {
    let sub_run_dir = parent_dir.join(&call_now.id);
    match callee.kind {
        CalleeKind::Task(_) => {
            let task = doc.callee_task(callee).ok_or_else(|| {
                RuntimeError::Language(WdlError::runtime("resolved callee task missing"))
            })?;
            run_task(
                ctx,
                task,
                call_now.inputs.clone(),
                &call_now.id,
                &sub_run_dir,
            )
            .map_err(|e| RuntimeError::RunFailed {
                task: task.name.clone(),
                run_id: call_now.id.clone(),
                cause: Box::new(e),
            })
        }
        CalleeKind::Workflow => {
            let sub_doc = doc.callee_document(callee).ok_or_else(|| {
                RuntimeError::Language(WdlError::runtime("resolved callee document missing"))
            })?;
            let sub_wf = doc.callee_workflow(callee).ok_or_else(|| {
                RuntimeError::Language(WdlError::runtime("resolved callee workflow missing"))
            })?;
            std::fs::create_dir_all(&sub_run_dir)
                .map_err(|e| RuntimeError::io("creating sub-workflow dir", e))?;
            let outputs = run_workflow(
                ctx,
                sub_doc,
                sub_wf,
                call_now.inputs.clone(),
                &call_now.id,
                &sub_run_dir,
            )?;
            Ok(outputs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_and_check;

    fn machine_for(source: &str, inputs: Bindings<Value>) -> (StateMachine, Document) {
        let doc = parse_and_check(source, "w.wdl", true).unwrap();
        let wf = doc.workflow.as_ref().unwrap();
        let plan = Plan::compile(wf, &doc).unwrap();
        (StateMachine::new(&plan, inputs, "1.0"), doc)
    }

    fn drain(state: &mut StateMachine) -> Vec<CallNow> {
        let mut calls = Vec::new();
        while let Some(c) = state.step().unwrap() {
            calls.push(c);
        }
        calls
    }

    #[test]
    fn pure_decl_workflow_completes() {
        let inputs = Bindings::new().bind("x".to_string(), Value::int(5), None);
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            workflow w {
                input { Int x }
                Int y = x + 1
                output { Int z = y * 2 }
            }"#,
            inputs,
        );
        assert!(drain(&mut state).is_empty());
        let outs = state.outputs().unwrap();
        assert_eq!(outs.resolve("z").unwrap().as_int(), Some(12));
    }

    #[test]
    fn scatter_gathers_in_index_order() {
        let inputs = Bindings::new().bind(
            "xs".to_string(),
            Value::array(
                Type::int(false),
                (0..12).map(Value::int).collect(),
            ),
            None,
        );
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            workflow w {
                input { Array[Int] xs }
                scatter (x in xs) { Int sq = x * x }
                output { Array[Int] sqs = sq }
            }"#,
            inputs,
        );
        assert!(drain(&mut state).is_empty());
        let outs = state.outputs().unwrap();
        let sqs = outs.resolve("sqs").unwrap().as_array().unwrap().to_vec();
        assert_eq!(sqs.len(), 12);
        // index order must hold even past single digits (lexicographic
        // traps: "-10" sorts before "-2")
        assert_eq!(sqs[10].as_int(), Some(100));
        assert_eq!(sqs[11].as_int(), Some(121));
    }

    #[test]
    fn conditional_false_yields_null() {
        let inputs = Bindings::new()
            .bind("b".to_string(), Value::boolean(false), None)
            .bind("x".to_string(), Value::int(5), None);
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            workflow w {
                input { Boolean b, Int x }
                if (b) { Int y = x + 1 }
                output { Int? y_out = y }
            }"#,
            inputs,
        );
        assert!(drain(&mut state).is_empty());
        assert!(state.outputs().unwrap().resolve("y_out").unwrap().is_null());
    }

    #[test]
    fn conditional_true_yields_value() {
        let inputs = Bindings::new()
            .bind("b".to_string(), Value::boolean(true), None)
            .bind("x".to_string(), Value::int(5), None);
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            workflow w {
                input { Boolean b, Int x }
                if (b) { Int y = x + 1 }
                output { Int? y_out = y }
            }"#,
            inputs,
        );
        assert!(drain(&mut state).is_empty());
        assert_eq!(
            state.outputs().unwrap().resolve("y_out").unwrap().as_int(),
            Some(6)
        );
    }

    #[test]
    fn calls_surface_and_finish() {
        let inputs = Bindings::new().bind("who".to_string(), Value::string("x"), None);
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            task hello {
                input { String who }
                command { echo "~{who}" }
                output { String out = read_string(stdout()) }
            }
            workflow w {
                input { String who }
                call hello { input: who = who }
                output { String msg = hello.out }
            }"#,
            inputs,
        );
        let calls = drain(&mut state);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call-hello");
        assert_eq!(
            calls[0].inputs.resolve("who").unwrap().as_string(),
            Some("x")
        );
        assert!(state.outputs().is_none());

        let call_outs = Bindings::new().bind("out".to_string(), Value::string("hi x"), None);
        state.call_finished("call-hello", call_outs);
        assert!(drain(&mut state).is_empty());
        assert_eq!(
            state.outputs().unwrap().resolve("msg").unwrap().as_string(),
            Some("hi x")
        );
    }

    #[test]
    fn scattered_calls_multiplex() {
        let inputs = Bindings::new().bind(
            "names".to_string(),
            Value::array(
                Type::string(false),
                vec![Value::string("a"), Value::string("b")],
            ),
            None,
        );
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            task hello {
                input { String who }
                command { echo "~{who}" }
                output { String out = read_string(stdout()) }
            }
            workflow w {
                input { Array[String] names }
                scatter (name in names) {
                    call hello { input: who = name }
                }
                output { Array[String] msgs = hello.out }
            }"#,
            inputs,
        );
        let calls = drain(&mut state);
        assert_eq!(calls.len(), 2);
        for c in &calls {
            let who = c.inputs.resolve("who").unwrap().as_string().unwrap().to_string();
            state.call_finished(&c.id, Bindings::new().bind(
                "out".to_string(),
                Value::string(format!("hi {}", who)),
                None,
            ));
        }
        assert!(drain(&mut state).is_empty());
        let msgs = state
            .outputs()
            .unwrap()
            .resolve("msgs")
            .unwrap()
            .as_array()
            .unwrap()
            .to_vec();
        assert_eq!(msgs[0].as_string(), Some("hi a"));
        assert_eq!(msgs[1].as_string(), Some("hi b"));
    }

    #[test]
    fn namespaced_workflow_inputs_feed_calls() {
        let inputs = Bindings::new()
            .bind("who".to_string(), Value::string("x"), None)
            .bind("hello.greeting".to_string(), Value::string("hey"), None);
        let (mut state, _doc) = machine_for(
            r#"version 1.0
            task hello {
                input {
                    String who
                    String greeting = "hello"
                }
                command { echo "~{greeting} ~{who}" }
                output { String out = read_string(stdout()) }
            }
            workflow w {
                input { String who }
                call hello { input: who = who }
                output { String msg = hello.out }
            }"#,
            inputs,
        );
        let calls = drain(&mut state);
        assert_eq!(
            calls[0].inputs.resolve("greeting").unwrap().as_string(),
            Some("hey")
        );
    }

    #[test]
    fn input_validation() {
        let doc = parse_and_check(
            r#"version 1.0
            workflow w {
                input { Int x }
                output { Int y = x }
            }"#,
            "w.wdl",
            true,
        )
        .unwrap();
        let wf = doc.workflow.as_ref().unwrap();
        assert!(validate_workflow_inputs(wf, &Bindings::new()).is_err());
        let ok = Bindings::new().bind("x".to_string(), Value::int(1), None);
        assert!(validate_workflow_inputs(wf, &ok).is_ok());
        let unknown = ok.bind("zzz".to_string(), Value::int(1), None);
        assert!(validate_workflow_inputs(wf, &unknown).is_err());
    }
}
