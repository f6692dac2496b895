//! sluice CLI: check and run WDL documents locally.
//!
//! Usage:
//!   sluice check <doc.wdl>
//!   sluice run <doc.wdl> [inputs.json] [--dir DIR] [--task NAME]
//!              [--config FILE] [--verbose]

use sluice::runtime::{install_signal_handlers, Config, RunContext};
use sluice::{inputs_from_json, load, outputs_to_json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

struct RunArgs {
    wdl_file: PathBuf,
    inputs_file: Option<PathBuf>,
    dir: PathBuf,
    task: Option<String>,
    config_file: Option<PathBuf>,
}

enum Command {
    Check { wdl_file: PathBuf },
    Run(RunArgs),
}

fn usage() -> ! {
    eprintln!(
        "usage:\n  sluice check <doc.wdl>\n  sluice run <doc.wdl> [inputs.json] \
         [--dir DIR] [--task NAME] [--config FILE] [--verbose]"
    );
    std::process::exit(2)
}

fn parse_args() -> (Command, bool) {
    let mut args = std::env::args().skip(1).collect::<Vec<_>>();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    args.retain(|a| a != "--verbose" && a != "-v");

    let mut it = args.into_iter();
    let command = match it.next().as_deref() {
        Some("check") => {
            let wdl_file = it.next().map(PathBuf::from).unwrap_or_else(|| usage());
            Command::Check { wdl_file }
        }
        Some("run") => {
            let wdl_file = it.next().map(PathBuf::from).unwrap_or_else(|| usage());
            let mut run = RunArgs {
                wdl_file,
                inputs_file: None,
                dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                task: None,
                config_file: None,
            };
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--dir" => run.dir = it.next().map(PathBuf::from).unwrap_or_else(|| usage()),
                    "--task" => run.task = Some(it.next().unwrap_or_else(|| usage())),
                    "--config" => {
                        run.config_file = Some(it.next().map(PathBuf::from).unwrap_or_else(|| usage()))
                    }
                    other if !other.starts_with('-') && run.inputs_file.is_none() => {
                        run.inputs_file = Some(PathBuf::from(other))
                    }
                    _ => usage(),
                }
            }
            Command::Run(run)
        }
        _ => usage(),
    };
    (command, verbose)
}

fn main() -> ExitCode {
    let (command, verbose) = parse_args();

    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match command {
        Command::Check { wdl_file } => match load(&wdl_file, true) {
            Ok(_) => {
                eprintln!("ok: {}", wdl_file.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
        Command::Run(run) => match execute(run) {
            Ok(json) => {
                println!("{}", serde_json::to_string_pretty(&json).unwrap());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn execute(args: RunArgs) -> Result<serde_json::Value, String> {
    let doc = load(&args.wdl_file, true).map_err(|e| e.to_string())?;

    let input_json: serde_json::Value = match &args.inputs_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("malformed {}: {}", path.display(), e))?
        }
        None => serde_json::json!({}),
    };

    let config = match &args.config_file {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    let ctx = RunContext::new(config).map_err(|e| e.to_string())?;
    install_signal_handlers(Arc::clone(&ctx.terminating));

    // pick the execution target: named task, else the workflow, else a
    // document with exactly one task
    if let Some(task_name) = &args.task {
        let task = doc
            .task(task_name)
            .ok_or_else(|| format!("no task named {} in {}", task_name, args.wdl_file.display()))?;
        let inputs = inputs_from_json(&input_json, &task.name, &task.available_inputs())
            .map_err(|e| e.to_string())?;
        let (_dir, outputs) = ctx
            .run_task(task, inputs, &args.dir)
            .map_err(|e| e.to_string())?;
        return Ok(outputs_to_json(&outputs, &task.name));
    }

    if let Some(wf) = &doc.workflow {
        let inputs = inputs_from_json(&input_json, &wf.name, &wf.available_inputs())
            .map_err(|e| e.to_string())?;
        let (_dir, outputs) = ctx
            .run_workflow(&doc, wf, inputs, &args.dir)
            .map_err(|e| e.to_string())?;
        return Ok(outputs_to_json(&outputs, &wf.name));
    }

    match doc.tasks.as_slice() {
        [task] => {
            let inputs = inputs_from_json(&input_json, &task.name, &task.available_inputs())
                .map_err(|e| e.to_string())?;
            let (_dir, outputs) = ctx
                .run_task(task, inputs, &args.dir)
                .map_err(|e| e.to_string())?;
            Ok(outputs_to_json(&outputs, &task.name))
        }
        [] => Err("document has no workflow and no tasks".to_string()),
        _ => Err("document has multiple tasks; choose one with --task".to_string()),
    }
}
