//! Cache-aware retrieval of remote input files.
//!
//! `File`/`Directory` inputs whose paths are URIs are localized before task
//! execution: the download cache is consulted first, and on a miss a
//! scheme-specific downloader (itself an ordinary WDL task definition)
//! runs through the regular task runner, with the URL as a string input and
//! a single file output. Cacheable results are moved into the download
//! cache and the input value is rewritten to the local path.

use super::error::{RuntimeError, RuntimeResult};
use super::task::run_task;
use super::RunContext;
use crate::env::Bindings;
use crate::value::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

const HTTP_DOWNLOADER: &str = r#"
version 1.0
task fetch_http {
    input {
        String uri
    }
    command <<<
        set -euo pipefail
        mkdir __out
        cd __out
        curl -fSL --retry 2 -O "~{uri}"
    >>>
    output {
        File file = glob("__out/*")[0]
    }
    runtime {
        cpu: 2
        memory: "1 GB"
        docker: "curlimages/curl:8.7.1"
    }
}
"#;

const S3_DOWNLOADER: &str = r#"
version 1.0
task fetch_s3 {
    input {
        String uri
    }
    command <<<
        set -euo pipefail
        mkdir __out
        cd __out
        aws s3 cp "~{uri}" .
    >>>
    output {
        File file = glob("__out/*")[0]
    }
    runtime {
        cpu: 2
        memory: "1 GB"
        docker: "amazon/aws-cli:2.15.30"
    }
}
"#;

const GS_DOWNLOADER: &str = r#"
version 1.0
task fetch_gs {
    input {
        String uri
    }
    command <<<
        set -euo pipefail
        mkdir __out
        cd __out
        gsutil cp "~{uri}" .
    >>>
    output {
        File file = glob("__out/*")[0]
    }
    runtime {
        cpu: 2
        memory: "1 GB"
        docker: "google/cloud-sdk:468.0.0-slim"
    }
}
"#;

/// Whether a path string is a URI rather than a local path.
pub fn is_uri(path: &str) -> bool {
    path.contains("://")
}

fn downloader_source(scheme: &str) -> Option<&'static str> {
    match scheme {
        "http" | "https" | "ftp" => Some(HTTP_DOWNLOADER),
        "s3" => Some(S3_DOWNLOADER),
        "gs" => Some(GS_DOWNLOADER),
        _ => None,
    }
}

/// Whether a downloader exists for this URI's scheme.
pub fn able(uri: &str) -> bool {
    Url::parse(uri)
        .ok()
        .map(|u| downloader_source(u.scheme()).is_some())
        .unwrap_or(false)
}

/// Rewrite every URI-valued File/Directory in the input environment to a
/// local path, downloading as needed.
pub fn localize_inputs(
    ctx: &RunContext,
    inputs: &Bindings<Value>,
    run_dir: &Path,
) -> RuntimeResult<Bindings<Value>> {
    let mut needs_download = false;
    for b in inputs.iter() {
        let mut paths = Vec::new();
        b.value().collect_paths(&mut paths);
        if paths.iter().any(|(p, _)| is_uri(p)) {
            needs_download = true;
            break;
        }
    }
    if !needs_download {
        return Ok(inputs.clone());
    }

    let mut failure: Option<RuntimeError> = None;
    let mut out = Bindings::new();
    for b in inputs.iter().collect::<Vec<_>>().into_iter().rev() {
        let rewritten = b.value().map_paths(&mut |p, _| {
            if !is_uri(p) {
                return Ok(p.to_string());
            }
            match ensure_local(ctx, p, run_dir) {
                Ok(local) => Ok(local.to_string_lossy().to_string()),
                Err(e) => {
                    let msg = e.to_string();
                    failure = Some(e);
                    Err(crate::error::WdlError::runtime(msg))
                }
            }
        });
        match (rewritten, failure.take()) {
            (_, Some(e)) => return Err(e),
            (Ok(v), None) => {
                out = out.bind(b.name().to_string(), v, None);
            }
            (Err(e), None) => return Err(RuntimeError::Language(e)),
        }
    }
    Ok(out)
}

/// Produce a local path for `uri`: download cache hit, or a fresh download
/// through the scheme's downloader task.
pub fn ensure_local(ctx: &RunContext, uri: &str, run_dir: &Path) -> RuntimeResult<PathBuf> {
    if let Some(cached) = ctx.cache.get_download(uri) {
        return Ok(cached);
    }

    let parsed = Url::parse(uri).map_err(|e| RuntimeError::DownloadFailed {
        uri: uri.to_string(),
        message: e.to_string(),
    })?;
    let source = downloader_source(parsed.scheme()).ok_or_else(|| {
        RuntimeError::DownloadFailed {
            uri: uri.to_string(),
            message: format!("no downloader for scheme {}", parsed.scheme()),
        }
    })?;

    let mut doc = crate::parser::parse_document(source, "<downloader>", "<downloader>")
        .map_err(RuntimeError::Language)?;
    doc.typecheck(true).map_err(RuntimeError::Language)?;
    let task = &doc.tasks[0];

    let dl_id = format!("download-{}", uuid::Uuid::new_v4().simple());
    let dl_dir = run_dir.join("downloads").join(&dl_id);
    info!(uri, dir = %dl_dir.display(), "downloading input");

    let inputs = Bindings::new().bind("uri".to_string(), Value::string(uri), None);
    let outputs = run_task(ctx, task, inputs, &dl_id, &dl_dir).map_err(|e| {
        RuntimeError::DownloadFailed {
            uri: uri.to_string(),
            message: e.to_string(),
        }
    })?;
    let downloaded = outputs
        .resolve("file")
        .and_then(|v| v.as_string().map(PathBuf::from))
        .ok_or_else(|| RuntimeError::DownloadFailed {
            uri: uri.to_string(),
            message: "downloader produced no file output".to_string(),
        })?;

    ctx.cache.put_download(uri, downloaded)
}
