//! Content-addressed call cache and URL download cache.
//!
//! Task results are memoized under `<dir>/<task_digest>/<input_digest>.json`
//! where the task digest covers the command template and output expressions
//! (so editing either invalidates prior results) and the input digest is a
//! canonical JSON serialization of the inputs. Cache hits hold shared
//! advisory locks on every file they reference, for the life of the cache
//! handle, so concurrent cleanup cannot delete files out from under a
//! running workflow.
//!
//! Downloaded files are cached separately, keyed by URI under
//! `<dir>/files/<scheme>/<host>/<encoded-path>/<basename>`.

use super::config::{CallCacheConfig, DownloadCacheConfig};
use super::error::{RuntimeError, RuntimeResult};
use super::fs_utils::write_atomic;
use crate::env::Bindings;
use crate::tree::Task;
use crate::types::Type;
use crate::value::Value;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// SHA-256 of the parts of a task definition that determine its behavior.
pub fn task_digest(task: &Task) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.name.as_bytes());
    hasher.update(b"\x1ecommand\x1e");
    hasher.update(task.command.to_string().as_bytes());
    for d in &task.outputs {
        hasher.update(b"\x1eoutput\x1e");
        hasher.update(d.to_string().as_bytes());
    }
    for (k, v) in &task.runtime {
        hasher.update(b"\x1eruntime\x1e");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.to_string().as_bytes());
    }
    hex(&hasher.finalize())
}

/// SHA-256 of the canonical JSON of an input environment (sorted keys).
pub fn input_digest(inputs: &Bindings<Value>) -> String {
    let mut entries: Vec<(String, serde_json::Value)> = inputs
        .iter()
        .map(|b| (b.name().to_string(), b.value().to_json()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let obj: serde_json::Map<String, serde_json::Value> = entries.into_iter().collect();
    let canonical = serde_json::Value::Object(obj).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Default)]
struct LockSet {
    held: HashSet<PathBuf>,
    files: Vec<std::fs::File>,
}

pub struct CallCache {
    call_cfg: CallCacheConfig,
    dl_cfg: DownloadCacheConfig,
    locks: Mutex<LockSet>,
}

impl CallCache {
    pub fn new(call_cfg: CallCacheConfig, dl_cfg: DownloadCacheConfig) -> Self {
        Self {
            call_cfg,
            dl_cfg,
            locks: Mutex::new(LockSet::default()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.call_cfg.enabled
    }

    fn entry_path(&self, task_digest: &str, input_digest: &str) -> PathBuf {
        self.call_cfg
            .dir
            .join(task_digest)
            .join(format!("{}.json", input_digest))
    }

    /// Open shared advisory locks on `paths`, all or none, remembering them
    /// for the life of this cache handle.
    fn flock_shared(&self, paths: &[PathBuf]) -> std::io::Result<()> {
        let mut locks = self.locks.lock().unwrap();
        let mut fresh: Vec<(PathBuf, std::fs::File)> = Vec::new();
        for path in paths {
            let canonical = path.canonicalize()?;
            if locks.held.contains(&canonical) {
                continue;
            }
            let file = std::fs::File::open(&canonical)?;
            file.try_lock_shared()?;
            fresh.push((canonical, file));
        }
        for (path, file) in fresh {
            locks.held.insert(path);
            locks.files.push(file);
        }
        Ok(())
    }

    /// Look up memoized outputs. Returns `None` on any miss condition: no
    /// entry, unreadable entry, or a referenced file that has vanished or
    /// cannot be locked.
    pub fn get(
        &self,
        task_digest: &str,
        input_digest: &str,
        output_types: &Bindings<Type>,
    ) -> Option<Bindings<Value>> {
        if !self.call_cfg.enabled {
            return None;
        }
        let path = self.entry_path(task_digest, input_digest);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => {
                debug!(entry = %path.display(), "call cache miss");
                return None;
            }
        };
        let json: serde_json::Value = match serde_json::from_str(&text) {
            Ok(j) => j,
            Err(e) => {
                warn!(entry = %path.display(), error = %e, "unreadable call cache entry");
                return None;
            }
        };
        let outputs = match super::env_from_json(&json, output_types) {
            Ok(env) => env,
            Err(e) => {
                warn!(entry = %path.display(), error = %e, "stale call cache entry");
                return None;
            }
        };

        let mut paths = Vec::new();
        for b in outputs.iter() {
            b.value().collect_paths(&mut paths);
        }
        let file_paths: Vec<PathBuf> = paths.iter().map(|(p, _)| PathBuf::from(p)).collect();
        for p in &file_paths {
            if !p.exists() {
                debug!(entry = %path.display(), missing = %p.display(), "cache entry references deleted file");
                return None;
            }
        }
        if let Err(e) = self.flock_shared(&file_paths) {
            warn!(entry = %path.display(), error = %e, "cannot lock cache hit files");
            return None;
        }
        info!(entry = %path.display(), "call cache hit");
        Some(outputs)
    }

    /// Memoize `outputs`, written atomically.
    pub fn put(
        &self,
        task_digest: &str,
        input_digest: &str,
        outputs: &Bindings<Value>,
    ) -> RuntimeResult<()> {
        if !self.call_cfg.enabled {
            return Ok(());
        }
        let path = self.entry_path(task_digest, input_digest);
        let json = super::env_to_json(outputs);
        write_atomic(&path, json.to_string().as_bytes())?;
        info!(entry = %path.display(), "call cache store");
        Ok(())
    }

    /// Where a cached copy of `uri` would live, or `None` when the URI is
    /// not cacheable (malformed, query-bearing, or filtered by the
    /// allow/deny prefix lists).
    pub fn download_path(&self, uri: &str) -> Option<PathBuf> {
        let parsed = Url::parse(uri).ok()?;
        let host = parsed.host_str()?;
        if !self.dl_cfg.disregard_query && parsed.query().is_some() {
            return None;
        }
        if !self.dl_cfg.allow_prefix.is_empty()
            && !self.dl_cfg.allow_prefix.iter().any(|p| uri.starts_with(p.as_str()))
        {
            return None;
        }
        if self.dl_cfg.deny_prefix.iter().any(|p| uri.starts_with(p.as_str())) {
            return None;
        }
        let path = parsed.path();
        let (dirname, basename) = match path.rsplit_once('/') {
            Some((d, f)) => (d.trim_matches('/'), f),
            None => ("", path),
        };
        if basename.is_empty() {
            return None;
        }
        let encoded = dirname.replace('_', "__").replace('/', "_");
        let mut out = self.dl_cfg.dir.join("files").join(parsed.scheme()).join(host);
        if !encoded.is_empty() {
            out = out.join(encoded);
        }
        Some(out.join(basename))
    }

    /// Cached local copy of `uri`, shared-locked, if present.
    pub fn get_download(&self, uri: &str) -> Option<PathBuf> {
        if !self.dl_cfg.enabled {
            return None;
        }
        let path = self.download_path(uri)?;
        if !path.is_file() {
            debug!(uri, cache_path = %path.display(), "download cache miss");
            return None;
        }
        match self.flock_shared(&[path.clone()]) {
            Ok(()) => {
                info!(uri, cache_path = %path.display(), "download cache hit");
                Some(path)
            }
            Err(e) => {
                warn!(uri, cache_path = %path.display(), error = %e, "download cache hit but cannot lock");
                None
            }
        }
    }

    /// Move a freshly-downloaded file into the cache (atomic rename) and
    /// return the new path; uncacheable URIs keep their original path.
    pub fn put_download(&self, uri: &str, downloaded: PathBuf) -> RuntimeResult<PathBuf> {
        if !self.dl_cfg.enabled {
            return Ok(downloaded);
        }
        let Some(target) = self.download_path(uri) else {
            return Ok(downloaded);
        };
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| RuntimeError::io(format!("creating {}", dir.display()), e))?;
        }
        std::fs::rename(&downloaded, &target)
            .map_err(|e| RuntimeError::io(format!("renaming into {}", target.display()), e))?;
        info!(uri, cache_path = %target.display(), "stored download in cache");
        let _ = self.flock_shared(&[target.clone()]);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourcePosition;
    use crate::expr::Expression;
    use crate::tree::Declaration;
    use indexmap::IndexMap;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn sample_task(command_text: &str) -> Task {
        Task {
            pos: pos(),
            name: "t".into(),
            inputs: None,
            postinputs: vec![],
            command: Expression::command(
                pos(),
                vec![crate::expr::StringPart::Text(command_text.into())],
            ),
            outputs: vec![Declaration::new(
                pos(),
                Type::string(false),
                "out".into(),
                Some(Expression::string_literal(pos(), "x")),
            )],
            runtime: IndexMap::new(),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        }
    }

    fn cache_in(dir: &Path) -> CallCache {
        CallCache::new(
            CallCacheConfig {
                enabled: true,
                dir: dir.join("calls"),
            },
            DownloadCacheConfig {
                enabled: true,
                dir: dir.join("downloads"),
                allow_prefix: vec![],
                deny_prefix: vec![],
                disregard_query: false,
            },
        )
    }

    #[test]
    fn digests_are_stable_and_sensitive() {
        let t1 = sample_task("echo hi");
        let t2 = sample_task("echo hi");
        let t3 = sample_task("echo bye");
        assert_eq!(task_digest(&t1), task_digest(&t2));
        assert_ne!(task_digest(&t1), task_digest(&t3));

        let a = Bindings::new().bind("x".to_string(), Value::int(1), None);
        let b = Bindings::new().bind("x".to_string(), Value::int(1), None);
        let c = Bindings::new().bind("x".to_string(), Value::int(2), None);
        assert_eq!(input_digest(&a), input_digest(&b));
        assert_ne!(input_digest(&a), input_digest(&c));
    }

    #[test]
    fn input_digest_ignores_binding_order() {
        let a = Bindings::new()
            .bind("x".to_string(), Value::int(1), None)
            .bind("y".to_string(), Value::int(2), None);
        let b = Bindings::new()
            .bind("y".to_string(), Value::int(2), None)
            .bind("x".to_string(), Value::int(1), None);
        assert_eq!(input_digest(&a), input_digest(&b));
    }

    #[test]
    fn put_then_get() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = cache_in(dir.path());
        let outputs = Bindings::new().bind("out".to_string(), Value::string("hi"), None);
        cache.put("td", "id", &outputs).unwrap();

        let types = Bindings::new().bind("out".to_string(), Type::string(false), None);
        let hit = cache.get("td", "id", &types).unwrap();
        assert_eq!(hit.resolve("out").unwrap().as_string(), Some("hi"));
        assert!(cache.get("td", "other", &types).is_none());
    }

    #[test]
    fn get_misses_when_referenced_file_gone() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = cache_in(dir.path());
        let f = dir.path().join("result.txt");
        std::fs::write(&f, "data").unwrap();
        let outputs = Bindings::new().bind(
            "out".to_string(),
            Value::file(f.display().to_string()),
            None,
        );
        cache.put("td", "id", &outputs).unwrap();
        let types = Bindings::new().bind("out".to_string(), Type::file(false), None);
        assert!(cache.get("td", "id", &types).is_some());
        std::fs::remove_file(&f).unwrap();
        assert!(cache.get("td", "id", &types).is_none());
    }

    #[test]
    fn download_path_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = cache_in(dir.path());
        let p = cache
            .download_path("https://example.org/data/ref_genome/hg38.fa")
            .unwrap();
        let s = p.display().to_string();
        assert!(s.contains("files/https/example.org"));
        assert!(s.contains("data_ref__genome"));
        assert!(s.ends_with("hg38.fa"));

        // query strings spoil cacheability unless disregarded
        assert!(cache
            .download_path("https://example.org/f.txt?token=abc")
            .is_none());
        assert!(cache.download_path("not a uri").is_none());
    }

    #[test]
    fn download_prefix_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut cache = cache_in(dir.path());
        {
            let c = &mut cache;
            c.dl_cfg.allow_prefix = vec!["https://good.example/".to_string()];
            c.dl_cfg.deny_prefix = vec!["https://good.example/secret/".to_string()];
        }
        assert!(cache.download_path("https://good.example/a.txt").is_some());
        assert!(cache.download_path("https://other.example/a.txt").is_none());
        assert!(cache
            .download_path("https://good.example/secret/a.txt")
            .is_none());
    }

    #[test]
    fn download_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = cache_in(dir.path());
        let uri = "https://example.org/files/payload.bin";
        assert!(cache.get_download(uri).is_none());
        let staged = dir.path().join("fresh.bin");
        std::fs::write(&staged, b"1234").unwrap();
        let cached = cache.put_download(uri, staged.clone()).unwrap();
        assert!(!staged.exists());
        assert!(cached.is_file());
        assert_eq!(cache.get_download(uri).unwrap(), cached);
    }
}
