//! In-memory doubles for the external collaborators.
//!
//! [`MockEngine`] is a scriptable engine with a full virtual filesystem;
//! [`MockModule`] and [`MockResolver`] record what the loader asked of them.
//! The crate's own tests run on these, and downstream harnesses can too.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{Engine, EngineModule, LocateFn, LogSink, ProgressSink, NO_TIMEOUT};
use crate::error::{EngineError, ResolveError};
use crate::protocol::{DownloadProgress, LogRecord, ProgressUpdate};
use crate::resolver::{AssetKind, AssetResolver};

/// Exit code the mock engine reports when its timeout halts a `spin` run.
pub const TIMEOUT_EXIT_CODE: i32 = 1;

/// Simulated cost of a `spin` invocation, in milliseconds.
const SPIN_COST_MS: i64 = 10_000;

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    exit_code: i32,
    timeout_ms: i64,
    last_timeout: Option<i64>,
    reset_count: u64,
    exec_count: u64,
}

fn fs_err(op: &'static str, path: &str, message: &str) -> EngineError {
    EngineError::Filesystem {
        op,
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A scriptable in-memory engine.
///
/// Argument conventions for [`Engine::exec`]:
/// - `noop` (or nothing): exits 0.
/// - `exit <code>`: exits with the given code.
/// - `spin`: a long-running job; halted by any timeout shorter than its
///   simulated cost, exiting with [`TIMEOUT_EXIT_CODE`].
/// - `fail <message>`: fails with an execution error.
///
/// Every run emits a log record; `spin` also emits progress updates.
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    logger: Option<LogSink>,
    progress: Option<ProgressSink>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Creates an engine with an empty filesystem rooted at `/`.
    #[must_use]
    pub fn new() -> Self {
        let mut state = MockState {
            timeout_ms: NO_TIMEOUT,
            ..MockState::default()
        };
        state.dirs.insert("/".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
            logger: None,
            progress: None,
        }
    }

    /// A probe sharing this engine's state, usable after the engine has
    /// been moved into a host.
    #[must_use]
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn log(&self, stream: &str, message: String) {
        if let Some(logger) = &self.logger {
            logger(LogRecord {
                stream: stream.to_string(),
                message,
            });
        }
    }

    fn emit_progress(&self, progress: f64, time: f64) {
        if let Some(sink) = &self.progress {
            sink(ProgressUpdate { progress, time });
        }
    }
}

impl Engine for MockEngine {
    fn set_timeout(&mut self, timeout_ms: i64) {
        let mut state = self.state();
        state.timeout_ms = timeout_ms;
        state.last_timeout = Some(timeout_ms);
    }

    fn exec(&mut self, args: &[String]) -> Result<(), EngineError> {
        self.log("stderr", format!("exec: {}", args.join(" ")));
        let (verb, rest) = match args.split_first() {
            Some((verb, rest)) => (verb.as_str(), rest),
            None => ("noop", &[] as &[String]),
        };
        let outcome = match verb {
            "noop" => Ok(0),
            "exit" => match rest.first().and_then(|c| c.parse::<i32>().ok()) {
                Some(code) => Ok(code),
                None => Err(EngineError::Execution {
                    message: "exit requires a numeric code".to_string(),
                }),
            },
            "spin" => {
                self.emit_progress(0.5, 0.5);
                let timeout = self.state().timeout_ms;
                if timeout >= 0 && timeout < SPIN_COST_MS {
                    self.log("stderr", "spin halted by timeout".to_string());
                    Ok(TIMEOUT_EXIT_CODE)
                } else {
                    self.emit_progress(1.0, 1.0);
                    Ok(0)
                }
            }
            "fail" => Err(EngineError::Execution {
                message: rest.first().cloned().unwrap_or_else(|| "failed".to_string()),
            }),
            other => Err(EngineError::Execution {
                message: format!("unknown verb '{other}'"),
            }),
        };
        let mut state = self.state();
        state.exec_count += 1;
        state.exit_code = outcome?;
        Ok(())
    }

    fn exit_code(&self) -> i32 {
        self.state().exit_code
    }

    fn reset(&mut self) {
        let mut state = self.state();
        state.exit_code = 0;
        state.timeout_ms = NO_TIMEOUT;
        state.reset_count += 1;
    }

    fn set_logger(&mut self, sink: LogSink) {
        self.logger = Some(sink);
    }

    fn set_progress(&mut self, sink: ProgressSink) {
        self.progress = Some(sink);
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = normalize(path);
        let mut state = self.state();
        if !state.dirs.contains(&parent(&path)) {
            return Err(fs_err("writeFile", &path, "parent directory does not exist"));
        }
        if state.dirs.contains(&path) {
            return Err(fs_err("writeFile", &path, "is a directory"));
        }
        state.files.insert(path, data.to_vec());
        Ok(())
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, EngineError> {
        let path = normalize(path);
        self.state()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| fs_err("readFile", &path, "no such file"))
    }

    fn delete_file(&mut self, path: &str) -> Result<(), EngineError> {
        let path = normalize(path);
        self.state()
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| fs_err("deleteFile", &path, "no such file"))
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(), EngineError> {
        let old_path = normalize(old_path);
        let new_path = normalize(new_path);
        let mut state = self.state();
        if !state.dirs.contains(&parent(&new_path)) {
            return Err(fs_err("rename", &new_path, "parent directory does not exist"));
        }
        if let Some(data) = state.files.remove(&old_path) {
            state.files.insert(new_path, data);
            return Ok(());
        }
        if state.dirs.remove(&old_path) {
            state.dirs.insert(new_path);
            return Ok(());
        }
        Err(fs_err("rename", &old_path, "no such file or directory"))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), EngineError> {
        let path = normalize(path);
        let mut state = self.state();
        if !state.dirs.contains(&parent(&path)) {
            return Err(fs_err("createDir", &path, "parent directory does not exist"));
        }
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(fs_err("createDir", &path, "already exists"));
        }
        state.dirs.insert(path);
        Ok(())
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<String>, EngineError> {
        let path = normalize(path);
        let state = self.state();
        if !state.dirs.contains(&path) {
            return Err(fs_err("listDir", &path, "no such directory"));
        }
        let mut entries = vec![".".to_string(), "..".to_string()];
        let is_child = |candidate: &str| parent(candidate) == path && candidate != path;
        entries.extend(
            state
                .dirs
                .iter()
                .map(String::as_str)
                .chain(state.files.keys().map(String::as_str))
                .filter(|candidate| is_child(candidate))
                .map(|candidate| basename(candidate).to_string()),
        );
        Ok(entries)
    }

    fn delete_dir(&mut self, path: &str) -> Result<(), EngineError> {
        let path = normalize(path);
        let mut state = self.state();
        if !state.dirs.contains(&path) {
            return Err(fs_err("deleteDir", &path, "no such directory"));
        }
        if path == "/" {
            return Err(fs_err("deleteDir", &path, "cannot remove the root"));
        }
        let occupied = state
            .dirs
            .iter()
            .map(String::as_str)
            .chain(state.files.keys().map(String::as_str))
            .any(|candidate| parent(candidate) == path && candidate != path);
        if occupied {
            return Err(fs_err("deleteDir", &path, "directory not empty"));
        }
        state.dirs.remove(&path);
        Ok(())
    }
}

/// Shared view into a [`MockEngine`]'s state.
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// How many times the engine has been reset.
    #[must_use]
    pub fn reset_count(&self) -> u64 {
        self.state().reset_count
    }

    /// How many executions have run.
    #[must_use]
    pub fn exec_count(&self) -> u64 {
        self.state().exec_count
    }

    /// The most recent timeout configured on the engine.
    #[must_use]
    pub fn last_timeout(&self) -> Option<i64> {
        self.state().last_timeout
    }

    /// A copy of the file at `path`, if present.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(&normalize(path)).cloned()
    }
}

#[derive(Default)]
struct ModuleInner {
    instantiations: u64,
    fail_next: Option<String>,
    last_core: Option<String>,
    last_wasm: Option<String>,
    last_worker: Option<String>,
    probe: Option<MockProbe>,
}

/// A recording engine module that hands out [`MockEngine`] instances.
#[derive(Clone, Default)]
pub struct MockModule {
    inner: Arc<Mutex<ModuleInner>>,
}

impl MockModule {
    /// Creates a module that instantiates successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, ModuleInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Makes the next instantiation fail with the given message.
    pub fn fail_next_instantiation(&self, message: &str) {
        self.inner().fail_next = Some(message.to_string());
    }

    /// Total instantiation attempts that succeeded.
    #[must_use]
    pub fn instantiations(&self) -> u64 {
        self.inner().instantiations
    }

    /// The core location handed to the most recent instantiation.
    #[must_use]
    pub fn last_core_location(&self) -> Option<String> {
        self.inner().last_core.clone()
    }

    /// What the locate callback answered for the binary payload.
    #[must_use]
    pub fn last_wasm_location(&self) -> Option<String> {
        self.inner().last_wasm.clone()
    }

    /// What the locate callback answered for the secondary worker.
    #[must_use]
    pub fn last_worker_location(&self) -> Option<String> {
        self.inner().last_worker.clone()
    }

    /// A probe into the most recently instantiated engine.
    #[must_use]
    pub fn probe(&self) -> Option<MockProbe> {
        self.inner().probe.clone()
    }
}

impl EngineModule for MockModule {
    fn instantiate(
        &self,
        core_location: &str,
        locate: LocateFn<'_>,
    ) -> Result<Box<dyn Engine>, EngineError> {
        let mut inner = self.inner();
        if let Some(message) = inner.fail_next.take() {
            return Err(EngineError::Instantiation { message });
        }
        // Replay the lookups a real engine performs while bootstrapping.
        inner.last_core = Some(core_location.to_string());
        inner.last_wasm = Some(locate("engine-core.wasm", ""));
        inner.last_worker = Some(locate("engine-core.worker.js", ""));

        let engine = MockEngine::new();
        inner.probe = Some(engine.probe());
        inner.instantiations += 1;
        Ok(Box::new(engine))
    }
}

#[derive(Default)]
struct ResolverInner {
    resolved: Vec<(String, AssetKind)>,
    fail_for: Option<String>,
}

/// A recording resolver that prefixes locations with `blob:`.
///
/// Emits a two-step download-progress sequence per resolution.
#[derive(Clone, Default)]
pub struct MockResolver {
    inner: Arc<Mutex<ResolverInner>>,
}

impl MockResolver {
    /// Creates a resolver that resolves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Makes resolution fail for the given location.
    pub fn fail_for(&self, url: &str) {
        self.inner().fail_for = Some(url.to_string());
    }

    /// Every location resolved so far, in order.
    #[must_use]
    pub fn resolved(&self) -> Vec<(String, AssetKind)> {
        self.inner().resolved.clone()
    }
}

impl AssetResolver for MockResolver {
    fn resolve(
        &self,
        url: &str,
        asset_kind: AssetKind,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<String, ResolveError> {
        {
            let mut inner = self.inner();
            if inner.fail_for.as_deref() == Some(url) {
                return Err(ResolveError::Fetch {
                    url: url.to_string(),
                    message: "mock fetch failure".to_string(),
                });
            }
            inner.resolved.push((url.to_string(), asset_kind));
        }
        progress(DownloadProgress {
            url: url.to_string(),
            received: 512,
            total: Some(1024),
            done: false,
        });
        progress(DownloadProgress {
            url: url.to_string(),
            received: 1024,
            total: Some(1024),
            done: true,
        });
        Ok(format!("blob:{url}"))
    }
}
