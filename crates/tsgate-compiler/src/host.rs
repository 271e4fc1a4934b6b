//! Compilation Host
//!
//! Builds the in-memory module graph for one compilation pass and serves it
//! to the language service.
//!
//! # Ingestion
//!
//! Every module goes through one *ingest task*: fetch (bypass marker plus
//! no-cache), parse, rewrite specifiers, register. Tasks are shared futures
//! kept in a single-flight table, so concurrent discoverers of the same path
//! attach to the same task and upstream sees one fetch per path.
//!
//! Rewriting a module reports its dependencies through the
//! [`DependencySink`]; the host creates (but does not poll) a task for each
//! one and files it in the containing module's resolve queue. A root or
//! library registration then drives the queues of its whole transitive
//! closure with a `FuturesUnordered`, so nothing is spawned and no lock is
//! held across an await. The first failure anywhere in the closure fails the
//! registration.
//!
//! Tasks only hold the host state weakly while they wait on upstream, so
//! dropping a host frees its graph even when a pass stopped halfway.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tsgate_module::{ModulePath, ModuleRecord, ModuleRegistry, ScriptKind};
use tsgate_upstream::{fetch_source, source_url, FetchError, ResponseHead, Upstream, UpstreamResponse};
use url::Url;

use crate::diagnostics::{DiagnosticKind, DiagnosticsResult};
use crate::emit::{CombinedEmitOutput, CompiledOutput};
use crate::error::HostError;
use crate::options::CompilerOptions;
use crate::rewriter::{Dependency, DependencySink, ImportRewriter};
use crate::service::{LanguageService, LanguageServiceHost};

/// Shared fetch-parse-rewrite-register task for one module
pub type IngestTask = Shared<BoxFuture<'static, Result<Arc<ModuleRecord>, HostError>>>;

/// In-memory declaration file with an explicit version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraLib {
    /// Declaration source
    pub content: String,
    /// Content version
    pub version: u32,
}

/// Where a host fetches from and how it compiles
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Origin that root-absolute module paths resolve against
    pub origin: Url,
    /// Base URL of `lib.*.d.ts` files
    pub lib_base: Url,
    /// Compiler options of the pass
    pub options: CompilerOptions,
}

impl HostConfig {
    /// Config with default compiler options
    #[must_use]
    pub fn new(origin: Url, lib_base: Url) -> Self {
        Self {
            origin,
            lib_base,
            options: CompilerOptions::default(),
        }
    }

    /// Replace compiler options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Default)]
struct Inflight {
    tasks: HashMap<ModulePath, IngestTask>,
    failures: HashMap<ModulePath, HostError>,
}

struct HostState {
    upstream: Arc<dyn Upstream>,
    config: HostConfig,
    registry: ModuleRegistry,
    extra_libs: RwLock<IndexMap<ModulePath, Arc<ModuleRecord>>>,
    inflight: Mutex<Inflight>,
    /// Containing module → dependency → task, drained by closure waits
    resolve_queues: Mutex<HashMap<ModulePath, IndexMap<ModulePath, IngestTask>>>,
}

/// Incremental compilation host for one pass
///
/// Cheap to clone; clones share the module graph.
#[derive(Clone)]
pub struct CompilationHost {
    state: Arc<HostState>,
    service: Arc<LanguageService>,
}

impl fmt::Debug for CompilationHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationHost")
            .field("origin", &self.state.config.origin.as_str())
            .field("modules", &self.state.registry.len())
            .field("extra_libs", &self.state.extra_libs.read().len())
            .finish_non_exhaustive()
    }
}

impl CompilationHost {
    /// Create host
    #[must_use]
    pub fn new(upstream: Arc<dyn Upstream>, config: HostConfig) -> Self {
        Self {
            state: Arc::new(HostState {
                upstream,
                config,
                registry: ModuleRegistry::new(),
                extra_libs: RwLock::new(IndexMap::new()),
                inflight: Mutex::new(Inflight::default()),
                resolve_queues: Mutex::new(HashMap::new()),
            }),
            service: Arc::new(LanguageService::new()),
        }
    }

    /// Compiler options
    #[inline]
    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        &self.state.config.options
    }

    /// Registered modules and libraries
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.state.registry
    }

    /// Language service over this host
    #[inline]
    #[must_use]
    pub fn language_service(&self) -> &LanguageService {
        &self.service
    }

    /// Register a root module and its transitive closure
    ///
    /// `response` is the already-fetched upstream response for `url`, if the
    /// caller has one. Returns the existing record when `path` is already
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, parse or locate failure anywhere in the
    /// closure.
    pub async fn add_root_file(
        &self,
        path: ModulePath,
        url: Url,
        response: Option<UpstreamResponse>,
    ) -> Result<Arc<ModuleRecord>, HostError> {
        let record = self.state.ingest(path, url, response).await?;
        self.state.await_closure(&record).await?;
        tracing::debug!(
            path = %record.path,
            modules = self.state.registry.len(),
            "Root module registered with its closure"
        );
        Ok(record)
    }

    /// [`Self::add_root_file`] keyed by the URL's path
    ///
    /// # Errors
    ///
    /// See [`Self::add_root_file`].
    pub async fn add_root_url(
        &self,
        url: &Url,
        response: Option<UpstreamResponse>,
    ) -> Result<Arc<ModuleRecord>, HostError> {
        let source = source_url(url);
        self.add_root_file(ModulePath::from_url(&source), source, response)
            .await
    }

    /// Register an ambient library by name (`ES2015`, `dom`)
    ///
    /// # Errors
    ///
    /// Returns the first failure of the library or the libraries it
    /// references.
    pub async fn add_lib_file(&self, name: &str) -> Result<Arc<ModuleRecord>, HostError> {
        let path = ModulePath::library(name);
        let url = self.state.url_for(&path)?;
        self.add_root_file(path, url, None).await
    }

    /// Register libraries one after another; `None` uses the `lib` option
    ///
    /// # Errors
    ///
    /// Returns the first library failure.
    pub async fn add_lib_files(&self, names: Option<&[String]>) -> Result<(), HostError> {
        let names = names
            .map(<[String]>::to_vec)
            .or_else(|| self.options().lib.clone())
            .unwrap_or_default();
        for name in &names {
            self.add_lib_file(name).await?;
        }
        Ok(())
    }

    /// Replace the in-memory declaration files
    ///
    /// Names starting with `/` are module paths; anything else is a library
    /// name.
    ///
    /// # Errors
    ///
    /// Returns an error if a name cannot be located or parsed.
    pub fn update_extra_libs(&self, libs: IndexMap<String, ExtraLib>) -> Result<(), HostError> {
        let mut parsed = IndexMap::with_capacity(libs.len());
        for (name, lib) in libs {
            let path = if name.starts_with('/') {
                ModulePath::parse(&name)?
            } else {
                ModulePath::library(&name)
            };
            let url = self.state.url_for(&path)?;
            let head = ResponseHead {
                url: url.clone(),
                status: 200,
                last_modified: None,
                content_type: None,
            };
            let mut record = ModuleRecord::parse(path.clone(), url, ScriptKind::Ts, lib.content, head)?;
            record.version = lib.version;
            parsed.insert(path, Arc::new(record));
        }
        tracing::debug!(count = parsed.len(), "Updated extra libraries");
        *self.state.extra_libs.write() = parsed;
        Ok(())
    }

    /// Replace a registered module's content, bumping its version
    ///
    /// The new text is rewritten like fetched content; new dependencies are
    /// ingested before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unregistered path, or the
    /// first failure of a new dependency.
    pub async fn update_file(
        &self,
        path: &ModulePath,
        text: impl Into<String>,
    ) -> Result<Arc<ModuleRecord>, HostError> {
        let current = self
            .state
            .registry
            .get(path)
            .ok_or_else(|| HostError::MissingModule(path.clone()))?;
        let record = ModuleRecord::parse(
            path.clone(),
            current.url.clone(),
            current.kind,
            text.into(),
            current.response.clone(),
        )?;
        let record = self.state.rewrite(record)?;
        let record = self.state.registry.replace(record)?;
        self.state.await_closure(&record).await?;
        Ok(record)
    }

    /// Diagnostics of one module: syntactic, semantic, suggestion
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for an unknown path.
    pub fn combined_diagnostics(&self, path: &ModulePath) -> Result<Vec<DiagnosticsResult>, HostError> {
        let service = &self.service;
        Ok(vec![
            DiagnosticsResult::new(
                DiagnosticKind::Syntactic,
                service.syntactic_diagnostics(self, path)?,
            ),
            DiagnosticsResult::new(
                DiagnosticKind::Semantic,
                service.semantic_diagnostics(self, path)?,
            ),
            DiagnosticsResult::new(
                DiagnosticKind::Suggestion,
                service.suggestion_diagnostics(self, path)?,
            ),
        ])
    }

    /// Compiled output and diagnostics of one registered module
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingModule`] for a path that was never
    /// registered.
    pub fn emit_output(&self, path: &ModulePath) -> Result<CompiledOutput, HostError> {
        let record = self
            .state
            .registry
            .get(path)
            .ok_or_else(|| HostError::MissingModule(path.clone()))?;
        let emitted = self.service.emit_output(self, path)?;
        let compiled = if emitted.emit_skipped {
            None
        } else {
            emitted.output_files.into_iter().next().map(|file| file.text)
        };

        Ok(CompiledOutput {
            path: path.clone(),
            url: record.url.clone(),
            compiled,
            diagnostics: self.combined_diagnostics(path)?,
            response: record.response.clone(),
        })
    }

    /// Outputs of every registered module in registration order
    ///
    /// With `noEmitOnError`, any error in the pass suppresses all output.
    ///
    /// # Errors
    ///
    /// Returns the first per-module failure.
    pub fn emit_outputs(&self) -> Result<CombinedEmitOutput, HostError> {
        let options_diagnostics = DiagnosticsResult::new(
            DiagnosticKind::CompilerOption,
            self.service.compiler_options_diagnostics(self),
        );

        let mut files = IndexMap::new();
        for path in self.state.registry.list() {
            let output = self.emit_output(&path)?;
            files.insert(path, output);
        }

        let has_errors = options_diagnostics.diagnostics.iter().any(|d| d.is_error())
            || files.values().any(CompiledOutput::has_errors);
        if has_errors && self.options().no_emit_on_error {
            tracing::debug!("Suppressing output of pass with errors (noEmitOnError)");
            for output in files.values_mut() {
                output.compiled = None;
            }
        }

        let combined = CombinedEmitOutput {
            files,
            diagnostics: options_diagnostics,
        };
        tracing::info!(
            modules = combined.files.len(),
            compiled = combined.compiled_count(),
            errors = combined.report().error_count(),
            "Compilation pass emitted"
        );
        Ok(combined)
    }
}

impl HostState {
    fn url_for(&self, path: &ModulePath) -> Result<Url, HostError> {
        let base = if path.is_library() {
            &self.config.lib_base
        } else {
            &self.config.origin
        };
        path.to_url(base).map_err(|e| HostError::locate(path, e))
    }

    fn extra_lib(&self, path: &ModulePath) -> Option<Arc<ModuleRecord>> {
        self.extra_libs.read().get(path).cloned()
    }

    /// Existing record, the in-flight task, or a new task
    fn ingest(
        self: &Arc<Self>,
        path: ModulePath,
        url: Url,
        response: Option<UpstreamResponse>,
    ) -> IngestTask {
        if let Some(record) = self.extra_lib(&path) {
            return ready(Ok(record));
        }

        let mut inflight = self.inflight.lock();
        if let Some(error) = inflight.failures.get(&path) {
            return ready(Err(error.clone()));
        }
        if let Some(record) = self.registry.get(&path) {
            return ready(Ok(record));
        }
        if let Some(task) = inflight.tasks.get(&path) {
            return task.clone();
        }

        tracing::debug!(path = %path, url = %url, "Starting ingestion");
        let task = fetch_and_register(
            Arc::downgrade(self),
            Arc::clone(&self.upstream),
            path.clone(),
            url,
            response,
        )
        .boxed()
        .shared();
        inflight.tasks.insert(path, task.clone());
        task
    }

    fn ingest_path(self: &Arc<Self>, path: &ModulePath) -> IngestTask {
        match self.url_for(path) {
            Ok(url) => self.ingest(path.clone(), url, None),
            Err(error) => ready(Err(error)),
        }
    }

    fn register(
        self: &Arc<Self>,
        path: ModulePath,
        loaded: Result<ModuleRecord, HostError>,
    ) -> Result<Arc<ModuleRecord>, HostError> {
        let mut inflight = self.inflight.lock();
        inflight.tasks.remove(&path);
        match loaded {
            Ok(record) => Ok(self.registry.register(record)),
            Err(error) => {
                tracing::debug!(path = %path, error = %error, "Ingestion failed");
                inflight.failures.insert(path, error.clone());
                Err(error)
            }
        }
    }

    fn parse(
        self: &Arc<Self>,
        path: &ModulePath,
        source: Url,
        response: &UpstreamResponse,
    ) -> Result<ModuleRecord, HostError> {
        let kind = ScriptKind::from_path(path.as_str(), self.config.options.allow_js);
        let head = response.head(&source);
        let record = ModuleRecord::parse(path.clone(), source, kind, response.text(), head)?;
        self.rewrite(record)
    }

    fn rewrite(self: &Arc<Self>, record: ModuleRecord) -> Result<ModuleRecord, HostError> {
        let result = ImportRewriter::new().rewrite(&record, &Sink(self));
        let dependencies = result.dependency_paths();
        Ok(record.rewrite(&result.edits, dependencies)?)
    }

    /// File a task for `dependency` in `containing`'s resolve queue
    fn enqueue(self: &Arc<Self>, containing: &ModulePath, dependency: &ModulePath) {
        if self.registry.contains(dependency) || self.extra_lib(dependency).is_some() {
            return;
        }
        let task = self.ingest_path(dependency);
        self.resolve_queues
            .lock()
            .entry(containing.clone())
            .or_default()
            .entry(dependency.clone())
            .or_insert(task);
    }

    /// Resolve every task reachable from `root`
    async fn await_closure(self: &Arc<Self>, root: &Arc<ModuleRecord>) -> Result<(), HostError> {
        let mut seen = HashSet::from([root.path.clone()]);
        let mut pending = FuturesUnordered::new();
        self.schedule(root, &mut seen, &mut pending);

        while let Some(result) = pending.next().await {
            let record = result?;
            self.schedule(&record, &mut seen, &mut pending);
        }
        Ok(())
    }

    fn schedule(
        self: &Arc<Self>,
        record: &ModuleRecord,
        seen: &mut HashSet<ModulePath>,
        pending: &mut FuturesUnordered<IngestTask>,
    ) {
        let mut queue = self
            .resolve_queues
            .lock()
            .remove(&record.path)
            .unwrap_or_default();
        for dependency in &record.dependencies {
            if !seen.insert(dependency.clone()) {
                continue;
            }
            let task = queue
                .shift_remove(dependency)
                .unwrap_or_else(|| self.ingest_path(dependency));
            pending.push(task);
        }
    }
}

struct Sink<'a>(&'a Arc<HostState>);

impl DependencySink for Sink<'_> {
    fn discover(&self, containing: &ModulePath, dependency: &Dependency) {
        self.0.enqueue(containing, &dependency.path);
    }
}

fn ready(result: Result<Arc<ModuleRecord>, HostError>) -> IngestTask {
    future::ready(result).boxed().shared()
}

/// Body of an ingest task; the state is upgraded only after the fetch
async fn fetch_and_register(
    state: Weak<HostState>,
    upstream: Arc<dyn Upstream>,
    path: ModulePath,
    url: Url,
    response: Option<UpstreamResponse>,
) -> Result<Arc<ModuleRecord>, HostError> {
    let source = source_url(&url);
    let fetched = match response {
        Some(response) if response.is_ok() => Ok(response),
        Some(response) => Err(HostError::from(FetchError::status(
            source.as_str(),
            response.status,
            response.status_text,
        ))),
        None => fetch_source(upstream.as_ref(), &url)
            .await
            .map_err(HostError::from),
    };

    let state = state.upgrade().ok_or(HostError::Released)?;
    let loaded = fetched.and_then(|response| state.parse(&path, source, &response));
    state.register(path, loaded)
}

impl LanguageServiceHost for CompilationHost {
    fn compilation_settings(&self) -> &CompilerOptions {
        &self.state.config.options
    }

    fn script_file_names(&self) -> Vec<ModulePath> {
        let mut names = self.state.registry.list();
        names.extend(self.state.extra_libs.read().keys().cloned());
        names
    }

    fn script_version(&self, path: &ModulePath) -> Option<u32> {
        self.source_file(path).map(|record| record.version)
    }

    fn file_exists(&self, path: &ModulePath) -> bool {
        self.state.registry.contains(path) || self.state.extra_libs.read().contains_key(path)
    }

    fn read_file(&self, path: &ModulePath) -> Option<String> {
        self.source_file(path).map(|record| record.text.clone())
    }

    fn source_file(&self, path: &ModulePath) -> Option<Arc<ModuleRecord>> {
        self.state
            .registry
            .get(path)
            .or_else(|| self.state.extra_lib(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsgate_test_utils::{lib_base, origin, url, StaticUpstream};

    fn host(upstream: StaticUpstream) -> CompilationHost {
        CompilationHost::new(Arc::new(upstream), HostConfig::new(origin(), lib_base()))
    }

    #[tokio::test]
    async fn failed_pass_releases_host_state() {
        let host = host(
            StaticUpstream::new()
                .with_file("/main.ts", "import { a } from './a';\nimport { b } from './b';\nconsole.log(a, b);\n")
                .with_file("/a.ts", "import { c } from './c';\nexport const a = c;\n")
                .with_file("/c.ts", "export const c = 1;\n"),
        );
        let state = Arc::downgrade(&host.state);

        let result = host.add_root_url(&url("/main.ts"), None).await;

        assert!(matches!(result, Err(HostError::Fetch(_))));
        drop(host);
        assert!(state.upgrade().is_none());
    }

    #[tokio::test]
    async fn completed_pass_releases_host_state() {
        let host = host(
            StaticUpstream::new()
                .with_file("/main.ts", "import { a } from './a';\nconsole.log(a);\n")
                .with_file("/a.ts", "export const a = 1;\n"),
        );
        let state = Arc::downgrade(&host.state);

        host.add_root_url(&url("/main.ts"), None).await.unwrap();

        drop(host);
        assert!(state.upgrade().is_none());
    }

    #[tokio::test]
    async fn abandoned_task_reports_released_host() {
        let host = host(StaticUpstream::new().with_file("/a.ts", "export const a = 1;\n"));
        let task = host.state.ingest(path_of("/a.ts"), url("/a.ts"), None);

        drop(host);

        assert!(matches!(task.await, Err(HostError::Released)));
    }

    fn path_of(p: &str) -> ModulePath {
        ModulePath::parse(p).unwrap()
    }
}
