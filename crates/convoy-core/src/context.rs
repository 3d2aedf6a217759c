//! Shared state for one run of a task tree.
//!
//! Every task in the tree, including concurrently running siblings, receives
//! the same [`Context`] by reference. Each sub-store has its own lock and every
//! accessor holds it only for the map access itself, so no lock is ever held
//! across a call into another task or across command execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::events::EventBus;
use crate::execution::Executor;
use crate::models::{CoreError, CoreErrorKind, CoreResult, VersionManifest};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
}

impl ContextConfig {
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid context config: {error}"),
            )
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HostOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Default)]
struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

#[derive(Default)]
struct OutputStore {
    outputs: Mutex<HashMap<String, HostOutput>>,
}

#[derive(Default)]
struct ManifestCache {
    manifests: RwLock<HashMap<String, Arc<VersionManifest>>>,
}

pub struct Context {
    events: EventBus,
    registry: ExecutorRegistry,
    outputs: OutputStore,
    manifests: ManifestCache,
    private_key_path: Option<PathBuf>,
    public_key_path: Option<PathBuf>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        let mut builder = Self::builder();
        if let Some(path) = &config.private_key_path {
            builder = builder.private_key_path(path);
        }
        if let Some(path) = &config.public_key_path {
            builder = builder.public_key_path(path);
        }
        builder.build()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn private_key_path(&self) -> Option<&PathBuf> {
        self.private_key_path.as_ref()
    }

    pub fn public_key_path(&self) -> Option<&PathBuf> {
        self.public_key_path.as_ref()
    }

    /// Returns the executor registered for `host`.
    ///
    /// A missing registration means the tree was built without the setup step
    /// for this host. That is reported as [`CoreErrorKind::NoExecutor`], which
    /// is fatal; use [`Context::find_executor`] when absence is expected.
    pub fn executor(&self, host: &str) -> CoreResult<Arc<dyn Executor>> {
        match self.find_executor(host) {
            Some(executor) => Ok(executor),
            None => {
                tracing::error!(host, "no executor initialized for host");
                Err(CoreError::no_executor(host))
            }
        }
    }

    pub fn find_executor(&self, host: &str) -> Option<Arc<dyn Executor>> {
        self.registry
            .executors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    pub fn set_executor(&self, host: impl Into<String>, executor: Arc<dyn Executor>) {
        self.registry
            .executors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.into(), executor);
    }

    pub fn outputs(&self, host: &str) -> Option<HostOutput> {
        self.outputs
            .outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    pub fn set_outputs(&self, host: impl Into<String>, stdout: Vec<u8>, stderr: Vec<u8>) {
        self.outputs
            .outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.into(), HostOutput { stdout, stderr });
    }

    pub fn manifest(&self, component: &str) -> Option<Arc<VersionManifest>> {
        self.manifests
            .manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .cloned()
    }

    pub fn set_manifest(&self, component: impl Into<String>, manifest: Arc<VersionManifest>) {
        self.manifests
            .manifests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(component.into(), manifest);
    }

    /// Returns the cached manifest for `component`, fetching it on a miss.
    ///
    /// `fetch` runs without the cache lock held. Two tasks missing at the same
    /// time may both fetch; the later insert wins.
    pub fn manifest_or_fetch(
        &self,
        component: &str,
        fetch: impl FnOnce(&str) -> CoreResult<VersionManifest>,
    ) -> CoreResult<Arc<VersionManifest>> {
        if let Some(manifest) = self.manifest(component) {
            return Ok(manifest);
        }

        tracing::debug!(component, "manifest cache miss");
        let manifest = Arc::new(fetch(component)?);
        self.set_manifest(component, Arc::clone(&manifest));
        Ok(manifest)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("events", &self.events)
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    events: Option<EventBus>,
    private_key_path: Option<PathBuf>,
    public_key_path: Option<PathBuf>,
}

impl ContextBuilder {
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    pub fn build(self) -> Context {
        Context {
            events: self.events.unwrap_or_default(),
            registry: ExecutorRegistry::default(),
            outputs: OutputStore::default(),
            manifests: ManifestCache::default(),
            private_key_path: self.private_key_path,
            public_key_path: self.public_key_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{Context, ContextConfig};
    use crate::models::{CoreError, CoreErrorKind, VersionManifest};

    #[test]
    fn outputs_overwrite_rather_than_accumulate() {
        let ctx = Context::new();
        ctx.set_outputs("db-1", b"first".to_vec(), b"".to_vec());
        ctx.set_outputs("db-1", b"second".to_vec(), b"warn".to_vec());

        let output = ctx.outputs("db-1").expect("outputs recorded");
        assert_eq!(output.stdout_text(), "second");
        assert_eq!(output.stderr_text(), "warn");
        assert!(ctx.outputs("db-2").is_none());
    }

    #[test]
    fn manifest_or_fetch_only_fetches_on_miss() {
        let ctx = Context::new();
        let mut fetches = 0;

        for _ in 0..3 {
            let manifest = ctx
                .manifest_or_fetch("store", |component| {
                    fetches += 1;
                    Ok(VersionManifest {
                        description: component.to_string(),
                        ..VersionManifest::default()
                    })
                })
                .expect("fetch should succeed");
            assert_eq!(manifest.description, "store");
        }

        assert_eq!(fetches, 1);
    }

    #[test]
    fn manifest_fetch_failure_is_not_cached() {
        let ctx = Context::new();
        let error = ctx
            .manifest_or_fetch("pd", |_| Err(CoreError::step_failure("mirror offline")))
            .unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::StepFailure);
        assert!(ctx.manifest("pd").is_none());
    }

    #[test]
    fn key_paths_come_from_config() {
        let config = ContextConfig::from_json_str(
            r#"{"private_key_path":"/home/ops/.ssh/id_rsa","public_key_path":"/home/ops/.ssh/id_rsa.pub"}"#,
        )
        .expect("config should parse");
        let ctx = Context::from_config(&config);

        assert_eq!(
            ctx.private_key_path().map(|path| path.as_path()),
            Some(Path::new("/home/ops/.ssh/id_rsa"))
        );
        assert_eq!(
            ctx.public_key_path().map(|path| path.as_path()),
            Some(Path::new("/home/ops/.ssh/id_rsa.pub"))
        );
    }

    #[test]
    fn empty_config_is_valid_and_malformed_config_is_rejected() {
        assert_eq!(
            ContextConfig::from_json_str("{}").expect("empty object parses"),
            ContextConfig::default()
        );

        let error = ContextConfig::from_json_str("{\"private_key_path\": 7}").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
