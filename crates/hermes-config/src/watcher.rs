//! Hot redeployment of flow definitions.
//!
//! [`DefinitionWatcher`] turns file system changes of the definition files
//! into [`DeploymentEvent`]s; [`DeploymentListener`] applies them to a
//! [`DeploymentRegistry`]. A definition that fails to load produces
//! [`DeploymentEvent::Rejected`] and the running generation stays in place.
//!
//! # Example
//!
//! ```no_run
//! use hermes_config::{DefinitionWatcher, DeploymentListener};
//! use hermes_flow::DeploymentRegistry;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), hermes_config::ConfigError> {
//! let registry = DeploymentRegistry::default();
//! let watcher = DefinitionWatcher::builder("api.yaml")
//!     .with_debounce(Duration::from_millis(300))
//!     .build()?;
//! registry.apply(watcher.reload());
//!
//! let (tx, rx) = mpsc::channel(16);
//! tokio::spawn(watcher.run(tx));
//! tokio::spawn(DeploymentListener::new(registry).run(rx));
//! # Ok(())
//! # }
//! ```

use hermes_flow::{DeploymentEvent, DeploymentRegistry};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::definition::load_deployment;
use crate::{ConfigError, DeploymentSection};

/// Builder for [`DefinitionWatcher`].
#[derive(Debug)]
pub struct DefinitionWatcherBuilder {
    api_path: PathBuf,
    organization_path: Option<PathBuf>,
    debounce: Duration,
}

impl DefinitionWatcherBuilder {
    /// Also watches an organization definition.
    #[must_use]
    pub fn organization(mut self, path: impl Into<PathBuf>) -> Self {
        self.organization_path = Some(path.into());
        self
    }

    /// Sets the quiet period after a change before reloading. Default 500ms.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Starts watching.
    ///
    /// The parent directories of the definition files are watched, so files
    /// replaced by rename are still seen.
    ///
    /// # Errors
    ///
    /// Fails if a definition file does not exist or the platform watcher
    /// cannot be created.
    pub fn build(self) -> Result<DefinitionWatcher, ConfigError> {
        let files: Vec<&Path> = std::iter::once(self.api_path.as_path())
            .chain(self.organization_path.as_deref())
            .collect();

        let mut directories = HashSet::new();
        let mut names = HashSet::new();
        for file in &files {
            if !file.exists() {
                return Err(ConfigError::file_not_found(file));
            }
            let directory = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            directories.insert(directory);
            if let Some(name) = file.file_name() {
                names.insert(name.to_os_string());
            }
        }

        let (tx, rx) = mpsc::channel(100);
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        })?;
        for directory in &directories {
            watcher.watch(directory, RecursiveMode::NonRecursive)?;
        }
        tracing::debug!(api = %self.api_path.display(), "watching flow definitions");

        Ok(DefinitionWatcher {
            _watcher: watcher,
            rx,
            names,
            api_path: self.api_path,
            organization_path: self.organization_path,
            debounce: self.debounce,
        })
    }
}

/// Emits a deployment event each time a definition file settles after a change.
pub struct DefinitionWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    names: HashSet<OsString>,
    api_path: PathBuf,
    organization_path: Option<PathBuf>,
    debounce: Duration,
}

impl DefinitionWatcher {
    /// Starts a builder for the API definition at `api_path`.
    pub fn builder(api_path: impl Into<PathBuf>) -> DefinitionWatcherBuilder {
        DefinitionWatcherBuilder {
            api_path: api_path.into(),
            organization_path: None,
            debounce: Duration::from_millis(500),
        }
    }

    /// Builds a watcher from the deployment section.
    ///
    /// # Errors
    ///
    /// Fails if `definitions_path` is unset or a file cannot be watched.
    pub fn from_section(section: &DeploymentSection) -> Result<Self, ConfigError> {
        let api_path = section.definitions_path.clone().ok_or_else(|| {
            ConfigError::validation_error("deployment.definitions_path is not set")
        })?;
        let mut builder = Self::builder(api_path).with_debounce(section.debounce());
        if let Some(organization) = &section.organization_path {
            builder = builder.organization(organization.clone());
        }
        builder.build()
    }

    /// Returns the watched API definition path.
    pub fn api_path(&self) -> &Path {
        &self.api_path
    }

    /// Loads the definitions now.
    pub fn reload(&self) -> DeploymentEvent {
        match load_deployment(&self.api_path, self.organization_path.as_deref()) {
            Ok(deployment) => DeploymentEvent::Deployed(Arc::new(deployment)),
            Err(error) => {
                tracing::warn!(path = %self.api_path.display(), %error, "flow definition rejected");
                DeploymentEvent::Rejected {
                    source: self.api_path.display().to_string(),
                    reason: error.to_string(),
                }
            }
        }
    }

    /// Waits for the next change and reloads.
    ///
    /// Changes arriving within the debounce period of the first one are
    /// folded into a single reload. Returns `None` once the platform watcher
    /// stops.
    pub async fn next_event(&mut self) -> Option<DeploymentEvent> {
        loop {
            let event = self.rx.recv().await?;
            if !self.is_relevant(&event) {
                continue;
            }

            tokio::time::sleep(self.debounce).await;
            while self.rx.try_recv().is_ok() {}
            return Some(self.reload());
        }
    }

    /// Forwards events to `tx` until the receiver or the watcher goes away.
    pub async fn run(mut self, tx: mpsc::Sender<DeploymentEvent>) {
        while let Some(event) = self.next_event().await {
            if tx.send(event).await.is_err() {
                break;
            }
        }
        tracing::debug!(api = %self.api_path.display(), "definition watcher stopped");
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .filter_map(|path| path.file_name())
                .any(|name| self.names.contains(name))
    }
}

impl std::fmt::Debug for DefinitionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionWatcher")
            .field("api_path", &self.api_path)
            .field("organization_path", &self.organization_path)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

/// Applies deployment events to a registry.
#[derive(Debug, Clone)]
pub struct DeploymentListener {
    registry: DeploymentRegistry,
}

impl DeploymentListener {
    /// Creates a listener updating `registry`.
    pub const fn new(registry: DeploymentRegistry) -> Self {
        Self { registry }
    }

    /// Applies events until the channel closes; returns how many generations
    /// were installed.
    pub async fn run(self, mut rx: mpsc::Receiver<DeploymentEvent>) -> usize {
        let mut installed = 0;
        while let Some(event) = rx.recv().await {
            if self.registry.apply(event) {
                installed += 1;
            }
        }
        installed
    }

    /// Runs the listener on a new task.
    pub fn spawn(self, rx: mpsc::Receiver<DeploymentEvent>) -> JoinHandle<usize> {
        tokio::spawn(self.run(rx))
    }
}
