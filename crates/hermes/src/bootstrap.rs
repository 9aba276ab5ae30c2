//! Assembling a running gateway from a [`HermesConfig`].

use hermes_config::{load_deployment, DefinitionWatcher, DeploymentListener, HermesConfig};
use hermes_flow::DeploymentRegistry;
use hermes_policy::PolicyRegistry;
use hermes_telemetry::MetricsReporter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::HermesResult;
use crate::invoker::Invoker;
use crate::reactor::{ApiReactor, ReactorSettings};

/// Installs logging and metrics as configured.
///
/// Call once per process, before [`Gateway::start`].
pub fn init_telemetry(config: &HermesConfig) -> HermesResult<()> {
    hermes_telemetry::init_telemetry(&config.telemetry.to_telemetry_config())?;
    Ok(())
}

/// The deployment registry plus the tasks keeping it current.
#[derive(Debug)]
pub struct Deployments {
    registry: DeploymentRegistry,
    watcher: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<usize>>,
}

impl Deployments {
    /// Loads the configured definitions and, when asked, starts watching them.
    ///
    /// Without `deployment.definitions_path` the registry holds an empty
    /// deployment. Watching spawns tasks and needs a Tokio runtime.
    pub fn load(config: &HermesConfig) -> HermesResult<Self> {
        let section = &config.deployment;
        let registry = match &section.definitions_path {
            Some(path) => DeploymentRegistry::new(load_deployment(
                path,
                section.organization_path.as_deref(),
            )?),
            None => DeploymentRegistry::default(),
        };

        if !section.watch {
            return Ok(Self {
                registry,
                watcher: None,
                listener: None,
            });
        }

        let watcher = DefinitionWatcher::from_section(section)?;
        let (tx, rx) = mpsc::channel(100);
        let listener = DeploymentListener::new(registry.clone()).spawn(rx);
        tracing::info!(path = %watcher.api_path().display(), "watching flow definitions");
        let watcher = tokio::spawn(watcher.run(tx));

        Ok(Self {
            registry,
            watcher: Some(watcher),
            listener: Some(listener),
        })
    }

    /// Returns the registry.
    pub const fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    /// Returns true while definitions are being watched.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .as_ref()
            .is_some_and(|watcher| !watcher.is_finished())
    }

    /// Stops watching and returns how many generations were hot-deployed.
    pub async fn shutdown(mut self) -> usize {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        match self.listener.take() {
            Some(listener) => listener.await.unwrap_or_default(),
            None => 0,
        }
    }
}

/// A configured reactor together with its deployments.
#[derive(Debug)]
pub struct Gateway {
    reactor: Arc<ApiReactor>,
    deployments: Deployments,
}

impl Gateway {
    /// Loads deployments and builds a reactor with telemetry hooks and the
    /// metrics reporter attached.
    pub fn start(
        config: &HermesConfig,
        policies: Arc<dyn PolicyRegistry>,
        invoker: impl Invoker,
    ) -> HermesResult<Self> {
        let settings = ReactorSettings::from_config(config)?;
        let deployments = Deployments::load(config)?;
        let reactor = ApiReactor::builder(deployments.registry().clone())
            .policies(policies)
            .invoker(invoker)
            .settings(settings)
            .reporter(MetricsReporter)
            .with_telemetry_hooks()
            .build();
        tracing::info!(
            api = %deployments.registry().current().api_id(),
            watching = deployments.is_watching(),
            "gateway started"
        );

        Ok(Self {
            reactor: Arc::new(reactor),
            deployments,
        })
    }

    /// Returns the reactor; clone the `Arc` to share it across tasks.
    pub const fn reactor(&self) -> &Arc<ApiReactor> {
        &self.reactor
    }

    /// Returns the deployments.
    pub const fn deployments(&self) -> &Deployments {
        &self.deployments
    }

    /// Stops background tasks.
    pub async fn shutdown(self) -> usize {
        self.deployments.shutdown().await
    }
}
