//! Policy lookup by name.
//!
//! The gateway does not know concrete policies. It asks a [`PolicyRegistry`]
//! to instantiate one from a [`ResolvedPolicy`]; an unknown name or a broken
//! configuration comes back as a [`PolicyLookupError`] value so the caller can
//! drop that single entry and carry on.

use dashmap::DashMap;
use hermes_core::ExecutionPhase;
use hermes_flow::ResolvedPolicy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::policy::{ConditionalPolicy, Policy};

/// Why a policy could not be produced.
#[derive(Debug, Error)]
pub enum PolicyLookupError {
    /// No plugin is registered under the name.
    #[error("no policy registered under '{policy}'")]
    NotFound {
        /// Requested policy name.
        policy: String,
    },

    /// The plugin does not run on the requested phase.
    #[error("policy '{policy}' does not support phase '{phase}'")]
    UnsupportedPhase {
        /// Requested policy name.
        policy: String,
        /// Requested phase.
        phase: ExecutionPhase,
    },

    /// The plugin rejected its configuration.
    #[error("policy '{policy}' could not be instantiated: {source}")]
    Instantiation {
        /// Requested policy name.
        policy: String,
        /// The plugin's error.
        #[source]
        source: anyhow::Error,
    },
}

impl PolicyLookupError {
    /// Returns the requested policy name.
    pub fn policy(&self) -> &str {
        match self {
            Self::NotFound { policy }
            | Self::UnsupportedPhase { policy, .. }
            | Self::Instantiation { policy, .. } => policy,
        }
    }
}

/// Instantiates policies from their declarations.
pub trait PolicyRegistry: Send + Sync {
    /// Creates the policy declared by `policy` for `phase`.
    ///
    /// A declared condition must be honored by the returned instance.
    fn create(
        &self,
        phase: ExecutionPhase,
        policy: &ResolvedPolicy,
    ) -> Result<Arc<dyn Policy>, PolicyLookupError>;
}

impl<R: PolicyRegistry + ?Sized> PolicyRegistry for Arc<R> {
    fn create(
        &self,
        phase: ExecutionPhase,
        policy: &ResolvedPolicy,
    ) -> Result<Arc<dyn Policy>, PolicyLookupError> {
        (**self).create(phase, policy)
    }
}

type Factory =
    Arc<dyn Fn(ExecutionPhase, &Value) -> anyhow::Result<Arc<dyn Policy>> + Send + Sync>;

struct Plugin {
    factory: Factory,
    phases: Vec<ExecutionPhase>,
}

/// In-memory registry of policy plugins keyed by name.
///
/// Plugins can be registered while requests are running; an instantiation
/// always sees either the old or the new plugin.
///
/// # Example
///
/// ```
/// use hermes_core::{ExecutionPhase, UnitOutcome};
/// use hermes_flow::ResolvedPolicy;
/// use hermes_policy::{FnPolicy, PolicyPluginRegistry, PolicyRegistry};
/// use serde::Deserialize;
/// use std::sync::Arc;
///
/// #[derive(Deserialize, Default)]
/// struct HeaderConfig {
///     #[serde(default)]
///     value: String,
/// }
///
/// let registry = PolicyPluginRegistry::new();
/// registry.register_configured("header", |config: HeaderConfig, _phase| {
///     Arc::new(FnPolicy::new("header", move |ctx, _phase| {
///         ctx.set_attribute("header", config.value.clone());
///         Ok(UnitOutcome::Continue)
///     }))
/// });
///
/// let declared = ResolvedPolicy::new("header", serde_json::json!({ "value": "x" }));
/// assert!(registry.create(ExecutionPhase::Request, &declared).is_ok());
///
/// let unknown = ResolvedPolicy::new("nope", serde_json::Value::Null);
/// assert!(registry.create(ExecutionPhase::Request, &unknown).is_err());
/// ```
#[derive(Default)]
pub struct PolicyPluginRegistry {
    plugins: DashMap<String, Plugin>,
}

impl PolicyPluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory usable on every phase, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(ExecutionPhase, &Value) -> anyhow::Result<Arc<dyn Policy>> + Send + Sync + 'static,
    {
        self.register_for_phases(name, [], factory);
    }

    /// Registers a factory restricted to `phases`; no phase means every phase.
    pub fn register_for_phases<F>(
        &self,
        name: impl Into<String>,
        phases: impl IntoIterator<Item = ExecutionPhase>,
        factory: F,
    ) where
        F: Fn(ExecutionPhase, &Value) -> anyhow::Result<Arc<dyn Policy>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(policy = %name, "policy plugin registered");
        self.plugins.insert(
            name,
            Plugin {
                factory: Arc::new(factory),
                phases: phases.into_iter().collect(),
            },
        );
    }

    /// Registers a factory taking a typed configuration.
    ///
    /// A missing (`null`) configuration is read as an empty object so that
    /// configurations with `#[serde(default)]` fields accept it.
    pub fn register_configured<C, F>(&self, name: impl Into<String>, build: F)
    where
        C: DeserializeOwned,
        F: Fn(C, ExecutionPhase) -> Arc<dyn Policy> + Send + Sync + 'static,
    {
        self.register(name, move |phase, configuration| {
            let configuration = match configuration {
                Value::Null => Value::Object(serde_json::Map::new()),
                other => other.clone(),
            };
            let config: C = serde_json::from_value(configuration)?;
            Ok(build(config, phase))
        });
    }

    /// Removes a plugin; returns true if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.plugins.remove(name).is_some()
    }

    /// Returns true if a plugin is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Returns the number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl PolicyRegistry for PolicyPluginRegistry {
    fn create(
        &self,
        phase: ExecutionPhase,
        policy: &ResolvedPolicy,
    ) -> Result<Arc<dyn Policy>, PolicyLookupError> {
        // Release the shard guard before running plugin code.
        let factory = {
            let plugin = self
                .plugins
                .get(&policy.name)
                .ok_or_else(|| PolicyLookupError::NotFound {
                    policy: policy.name.clone(),
                })?;
            if !plugin.phases.is_empty() && !plugin.phases.contains(&phase) {
                return Err(PolicyLookupError::UnsupportedPhase {
                    policy: policy.name.clone(),
                    phase,
                });
            }
            Arc::clone(&plugin.factory)
        };

        let instance =
            factory(phase, &policy.configuration).map_err(|source| PolicyLookupError::Instantiation {
                policy: policy.name.clone(),
                source,
            })?;

        Ok(match &policy.condition {
            Some(condition) => Arc::new(ConditionalPolicy::new(instance, condition.clone())),
            None => instance,
        })
    }
}

impl std::fmt::Debug for PolicyPluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyPluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
