//! Resolver configuration loading
//!
//! Each resolver names a configuration object; the framework loads it into
//! the per-reconcile context before Validate/Resolve run. The framework
//! neither reads nor validates the keys beyond transport, with one
//! exception: resolvers may honor a timeout override (see
//! `Resolver::get_resolution_timeout`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::error::ResolutionError;

/// Source of a resolver's key→value configuration mapping
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load the mapping stored under `name`. A missing object yields an
    /// empty mapping, not an error.
    async fn load(&self, name: &str) -> Result<BTreeMap<String, String>, ResolutionError>;
}

/// ConfigMap-backed source reading from the operator namespace
pub struct ConfigMapSource {
    client: Client,
    namespace: String,
}

impl ConfigMapSource {
    /// New source reading ConfigMaps from `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl ConfigSource for ConfigMapSource {
    async fn load(&self, name: &str) -> Result<BTreeMap<String, String>, ResolutionError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get_opt(name).await? {
            Some(cm) => Ok(cm.data.unwrap_or_default()),
            None => Ok(BTreeMap::new()),
        }
    }
}

/// Fixed in-memory configuration, used in tests and standalone tooling
#[derive(Clone, Debug, Default)]
pub struct StaticConfig(
    /// The mapping returned for every load
    pub BTreeMap<String, String>,
);

#[async_trait]
impl ConfigSource for StaticConfig {
    async fn load(&self, _name: &str) -> Result<BTreeMap<String, String>, ResolutionError> {
        Ok(self.0.clone())
    }
}
