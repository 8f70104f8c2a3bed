//! Control-plane access for the reconciler
//!
//! Two seams are abstracted behind traits so reconcile logic can be tested
//! with mock clients: the read-through lister fed by the watch cache, and
//! the writing client used for status mutations. The writing client always
//! talks to the control plane directly so MarkFailed observes the latest
//! generation, never a stale cache entry.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::crd::ResolutionRequest;
use crate::error::ResolutionError;

/// Read-through lister over the shared watch cache
#[cfg_attr(test, automock)]
pub trait RequestStore: Send + Sync {
    /// Cached request for `(namespace, name)`, if the cache has observed it
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ResolutionRequest>>;
}

/// Lister backed by the controller's reflector store
pub struct ReflectorStore {
    store: Store<ResolutionRequest>,
}

impl ReflectorStore {
    /// Wrap the store handed out by the controller
    pub fn new(store: Store<ResolutionRequest>) -> Self {
        Self { store }
    }
}

impl RequestStore for ReflectorStore {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ResolutionRequest>> {
        self.store
            .get(&ObjectRef::new(name).within(namespace))
    }
}

/// Writing client for ResolutionRequest status operations
///
/// All three calls the core issues are here: re-fetch (MarkFailed only),
/// status replace (MarkFailed only) and status merge-patch (success only).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestClient: Send + Sync {
    /// Fetch the latest generation of a request from the control plane
    async fn get(&self, namespace: &str, name: &str)
        -> Result<ResolutionRequest, ResolutionError>;

    /// Replace the status subresource with the one on `request`
    async fn update_status(&self, request: &ResolutionRequest) -> Result<(), ResolutionError>;

    /// JSON-merge-patch the status subresource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<(), ResolutionError>;
}

/// Real client issuing Kubernetes API calls
pub struct KubeRequestClient {
    client: Client,
}

impl KubeRequestClient {
    /// New client wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ResolutionRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl RequestClient for KubeRequestClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResolutionRequest, ResolutionError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn update_status(&self, request: &ResolutionRequest) -> Result<(), ResolutionError> {
        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        let body = serde_json::to_vec(request).map_err(|e| {
            ResolutionError::unknown(format!("error serializing resolution request: {e}"))
        })?;
        self.api(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<(), ResolutionError> {
        // Patch::Merge issues application/merge-patch+json
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(body))
            .await?;
        Ok(())
    }
}
