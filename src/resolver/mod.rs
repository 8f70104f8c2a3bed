//! Resolver plug-in contract
//!
//! A resolver supplies the domain-specific fetch logic for one artifact
//! source (a Git repository, an OCI registry, ...). The framework owns
//! everything around it: dispatch, validation gating, timeout
//! enforcement, result encoding and status writes.

mod context;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BoxError;

pub use context::ResolutionContext;

/// Value object a resolver returns on success.
///
/// `data` may be empty; `annotations` may be empty but always exists.
/// The framework never mutates the payload bytes, it only transport-encodes
/// them into the request status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Raw artifact bytes
    pub data: Vec<u8>,
    /// Free-form metadata attached to the request status alongside the data
    pub annotations: BTreeMap<String, String>,
}

impl ResolvedArtifact {
    /// Artifact with the given bytes and no annotations
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Attach an annotation, returning self for chaining
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Contract every resolver plug-in satisfies.
///
/// `validate_params` must be pure and deterministic: no I/O, and a non-Ok
/// return iff the parameters cannot possibly be resolved. `resolve` may
/// perform arbitrary I/O but must return promptly when its task is
/// cancelled and must be idempotent in its returned bytes for fixed inputs
/// and upstream state.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Stable identifier embedded in error messages
    fn get_name(&self, ctx: &ResolutionContext) -> String;

    /// Label filter; only requests whose labels match are delivered.
    /// Must include the resolver-type key.
    fn get_selector(&self, ctx: &ResolutionContext) -> BTreeMap<String, String>;

    /// Name of the configuration object loaded into the context before
    /// Validate/Resolve run
    fn get_config_name(&self, ctx: &ResolutionContext) -> String;

    /// Inspect the parameter map; reject requests that cannot resolve
    async fn validate_params(
        &self,
        ctx: &ResolutionContext,
        params: &BTreeMap<String, String>,
    ) -> Result<(), BoxError>;

    /// Perform the fetch
    async fn resolve(
        &self,
        ctx: &ResolutionContext,
        params: &BTreeMap<String, String>,
    ) -> Result<ResolvedArtifact, BoxError>;

    /// Per-request timeout override sourced from the injected
    /// configuration. The framework clamps the result to its own maximum,
    /// so a plug-in can only shrink the deadline.
    fn get_resolution_timeout(&self, ctx: &ResolutionContext, default: Duration) -> Duration {
        let _ = ctx;
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_builder_attaches_annotations() {
        let artifact = ResolvedArtifact::new(b"hello".to_vec())
            .annotation("content-type", "text/plain")
            .annotation("commit", "abc123");
        assert_eq!(artifact.data, b"hello");
        assert_eq!(artifact.annotations.len(), 2);
        assert_eq!(artifact.annotations["content-type"], "text/plain");
    }

    #[test]
    fn empty_artifact_has_an_annotations_map() {
        let artifact = ResolvedArtifact::default();
        assert!(artifact.data.is_empty());
        assert!(artifact.annotations.is_empty());
    }
}
