//! Request-scoped context handed to resolver plug-ins
//!
//! The framework attaches the request namespace and the resolver's
//! configuration mapping before Validate/Resolve run. Plug-ins read from
//! this context; they never reach back into the control plane themselves.

use std::collections::BTreeMap;

/// Scoped information injected into every resolver call.
///
/// Carries the namespace the request originates from (consumed by
/// resolvers that need it for authorization) and the key→value
/// configuration loaded from the resolver's named config object.
/// Unrecognized keys pass through untouched.
#[derive(Clone, Debug, Default)]
pub struct ResolutionContext {
    namespace: String,
    config: BTreeMap<String, String>,
}

impl ResolutionContext {
    /// Context for one reconcile of a request in `namespace`
    pub fn new(namespace: impl Into<String>, config: BTreeMap<String, String>) -> Self {
        Self {
            namespace: namespace.into(),
            config,
        }
    }

    /// Context with no request in flight, used at controller wiring time
    /// (e.g. asking a resolver for its selector)
    pub fn background() -> Self {
        Self::default()
    }

    /// Namespace the request originates from
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolver configuration mapping
    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_carries_namespace_and_config() {
        let config = BTreeMap::from([("fetch-timeout".to_string(), "1m".to_string())]);
        let ctx = ResolutionContext::new("tenant-a", config);
        assert_eq!(ctx.namespace(), "tenant-a");
        assert_eq!(ctx.config().get("fetch-timeout").unwrap(), "1m");
    }

    #[test]
    fn background_context_is_empty() {
        let ctx = ResolutionContext::background();
        assert_eq!(ctx.namespace(), "");
        assert!(ctx.config().is_empty());
    }
}
