//! Reconciliation logic for ResolutionRequest records
//!
//! The reconciler turns an observed request into either a populated
//! success status or a terminal failure, under a bounded resolution
//! deadline and in the presence of concurrent workers and external-API
//! races. It follows the Kubernetes controller pattern: the work-queue
//! delivers a key, the reconciler drives the record to a terminal state,
//! and the error policy translates classified failures into queue
//! behavior.

mod client;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, warn};

use crate::config::ConfigSource;
use crate::crd::{Condition, ConditionStatus, ResolutionRequest};
use crate::error::{ReconcileError, ResolutionError, REASON_RESOLVED};
use crate::leader::LeaderGate;
use crate::resolver::{ResolutionContext, ResolvedArtifact, Resolver};
use crate::DEFAULT_MAXIMUM_RESOLUTION_DURATION;

pub use client::{KubeRequestClient, ReflectorStore, RequestClient, RequestStore};

#[cfg(test)]
pub use client::{MockRequestClient, MockRequestStore};

/// Component name used in fetch errors for the request record itself
const REQUEST_LISTER_NAME: &str = "resolutionrequest";

/// Drives ResolutionRequest records to a terminal state.
///
/// Performs the functionality common to all resolvers and delegates the
/// domain-specific fetch to the embedded plug-in. All fields are read-only
/// after construction; every piece of mutable state lives in the request
/// record at the control plane.
pub struct Reconciler<R> {
    resolver: Arc<R>,
    store: Arc<dyn RequestStore>,
    client: Arc<dyn RequestClient>,
    config: Arc<dyn ConfigSource>,
    leader: Arc<dyn LeaderGate>,
}

impl<R: Resolver> Reconciler<R> {
    /// New reconciler around the given resolver and control-plane seams
    pub fn new(
        resolver: Arc<R>,
        store: Arc<dyn RequestStore>,
        client: Arc<dyn RequestClient>,
        config: Arc<dyn ConfigSource>,
        leader: Arc<dyn LeaderGate>,
    ) -> Self {
        Self {
            resolver,
            store,
            client,
            config,
            leader,
        }
    }

    /// Reconcile one request key of the form "namespace/name".
    ///
    /// Looks the request up, short-circuits if it is already terminal and
    /// otherwise runs the resolver under the resolution deadline. Returns
    /// `Ok` for terminal writes and idempotent skips; permanent errors for
    /// every classified failure.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn reconcile(&self, key: &str) -> Result<(), ReconcileError> {
        let Some((namespace, name)) = split_key(key) else {
            return Err(ReconcileError::permanent(
                ResolutionError::InvalidResourceKey(key.to_string()),
            ));
        };

        // Non-leaders receive keys from the shared queue but must not
        // mutate the record.
        if !self.leader.is_leader(key) {
            debug!("not the leader for this key, skipping");
            return Ok(());
        }

        let rr = match self.store.get(namespace, name) {
            Some(rr) => rr,
            None => {
                return Err(ReconcileError::permanent(
                    ResolutionError::GettingResource {
                        resolver_name: REQUEST_LISTER_NAME.to_string(),
                        key: key.to_string(),
                        message: "resolution request not found".to_string(),
                    },
                ));
            }
        };

        if rr.is_done() {
            debug!("request already terminal, skipping redelivery");
            return Ok(());
        }

        let rcx = self.request_context(namespace).await;
        self.resolve(&rcx, key, &rr).await
    }

    /// Build the per-reconcile context: request namespace plus the
    /// resolver's configuration mapping. A config load failure degrades to
    /// an empty mapping rather than failing the reconcile.
    async fn request_context(&self, namespace: &str) -> ResolutionContext {
        let config_name = self.resolver.get_config_name(&ResolutionContext::background());
        let config = match self.config.load(&config_name).await {
            Ok(config) => config,
            Err(e) => {
                warn!(config = %config_name, error = %e, "error loading resolver config, using empty mapping");
                BTreeMap::new()
            }
        };
        ResolutionContext::new(namespace, config)
    }

    /// Effective resolution deadline: the plug-in may shrink the framework
    /// maximum but never extend it.
    fn resolution_timeout(&self, rcx: &ResolutionContext) -> Duration {
        self.resolver
            .get_resolution_timeout(rcx, DEFAULT_MAXIMUM_RESOLUTION_DURATION)
            .min(DEFAULT_MAXIMUM_RESOLUTION_DURATION)
    }

    /// Run validate-then-resolve on a worker task and arbitrate between
    /// worker outcome and the resolution deadline.
    ///
    /// The worker posts exactly one tagged outcome into a capacity-one
    /// slot; the send is discarded if the deadline already fired. Status
    /// writes happen on this task, which outlives the deadline.
    async fn resolve(
        &self,
        rcx: &ResolutionContext,
        key: &str,
        rr: &ResolutionRequest,
    ) -> Result<(), ReconcileError> {
        let timeout = self.resolution_timeout(rcx);

        let (tx, rx) = oneshot::channel();
        let resolver = Arc::clone(&self.resolver);
        let params = rr.spec.parameters.clone();
        let worker_ctx = rcx.clone();
        let worker_key = key.to_string();
        let worker = tokio::spawn(async move {
            let outcome = match resolver.validate_params(&worker_ctx, &params).await {
                Err(e) => Err(ResolutionError::InvalidRequest {
                    key: worker_key,
                    message: e.to_string(),
                }),
                Ok(()) => match resolver.resolve(&worker_ctx, &params).await {
                    Err(e) => Err(ResolutionError::GettingResource {
                        resolver_name: resolver.get_name(&worker_ctx),
                        key: worker_key,
                        message: e.to_string(),
                    }),
                    Ok(artifact) => Ok(artifact),
                },
            };
            let _ = tx.send(outcome);
        });

        tokio::select! {
            outcome = rx => match outcome {
                Ok(Ok(artifact)) => self.write_resolved_data(key, rr, artifact).await,
                Ok(Err(err)) => Err(self.on_error(Some(rr), err).await),
                // The worker died without posting an outcome. Nothing
                // classified this, so hand the queue a retryable error.
                Err(_) => Err(ReconcileError::transient(ResolutionError::unknown(
                    "resolution worker exited without a result",
                ))),
            },
            _ = tokio::time::sleep(timeout) => {
                worker.abort();
                Err(self
                    .on_error(Some(rr), ResolutionError::Timeout {
                        key: key.to_string(),
                        timeout,
                    })
                    .await)
            }
        }
    }

    /// Terminal failure handling: best-effort MarkFailed, then a permanent
    /// wrapper so the queue never redelivers the key. A failure to record
    /// the failure is logged and must not mask the original cause.
    async fn on_error(
        &self,
        rr: Option<&ResolutionRequest>,
        err: ResolutionError,
    ) -> ReconcileError {
        if let Some(rr) = rr {
            if let Err(write_err) = self.mark_failed(rr, &err).await {
                warn!(error = %write_err, "error marking resolution request as failed");
            }
        }
        ReconcileError::permanent(err)
    }

    /// Mark the request as terminally failed.
    ///
    /// Re-fetches through the writing client (not the lister) so the
    /// latest generation and status are observed; a record a concurrent
    /// writer already finalized is left untouched.
    pub async fn mark_failed(
        &self,
        rr: &ResolutionRequest,
        err: &ResolutionError,
    ) -> Result<(), ResolutionError> {
        let namespace = rr.namespace().unwrap_or_default();
        let name = rr.name_any();
        let key = format!("{namespace}/{name}");
        let reason = err.reason();

        let mut latest = match self.client.get(&namespace, &name).await {
            Ok(latest) => latest,
            Err(get_err) => {
                warn!(key = %key, error = %get_err, "error getting latest generation of resolution request");
                return Err(get_err);
            }
        };
        if latest.is_done() {
            return Ok(());
        }

        latest
            .status
            .get_or_insert_with(Default::default)
            .mark_failed(reason, &err.to_string());
        if let Err(update_err) = self.client.update_status(&latest).await {
            warn!(key = %key, error = %update_err, "error marking resolution request as failed");
            return Err(update_err);
        }
        Ok(())
    }

    /// Write the resolved artifact into the request status.
    ///
    /// The bytes are strict-base64 encoded and merge-patched together with
    /// the resolver's annotations and the Succeeded=True condition, closing
    /// the state machine in a single write.
    async fn write_resolved_data(
        &self,
        key: &str,
        rr: &ResolutionRequest,
        artifact: ResolvedArtifact,
    ) -> Result<(), ReconcileError> {
        let namespace = rr.namespace().unwrap_or_default();
        let name = rr.name_any();

        let patch = StatusDataPatch {
            annotations: artifact.annotations,
            data: STANDARD.encode(&artifact.data),
            conditions: vec![Condition::succeeded(
                ConditionStatus::True,
                REASON_RESOLVED,
                "",
            )],
        };
        let body = match serde_json::to_value(patch) {
            Ok(status) => serde_json::json!({ "status": status }),
            Err(e) => {
                let err = ResolutionError::UpdatingRequest {
                    key: key.to_string(),
                    message: format!("error serializing resource request patch: {e}"),
                };
                return Err(self.on_error(Some(rr), err).await);
            }
        };

        if let Err(patch_err) = self.client.patch_status(&namespace, &name, &body).await {
            let err = ResolutionError::UpdatingRequest {
                key: key.to_string(),
                message: patch_err.to_string(),
            };
            return Err(self.on_error(Some(rr), err).await);
        }
        Ok(())
    }
}

/// JSON shape merge-patched into a request's status on success
#[derive(Serialize)]
struct StatusDataPatch {
    annotations: BTreeMap<String, String>,
    data: String,
    conditions: Vec<Condition>,
}

/// Split a work-queue key into (namespace, name)
fn split_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}

/// Reconcile entry point for the controller runtime
pub async fn reconcile<R: Resolver>(
    request: Arc<ResolutionRequest>,
    reconciler: Arc<Reconciler<R>>,
) -> Result<Action, ReconcileError> {
    let key = format!(
        "{}/{}",
        request.namespace().unwrap_or_default(),
        request.name_any()
    );
    reconciler.reconcile(&key).await?;
    // Terminal write or idempotent skip; wait for a spec change.
    Ok(Action::await_change())
}

/// Error policy for the controller runtime.
///
/// Classified failures are permanent: redelivery cannot help, so the queue
/// waits for a spec change. Everything else is retried with backoff.
pub fn error_policy<R: Resolver>(
    request: Arc<ResolutionRequest>,
    error: &ReconcileError,
    _reconciler: Arc<Reconciler<R>>,
) -> Action {
    error!(
        error = %error,
        request = %request.name_any(),
        "reconciliation failed"
    );
    if error.is_permanent() {
        Action::await_change()
    } else {
        Action::requeue(Duration::from_secs(5))
    }
}
