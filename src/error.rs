//! Error types for the resolution framework
//!
//! Every terminal failure of a reconcile is classified into one of the
//! kinds below. The kind determines the `reason` written into the
//! Succeeded condition and whether the controller runtime is told to
//! retry the key.

use std::time::Duration;

use thiserror::Error;

/// Condition reason for a successfully resolved request
pub const REASON_RESOLVED: &str = "Resolved";

/// Condition reason for a generic resolution failure
pub const REASON_RESOLUTION_FAILED: &str = "ResolutionFailed";

/// Condition reason when the resolution deadline fired
pub const REASON_RESOLUTION_TIMED_OUT: &str = "ResolutionTimedOut";

/// Condition reason when parameter validation rejected the request
pub const REASON_INVALID_REQUEST: &str = "InvalidRequest";

/// Boxed error crossing the resolver plug-in boundary
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classified failure of a single reconcile
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolutionError {
    /// The work-queue delivered a key that does not parse as "namespace/name"
    #[error("invalid resource key {0:?}")]
    InvalidResourceKey(String),

    /// Fetching a resource failed, either the request record itself or the
    /// upstream artifact a resolver was asked for
    #[error("error getting {resolver_name:?} {key:?}: {message}")]
    GettingResource {
        /// Name of the component that failed the fetch
        resolver_name: String,
        /// "namespace/name" of the request being reconciled
        key: String,
        /// Original error text
        message: String,
    },

    /// Parameter validation rejected the request before resolution started
    #[error("invalid resolution request {key:?}: {message}")]
    InvalidRequest {
        /// "namespace/name" of the request being reconciled
        key: String,
        /// Validation error text from the resolver
        message: String,
    },

    /// The resolution deadline fired before the resolver produced a result
    #[error("resolution of {key:?} timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// "namespace/name" of the request being reconciled
        key: String,
        /// Deadline that was enforced
        timeout: Duration,
    },

    /// Writing the request status failed
    #[error("error updating resolution request {key:?}: {message}")]
    UpdatingRequest {
        /// "namespace/name" of the request being reconciled
        key: String,
        /// Original error text
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Unclassified error; retried by the queue
    #[error("{0}")]
    Unknown(String),
}

impl ResolutionError {
    /// Create an unclassified error with the given message
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Canonical mapping from error kind to the `reason` string written
    /// into the Succeeded condition. Unknown kinds fall through to the
    /// generic resolution failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => REASON_INVALID_REQUEST,
            Self::Timeout { .. } => REASON_RESOLUTION_TIMED_OUT,
            _ => REASON_RESOLUTION_FAILED,
        }
    }
}

/// Error surfaced to the controller runtime.
///
/// `permanent` tells the error policy that redelivering the key cannot
/// help; the queue then waits for a spec change instead of requeueing.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ReconcileError {
    /// The classified failure that ended the reconcile
    #[source]
    pub source: ResolutionError,
    permanent: bool,
}

impl ReconcileError {
    /// Wrap a terminal failure; the queue must not redeliver the key
    pub fn permanent(source: ResolutionError) -> Self {
        Self {
            source,
            permanent: true,
        }
    }

    /// Wrap a transient failure; the queue retries with backoff
    pub fn transient(source: ResolutionError) -> Self {
        Self {
            source,
            permanent: false,
        }
    }

    /// True if the queue must not redeliver the key
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}
