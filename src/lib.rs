//! Relic - CRD-driven Kubernetes operator for artifact resolution
//!
//! Relic fulfills asynchronous requests to fetch the bytes of
//! externally-stored artifacts (e.g. a workflow document in a Git
//! repository). A resolver plug-in supplies the domain-specific fetch
//! logic; the framework supplies dispatch, validation gating, timeout
//! enforcement, result encoding, status patching and retry
//! classification.
//!
//! # Architecture
//!
//! A `ResolutionRequest` record is created externally and routed to a
//! resolver by its resolver-type label. The reconciler drives each
//! request to exactly one terminal state: a populated success status
//! (base64 data plus annotations, Succeeded=True) or a terminal failure
//! (Succeeded=False with a classified reason). Terminal records are
//! never re-entered.
//!
//! # Modules
//!
//! - [`crd`] - The ResolutionRequest custom resource
//! - [`resolver`] - Plug-in contract and per-request context
//! - [`reconciler`] - Reconciliation state machine and status writer
//! - [`config`] - Resolver configuration loading
//! - [`leader`] - Leader awareness consumed before mutating calls
//! - [`git`] - Git resolver plug-in
//! - [`error`] - Error taxonomy and retry classification

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod git;
pub mod leader;
pub mod reconciler;
pub mod resolver;

pub use error::{ReconcileError, ResolutionError};

use std::time::Duration;

/// Maximum amount of time resolution may take.
///
/// Bounds plug-in execution per request; a plug-in may shrink this via
/// its configured timeout override but never extend it. Distinct from
/// the reconcile lifetime: status writes survive this deadline.
pub const DEFAULT_MAXIMUM_RESOLUTION_DURATION: Duration = Duration::from_secs(30);
