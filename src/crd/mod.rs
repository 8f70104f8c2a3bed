//! Custom Resource Definitions for the resolution framework
//!
//! A single resource type is defined: [`ResolutionRequest`], the externally
//! created record the reconciler acts upon. The framework only ever writes
//! its `status` subresource.

mod request;
mod types;

pub use request::{ResolutionRequest, ResolutionRequestSpec, ResolutionRequestStatus};
pub use types::{Condition, ConditionStatus, CONDITION_SUCCEEDED};

/// Label key the work-queue filter routes on. Every resolver's selector
/// must carry this key so requests reach exactly one plug-in.
pub const LABEL_KEY_RESOLVER_TYPE: &str = "resolution.relic.dev/type";
