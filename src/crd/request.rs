//! ResolutionRequest Custom Resource Definition
//!
//! A ResolutionRequest asks the framework to fetch the bytes of an
//! externally-stored artifact. The spec carries an opaque parameter map
//! whose semantics belong to the resolver plug-in routed to by the
//! resolver-type label; the status carries the base64-encoded artifact or
//! a terminal failure condition.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus, CONDITION_SUCCEEDED};

/// Specification for a ResolutionRequest
///
/// Created externally; the framework never creates or deletes requests
/// and only ever mutates `status`.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "resolution.relic.dev",
    version = "v1alpha1",
    kind = "ResolutionRequest",
    plural = "resolutionrequests",
    shortname = "rr",
    status = "ResolutionRequestStatus",
    namespaced,
    printcolumn = r#"{"name":"Succeeded","type":"string","jsonPath":".status.conditions[?(@.type=='Succeeded')].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type=='Succeeded')].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequestSpec {
    /// Resolver parameters. Keys and values are plug-in defined; the
    /// framework forwards the map untouched.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Status for a ResolutionRequest
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequestStatus {
    /// Conditions representing the request state. The Succeeded condition
    /// is the single source of terminal truth.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Base64 (strict, standard alphabet) of the resolved bytes
    #[serde(default)]
    pub data: String,

    /// Annotations attached by the resolver
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ResolutionRequestStatus {
    /// The Succeeded condition, if one has been written
    pub fn succeeded_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == CONDITION_SUCCEEDED)
    }

    /// Replace any existing condition of the same type
    fn set_condition(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }

    /// Mark the request as terminally failed with the given reason and message
    pub fn mark_failed(&mut self, reason: &str, message: &str) {
        self.set_condition(Condition::succeeded(ConditionStatus::False, reason, message));
    }
}

impl ResolutionRequest {
    /// Terminal-state predicate: the Succeeded condition is present with
    /// status True or False. Done records are never re-entered.
    pub fn is_done(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.succeeded_condition())
            .map(|c| c.status != ConditionStatus::Unknown)
            .unwrap_or(false)
    }
}
