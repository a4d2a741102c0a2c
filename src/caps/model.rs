//! Capability data model.
//!
//! Wire names follow the JSON the dashboard consumes (`capabilityID`,
//! `authorizeCapabilityID`, `grantPolicy`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Generates an opaque string identifier newtype.
macro_rules! opaque_id {
    ($(
        $(#[$meta:meta])*
        $name:ident
    ),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                /// Mint a fresh random identifier.
                pub fn generate() -> Self {
                    Self(uuid::Uuid::new_v4().to_string())
                }

                #[inline]
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

opaque_id! {
    /// Globally unique, immutable capability identifier.
    CapabilityId,
    /// Capability request identifier.
    RequestId,
    /// Identifier of a principal (assigner, assignee, requester, requestee).
    PrincipalId,
}

/// Attributes presented by a requester, keyed by attribute name.
pub type RequesterAttributes = BTreeMap<String, String>;

// ============================================================================
// Capability
// ============================================================================

/// Lifecycle status of a capability.
///
/// `Delegated -> Granted -> Revoked`, or `Delegated -> Superseded` when
/// another candidate of the same request wins. Records are never erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    /// Offered downstream, not yet exercised.
    Delegated,
    /// Fully realized and enforceable.
    Granted,
    /// Terminal. Kept for audit.
    Revoked,
    /// Terminal. A losing candidate of a resolved request.
    Superseded,
}

impl CapabilityStatus {
    /// Whether `self -> next` is a permitted transition.
    pub fn can_transition_to(self, next: CapabilityStatus) -> bool {
        matches!(
            (self, next),
            (Self::Delegated, Self::Granted)
                | (Self::Delegated, Self::Superseded)
                | (Self::Granted, Self::Revoked)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delegated => "delegated",
            Self::Granted => "granted",
            Self::Revoked => "revoked",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy governing whether and what is released when a capability is granted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPolicy {
    /// Attribute the requester must present: `name=value` or bare `name`.
    #[serde(rename = "requesterAttribute", default)]
    pub requester_attribute: String,
    /// Condition expression, see [`crate::caps::policy::BuiltinConditions`].
    #[serde(rename = "grantCondition", default)]
    pub grant_condition: String,
    /// Value released to the requester when the condition holds.
    #[serde(rename = "grantValue", default)]
    pub grant_value: String,
}

impl GrantPolicy {
    /// A policy with no attribute requirement that always holds.
    pub fn permissive(grant_value: impl Into<String>) -> Self {
        Self {
            requester_attribute: String::new(),
            grant_condition: "always".to_string(),
            grant_value: grant_value.into(),
        }
    }
}

/// A unit of authority handed from an assigner to an assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "capabilityID")]
    pub id: CapabilityId,
    #[serde(rename = "assignerID")]
    pub assigner: PrincipalId,
    #[serde(rename = "assigneeID")]
    pub assignee: PrincipalId,
    #[serde(rename = "capabilityName")]
    pub name: String,
    #[serde(rename = "capabilityValue")]
    pub value: String,
    /// The capability whose authority was consumed to create this one.
    /// `None` marks a root of the delegation forest.
    #[serde(rename = "authorizeCapabilityID")]
    pub authorized_by: Option<CapabilityId>,
    #[serde(rename = "grantPolicy", default)]
    pub grant_policy: GrantPolicy,
    pub status: CapabilityStatus,
}

impl Capability {
    #[inline]
    pub fn is_root(&self) -> bool {
        self.authorized_by.is_none()
    }
}

/// Projection served by `/cap/granted`: the capability plus its grant
/// condition surfaced at top level.
///
/// The top-level `grantCondition` is the same value as
/// `grantPolicy.grantCondition`.
#[derive(Debug, Clone, Serialize)]
pub struct GrantedView {
    #[serde(flatten)]
    pub capability: Capability,
    #[serde(rename = "grantCondition")]
    pub grant_condition: String,
}

impl From<Capability> for GrantedView {
    fn from(capability: Capability) -> Self {
        let grant_condition = capability.grant_policy.grant_condition.clone();
        Self {
            capability,
            grant_condition,
        }
    }
}

/// Whether a credential value `pattern` covers a requested `value`.
///
/// `*` covers everything; `*.suffix` covers any value ending in `.suffix`.
pub fn value_covers(pattern: &str, value: &str) -> bool {
    if pattern == value || pattern == "*" {
        return true;
    }
    match pattern.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => {
            value.len() > suffix.len() && value.ends_with(suffix)
        }
        _ => false,
    }
}

// ============================================================================
// Capability Requests
// ============================================================================

/// Lifecycle status of a capability request. `Pending -> Resolved`, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Resolved,
}

/// A requester asking a requestee for a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    #[serde(rename = "requestID")]
    pub id: RequestId,
    #[serde(rename = "requesterID")]
    pub requester: PrincipalId,
    #[serde(rename = "requesteeID")]
    pub requestee: PrincipalId,
    #[serde(rename = "requestCapability")]
    pub capability: String,
    #[serde(rename = "requestCapabilityValue")]
    pub value: String,
    pub status: RequestStatus,
    /// Attributes presented at submission; used when a grant carries none.
    #[serde(
        rename = "requesterAttributes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attributes: RequesterAttributes,
    /// The candidate chosen when the request was resolved.
    #[serde(
        rename = "grantedCapabilityID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub granted: Option<CapabilityId>,
}

impl CapabilityRequest {
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// A request together with the candidates offered against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub request: CapabilityRequest,
    #[serde(rename = "pendingCapabilities")]
    pub candidates: Vec<Capability>,
}

// ============================================================================
// Service inputs
// ============================================================================

/// Input for submitting a new capability request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestSubmission {
    #[serde(rename = "requesterID")]
    pub requester: PrincipalId,
    #[serde(rename = "requesteeID")]
    pub requestee: PrincipalId,
    #[serde(rename = "requestCapability")]
    pub capability: String,
    #[serde(rename = "requestCapabilityValue")]
    pub value: String,
    /// Assigners asked to offer terms for this request.
    #[serde(rename = "candidateAssignerIDs", default)]
    pub candidate_assigners: Vec<PrincipalId>,
    #[serde(rename = "requesterAttributes", default)]
    pub attributes: RequesterAttributes,
}

/// An explicit candidate offered against an open request.
///
/// Name and value default to the request's; the assignee defaults to
/// the requester.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateOffer {
    #[serde(rename = "capabilityID", default)]
    pub id: Option<CapabilityId>,
    #[serde(rename = "assignerID")]
    pub assigner: PrincipalId,
    #[serde(rename = "assigneeID", default)]
    pub assignee: Option<PrincipalId>,
    #[serde(rename = "capabilityName", default)]
    pub name: Option<String>,
    #[serde(rename = "capabilityValue", default)]
    pub value: Option<String>,
    #[serde(rename = "authorizeCapabilityID", default)]
    pub authorized_by: Option<CapabilityId>,
    #[serde(rename = "grantPolicy", default)]
    pub grant_policy: GrantPolicy,
}

/// Input for issuing a root capability.
#[derive(Debug, Clone, Deserialize)]
pub struct RootIssue {
    #[serde(rename = "capabilityID", default)]
    pub id: Option<CapabilityId>,
    #[serde(rename = "assignerID")]
    pub assigner: PrincipalId,
    #[serde(rename = "assigneeID")]
    pub assignee: PrincipalId,
    #[serde(rename = "capabilityName")]
    pub name: String,
    #[serde(rename = "capabilityValue")]
    pub value: String,
    #[serde(rename = "grantPolicy", default)]
    pub grant_policy: GrantPolicy,
}
