//! Capability delegation and grant authorization.
//!
//! # Architecture
//!
//! 1. **[`CapabilityStore`](store::CapabilityStore)** - Arena of capability
//!    records. The delegation forest is a set of `authorized_by` id links.
//!
//! 2. **[`GrantPolicyEvaluator`](policy::GrantPolicyEvaluator)** - Pure
//!    policy decisions over requester attributes and a pluggable condition
//!    language.
//!
//! 3. **[`RequestTracker`](tracker::RequestTracker)** - Request lifecycle
//!    (`Pending -> Resolved`) and the candidates offered against each request.
//!
//! 4. **[`CapabilityAuthority`](authority::CapabilityAuthority)** - The
//!    orchestrator. Sole path to a Granted capability.
//!
//! # Properties
//!
//! - A grant re-evaluates policy at grant time and runs under the request's
//!   lock, so at most one candidate of a request is ever granted
//! - Status partitions the store: a capability is Delegated, Granted or
//!   Revoked, never two at once
//! - Every granted capability links to a Granted parent held by its
//!   assigner, or is a root issued by a configured root authority

pub mod authority;
pub mod locks;
pub mod model;
pub mod policy;
pub mod rules;
pub mod store;
pub mod tracker;

pub use authority::{AuthorityParams, CapabilityAuthority};
pub use model::{
    CandidateOffer, Capability, CapabilityId, CapabilityRequest, CapabilityStatus, GrantPolicy,
    GrantedView, PendingRequest, PrincipalId, RequestId, RequestStatus, RequestSubmission,
    RequesterAttributes, RootIssue,
};
pub use policy::{
    BuiltinConditions, Clock, ConditionEvaluator, EvaluationContext, FixedClock,
    GrantPolicyEvaluator, PolicyDecision, SystemClock,
};
pub use rules::AutoGrantRule;
