//! Integration test common infrastructure.
//!
//! Builds in-process authorities and fixtures for the grant flow tests.

#![allow(dead_code)]

use capauthd::caps::{
    AuthorityParams, CandidateOffer, Capability, CapabilityAuthority, CapabilityId, GrantPolicy,
    PrincipalId, RequestId, RequestSubmission, RequesterAttributes, RootIssue,
};
use std::sync::Arc;
use std::time::Duration;

pub const ROOT: &str = "cp-root";

/// Authority with a single root principal.
pub fn authority() -> Arc<CapabilityAuthority> {
    Arc::new(CapabilityAuthority::new(AuthorityParams {
        roots: vec![PrincipalId::from(ROOT)],
        lock_timeout: Duration::from_millis(250),
        max_attempts: 3,
    }))
}

pub fn attrs(pairs: &[(&str, &str)]) -> RequesterAttributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn policy(attribute: &str, condition: &str, value: &str) -> GrantPolicy {
    GrantPolicy {
        requester_attribute: attribute.into(),
        grant_condition: condition.into(),
        grant_value: value.into(),
    }
}

/// Submit `u1 -> svc1 read logs` with no assigners, so the request starts empty.
pub fn submit_read_logs(authority: &CapabilityAuthority) -> RequestId {
    authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs".into(),
            candidate_assigners: Vec::new(),
            attributes: RequesterAttributes::new(),
        })
        .expect("submit request")
        .request
        .id
}

/// Root-authorized candidate with a caller-chosen id.
pub fn root_offer(id: &str, grant_policy: GrantPolicy) -> CandidateOffer {
    CandidateOffer {
        id: Some(CapabilityId::from(id)),
        assigner: ROOT.into(),
        assignee: None,
        name: None,
        value: None,
        authorized_by: None,
        grant_policy,
    }
}

/// Issue a root capability `read <value>` to `assignee`.
pub fn issue(
    authority: &CapabilityAuthority,
    assignee: &str,
    value: &str,
    grant_policy: GrantPolicy,
) -> Capability {
    authority
        .issue_root(RootIssue {
            id: None,
            assigner: ROOT.into(),
            assignee: assignee.into(),
            name: "read".into(),
            value: value.into(),
            grant_policy,
        })
        .expect("issue root")
}
