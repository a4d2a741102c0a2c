//! Integration tests for the request / candidate / grant flow.

mod common;

use capauthd::caps::{
    CandidateOffer, CapabilityId, CapabilityStatus, GrantPolicy, PrincipalId, RequestId,
    RequestStatus, RequestSubmission, RequesterAttributes,
};
use capauthd::error::{AuthorizationError, StoreError, TrackerError};
use common::{attrs, authority, issue, policy, root_offer, submit_read_logs};
use std::collections::HashSet;

fn admin_policy() -> GrantPolicy {
    policy("role=admin", "always", "logs")
}

#[test]
fn test_grant_with_matching_attributes_resolves_request() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .expect("attach cap-001");

    let granted = authority
        .grant(
            &request_id,
            &CapabilityId::from("cap-001"),
            Some(attrs(&[("role", "admin")])),
        )
        .expect("grant should succeed");

    assert_eq!(granted.id.as_str(), "cap-001");
    assert_eq!(granted.status, CapabilityStatus::Granted);
    assert_eq!(granted.assignee.as_str(), "u1");

    let view = authority.request(&request_id).unwrap();
    assert_eq!(view.request.status, RequestStatus::Resolved);
    assert_eq!(view.request.granted, Some(CapabilityId::from("cap-001")));
    assert!(view.candidates.is_empty());
    assert!(authority.list_pending_requests().is_empty());
}

#[test]
fn test_grant_with_wrong_attributes_changes_nothing() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .unwrap();

    let err = authority
        .grant(
            &request_id,
            &CapabilityId::from("cap-001"),
            Some(attrs(&[("role", "guest")])),
        )
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::PolicyNotSatisfied(_)));

    let cap = authority.capability(&CapabilityId::from("cap-001")).unwrap();
    assert_eq!(cap.status, CapabilityStatus::Delegated);
    let view = authority.request(&request_id).unwrap();
    assert_eq!(view.request.status, RequestStatus::Pending);
    assert_eq!(view.candidates.len(), 1);
}

#[test]
fn test_second_grant_on_resolved_request_is_rejected() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    for id in ["cap-001", "cap-002"] {
        authority
            .attach_candidate(&request_id, root_offer(id, admin_policy()))
            .unwrap();
    }
    let admin = Some(attrs(&[("role", "admin")]));

    authority
        .grant(&request_id, &CapabilityId::from("cap-001"), admin.clone())
        .expect("first grant");

    let before_caps = authority.list_capabilities();
    let before_requests = authority.list_requests();

    for id in ["cap-002", "cap-001"] {
        let err = authority
            .grant(&request_id, &CapabilityId::from(id), admin.clone())
            .unwrap_err();
        assert_eq!(
            err,
            AuthorizationError::Tracker(TrackerError::AlreadyResolved(request_id.clone()))
        );
    }

    assert_eq!(authority.list_capabilities(), before_caps);
    assert_eq!(authority.list_requests(), before_requests);
    assert_eq!(
        authority
            .capability(&CapabilityId::from("cap-002"))
            .unwrap()
            .status,
        CapabilityStatus::Superseded
    );
}

#[test]
fn test_losing_candidates_leave_the_delegated_list() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    for id in ["cap-001", "cap-002"] {
        authority
            .attach_candidate(&request_id, root_offer(id, admin_policy()))
            .unwrap();
    }
    assert_eq!(authority.list_delegated().len(), 2);

    authority
        .grant(
            &request_id,
            &CapabilityId::from("cap-001"),
            Some(attrs(&[("role", "admin")])),
        )
        .unwrap();

    assert!(authority.list_delegated().is_empty());
    assert!(authority.list_pending_requests().is_empty());
    let loser = authority.capability(&CapabilityId::from("cap-002")).unwrap();
    assert_eq!(loser.status, CapabilityStatus::Superseded);
    assert_eq!(authority.list_capabilities().len(), 2);
}

#[test]
fn test_explicit_candidate_must_stay_within_parent_credential() {
    let authority = authority();
    let credential = issue(&authority, "alice", "metrics", policy("", "always", "metrics"));
    let request_id = submit_read_logs(&authority);

    let escalation = CandidateOffer {
        id: Some(CapabilityId::from("cap-wide")),
        assigner: "alice".into(),
        assignee: None,
        name: Some("write".into()),
        value: Some("*".into()),
        authorized_by: Some(credential.id.clone()),
        grant_policy: policy("", "always", "*"),
    };
    let err = authority
        .attach_candidate(&request_id, escalation)
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::InvalidAuthority(_)));
    assert!(authority.capability(&CapabilityId::from("cap-wide")).is_err());
    assert!(authority.request(&request_id).unwrap().candidates.is_empty());
}

#[test]
fn test_offers_unsatisfiable_at_submission_are_not_made() {
    let authority = authority();
    issue(&authority, "alice", "logs", policy("role=admin", "never", "logs"));

    let view = authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs".into(),
            candidate_assigners: vec![PrincipalId::from("alice")],
            attributes: attrs(&[("role", "guest")]),
        })
        .expect("the request itself is accepted");

    assert!(view.candidates.is_empty());
    assert_eq!(view.request.status, RequestStatus::Pending);
    assert!(authority.list_delegated().is_empty());
}

#[test]
fn test_policy_rechecked_at_grant_time() {
    let authority = authority();
    let request_id = authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs".into(),
            candidate_assigners: Vec::new(),
            attributes: attrs(&[("role", "admin")]),
        })
        .unwrap()
        .request
        .id;
    authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .unwrap();

    // Submitted as admin, presents guest at grant time.
    let err = authority
        .grant(
            &request_id,
            &CapabilityId::from("cap-001"),
            Some(attrs(&[("role", "guest")])),
        )
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::PolicyNotSatisfied(_)));
    assert_eq!(authority.list_delegated().len(), 1);
    assert!(authority.list_granted().is_empty());

    // Without a body the submission attributes apply.
    authority
        .grant(&request_id, &CapabilityId::from("cap-001"), None)
        .expect("grant with submitted attributes");
}

#[test]
fn test_unknown_candidate_and_missing_request() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .unwrap();

    let err = authority
        .grant(&request_id, &CapabilityId::from("cap-999"), None)
        .unwrap_err();
    assert!(matches!(
        err,
        AuthorizationError::Tracker(TrackerError::UnknownCandidate { .. })
    ));
    assert_eq!(err.status_code().as_u16(), 404);

    let err = authority
        .grant(&RequestId::from("no-such-request"), &CapabilityId::from("cap-001"), None)
        .unwrap_err();
    assert!(matches!(
        err,
        AuthorizationError::Tracker(TrackerError::NotFound(_))
    ));
}

#[test]
fn test_duplicate_candidate_id_is_rejected() {
    let authority = authority();
    let request_id = submit_read_logs(&authority);
    authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .unwrap();
    let err = authority
        .attach_candidate(&request_id, root_offer("cap-001", admin_policy()))
        .unwrap_err();
    assert!(matches!(
        err,
        AuthorizationError::Store(StoreError::DuplicateId(_))
    ));
}

#[test]
fn test_delegated_grant_builds_chain_to_root() {
    let authority = authority();
    let credential = issue(
        &authority,
        "alice",
        "*.example",
        policy("team", "always", "logs"),
    );

    let view = authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs.example".into(),
            candidate_assigners: vec![PrincipalId::from("alice")],
            attributes: attrs(&[("team", "ops")]),
        })
        .expect("alice holds a covering credential");
    assert_eq!(view.candidates.len(), 1);
    let candidate = view.candidates[0].clone();
    assert_eq!(candidate.authorized_by, Some(credential.id.clone()));
    assert_eq!(candidate.grant_policy, credential.grant_policy);

    authority
        .grant(&view.request.id, &candidate.id, None)
        .expect("grant");

    let chain = authority.chain(&candidate.id).unwrap();
    let ids: Vec<_> = chain.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![candidate.id.clone(), credential.id.clone()]);
    assert!(chain.iter().all(|c| c.status == CapabilityStatus::Granted));
    assert!(chain.last().unwrap().is_root());
}

#[test]
fn test_revoked_parent_blocks_grant() {
    let authority = authority();
    let credential = issue(&authority, "alice", "logs", policy("", "always", "logs"));
    let view = authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs".into(),
            candidate_assigners: vec![PrincipalId::from("alice")],
            attributes: RequesterAttributes::new(),
        })
        .unwrap();
    let candidate_id = view.candidates[0].id.clone();

    authority.revoke(&credential.id).expect("revoke credential");

    let err = authority
        .grant(&view.request.id, &candidate_id, None)
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::InvalidAuthority(_)));
    assert_eq!(
        authority.capability(&candidate_id).unwrap().status,
        CapabilityStatus::Delegated
    );
    assert_eq!(authority.list_pending_requests().len(), 1);
}

#[test]
fn test_unauthorized_assigner_creates_nothing() {
    let authority = authority();
    let err = authority
        .request_capability(RequestSubmission {
            requester: "u1".into(),
            requestee: "svc1".into(),
            capability: "read".into(),
            value: "logs".into(),
            candidate_assigners: vec![PrincipalId::from("cp-root"), PrincipalId::from("mallory")],
            attributes: RequesterAttributes::new(),
        })
        .unwrap_err();
    assert!(matches!(err, AuthorizationError::InvalidAuthority(_)));
    assert!(authority.list_requests().is_empty());
    assert!(authority.list_capabilities().is_empty());
}

/// Pending candidates are Delegated capabilities, so `listPending` and
/// `listDelegated` share them by construction. The partition holds between
/// statuses: Delegated, Granted and Superseded never overlap.
#[test]
fn test_status_partition_counts_pending_candidates_as_delegated() {
    let authority = authority();
    issue(&authority, "alice", "*", policy("", "always", "*"));

    let mut granted_ids = Vec::new();
    for _ in 0..3 {
        let view = authority
            .request_capability(RequestSubmission {
                requester: "u1".into(),
                requestee: "svc1".into(),
                capability: "read".into(),
                value: "logs".into(),
                candidate_assigners: vec![
                    PrincipalId::from("alice"),
                    PrincipalId::from("cp-root"),
                ],
                attributes: RequesterAttributes::new(),
            })
            .unwrap();
        assert_eq!(view.candidates.len(), 2);
        granted_ids.push((view.request.id, view.candidates[0].id.clone()));
    }
    // Grant one of three; leave the others pending.
    let (request_id, capability_id) = &granted_ids[0];
    authority.grant(request_id, capability_id, None).unwrap();

    let ids_with = |status| -> HashSet<_> {
        authority
            .list_capabilities()
            .into_iter()
            .filter(|c| c.status == status)
            .map(|c| c.id)
            .collect()
    };
    let delegated: HashSet<_> = authority.list_delegated().into_iter().map(|c| c.id).collect();
    let superseded = ids_with(CapabilityStatus::Superseded);
    let granted: HashSet<_> = authority
        .list_granted()
        .into_iter()
        .map(|v| v.capability.id)
        .collect();
    let pending: HashSet<_> = authority
        .list_pending_requests()
        .into_iter()
        .flat_map(|p| p.candidates)
        .map(|c| c.id)
        .collect();

    assert!(delegated.is_disjoint(&granted));
    assert!(superseded.is_disjoint(&delegated));
    assert!(superseded.is_disjoint(&granted));
    assert!(pending.is_disjoint(&granted));
    assert_eq!(pending, delegated);
    assert_eq!(pending.len(), 4);
    assert_eq!(superseded.len(), 1);
    assert_eq!(
        delegated.len() + granted.len() + superseded.len(),
        authority.list_capabilities().len()
    );
}

#[test]
fn test_granted_view_surfaces_policy_condition() {
    let authority = authority();
    issue(
        &authority,
        "alice",
        "logs",
        policy("", "after:2000-01-01T00:00:00Z", "logs"),
    );
    let granted = authority.list_granted();
    assert_eq!(granted.len(), 1);
    assert_eq!(
        granted[0].grant_condition,
        granted[0].capability.grant_policy.grant_condition
    );
}
