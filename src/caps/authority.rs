//! Capability Authority - the delegation and grant orchestrator.
//!
//! [`CapabilityAuthority`] is the only entry point the HTTP facade calls. It
//! composes the capability store, the request tracker and the grant policy
//! evaluator, and it is the only code path that moves a capability to
//! Granted. Every grant, denial and revocation is logged for audit.

use super::locks::RequestLocks;
use super::model::{
    CandidateOffer, Capability, CapabilityId, CapabilityRequest, CapabilityStatus, GrantPolicy,
    GrantedView, PendingRequest, PrincipalId, RequestId, RequestSubmission, RequesterAttributes,
    RootIssue, value_covers,
};
use super::policy::{
    Clock, ConditionEvaluator, EvaluationContext, GrantPolicyEvaluator, PolicyDecision,
    SystemClock,
};
use super::rules::{AutoGrantRule, AutoGrantRules};
use super::store::CapabilityStore;
use super::tracker::{NewRequest, RequestTracker};
use crate::error::{AuthorizationError, AuthzResult, StoreError};
use crate::telemetry::{OperationTimer, spans};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Parameters for creating a new [`CapabilityAuthority`].
#[derive(Debug, Clone)]
pub struct AuthorityParams {
    /// Principals allowed to issue root capabilities.
    pub roots: Vec<PrincipalId>,
    /// How long one attempt waits for a request lock.
    pub lock_timeout: Duration,
    /// Lock attempts before surfacing `Contention`.
    pub max_attempts: u32,
}

impl Default for AuthorityParams {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            lock_timeout: Duration::from_millis(250),
            max_attempts: 3,
        }
    }
}

/// An assigner's standing to offer terms for a request.
struct Offer {
    assigner: PrincipalId,
    /// The assigner's own Granted credential, `None` for a root authority.
    credential: Option<Capability>,
}

/// The Capability Authority.
pub struct CapabilityAuthority {
    store: CapabilityStore,
    tracker: RequestTracker,
    evaluator: GrantPolicyEvaluator,
    locks: RequestLocks,
    rules: AutoGrantRules,
    roots: HashSet<PrincipalId>,
    clock: Arc<dyn Clock>,
}

impl CapabilityAuthority {
    pub fn new(params: AuthorityParams) -> Self {
        let AuthorityParams {
            roots,
            lock_timeout,
            max_attempts,
        } = params;

        Self {
            store: CapabilityStore::new(),
            tracker: RequestTracker::new(),
            evaluator: GrantPolicyEvaluator::default(),
            locks: RequestLocks::new(lock_timeout, max_attempts),
            rules: AutoGrantRules::new(),
            roots: roots.into_iter().collect(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for grant conditions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the grant-condition language.
    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = GrantPolicyEvaluator::new(conditions);
        self
    }

    #[inline]
    pub fn is_root(&self, principal: &PrincipalId) -> bool {
        self.roots.contains(principal)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn list_delegated(&self) -> Vec<Capability> {
        self.store.list_by_status(CapabilityStatus::Delegated)
    }

    pub fn list_granted(&self) -> Vec<GrantedView> {
        self.store
            .list_by_status(CapabilityStatus::Granted)
            .into_iter()
            .map(GrantedView::from)
            .collect()
    }

    pub fn list_capabilities(&self) -> Vec<Capability> {
        self.store.list_all()
    }

    pub fn capability(&self, id: &CapabilityId) -> AuthzResult<Capability> {
        Ok(self.store.get(id)?)
    }

    pub fn list_requests(&self) -> Vec<CapabilityRequest> {
        self.tracker.list_all()
    }

    pub fn request(&self, id: &RequestId) -> AuthzResult<PendingRequest> {
        Ok(self.tracker.view(id)?)
    }

    /// Pending requests with their candidates.
    ///
    /// Requests left Pending after their candidate was granted are repaired
    /// before the snapshot is taken.
    pub fn list_pending_requests(&self) -> Vec<PendingRequest> {
        let pending = self.tracker.list_pending();
        let stale: Vec<RequestId> = pending
            .iter()
            .filter(|p| {
                p.candidates.iter().any(|c| {
                    self.store
                        .get(&c.id)
                        .is_ok_and(|current| current.status == CapabilityStatus::Granted)
                })
            })
            .map(|p| p.request.id.clone())
            .collect();

        if stale.is_empty() {
            return pending;
        }
        for id in &stale {
            if let Err(e) = self.reconcile(id) {
                warn!(request_id = %id, error = %e, "Failed to reconcile request");
            }
        }
        self.tracker.list_pending()
    }

    /// The delegation chain from `id` up to its root, child first.
    pub fn chain(&self, id: &CapabilityId) -> AuthzResult<Vec<Capability>> {
        self.store
            .chain_of(id)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.surface(e.into()))
    }

    // ========================================================================
    // Root issuance and revocation
    // ========================================================================

    /// Issue a root capability. Only configured root authorities may do so.
    pub fn issue_root(&self, issue: RootIssue) -> AuthzResult<Capability> {
        let _timer = OperationTimer::new("issue_root");
        if !self.is_root(&issue.assigner) {
            warn!(assigner = %issue.assigner, "Root issuance denied");
            return Err(AuthorizationError::InvalidAuthority(format!(
                "{} is not a root authority",
                issue.assigner
            )));
        }

        let capability = Capability {
            id: issue.id.unwrap_or_else(CapabilityId::generate),
            assigner: issue.assigner,
            assignee: issue.assignee,
            name: issue.name,
            value: issue.value,
            authorized_by: None,
            grant_policy: issue.grant_policy,
            status: CapabilityStatus::Granted,
        };
        self.store.put(capability.clone())?;
        info!(
            capability_id = %capability.id,
            assigner = %capability.assigner,
            assignee = %capability.assignee,
            name = %capability.name,
            value = %capability.value,
            "Root capability issued"
        );
        self.refresh_gauges();
        Ok(capability)
    }

    /// Revoke a Granted capability. The record is kept.
    pub fn revoke(&self, id: &CapabilityId) -> AuthzResult<Capability> {
        let _timer = OperationTimer::new("revoke");
        let revoked = self.store.set_status(id, CapabilityStatus::Revoked)?;
        info!(
            capability_id = %revoked.id,
            assignee = %revoked.assignee,
            "Capability revoked"
        );
        self.refresh_gauges();
        Ok(revoked)
    }

    // ========================================================================
    // Requests and candidates
    // ========================================================================

    /// Submit a request and collect an offer from each candidate assigner.
    ///
    /// Every assigner must either hold a Granted credential covering the
    /// requested name and value or be a root authority; otherwise nothing is
    /// created. Offers whose policy the submitted attributes cannot satisfy
    /// right now are skipped.
    pub fn request_capability(&self, submission: RequestSubmission) -> AuthzResult<PendingRequest> {
        let _timer = OperationTimer::new("request");
        let _span = spans::request(submission.requester.as_str(), &submission.capability).entered();

        let mut seen = HashSet::new();
        let offers = submission
            .candidate_assigners
            .iter()
            .filter(|a| seen.insert((*a).clone()))
            .map(|a| self.offer_for(a, &submission.capability, &submission.value))
            .collect::<AuthzResult<Vec<_>>>()?;

        let request_id = self.tracker.submit(NewRequest {
            requester: submission.requester.clone(),
            requestee: submission.requestee,
            capability: submission.capability.clone(),
            value: submission.value.clone(),
            attributes: submission.attributes,
        });
        info!(
            request_id = %request_id,
            requester = %submission.requester,
            offers = offers.len(),
            "Capability request submitted"
        );

        let auto_grant = self.with_request_lock(&request_id, || {
            let request = self.tracker.get(&request_id)?;
            let ctx = EvaluationContext {
                attributes: &request.attributes,
                now: self.clock.now(),
            };
            let mut auto_grant = None;
            for offer in offers {
                let policy = match &offer.credential {
                    Some(credential) => credential.grant_policy.clone(),
                    None => GrantPolicy::permissive(&submission.value),
                };
                // Offers the requester could never accept are not made.
                if let PolicyDecision::Unsatisfied(reason) = self.evaluator.evaluate(&policy, &ctx)
                {
                    info!(
                        request_id = %request_id,
                        assigner = %offer.assigner,
                        reason = %reason,
                        "Offer skipped, policy unsatisfiable for requester"
                    );
                    continue;
                }
                let candidate = Capability {
                    id: CapabilityId::generate(),
                    assigner: offer.assigner,
                    assignee: submission.requester.clone(),
                    name: submission.capability.clone(),
                    value: submission.value.clone(),
                    authorized_by: offer.credential.as_ref().map(|c| c.id.clone()),
                    grant_policy: policy,
                    status: CapabilityStatus::Delegated,
                };
                if auto_grant.is_none()
                    && let Some(credential) = &offer.credential
                    && self.rules.allows(&credential.id, &submission.requester)
                {
                    auto_grant = Some(candidate.id.clone());
                }
                self.store.put(candidate.clone())?;
                debug!(
                    request_id = %request_id,
                    capability_id = %candidate.id,
                    "Candidate offered"
                );
                self.tracker.attach_candidate(&request_id, candidate)?;
            }
            Ok(auto_grant)
        })?;

        if let Some(capability_id) = auto_grant {
            match self.grant(&request_id, &capability_id, None) {
                Ok(_) => {
                    info!(request_id = %request_id, capability_id = %capability_id, "Auto-granted")
                }
                Err(e) => warn!(
                    request_id = %request_id,
                    capability_id = %capability_id,
                    error = %e,
                    "Auto-grant failed, request stays pending"
                ),
            }
        }

        self.refresh_gauges();
        Ok(self.tracker.view(&request_id)?)
    }

    /// Attach an explicit candidate to an open request.
    pub fn attach_candidate(
        &self,
        request_id: &RequestId,
        offer: CandidateOffer,
    ) -> AuthzResult<Capability> {
        let _timer = OperationTimer::new("attach_candidate");
        self.with_request_lock(request_id, || self.attach_locked(request_id, offer))
    }

    /// Caller must hold the request lock.
    fn attach_locked(
        &self,
        request_id: &RequestId,
        offer: CandidateOffer,
    ) -> AuthzResult<Capability> {
        let request = self.tracker.get(request_id)?;
        if !request.is_pending() {
            return Err(crate::error::TrackerError::AlreadyResolved(request_id.clone()).into());
        }

        let candidate = Capability {
            id: offer.id.unwrap_or_else(CapabilityId::generate),
            assigner: offer.assigner,
            assignee: offer.assignee.unwrap_or_else(|| request.requester.clone()),
            name: offer.name.unwrap_or_else(|| request.capability.clone()),
            value: offer.value.unwrap_or_else(|| request.value.clone()),
            authorized_by: offer.authorized_by,
            grant_policy: offer.grant_policy,
            status: CapabilityStatus::Delegated,
        };
        self.validate_authority(&candidate)?;

        self.store.put(candidate.clone())?;
        self.tracker.attach_candidate(request_id, candidate.clone())?;
        debug!(request_id = %request_id, capability_id = %candidate.id, "Candidate attached");
        self.refresh_gauges();
        Ok(candidate)
    }

    // ========================================================================
    // Grant
    // ========================================================================

    /// Grant one candidate of a pending request.
    ///
    /// Runs under the request's lock: look up the candidate, re-evaluate its
    /// policy against `attributes` (or the attributes presented at
    /// submission), validate the authorizing parent, mark the capability
    /// Granted and resolve the request. Nothing changes unless every check
    /// passes.
    pub fn grant(
        &self,
        request_id: &RequestId,
        capability_id: &CapabilityId,
        attributes: Option<RequesterAttributes>,
    ) -> AuthzResult<Capability> {
        let _timer = OperationTimer::new("grant");
        let _span = spans::grant(request_id.as_str(), capability_id.as_str()).entered();

        let result = self.grant_serialized(request_id, capability_id, attributes);
        match &result {
            Ok(granted) => {
                crate::metrics::record_grant_outcome("granted");
                info!(
                    request_id = %request_id,
                    capability_id = %granted.id,
                    assigner = %granted.assigner,
                    assignee = %granted.assignee,
                    authorized_by = ?granted.authorized_by,
                    "Capability granted"
                );
            }
            Err(e) => {
                crate::metrics::record_grant_outcome(e.error_code());
                if e.is_defect() {
                    error!(
                        request_id = %request_id,
                        capability_id = %capability_id,
                        error = %e,
                        "Grant hit an invariant violation"
                    );
                } else {
                    info!(
                        request_id = %request_id,
                        capability_id = %capability_id,
                        error = %e,
                        "Grant denied"
                    );
                }
            }
        }
        self.refresh_gauges();
        result
    }

    fn grant_serialized(
        &self,
        request_id: &RequestId,
        capability_id: &CapabilityId,
        attributes: Option<RequesterAttributes>,
    ) -> AuthzResult<Capability> {
        self.with_request_lock(request_id, || {
            self.repair_locked(request_id)?;
            self.grant_locked(request_id, capability_id, attributes)
        })
    }

    /// Caller must hold the request lock.
    fn grant_locked(
        &self,
        request_id: &RequestId,
        capability_id: &CapabilityId,
        attributes: Option<RequesterAttributes>,
    ) -> AuthzResult<Capability> {
        // 1. The candidate must belong to this still-pending request.
        let request = self.tracker.get(request_id)?;
        self.tracker.candidate(request_id, capability_id)?;
        let current = self.store.get(capability_id)?;
        if current.status != CapabilityStatus::Delegated {
            return Err(StoreError::InvalidTransition {
                id: current.id,
                from: current.status,
                to: CapabilityStatus::Granted,
            }
            .into());
        }

        // 2. Policy is re-checked at grant time, not only at offer time.
        let attributes = attributes.unwrap_or(request.attributes);
        let ctx = EvaluationContext {
            attributes: &attributes,
            now: self.clock.now(),
        };
        if let PolicyDecision::Unsatisfied(reason) =
            self.evaluator.evaluate(&current.grant_policy, &ctx)
        {
            return Err(AuthorizationError::PolicyNotSatisfied(reason));
        }

        // 3. The authorizing parent must be held by the assigner and cover
        // the candidate.
        self.validate_authority(&current)?;

        // 4. The parent's Granted status is re-checked in the same store
        // write that promotes the candidate, so a racing revoke cannot slip
        // in between.
        let granted = self.store.promote(capability_id).map_err(|e| match e {
            StoreError::ParentNotGranted { parent, .. } => AuthorizationError::InvalidAuthority(
                format!("authorizing capability {parent} is no longer granted"),
            ),
            other => other.into(),
        })?;

        // 5. Resolve under the request lock, which every other path that
        // resolves this request also takes.
        match self.tracker.resolve(request_id, capability_id) {
            Ok(resolution) => self.supersede(request_id, &resolution.discarded),
            Err(e) => {
                error!(
                    request_id = %request_id,
                    capability_id = %capability_id,
                    error = %e,
                    "Capability granted but request not resolved; left for reconcile"
                );
                return Err(e.into());
            }
        }
        Ok(granted)
    }

    /// Resolve a request whose candidate is already Granted.
    ///
    /// Returns `true` if a repair was made.
    pub fn reconcile(&self, request_id: &RequestId) -> AuthzResult<bool> {
        self.with_request_lock(request_id, || self.repair_locked(request_id))
    }

    /// Caller must hold the request lock.
    fn repair_locked(&self, request_id: &RequestId) -> AuthzResult<bool> {
        let view = self.tracker.view(request_id)?;
        if !view.request.is_pending() {
            return Ok(false);
        }
        let granted = view.candidates.iter().find(|c| {
            self.store
                .get(&c.id)
                .is_ok_and(|current| current.status == CapabilityStatus::Granted)
        });
        match granted {
            Some(candidate) => {
                let resolution = self.tracker.resolve(request_id, &candidate.id)?;
                self.supersede(request_id, &resolution.discarded);
                warn!(
                    request_id = %request_id,
                    capability_id = %candidate.id,
                    "Repaired pending request with granted candidate"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Auto-grant rules
    // ========================================================================

    pub fn add_auto_grant_rule(&self, rule: AutoGrantRule) -> AutoGrantRule {
        info!(
            credential = %rule.credential,
            requester = %rule.requester,
            grant = rule.grant,
            "Auto-grant rule registered"
        );
        self.rules.upsert(rule.clone());
        rule
    }

    pub fn auto_grant_rules(&self) -> Vec<AutoGrantRule> {
        self.rules.list()
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Find the credential an assigner offers from.
    fn offer_for(&self, assigner: &PrincipalId, name: &str, value: &str) -> AuthzResult<Offer> {
        let credential = self.store.find(|c| {
            c.status == CapabilityStatus::Granted
                && &c.assignee == assigner
                && c.name == name
                && value_covers(&c.value, value)
        });
        if credential.is_none() && !self.is_root(assigner) {
            return Err(AuthorizationError::InvalidAuthority(format!(
                "{assigner} holds no granted '{name}' capability covering '{value}'"
            )));
        }
        Ok(Offer {
            assigner: assigner.clone(),
            credential,
        })
    }

    /// Check that `capability` is backed by a Granted parent held by its
    /// assigner, or that a parentless capability comes from a root.
    fn validate_authority(&self, capability: &Capability) -> AuthzResult<()> {
        let Some(parent_id) = &capability.authorized_by else {
            if self.is_root(&capability.assigner) {
                return Ok(());
            }
            return Err(AuthorizationError::InvalidAuthority(format!(
                "{} has no authorizing capability and is not a root authority",
                capability.assigner
            )));
        };

        let parent = match self.store.get(parent_id) {
            Ok(parent) => parent,
            Err(StoreError::NotFound(_)) => {
                return Err(AuthorizationError::InvalidAuthority(format!(
                    "authorizing capability {parent_id} does not exist"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if parent.status != CapabilityStatus::Granted {
            return Err(AuthorizationError::InvalidAuthority(format!(
                "authorizing capability {parent_id} is {}",
                parent.status
            )));
        }
        if parent.assignee != capability.assigner {
            return Err(AuthorizationError::InvalidAuthority(format!(
                "authorizing capability {parent_id} is held by {}, not {}",
                parent.assignee, capability.assigner
            )));
        }
        if parent.name != capability.name || !value_covers(&parent.value, &capability.value) {
            return Err(AuthorizationError::InvalidAuthority(format!(
                "authorizing capability {parent_id} ({} {}) does not cover {} {}",
                parent.name, parent.value, capability.name, capability.value
            )));
        }

        for link in self.store.chain_of(parent_id) {
            link.map_err(|e| self.surface(e.into()))?;
        }
        Ok(())
    }

    /// Run `op` under the request's lock.
    ///
    /// Once the request is resolved or unknown nothing can mutate it again,
    /// so its lock entry is dropped.
    fn with_request_lock<T>(
        &self,
        request_id: &RequestId,
        op: impl FnOnce() -> AuthzResult<T>,
    ) -> AuthzResult<T> {
        let lock = self.locks.lock_for(request_id);
        let _guard = self.locks.acquire(request_id, &lock)?;
        let result = op();
        if !self.tracker.get(request_id).is_ok_and(|r| r.is_pending()) {
            self.locks.release(request_id);
        }
        result
    }

    /// Retire the losing candidates of a resolved request.
    ///
    /// Caller must hold the request lock.
    fn supersede(&self, request_id: &RequestId, discarded: &[Capability]) {
        if discarded.is_empty() {
            return;
        }
        let ids: Vec<CapabilityId> = discarded.iter().map(|c| c.id.clone()).collect();
        for id in self.store.supersede(&ids) {
            debug!(request_id = %request_id, capability_id = %id, "Candidate superseded");
        }
    }

    /// Log defects before handing them to the caller.
    fn surface(&self, err: AuthorizationError) -> AuthorizationError {
        if err.is_defect() {
            error!(error = %err, "Delegation invariant violated");
        }
        err
    }

    fn refresh_gauges(&self) {
        crate::metrics::set_capability_counts(self.store.counts());
        crate::metrics::set_pending_requests(self.tracker.pending_count());
    }
}
