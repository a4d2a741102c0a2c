//! Unified error handling for capauthd.
//!
//! Component errors (store, tracker) propagate unmodified into
//! [`AuthorizationError`], which owns the mapping to HTTP status codes
//! and metric labels.

use crate::caps::model::{CapabilityId, CapabilityStatus, RequestId};
use axum::http::StatusCode;
use thiserror::Error;

// ============================================================================
// Capability Store Errors
// ============================================================================

/// Errors raised by the capability store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("capability not found: {0}")]
    NotFound(CapabilityId),

    #[error("capability id already issued: {0}")]
    DuplicateId(CapabilityId),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: CapabilityId,
        from: CapabilityStatus,
        to: CapabilityStatus,
    },

    #[error("delegation cycle detected at {0}")]
    CycleDetected(CapabilityId),

    #[error("authorizing capability {parent} of {id} is not granted")]
    ParentNotGranted {
        id: CapabilityId,
        parent: CapabilityId,
    },
}

impl StoreError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DuplicateId(_) => "duplicate_id",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CycleDetected(_) => "cycle_detected",
            Self::ParentNotGranted { .. } => "parent_not_granted",
        }
    }
}

// ============================================================================
// Request Tracker Errors
// ============================================================================

/// Errors raised by the request tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("capability request not found: {0}")]
    NotFound(RequestId),

    #[error("capability request already resolved: {0}")]
    AlreadyResolved(RequestId),

    #[error("capability {capability} is not a candidate of request {request}")]
    UnknownCandidate {
        request: RequestId,
        capability: CapabilityId,
    },
}

impl TrackerError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::UnknownCandidate { .. } => "unknown_candidate",
        }
    }
}

// ============================================================================
// Authorization Errors (service boundary)
// ============================================================================

/// Errors surfaced by the delegation authorization service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("grant policy not satisfied: {0}")]
    PolicyNotSatisfied(String),

    #[error("invalid authority: {0}")]
    InvalidAuthority(String),

    #[error("request {0} is contended, retry later")]
    Contention(RequestId),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthorizationError {
    /// Get a static error code string for metrics labeling and error bodies.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Tracker(e) => e.error_code(),
            Self::PolicyNotSatisfied(_) => "policy_not_satisfied",
            Self::InvalidAuthority(_) => "invalid_authority",
            Self::Contention(_) => "contention",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::NotFound(_))
            | Self::Tracker(TrackerError::NotFound(_))
            | Self::Tracker(TrackerError::UnknownCandidate { .. }) => StatusCode::NOT_FOUND,

            Self::Tracker(TrackerError::AlreadyResolved(_))
            | Self::Contention(_)
            | Self::Store(StoreError::InvalidTransition { .. })
            | Self::Store(StoreError::DuplicateId(_)) => StatusCode::CONFLICT,

            Self::PolicyNotSatisfied(_)
            | Self::InvalidAuthority(_)
            | Self::Store(StoreError::ParentNotGranted { .. }) => StatusCode::FORBIDDEN,

            // Invariant violation, not a user error.
            Self::Store(StoreError::CycleDetected(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// True for errors that indicate a defect rather than a rejected request.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Store(StoreError::CycleDetected(_)))
    }
}

/// Result type for authorization service operations.
pub type AuthzResult<T> = Result<T, AuthorizationError>;
