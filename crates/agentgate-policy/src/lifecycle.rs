// agentgate-policy/src/lifecycle.rs
// ============================================================================
// Module: Policy Lifecycle Registry
// Description: Draft/in_review/published/rolled_back revision state machine.
// Purpose: Guard policy promotion so only one revision is published at a
//          time and rollback always restores a named prior revision.
// Dependencies: agentgate-core
// ============================================================================

//! ## Overview
//! A revision moves `draft -> in_review -> published`, with `rolled_back` as
//! a sink reachable only from `published`. The registry holds revisions
//! in-memory behind a mutex, matching the approval-workflow and quarantine
//! coordinators' "single re-entrant mutex, no I/O in the critical section"
//! shape; revisions are small and reconstructible from the signed package
//! store, so no separate persistence layer is required.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::signed::PolicyBundle;
use thiserror::Error;

/// Lifecycle status of a policy revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionStatus {
    /// Newly created, not yet submitted for review.
    Draft,
    /// Submitted for review; eligible for publish.
    InReview,
    /// The currently active revision.
    Published,
    /// Superseded by a rollback; terminal.
    RolledBack,
}

/// A policy revision tracked by the lifecycle registry.
#[derive(Debug, Clone)]
pub struct PolicyRevision {
    /// Revision identifier.
    pub revision_id: String,
    /// Tenant the revision applies to.
    pub tenant_id: String,
    /// Current lifecycle status.
    pub status: RevisionStatus,
    /// The tool-list bundle this revision carries.
    pub bundle: PolicyBundle,
}

/// Errors raised by [`LifecycleRegistry`] transitions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No revision exists with the given id.
    #[error("unknown policy revision: {0}")]
    NotFound(String),
    /// The requested transition is not valid from the revision's current status.
    #[error("cannot {action} revision {revision_id} in status {status:?}")]
    InvalidTransition { revision_id: String, status: RevisionStatus, action: &'static str },
}

/// In-memory registry enforcing the policy revision lifecycle.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    revisions: Mutex<BTreeMap<String, PolicyRevision>>,
}

impl LifecycleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new `draft` revision.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the registry's internal lock is
    /// poisoned.
    pub fn create_draft(&self, revision_id: impl Into<String>, tenant_id: impl Into<String>, bundle: PolicyBundle) -> Result<(), LifecycleError> {
        let revision_id = revision_id.into();
        let revision = PolicyRevision { revision_id: revision_id.clone(), tenant_id: tenant_id.into(), status: RevisionStatus::Draft, bundle };
        self.lock()?.insert(revision_id, revision);
        Ok(())
    }

    /// Moves a `draft` revision to `in_review`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] or [`LifecycleError::InvalidTransition`].
    pub fn submit_for_review(&self, revision_id: &str) -> Result<(), LifecycleError> {
        self.transition(revision_id, RevisionStatus::Draft, RevisionStatus::InReview, "submit for review")
    }

    /// Publishes an `in_review` revision, demoting any currently-published
    /// revision for the same tenant to nothing (it simply stops being the
    /// unique published one; it is left in place for audit/rollback).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] or [`LifecycleError::InvalidTransition`]
    /// if the revision is not `in_review`.
    pub fn publish(&self, revision_id: &str) -> Result<(), LifecycleError> {
        let mut revisions = self.lock()?;
        let tenant_id = {
            let revision = revisions.get(revision_id).ok_or_else(|| LifecycleError::NotFound(revision_id.to_string()))?;
            if revision.status != RevisionStatus::InReview {
                return Err(LifecycleError::InvalidTransition { revision_id: revision_id.to_string(), status: revision.status, action: "publish" });
            }
            revision.tenant_id.clone()
        };
        for other in revisions.values_mut() {
            if other.tenant_id == tenant_id && other.revision_id != revision_id && other.status == RevisionStatus::Published {
                other.status = RevisionStatus::RolledBack;
            }
        }
        if let Some(revision) = revisions.get_mut(revision_id) {
            revision.status = RevisionStatus::Published;
        }
        Ok(())
    }

    /// Rolls back the currently `published` revision for `tenant_id` and
    /// restores `restore_revision_id` (which must already be `rolled_back`
    /// or otherwise not currently published) to `published`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] if either revision is missing, or
    /// [`LifecycleError::InvalidTransition`] if no revision for the tenant is
    /// currently published.
    pub fn rollback(&self, tenant_id: &str, restore_revision_id: &str) -> Result<(), LifecycleError> {
        let mut revisions = self.lock()?;
        if !revisions.contains_key(restore_revision_id) {
            return Err(LifecycleError::NotFound(restore_revision_id.to_string()));
        }
        let published_id = revisions
            .values()
            .find(|revision| revision.tenant_id == tenant_id && revision.status == RevisionStatus::Published)
            .map(|revision| revision.revision_id.clone());
        let Some(published_id) = published_id else {
            return Err(LifecycleError::InvalidTransition { revision_id: tenant_id.to_string(), status: RevisionStatus::Draft, action: "rollback" });
        };
        if let Some(revision) = revisions.get_mut(&published_id) {
            revision.status = RevisionStatus::RolledBack;
        }
        if let Some(revision) = revisions.get_mut(restore_revision_id) {
            revision.status = RevisionStatus::Published;
        }
        Ok(())
    }

    /// Returns the currently `published` revision's bundle for `tenant_id`,
    /// if any.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] if the registry's internal lock is
    /// poisoned.
    pub fn published_bundle(&self, tenant_id: &str) -> Result<Option<PolicyBundle>, LifecycleError> {
        Ok(self.lock()?.values().find(|revision| revision.tenant_id == tenant_id && revision.status == RevisionStatus::Published).map(|revision| revision.bundle.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, PolicyRevision>>, LifecycleError> {
        self.revisions.lock().map_err(|_| LifecycleError::NotFound("registry lock poisoned".to_string()))
    }

    fn transition(&self, revision_id: &str, from: RevisionStatus, to: RevisionStatus, action: &'static str) -> Result<(), LifecycleError> {
        let mut revisions = self.lock()?;
        let revision = revisions.get_mut(revision_id).ok_or_else(|| LifecycleError::NotFound(revision_id.to_string()))?;
        if revision.status != from {
            return Err(LifecycleError::InvalidTransition { revision_id: revision_id.to_string(), status: revision.status, action });
        }
        revision.status = to;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_reaches_published() {
        let registry = LifecycleRegistry::new();
        registry.create_draft("r1", "tenant-a", PolicyBundle::default()).expect("creates");
        registry.submit_for_review("r1").expect("submits");
        registry.publish("r1").expect("publishes");
        let bundle = registry.published_bundle("tenant-a").expect("queries");
        assert!(bundle.is_some());
    }

    #[test]
    fn publish_without_review_is_rejected() {
        let registry = LifecycleRegistry::new();
        registry.create_draft("r1", "tenant-a", PolicyBundle::default()).expect("creates");
        let result = registry.publish("r1");
        assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));
    }

    #[test]
    fn only_one_revision_published_per_tenant() {
        let registry = LifecycleRegistry::new();
        registry.create_draft("r1", "tenant-a", PolicyBundle::default()).expect("creates");
        registry.submit_for_review("r1").expect("submits");
        registry.publish("r1").expect("publishes");

        registry.create_draft("r2", "tenant-a", PolicyBundle::default()).expect("creates");
        registry.submit_for_review("r2").expect("submits");
        registry.publish("r2").expect("publishes");

        registry.rollback("tenant-a", "r1").expect("rolls back");
        let bundle = registry.published_bundle("tenant-a").expect("queries");
        assert!(bundle.is_some());
    }
}
