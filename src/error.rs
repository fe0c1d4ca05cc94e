//! Canonical error type surfaced by the core.
//!
//! Every failure `start_child` and related operations can return (§6, §7),
//! shaped as a `thiserror` enum: one variant per failure kind, plus
//! `is_fatal`/`is_retryable` accessors callers can branch on without
//! matching every variant.

use thiserror::Error;

use crate::childspec::ChildRef;

/// Errors the core can surface to a caller.
#[derive(Debug, Error)]
pub enum ParentError {
    #[error("child spec is invalid: {reason}")]
    InvalidChildSpec { reason: String },

    #[error("child id {id} is pid-shaped and cannot be used as an id")]
    InvalidChildId { id: String },

    #[error("id {id} is already registered as pid {pid}")]
    AlreadyStarted { id: String, pid: String },

    #[error("child {from} binds to unresolved references: {to:?}")]
    MissingDeps { from: String, to: Vec<ChildRef> },

    #[error("binding-strength violation: {from} may not bind to {to:?}")]
    ForbiddenBindings { from: String, to: Vec<ChildRef> },

    #[error("shutdown group {group} has members with different restart policies")]
    NonUniformShutdownGroup { group: String },

    #[error("child {id} not found")]
    ChildNotFound { id: ChildRef },

    #[error("child start function failed: {reason}")]
    StartFailed { reason: String },

    #[error("configuration is invalid: {reason}")]
    InvalidConfiguration { reason: String },
}

impl ParentError {
    /// An error that can only be resolved by the owner itself giving up
    /// (the escalation path of §7). Intensity-ceiling failures are carried
    /// out-of-band as [`crate::restart_engine::EscalationReason`], not as a
    /// `ParentError` variant, so no variant here is unconditionally fatal.
    pub fn is_fatal(&self) -> bool {
        false
    }

    /// An error the Restart Engine's deferred-retry path may reasonably
    /// try again (a start failure, as opposed to a validation error which
    /// will never succeed on retry without caller intervention).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParentError::StartFailed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ParentError::ChildNotFound { .. })
    }
}
