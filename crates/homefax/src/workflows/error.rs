use std::fmt;

use serde::Serialize;

use super::domain::{
    AccessRequestId, ActorId, AdminKeyId, MaintenanceTaskId, NoticeId, ProjectId, PropertyId,
};
use super::permissions::DenialReason;
use super::store::RepositoryError;

/// Reference to a record that a request could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Actor(ActorId),
    Property(PropertyId),
    AccessRequest(AccessRequestId),
    Project(ProjectId),
    MaintenanceTask(MaintenanceTaskId),
    Notice(NoticeId),
    AdminKey(AdminKeyId),
    /// A presented key value matched nothing; the value itself is never echoed.
    UnknownAdminKey,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Actor(id) => write!(f, "{id}"),
            ResourceRef::Property(id) => write!(f, "{id}"),
            ResourceRef::AccessRequest(id) => write!(f, "{id}"),
            ResourceRef::Project(id) => write!(f, "{id}"),
            ResourceRef::MaintenanceTask(id) => write!(f, "{id}"),
            ResourceRef::Notice(id) => write!(f, "{id}"),
            ResourceRef::AdminKey(id) => write!(f, "{id}"),
            ResourceRef::UnknownAdminKey => write!(f, "admin key"),
        }
    }
}

/// Invariant a requested transition would break.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("admin key has already been redeemed")]
    KeyAlreadyUsed,
    #[error("progress may not decrease (current {current}%, attempted {attempted}%)")]
    ProgressRegression { current: u8, attempted: u8 },
    #[error("project is completed and cannot change")]
    ProjectCompleted,
    #[error("project is at {percent}% and must reach 100% before completion")]
    ProjectNotFinished { percent: u8 },
    #[error("access request is {status} and cannot open a project")]
    RequestNotApproved { status: &'static str },
    #[error("access request already opened {0}")]
    ProjectAlreadyOpened(ProjectId),
    #[error("property already has an owner")]
    OwnershipAlreadyAssigned,
    #[error("property is not accepting requests while {0}")]
    PropertyUnavailable(&'static str),
}

/// Failure taxonomy shared by every workflow manager.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("missing or invalid session")]
    Unauthenticated,
    #[error("not authorized: {0}")]
    NotAuthorized(DenialReason),
    #[error("{0} not found")]
    NotFound(ResourceRef),
    #[error("invalid state: {0}")]
    InvalidState(#[from] InvariantViolation),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
