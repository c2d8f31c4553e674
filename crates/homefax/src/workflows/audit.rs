use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ActorId, AuditEntryId};
use super::error::ResourceRef;
use super::store::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Register,
    IssueAdminKey,
    RedeemAdminKey,
    SubmitProperty,
    AssignOwner,
    ImportProperty,
    CreateAccessRequest,
    ApproveAccessRequest,
    DenyAccessRequest,
    CreateProject,
    EditProject,
    AppendProjectUpdate,
    CompleteProject,
    AddMaintenanceTask,
    CompleteMaintenanceTask,
    EditMaintenanceTask,
}

/// Immutable record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: Option<ActorId>,
    pub action: AuditAction,
    pub resource: ResourceRef,
    pub at: DateTime<Utc>,
}

/// Appends an entry inside the caller's transaction.
pub(crate) fn record(
    tables: &mut Tables,
    actor_id: Option<ActorId>,
    action: AuditAction,
    resource: ResourceRef,
    at: DateTime<Utc>,
) {
    let id = AuditEntryId(tables.allocate("audit"));
    tables.audit.push(AuditEntry {
        id,
        actor_id,
        action,
        resource,
        at,
    });
}
