//! Single decision point for every role-conditioned capability.
//!
//! Handlers never branch on roles themselves: they describe the action and the resource it
//! targets and consult [`PermissionEvaluator::evaluate`]. The evaluator is pure; anything
//! that needs a store lookup (such as operate rights granted by an approved contractor-access
//! request) is resolved by the caller and passed in on the [`Resource`].

use serde::Serialize;

use super::domain::{
    AccessRequest, AccessRequestType, MaintenanceTask, Notice, Principal, Project, Property,
    Role,
};
use super::error::WorkflowError;

/// Capability being exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewPropertyRecord,
    SubmitProperty,
    AssignOwner,
    ImportPropertyRoll,
    CreateAccessRequest(AccessRequestType),
    ViewAccessRequest,
    ResolveAccessRequest,
    CreateProject,
    OpenProjectFromRequest,
    ViewProject,
    EditProject,
    AppendProjectUpdate,
    CompleteProject,
    IssueAdminKey,
    ListAdminKeys,
    BroadcastNotice,
    ViewAuditLog,
    AddMaintenanceTask,
    CompleteMaintenanceTask,
    ReadNotice,
}

/// Record an action targets.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Platform,
    Property {
        property: &'a Property,
        operate_rights: bool,
    },
    AccessRequest {
        request: &'a AccessRequest,
        property: &'a Property,
    },
    Project {
        project: &'a Project,
        property: &'a Property,
    },
    MaintenanceTask {
        task: &'a MaintenanceTask,
        property: &'a Property,
        operate_rights: bool,
    },
    Notice(&'a Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    #[error("an authenticated session is required")]
    AuthenticationRequired,
    #[error("requires the {} role", .0.label())]
    RoleRequired(Role),
    #[error("requires the root administrator")]
    RootAdministratorRequired,
    #[error("only the property owner or an administrator may do this")]
    NotPropertyOwner,
    #[error("only the contractor assigned to the project may do this")]
    NotAssignedContractor,
    #[error("only the requesting contractor may do this")]
    NotRequester,
    #[error("contractor has no approved access to this property")]
    NoOperateRights,
    #[error("notice is addressed to another actor")]
    NotRecipient,
    #[error("action does not apply to this resource")]
    UnsupportedResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn into_result(self) -> Result<(), WorkflowError> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(WorkflowError::NotAuthorized(reason)),
        }
    }

    fn from_check(allowed: bool, reason: DenialReason) -> Self {
        if allowed {
            Decision::Allowed
        } else {
            Decision::Denied(reason)
        }
    }
}

/// How much of a property record a principal may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyVisibility {
    Full,
    Public,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn allowed(&self, principal: Principal<'_>, action: Action, resource: &Resource<'_>) -> bool {
        self.evaluate(principal, action, resource).is_allowed()
    }

    pub fn property_visibility(
        &self,
        principal: Principal<'_>,
        property: &Property,
        operate_rights: bool,
    ) -> PropertyVisibility {
        let resource = Resource::Property {
            property,
            operate_rights,
        };
        if self.allowed(principal, Action::ViewPropertyRecord, &resource) {
            PropertyVisibility::Full
        } else {
            PropertyVisibility::Public
        }
    }

    pub fn evaluate(
        &self,
        principal: Principal<'_>,
        action: Action,
        resource: &Resource<'_>,
    ) -> Decision {
        // Public information requests are the one action open to anonymous visitors.
        if let (Action::CreateAccessRequest(AccessRequestType::PublicInfoRequest), Resource::Property { .. }) =
            (action, resource)
        {
            return Decision::Allowed;
        }

        let Some(actor) = principal.actor() else {
            return Decision::Denied(DenialReason::AuthenticationRequired);
        };
        let is_admin = actor.is_admin();
        let is_contractor = actor.is_contractor();

        match (action, *resource) {
            (Action::ViewPropertyRecord, Resource::Property { property, operate_rights }) => {
                Decision::from_check(
                    is_admin || property.is_owned_by(actor.id) || (is_contractor && operate_rights),
                    DenialReason::NotPropertyOwner,
                )
            }
            (Action::SubmitProperty, Resource::Platform) => {
                Decision::from_check(is_contractor, DenialReason::RoleRequired(Role::Contractor))
            }
            (Action::AssignOwner, Resource::Property { .. })
            | (Action::ImportPropertyRoll, Resource::Platform)
            | (Action::BroadcastNotice, Resource::Platform)
            | (Action::ViewAuditLog, Resource::Platform) => {
                Decision::from_check(is_admin, DenialReason::RoleRequired(Role::Administrator))
            }
            (Action::CreateAccessRequest(_), Resource::Property { .. }) => {
                Decision::from_check(is_contractor, DenialReason::RoleRequired(Role::Contractor))
            }
            (Action::ViewAccessRequest, Resource::AccessRequest { request, property }) => {
                Decision::from_check(
                    is_admin
                        || property.is_owned_by(actor.id)
                        || request.contractor_id == Some(actor.id),
                    DenialReason::NotPropertyOwner,
                )
            }
            (Action::ResolveAccessRequest, Resource::AccessRequest { property, .. }) => {
                Decision::from_check(
                    is_admin || property.is_owned_by(actor.id),
                    DenialReason::NotPropertyOwner,
                )
            }
            (Action::CreateProject, Resource::Property { property, operate_rights }) => {
                if !is_contractor {
                    Decision::Denied(DenialReason::RoleRequired(Role::Contractor))
                } else {
                    Decision::from_check(
                        operate_rights || property.owner_id.is_none(),
                        DenialReason::NoOperateRights,
                    )
                }
            }
            (Action::OpenProjectFromRequest, Resource::AccessRequest { request, .. }) => {
                Decision::from_check(
                    is_contractor && request.contractor_id == Some(actor.id),
                    DenialReason::NotRequester,
                )
            }
            (Action::ViewProject, Resource::Project { project, property }) => Decision::from_check(
                is_admin || project.contractor_id == actor.id || property.is_owned_by(actor.id),
                DenialReason::NotPropertyOwner,
            ),
            (Action::EditProject, Resource::Project { project, .. }) => Decision::from_check(
                is_admin || project.contractor_id == actor.id,
                DenialReason::NotAssignedContractor,
            ),
            (Action::AppendProjectUpdate, Resource::Project { project, .. })
            | (Action::CompleteProject, Resource::Project { project, .. }) => Decision::from_check(
                project.contractor_id == actor.id,
                DenialReason::NotAssignedContractor,
            ),
            (Action::IssueAdminKey, Resource::Platform)
            | (Action::ListAdminKeys, Resource::Platform) => Decision::from_check(
                actor.is_root_admin(),
                DenialReason::RootAdministratorRequired,
            ),
            (Action::AddMaintenanceTask, Resource::Property { property, .. }) => {
                Decision::from_check(
                    is_admin || property.is_owned_by(actor.id),
                    DenialReason::NotPropertyOwner,
                )
            }
            (
                Action::CompleteMaintenanceTask,
                Resource::MaintenanceTask {
                    task,
                    property,
                    operate_rights,
                },
            ) => {
                if is_contractor && operate_rights {
                    Decision::Allowed
                } else if task.owner_editable {
                    Decision::from_check(
                        is_admin || property.is_owned_by(actor.id),
                        DenialReason::NotPropertyOwner,
                    )
                } else if is_contractor {
                    Decision::Denied(DenialReason::NoOperateRights)
                } else {
                    Decision::Denied(DenialReason::RoleRequired(Role::Contractor))
                }
            }
            (Action::ReadNotice, Resource::Notice(notice)) => match notice.recipient {
                Some(recipient) => {
                    Decision::from_check(recipient == actor.id, DenialReason::NotRecipient)
                }
                None => Decision::from_check(is_admin, DenialReason::NotRecipient),
            },
            _ => Decision::Denied(DenialReason::UnsupportedResource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::domain::{
        AccessRequestId, AccessRequestStatus, Actor, ActorId, MaintenanceStatus,
        MaintenanceTaskId, NoticeId, NoticePriority, NoticeStatus, ProjectId, ProjectStatus,
        PropertyId, PropertyStatus, RoleProfile, StructuralFacts,
    };
    use chrono::{TimeZone, Utc};

    fn actor(id: u64, profile: RoleProfile) -> Actor {
        Actor {
            id: ActorId(id),
            name: format!("Actor {id}"),
            email: format!("actor{id}@example.com"),
            profile,
            password_hash: String::new(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn contractor(id: u64) -> Actor {
        actor(
            id,
            RoleProfile::Contractor {
                company: "Cedar Build".to_string(),
                trade: "roofing".to_string(),
            },
        )
    }

    fn property(owner: Option<u64>) -> Property {
        Property {
            id: PropertyId(1),
            address: "6000 SW Broadway".to_string(),
            city: "Portland".to_string(),
            state: "OR".to_string(),
            zip_code: "97221".to_string(),
            facts: StructuralFacts::default(),
            status: PropertyStatus::Active,
            owner_id: owner.map(ActorId),
            owner_of_record: None,
            utilities: Vec::new(),
            assessed_value: Some(640_000),
            financials_public: false,
            completion_percent: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn request(contractor: Option<u64>) -> AccessRequest {
        AccessRequest {
            id: AccessRequestId(1),
            property_id: PropertyId(1),
            contractor_id: contractor.map(ActorId),
            owner_id: Some(ActorId(1)),
            admin_id: None,
            requested_by: contractor.map(ActorId),
            request_type: AccessRequestType::ContractorAccess,
            status: AccessRequestStatus::Pending,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn project(contractor: u64) -> Project {
        Project {
            id: ProjectId(1),
            property_id: PropertyId(1),
            contractor_id: ActorId(contractor),
            project_type: "roof".to_string(),
            description: "Replace roof".to_string(),
            status: ProjectStatus::InProgress,
            percent_complete: 0,
            attachments: Vec::new(),
            source_request: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn only_owner_or_admin_resolve_access_requests() {
        let evaluator = PermissionEvaluator::new();
        let owner = actor(1, RoleProfile::Owner);
        let stranger = actor(2, RoleProfile::Owner);
        let admin = actor(3, RoleProfile::Administrator { root: false });
        let requester = contractor(4);
        let property = property(Some(1));
        let request = request(Some(4));
        let resource = Resource::AccessRequest {
            request: &request,
            property: &property,
        };

        assert!(evaluator.allowed((&owner).into(), Action::ResolveAccessRequest, &resource));
        assert!(evaluator.allowed((&admin).into(), Action::ResolveAccessRequest, &resource));
        assert_eq!(
            evaluator.evaluate((&stranger).into(), Action::ResolveAccessRequest, &resource),
            Decision::Denied(DenialReason::NotPropertyOwner)
        );
        assert!(!evaluator.allowed((&requester).into(), Action::ResolveAccessRequest, &resource));
        assert_eq!(
            evaluator.evaluate(Principal::Public, Action::ResolveAccessRequest, &resource),
            Decision::Denied(DenialReason::AuthenticationRequired)
        );
    }

    #[test]
    fn only_assigned_contractor_updates_projects() {
        let evaluator = PermissionEvaluator::new();
        let assigned = contractor(4);
        let other = contractor(5);
        let admin = actor(3, RoleProfile::Administrator { root: true });
        let property = property(Some(1));
        let project = project(4);
        let resource = Resource::Project {
            project: &project,
            property: &property,
        };

        assert!(evaluator.allowed((&assigned).into(), Action::AppendProjectUpdate, &resource));
        assert!(evaluator.allowed((&assigned).into(), Action::CompleteProject, &resource));
        assert_eq!(
            evaluator.evaluate((&other).into(), Action::AppendProjectUpdate, &resource),
            Decision::Denied(DenialReason::NotAssignedContractor)
        );
        assert!(!evaluator.allowed((&admin).into(), Action::CompleteProject, &resource));
        assert!(evaluator.allowed((&admin).into(), Action::EditProject, &resource));
    }

    #[test]
    fn admin_keys_require_root_administrator() {
        let evaluator = PermissionEvaluator::new();
        let root = actor(1, RoleProfile::Administrator { root: true });
        let delegated = actor(2, RoleProfile::Administrator { root: false });

        assert!(evaluator.allowed((&root).into(), Action::IssueAdminKey, &Resource::Platform));
        assert!(evaluator.allowed((&root).into(), Action::ListAdminKeys, &Resource::Platform));
        assert_eq!(
            evaluator.evaluate((&delegated).into(), Action::IssueAdminKey, &Resource::Platform),
            Decision::Denied(DenialReason::RootAdministratorRequired)
        );
        assert!(evaluator.allowed((&delegated).into(), Action::BroadcastNotice, &Resource::Platform));
    }

    #[test]
    fn public_visitors_get_restricted_view_and_info_requests() {
        let evaluator = PermissionEvaluator::new();
        let property = property(Some(1));
        let resource = Resource::Property {
            property: &property,
            operate_rights: false,
        };

        assert!(evaluator.allowed(
            Principal::Public,
            Action::CreateAccessRequest(AccessRequestType::PublicInfoRequest),
            &resource
        ));
        assert!(!evaluator.allowed(
            Principal::Public,
            Action::CreateAccessRequest(AccessRequestType::ContractorAccess),
            &resource
        ));
        assert_eq!(
            evaluator.property_visibility(Principal::Public, &property, false),
            PropertyVisibility::Public
        );

        let owner = actor(1, RoleProfile::Owner);
        let granted = contractor(4);
        assert_eq!(
            evaluator.property_visibility((&owner).into(), &property, false),
            PropertyVisibility::Full
        );
        assert_eq!(
            evaluator.property_visibility((&granted).into(), &property, true),
            PropertyVisibility::Full
        );
        assert_eq!(
            evaluator.property_visibility((&granted).into(), &property, false),
            PropertyVisibility::Public
        );
    }

    #[test]
    fn contractor_only_tasks_reject_owners() {
        let evaluator = PermissionEvaluator::new();
        let owner = actor(1, RoleProfile::Owner);
        let granted = contractor(4);
        let property = property(Some(1));
        let mut task = MaintenanceTask {
            id: MaintenanceTaskId(1),
            property_id: PropertyId(1),
            title: "Service furnace".to_string(),
            frequency_months: Some(12),
            last_completed: None,
            next_due: None,
            status: MaintenanceStatus::RequiresContractor,
            owner_editable: false,
        };

        let resource = Resource::MaintenanceTask {
            task: &task,
            property: &property,
            operate_rights: false,
        };
        assert_eq!(
            evaluator.evaluate((&owner).into(), Action::CompleteMaintenanceTask, &resource),
            Decision::Denied(DenialReason::RoleRequired(Role::Contractor))
        );
        let granted_resource = Resource::MaintenanceTask {
            task: &task,
            property: &property,
            operate_rights: true,
        };
        assert!(evaluator.allowed(
            (&granted).into(),
            Action::CompleteMaintenanceTask,
            &granted_resource
        ));

        task.owner_editable = true;
        let resource = Resource::MaintenanceTask {
            task: &task,
            property: &property,
            operate_rights: false,
        };
        assert!(evaluator.allowed((&owner).into(), Action::CompleteMaintenanceTask, &resource));
    }

    #[test]
    fn direct_projects_need_operate_rights_on_claimed_properties() {
        let evaluator = PermissionEvaluator::new();
        let builder = contractor(4);
        let claimed = property(Some(1));
        let unclaimed = property(None);

        let denied = Resource::Property {
            property: &claimed,
            operate_rights: false,
        };
        assert_eq!(
            evaluator.evaluate((&builder).into(), Action::CreateProject, &denied),
            Decision::Denied(DenialReason::NoOperateRights)
        );
        let open = Resource::Property {
            property: &unclaimed,
            operate_rights: false,
        };
        assert!(evaluator.allowed((&builder).into(), Action::CreateProject, &open));
    }

    #[test]
    fn broadcast_notices_are_marked_read_by_administrators() {
        let evaluator = PermissionEvaluator::new();
        let owner = actor(1, RoleProfile::Owner);
        let admin = actor(3, RoleProfile::Administrator { root: false });
        let notice = Notice {
            id: NoticeId(1),
            recipient: None,
            property_id: None,
            status: NoticeStatus::Unread,
            priority: NoticePriority::Normal,
            title: "Water main work".to_string(),
            body: "Expect low pressure".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };

        assert!(!evaluator.allowed((&owner).into(), Action::ReadNotice, &Resource::Notice(&notice)));
        assert!(evaluator.allowed((&admin).into(), Action::ReadNotice, &Resource::Notice(&notice)));
    }

    #[test]
    fn mismatched_resources_are_denied() {
        let evaluator = PermissionEvaluator::new();
        let admin = actor(3, RoleProfile::Administrator { root: true });
        assert_eq!(
            evaluator.evaluate((&admin).into(), Action::CompleteProject, &Resource::Platform),
            Decision::Denied(DenialReason::UnsupportedResource)
        );
    }
}
