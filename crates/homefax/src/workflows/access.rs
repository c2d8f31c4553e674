//! Access request state machine.
//!
//! `pending` moves once to `approved` or `denied`; both are terminal. Resolving a request
//! that is already terminal returns it unchanged so that client retries are harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{
    AccessOutcome, AccessRequest, AccessRequestId, AccessRequestStatus, AccessRequestType, Actor,
    ActorId, Principal, Project, PropertyId, PropertyStatus, Role,
};
use super::error::{InvariantViolation, ResourceRef, WorkflowError};
use super::notifications::{NotificationRouter, PlatformEvent};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::projects::{self, ProjectOpening};
use super::store::{PlatformStore, Tables};

/// Body of `POST /access-requests`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRequestDraft {
    pub property_id: PropertyId,
    #[serde(default)]
    pub contractor_id: Option<ActorId>,
    #[serde(default)]
    pub owner_id: Option<ActorId>,
    #[serde(default)]
    pub admin_id: Option<ActorId>,
    pub request_type: AccessRequestType,
}

/// Outcome of a resolve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub request: AccessRequest,
    /// False when the request was already terminal and nothing changed.
    pub transitioned: bool,
    /// Project opened by approving a new-property submission.
    pub project: Option<Project>,
}

pub struct AccessRequestManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationRouter<S>>,
    evaluator: PermissionEvaluator,
}

impl<S> AccessRequestManager<S>
where
    S: PlatformStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        notifications: Arc<NotificationRouter<S>>,
    ) -> Self {
        Self {
            store,
            clock,
            notifications,
            evaluator: PermissionEvaluator::new(),
        }
    }

    /// File a request. New requests are always pending.
    pub fn create(
        &self,
        principal: Principal<'_>,
        draft: AccessRequestDraft,
    ) -> Result<AccessRequest, WorkflowError> {
        let contractor_id = match (principal.actor(), draft.contractor_id) {
            (Some(actor), Some(claimed)) if claimed != actor.id => {
                return Err(WorkflowError::validation(
                    "contractor_id must match the session actor",
                ))
            }
            (Some(actor), _) if actor.is_contractor() => Some(actor.id),
            (None, Some(_)) => {
                return Err(WorkflowError::validation(
                    "anonymous requests may not name a contractor",
                ))
            }
            _ => None,
        };

        let now = self.clock.now();
        let request = self.store.transaction(|tables| -> Result<AccessRequest, WorkflowError> {
            let property = tables.property(draft.property_id)?;
            self.evaluator
                .evaluate(
                    principal,
                    Action::CreateAccessRequest(draft.request_type),
                    &Resource::Property {
                        property,
                        operate_rights: false,
                    },
                )
                .into_result()?;
            if property.status == PropertyStatus::Archived {
                return Err(InvariantViolation::PropertyUnavailable("archived").into());
            }
            if draft.owner_id.is_some_and(|owner| property.owner_id != Some(owner)) {
                return Err(WorkflowError::validation(
                    "owner_id does not match the property owner",
                ));
            }
            if let Some(admin_id) = draft.admin_id {
                if !tables.actor(admin_id)?.is_admin() {
                    return Err(WorkflowError::validation(
                        "admin_id does not name an administrator",
                    ));
                }
            }

            let owner_id = property.owner_id;
            let request = insert_request(
                tables,
                NewRequest {
                    property_id: draft.property_id,
                    contractor_id,
                    owner_id,
                    admin_id: draft.admin_id,
                    request_type: draft.request_type,
                },
                principal.actor_id(),
                now,
            );
            Ok(request)
        })?;

        info!(
            request = %request.id,
            property = %request.property_id,
            request_type = ?request.request_type,
            "access request created"
        );
        Ok(request)
    }

    /// Apply the owner's or an administrator's disposition.
    ///
    /// The terminal check and the write share one transaction, so of two concurrent
    /// resolutions exactly one reports `transitioned` and only that one emits notices.
    pub fn resolve(
        &self,
        request_id: AccessRequestId,
        actor: &Actor,
        outcome: AccessOutcome,
    ) -> Result<Resolution, WorkflowError> {
        let now = self.clock.now();
        let resolution = self.store.transaction(|tables| -> Result<Resolution, WorkflowError> {
            let request = tables.access_request(request_id)?;
            let property = tables.property(request.property_id)?;
            self.evaluator
                .evaluate(
                    actor.into(),
                    Action::ResolveAccessRequest,
                    &Resource::AccessRequest { request, property },
                )
                .into_result()?;
            if request.status.is_terminal() {
                return Ok(Resolution {
                    request: request.clone(),
                    transitioned: false,
                    project: None,
                });
            }

            let request = {
                let request = tables
                    .access_requests
                    .get_mut(&request_id)
                    .ok_or(WorkflowError::NotFound(ResourceRef::AccessRequest(request_id)))?;
                request.status = outcome.into();
                request.resolved_by = Some(actor.id);
                request.resolved_at = Some(now);
                request.clone()
            };
            let action = match outcome {
                AccessOutcome::Approved => AuditAction::ApproveAccessRequest,
                AccessOutcome::Denied => AuditAction::DenyAccessRequest,
            };
            audit::record(
                tables,
                Some(actor.id),
                action,
                ResourceRef::AccessRequest(request_id),
                now,
            );

            let project = if outcome == AccessOutcome::Approved
                && request.request_type == AccessRequestType::NewPropertySubmission
            {
                Some(approve_submission(tables, &request, now)?)
            } else {
                None
            };

            Ok(Resolution {
                request,
                transitioned: true,
                project,
            })
        })?;

        if !resolution.transitioned {
            info!(
                request = %request_id,
                status = resolution.request.status.label(),
                "access request already resolved"
            );
            return Ok(resolution);
        }

        info!(
            request = %request_id,
            status = resolution.request.status.label(),
            resolved_by = %actor.id,
            "access request resolved"
        );
        self.announce(PlatformEvent::AccessResolved {
            request: resolution.request.clone(),
        });
        if let Some(project) = &resolution.project {
            self.announce(PlatformEvent::ProjectCreated {
                project: project.clone(),
            });
        }
        Ok(resolution)
    }

    pub fn get(&self, request_id: AccessRequestId, actor: &Actor) -> Result<AccessRequest, WorkflowError> {
        self.store.read(|tables| -> Result<AccessRequest, WorkflowError> {
            let request = tables.access_request(request_id)?;
            let property = tables.property(request.property_id)?;
            self.evaluator
                .evaluate(
                    actor.into(),
                    Action::ViewAccessRequest,
                    &Resource::AccessRequest { request, property },
                )
                .into_result()?;
            Ok(request.clone())
        })?
    }

    /// Requests visible to `actor`, newest first: owners see requests on their properties,
    /// contractors their own, administrators everything.
    pub fn list(
        &self,
        actor: &Actor,
        status: Option<AccessRequestStatus>,
    ) -> Result<Vec<AccessRequest>, WorkflowError> {
        let mut requests = self.store.read(|tables| {
            tables
                .access_requests
                .values()
                .filter(|request| status.map_or(true, |status| request.status == status))
                .filter(|request| visible_to(tables, actor, request))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    fn announce(&self, event: PlatformEvent) {
        if let Err(err) = self.notifications.notify(&event) {
            warn!(error = %err, "access notice not routed");
        }
    }
}

fn visible_to(tables: &Tables, actor: &Actor, request: &AccessRequest) -> bool {
    match actor.role() {
        Role::Administrator => true,
        Role::Contractor => request.contractor_id == Some(actor.id),
        Role::Owner => tables
            .properties
            .get(&request.property_id)
            .is_some_and(|property| property.is_owned_by(actor.id)),
        Role::PublicVisitor => false,
    }
}

pub(crate) struct NewRequest {
    pub(crate) property_id: PropertyId,
    pub(crate) contractor_id: Option<ActorId>,
    pub(crate) owner_id: Option<ActorId>,
    pub(crate) admin_id: Option<ActorId>,
    pub(crate) request_type: AccessRequestType,
}

pub(crate) fn insert_request(
    tables: &mut Tables,
    new: NewRequest,
    filed_by: Option<ActorId>,
    now: DateTime<Utc>,
) -> AccessRequest {
    let id = AccessRequestId(tables.allocate("access_requests"));
    let request = AccessRequest {
        id,
        property_id: new.property_id,
        contractor_id: new.contractor_id,
        owner_id: new.owner_id,
        admin_id: new.admin_id,
        requested_by: filed_by,
        request_type: new.request_type,
        status: AccessRequestStatus::Pending,
        resolved_by: None,
        resolved_at: None,
        created_at: now,
    };
    tables.access_requests.insert(id, request.clone());
    audit::record(
        tables,
        filed_by,
        AuditAction::CreateAccessRequest,
        ResourceRef::AccessRequest(id),
        now,
    );
    request
}

/// Activate a submitted property and open its new-construction project.
fn approve_submission(
    tables: &mut Tables,
    request: &AccessRequest,
    now: DateTime<Utc>,
) -> Result<Project, WorkflowError> {
    let property = tables.property_mut(request.property_id)?;
    if property.status == PropertyStatus::PendingVerification {
        property.status = PropertyStatus::Active;
    }
    property.completion_percent = Some(property.completion_percent.unwrap_or(0));
    projects::open_from_request_in(tables, request.id, ProjectOpening::default(), now)
}
