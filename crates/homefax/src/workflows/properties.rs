use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::access::{self, NewRequest};
use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{
    AccessRequest, AccessRequestStatus, AccessRequestType, Actor, ActorId, MaintenanceTask,
    Principal, Project, Property, PropertyDraft, PropertyId, PropertyStatus, Role,
    StructuralFacts, UtilityKind,
};
use super::error::{InvariantViolation, ResourceRef, WorkflowError};
use super::permissions::{Action, PermissionEvaluator, PropertyVisibility, Resource};
use super::store::{PlatformStore, Tables};

/// Projection shown to principals without full rights. Owner identity is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicPropertyView {
    pub id: PropertyId,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub facts: StructuralFacts,
    pub status: PropertyStatus,
    pub utilities: Vec<UtilityKind>,
    pub completion_percent: Option<u8>,
    /// Present only when the owner has marked financials public.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessed_value: Option<u64>,
}

impl From<&Property> for PublicPropertyView {
    fn from(property: &Property) -> Self {
        Self {
            id: property.id,
            address: property.address.clone(),
            city: property.city.clone(),
            state: property.state.clone(),
            zip_code: property.zip_code.clone(),
            facts: property.facts.clone(),
            status: property.status,
            utilities: property.utilities.clone(),
            completion_percent: property.completion_percent,
            assessed_value: property
                .assessed_value
                .filter(|_| property.financials_public),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum PropertyView {
    Full(Property),
    Public(PublicPropertyView),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub id: ActorId,
    pub name: String,
    pub email: String,
}

/// Everything recorded against a property, for principals with full rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComprehensiveProperty {
    pub property: Property,
    pub owner: Option<OwnerSummary>,
    pub projects: Vec<Project>,
    pub maintenance_tasks: Vec<MaintenanceTask>,
    pub access_requests: Vec<AccessRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertySubmission {
    pub property: Property,
    pub request: AccessRequest,
}

pub struct PropertyRegistry<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    evaluator: PermissionEvaluator,
}

impl<S> PropertyRegistry<S>
where
    S: PlatformStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            evaluator: PermissionEvaluator::new(),
        }
    }

    /// Record a contractor-submitted property for administrator verification.
    pub fn submit_property(
        &self,
        actor: &Actor,
        draft: PropertyDraft,
    ) -> Result<PropertySubmission, WorkflowError> {
        self.evaluator
            .evaluate(actor.into(), Action::SubmitProperty, &Resource::Platform)
            .into_result()?;
        let draft = normalize_draft(draft)?;

        let now = self.clock.now();
        let submission = self.store.transaction(|tables| -> Result<PropertySubmission, WorkflowError> {
            let property = insert_property(tables, draft, PropertyStatus::PendingVerification, now);
            audit::record(
                tables,
                Some(actor.id),
                AuditAction::SubmitProperty,
                ResourceRef::Property(property.id),
                now,
            );
            let request = access::insert_request(
                tables,
                NewRequest {
                    property_id: property.id,
                    contractor_id: Some(actor.id),
                    owner_id: None,
                    admin_id: None,
                    request_type: AccessRequestType::NewPropertySubmission,
                },
                Some(actor.id),
                now,
            );
            Ok(PropertySubmission { property, request })
        })?;

        info!(
            property = %submission.property.id,
            request = %submission.request.id,
            contractor = %actor.id,
            "property submitted for verification"
        );
        Ok(submission)
    }

    /// Resolve a manual ownership review by attaching an owner to an unclaimed property.
    pub fn assign_owner(
        &self,
        admin: &Actor,
        property_id: PropertyId,
        owner_id: ActorId,
    ) -> Result<Property, WorkflowError> {
        let now = self.clock.now();
        let property = self.store.transaction(|tables| -> Result<Property, WorkflowError> {
            let property = tables.property(property_id)?;
            self.evaluator
                .evaluate(
                    admin.into(),
                    Action::AssignOwner,
                    &Resource::Property {
                        property,
                        operate_rights: false,
                    },
                )
                .into_result()?;
            if property.owner_id.is_some() {
                return Err(InvariantViolation::OwnershipAlreadyAssigned.into());
            }
            if tables.actor(owner_id)?.role() != Role::Owner {
                return Err(WorkflowError::validation(
                    "owner_id does not name a property owner",
                ));
            }

            let property = {
                let property = tables.property_mut(property_id)?;
                property.owner_id = Some(owner_id);
                if property.status == PropertyStatus::PendingVerification {
                    property.status = PropertyStatus::Active;
                }
                property.clone()
            };
            for request in tables.access_requests.values_mut() {
                if request.property_id == property_id
                    && request.status == AccessRequestStatus::Pending
                {
                    request.owner_id = Some(owner_id);
                }
            }
            audit::record(
                tables,
                Some(admin.id),
                AuditAction::AssignOwner,
                ResourceRef::Property(property_id),
                now,
            );
            Ok(property)
        })?;

        info!(property = %property_id, owner = %owner_id, assigned_by = %admin.id, "owner assigned");
        Ok(property)
    }

    pub fn view(
        &self,
        principal: Principal<'_>,
        property_id: PropertyId,
    ) -> Result<PropertyView, WorkflowError> {
        self.store.read(|tables| -> Result<PropertyView, WorkflowError> {
            let property = tables.property(property_id)?;
            let view = match self.visibility(tables, principal, property) {
                PropertyVisibility::Full => PropertyView::Full(property.clone()),
                PropertyVisibility::Public => PropertyView::Public(property.into()),
            };
            Ok(view)
        })?
    }

    pub fn comprehensive(
        &self,
        principal: Principal<'_>,
        property_id: PropertyId,
    ) -> Result<ComprehensiveProperty, WorkflowError> {
        self.store.read(|tables| -> Result<ComprehensiveProperty, WorkflowError> {
            let property = tables.property(property_id)?;
            let operate_rights = operate_rights(tables, principal, property_id);
            self.evaluator
                .evaluate(
                    principal,
                    Action::ViewPropertyRecord,
                    &Resource::Property {
                        property,
                        operate_rights,
                    },
                )
                .into_result()?;

            let owner = property
                .owner_id
                .and_then(|id| tables.actors.get(&id))
                .map(|owner| OwnerSummary {
                    id: owner.id,
                    name: owner.name.clone(),
                    email: owner.email.clone(),
                });
            Ok(ComprehensiveProperty {
                property: property.clone(),
                owner,
                projects: tables
                    .projects
                    .values()
                    .filter(|project| project.property_id == property_id)
                    .cloned()
                    .collect(),
                maintenance_tasks: tables
                    .maintenance_tasks
                    .values()
                    .filter(|task| task.property_id == property_id)
                    .cloned()
                    .collect(),
                access_requests: tables
                    .access_requests
                    .values()
                    .filter(|request| request.property_id == property_id)
                    .cloned()
                    .collect(),
            })
        })?
    }

    /// Import county roll records as an administrator.
    pub fn import(
        &self,
        actor: &Actor,
        drafts: Vec<PropertyDraft>,
    ) -> Result<Vec<Property>, WorkflowError> {
        self.evaluator
            .evaluate(actor.into(), Action::ImportPropertyRoll, &Resource::Platform)
            .into_result()?;
        self.import_as(Some(actor.id), drafts)
    }

    /// Load county roll records at boot, outside any session.
    pub fn load_roll(&self, drafts: Vec<PropertyDraft>) -> Result<Vec<Property>, WorkflowError> {
        self.import_as(None, drafts)
    }

    fn import_as(
        &self,
        actor_id: Option<ActorId>,
        drafts: Vec<PropertyDraft>,
    ) -> Result<Vec<Property>, WorkflowError> {
        let drafts = drafts
            .into_iter()
            .map(normalize_draft)
            .collect::<Result<Vec<_>, _>>()?;
        let submitted = drafts.len();

        let now = self.clock.now();
        let imported = self.store.transaction(|tables| -> Result<Vec<Property>, WorkflowError> {
            let mut imported = Vec::new();
            for draft in drafts {
                if is_duplicate(tables, &draft) {
                    continue;
                }
                let property = insert_property(tables, draft, PropertyStatus::Active, now);
                audit::record(
                    tables,
                    actor_id,
                    AuditAction::ImportProperty,
                    ResourceRef::Property(property.id),
                    now,
                );
                imported.push(property);
            }
            Ok(imported)
        })?;

        if imported.len() < submitted {
            warn!(
                skipped = submitted - imported.len(),
                "roll records matching existing properties were skipped"
            );
        }
        info!(imported = imported.len(), "property roll imported");
        Ok(imported)
    }

    fn visibility(
        &self,
        tables: &Tables,
        principal: Principal<'_>,
        property: &Property,
    ) -> PropertyVisibility {
        let operate_rights = operate_rights(tables, principal, property.id);
        self.evaluator
            .property_visibility(principal, property, operate_rights)
    }
}

fn operate_rights(tables: &Tables, principal: Principal<'_>, property_id: PropertyId) -> bool {
    principal
        .actor()
        .is_some_and(|actor| actor.is_contractor() && tables.has_operate_rights(actor.id, property_id))
}

fn is_duplicate(tables: &Tables, draft: &PropertyDraft) -> bool {
    tables.properties.values().any(|existing| {
        existing.address.eq_ignore_ascii_case(&draft.address)
            && existing.city.eq_ignore_ascii_case(&draft.city)
            && existing.zip_code == draft.zip_code
    })
}

fn insert_property(
    tables: &mut Tables,
    draft: PropertyDraft,
    status: PropertyStatus,
    now: DateTime<Utc>,
) -> Property {
    let id = PropertyId(tables.allocate("properties"));
    let property = Property {
        id,
        address: draft.address,
        city: draft.city,
        state: draft.state,
        zip_code: draft.zip_code,
        facts: draft.facts,
        status,
        owner_id: None,
        owner_of_record: draft.owner_of_record,
        utilities: draft.utilities,
        assessed_value: draft.assessed_value,
        financials_public: draft.financials_public,
        completion_percent: None,
        created_at: now,
    };
    tables.properties.insert(id, property.clone());
    property
}

fn normalize_draft(mut draft: PropertyDraft) -> Result<PropertyDraft, WorkflowError> {
    for (field, value) in [
        ("address", &mut draft.address),
        ("city", &mut draft.city),
        ("state", &mut draft.state),
        ("zip_code", &mut draft.zip_code),
    ] {
        *value = value.trim().to_string();
        if value.is_empty() {
            return Err(WorkflowError::validation(format!("{field} is required")));
        }
    }
    draft.owner_of_record = draft
        .owner_of_record
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let mut seen = Vec::with_capacity(draft.utilities.len());
    draft.utilities.retain(|utility| {
        if seen.contains(utility) {
            false
        } else {
            seen.push(*utility);
            true
        }
    });
    Ok(draft)
}
