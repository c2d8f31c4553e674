use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{
    AccessRequest, AccessRequestStatus, Actor, ActorId, Notice, NoticeId, NoticePriority,
    NoticeStatus, Project, ProjectUpdate, PropertyId, UpdateKind, UtilityKind,
};
use super::error::{ResourceRef, WorkflowError};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::store::{PlatformStore, Tables};

/// Audience of an administrative broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target_type", rename_all = "snake_case")]
pub enum BroadcastTarget {
    AllUsers,
    ByUtility { utility_type: UtilityKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub title: String,
    pub message: String,
    #[serde(flatten)]
    pub target: BroadcastTarget,
    pub priority: NoticePriority,
}

/// Domain events that fan out into notices.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    ProjectCreated {
        project: Project,
    },
    ProjectUpdated {
        project: Project,
        update: ProjectUpdate,
    },
    AccessResolved {
        request: AccessRequest,
    },
    Broadcast(Broadcast),
    OwnershipReview {
        registrant: ActorId,
        registrant_name: String,
        candidates: Vec<PropertyId>,
    },
}

/// Notice content before it is addressed and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NoticeDraft {
    pub(crate) recipient: ActorId,
    pub(crate) property_id: Option<PropertyId>,
    pub(crate) priority: NoticePriority,
    pub(crate) title: String,
    pub(crate) body: String,
}

/// Resolves recipients for each event and persists one notice per recipient.
pub struct NotificationRouter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    evaluator: PermissionEvaluator,
}

impl<S> NotificationRouter<S>
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

    /// Persist a notice for every resolvable recipient of `event`.
    ///
    /// Each notice is written in its own transaction. A recipient that cannot be written is
    /// logged and skipped; notices already created for other recipients stay in place.
    pub fn notify(&self, event: &PlatformEvent) -> Result<Vec<Notice>, WorkflowError> {
        let drafts = self.store.read(|tables| route(tables, event))?;
        let mut delivered = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let recipient = draft.recipient;
            let created_at = self.clock.now();
            let outcome = self.store.transaction(|tables| {
                tables.actor(draft.recipient)?;
                let id = NoticeId(tables.allocate("notices"));
                let notice = Notice {
                    id,
                    recipient: Some(draft.recipient),
                    property_id: draft.property_id,
                    status: NoticeStatus::Unread,
                    priority: draft.priority,
                    title: draft.title,
                    body: draft.body,
                    created_at,
                };
                tables.notices.insert(id, notice.clone());
                Ok::<_, WorkflowError>(notice)
            });

            match outcome {
                Ok(notice) => delivered.push(notice),
                Err(err) => warn!(%recipient, error = %err, "notice delivery skipped"),
            }
        }

        debug!(delivered = delivered.len(), "notices routed");
        Ok(delivered)
    }

    /// Notices addressed to `actor` plus null-recipient notices, newest first.
    pub fn inbox(&self, actor: &Actor, unread_only: bool) -> Result<Vec<Notice>, WorkflowError> {
        let mut notices = self.store.read(|tables| {
            tables
                .notices
                .values()
                .filter(|notice| notice.is_visible_to(actor.id))
                .filter(|notice| !unread_only || notice.status == NoticeStatus::Unread)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        notices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notices)
    }

    /// Mark a notice read. Marking an already read notice is a no-op.
    pub fn mark_read(&self, notice_id: NoticeId, actor: &Actor) -> Result<Notice, WorkflowError> {
        self.store.transaction(|tables| -> Result<Notice, WorkflowError> {
            let notice = tables
                .notices
                .get_mut(&notice_id)
                .ok_or(WorkflowError::NotFound(ResourceRef::Notice(notice_id)))?;
            self.evaluator
                .evaluate(actor.into(), Action::ReadNotice, &Resource::Notice(&*notice))
                .into_result()?;
            notice.status = NoticeStatus::Read;
            Ok(notice.clone())
        })
    }
}

pub(crate) fn route(tables: &Tables, event: &PlatformEvent) -> Vec<NoticeDraft> {
    match event {
        PlatformEvent::ProjectCreated { project } => owner_of(tables, project.property_id)
            .map(|owner| NoticeDraft {
                recipient: owner,
                property_id: Some(project.property_id),
                priority: NoticePriority::High,
                title: format!("New {} project", project.project_type),
                body: project.description.clone(),
            })
            .into_iter()
            .collect(),
        PlatformEvent::ProjectUpdated { project, update } => {
            let title = match update.kind {
                UpdateKind::Completion => format!("Project completed: {}", project.project_type),
                UpdateKind::Progress | UpdateKind::Edit => {
                    format!("Project update: {}", update.title)
                }
            };
            let body = match update.progress_percentage {
                Some(percent) => format!("{} ({percent}% complete)", update.description),
                None => update.description.clone(),
            };
            owner_of(tables, project.property_id)
                .map(|owner| NoticeDraft {
                    recipient: owner,
                    property_id: Some(project.property_id),
                    priority: NoticePriority::Normal,
                    title,
                    body,
                })
                .into_iter()
                .collect()
        }
        PlatformEvent::AccessResolved { request } => {
            let outcome = match request.status {
                AccessRequestStatus::Approved => "approved",
                AccessRequestStatus::Denied => "denied",
                AccessRequestStatus::Pending => return Vec::new(),
            };
            [request.contractor_id, request.requested_by]
                .into_iter()
                .flatten()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|requester| NoticeDraft {
                    recipient: requester,
                    property_id: Some(request.property_id),
                    priority: NoticePriority::Normal,
                    title: format!("Access request {outcome}"),
                    body: format!("Your request {} was {outcome}.", request.id),
                })
                .collect()
        }
        PlatformEvent::Broadcast(broadcast) => broadcast_recipients(tables, broadcast.target)
            .into_iter()
            .map(|recipient| NoticeDraft {
                recipient,
                property_id: None,
                priority: broadcast.priority,
                title: broadcast.title.clone(),
                body: broadcast.message.clone(),
            })
            .collect(),
        PlatformEvent::OwnershipReview {
            registrant,
            registrant_name,
            candidates,
        } => {
            let body = if candidates.is_empty() {
                format!("{registrant_name} ({registrant}) matched no property records.")
            } else {
                let listed = candidates
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{registrant_name} ({registrant}) matched several properties: {listed}.")
            };
            tables
                .actors
                .values()
                .filter(|actor| actor.is_admin())
                .map(|admin| NoticeDraft {
                    recipient: admin.id,
                    property_id: None,
                    priority: NoticePriority::High,
                    title: "Ownership review required".to_string(),
                    body: body.clone(),
                })
                .collect()
        }
    }
}

fn owner_of(tables: &Tables, property: PropertyId) -> Option<ActorId> {
    tables
        .properties
        .get(&property)
        .and_then(|property| property.owner_id)
}

fn broadcast_recipients(tables: &Tables, target: BroadcastTarget) -> BTreeSet<ActorId> {
    match target {
        BroadcastTarget::AllUsers => tables.actors.keys().copied().collect(),
        BroadcastTarget::ByUtility { utility_type } => tables
            .properties
            .values()
            .filter(|property| property.has_utility(utility_type))
            .filter_map(|property| property.owner_id)
            .collect(),
    }
}
