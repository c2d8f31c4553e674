use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{
    AccessRequestId, AccessRequestStatus, AccessRequestType, Actor, ActorId, PartEntry, Project,
    ProjectId, ProjectStatus, ProjectUpdate, ProjectUpdateId, PropertyId, PropertyStatus,
    UpdateKind,
};
use super::error::{InvariantViolation, ResourceRef, WorkflowError};
use super::notifications::{NotificationRouter, PlatformEvent};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::store::{PlatformStore, Tables};

pub const NEW_CONSTRUCTION: &str = "new_construction";

/// Body of `POST /projects`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectDraft {
    pub property_id: PropertyId,
    #[serde(default)]
    pub contractor_id: Option<ActorId>,
    #[serde(rename = "type", alias = "project_type")]
    pub project_type: String,
    pub description: String,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub percent_complete: Option<u8>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Details supplied when a contractor opens a project from an approved request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectOpening {
    #[serde(default, rename = "type", alias = "project_type")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /project-updates`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectUpdateDraft {
    pub project_id: ProjectId,
    #[serde(default)]
    pub contractor_id: Option<ActorId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress_percentage: Option<u8>,
    #[serde(default)]
    pub files_added: Vec<String>,
    #[serde(default)]
    pub parts_listed: Option<Vec<PartEntry>>,
}

/// Body of `PUT /projects/:id`. Absent fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub percent_complete: Option<u8>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Tracks contractor engagements from creation through completion.
pub struct ProjectLifecycleManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationRouter<S>>,
    evaluator: PermissionEvaluator,
}

impl<S> ProjectLifecycleManager<S>
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

    pub fn create_direct(&self, actor: &Actor, draft: ProjectDraft) -> Result<Project, WorkflowError> {
        if draft.contractor_id.is_some_and(|id| id != actor.id) {
            return Err(WorkflowError::validation(
                "contractor_id must match the session actor",
            ));
        }
        let project_type = required_text(&draft.project_type, "project type is required")?;
        let description = required_text(&draft.description, "description is required")?;
        if draft.percent_complete.is_some_and(|percent| percent != 0) {
            return Err(WorkflowError::validation("new projects start at 0 percent"));
        }
        let status = match draft.status {
            None | Some(ProjectStatus::Pending) => ProjectStatus::Pending,
            Some(ProjectStatus::InProgress) => ProjectStatus::InProgress,
            Some(ProjectStatus::Completed) => {
                return Err(WorkflowError::validation(
                    "new projects start pending or in progress",
                ))
            }
        };

        let now = self.clock.now();
        let project = self.store.transaction(|tables| -> Result<Project, WorkflowError> {
            let property = tables.property(draft.property_id)?;
            let operate_rights = tables.has_operate_rights(actor.id, property.id);
            self.evaluator
                .evaluate(
                    actor.into(),
                    Action::CreateProject,
                    &Resource::Property {
                        property,
                        operate_rights,
                    },
                )
                .into_result()?;
            if property.status == PropertyStatus::Archived {
                return Err(InvariantViolation::PropertyUnavailable("archived").into());
            }

            let mut project = insert_project(
                tables,
                NewProject {
                    property_id: draft.property_id,
                    contractor_id: actor.id,
                    project_type,
                    description,
                    status,
                    source_request: None,
                },
                now,
            );
            project.attach(draft.attachments);
            tables.projects.insert(project.id, project.clone());
            Ok(project)
        })?;

        info!(project = %project.id, property = %project.property_id, contractor = %actor.id, "project created");
        self.announce(PlatformEvent::ProjectCreated {
            project: project.clone(),
        });
        Ok(project)
    }

    /// Open the project an approved access request entitles its contractor to.
    pub fn create_from_access_approval(
        &self,
        request_id: AccessRequestId,
        actor: &Actor,
        opening: ProjectOpening,
    ) -> Result<Project, WorkflowError> {
        let now = self.clock.now();
        let project = self.store.transaction(|tables| -> Result<Project, WorkflowError> {
            let request = tables.access_request(request_id)?;
            let property = tables.property(request.property_id)?;
            self.evaluator
                .evaluate(
                    actor.into(),
                    Action::OpenProjectFromRequest,
                    &Resource::AccessRequest { request, property },
                )
                .into_result()?;
            open_from_request_in(tables, request_id, opening, now)
        })?;

        info!(project = %project.id, request = %request_id, "project opened from access request");
        self.announce(PlatformEvent::ProjectCreated {
            project: project.clone(),
        });
        Ok(project)
    }

    /// Append an immutable progress update and advance the project projection with it.
    pub fn append_update(
        &self,
        actor: &Actor,
        draft: ProjectUpdateDraft,
    ) -> Result<ProjectUpdate, WorkflowError> {
        if draft.contractor_id.is_some_and(|id| id != actor.id) {
            return Err(WorkflowError::validation(
                "contractor_id must match the session actor",
            ));
        }
        let title = required_text(&draft.title, "update title is required")?;
        if let Some(percent) = draft.progress_percentage {
            check_percent(percent)?;
        }

        let now = self.clock.now();
        let (project, update) = self
            .store
            .transaction(|tables| -> Result<(Project, ProjectUpdate), WorkflowError> {
                self.authorize(tables, draft.project_id, actor, Action::AppendProjectUpdate)?;
                let current = tables.project(draft.project_id)?;
                if current.is_completed() {
                    return Err(InvariantViolation::ProjectCompleted.into());
                }
                if let Some(attempted) = draft.progress_percentage {
                    if attempted < current.percent_complete {
                        return Err(InvariantViolation::ProgressRegression {
                            current: current.percent_complete,
                            attempted,
                        }
                        .into());
                    }
                }

                let update = record_update(
                    tables,
                    ProjectUpdate {
                        id: ProjectUpdateId(0),
                        project_id: draft.project_id,
                        contractor_id: actor.id,
                        kind: UpdateKind::Progress,
                        title,
                        description: draft.description.trim().to_string(),
                        progress_percentage: draft.progress_percentage,
                        files_added: draft.files_added.clone(),
                        parts_listed: draft.parts_listed.clone(),
                        created_at: now,
                    },
                );
                let project = advance(
                    tables,
                    draft.project_id,
                    draft.progress_percentage,
                    &draft.files_added,
                    true,
                )?;
                audit::record(
                    tables,
                    Some(actor.id),
                    AuditAction::AppendProjectUpdate,
                    ResourceRef::Project(project.id),
                    now,
                );
                Ok((project, update))
            })?;

        info!(
            project = %project.id,
            percent = project.percent_complete,
            "project update appended"
        );
        self.announce(PlatformEvent::ProjectUpdated {
            project,
            update: update.clone(),
        });
        Ok(update)
    }

    /// Close a project at 100 percent. Completion is terminal.
    pub fn complete(&self, project_id: ProjectId, actor: &Actor) -> Result<Project, WorkflowError> {
        let now = self.clock.now();
        let (project, update) = self
            .store
            .transaction(|tables| complete_in(&self.evaluator, tables, project_id, actor, now))?;

        info!(project = %project.id, contractor = %actor.id, "project completed");
        self.announce(PlatformEvent::ProjectUpdated { project: project.clone(), update });
        Ok(project)
    }

    /// Apply a partial edit. Administrators may only reword the description; progress,
    /// attachments and status belong to the assigned contractor and are logged as an
    /// update like any other progress.
    pub fn edit(
        &self,
        project_id: ProjectId,
        actor: &Actor,
        patch: ProjectPatch,
    ) -> Result<Project, WorkflowError> {
        if let Some(percent) = patch.percent_complete {
            check_percent(percent)?;
        }
        let description = match patch.description.as_deref() {
            Some(text) => Some(required_text(text, "description may not be blank")?),
            None => None,
        };
        let attachments = patch.attachments.clone().unwrap_or_default();
        let moves_progress = patch.percent_complete.is_some() || !attachments.is_empty();

        let now = self.clock.now();
        let (project, updates) = self
            .store
            .transaction(|tables| -> Result<(Project, Vec<ProjectUpdate>), WorkflowError> {
                self.authorize(tables, project_id, actor, Action::EditProject)?;
                if moves_progress || patch.status.is_some() {
                    self.authorize(tables, project_id, actor, Action::AppendProjectUpdate)?;
                }
                let current = tables.project(project_id)?;
                if current.is_completed() {
                    return Err(InvariantViolation::ProjectCompleted.into());
                }
                if let Some(attempted) = patch.percent_complete {
                    if attempted < current.percent_complete {
                        return Err(InvariantViolation::ProgressRegression {
                            current: current.percent_complete,
                            attempted,
                        }
                        .into());
                    }
                }
                if patch.status == Some(ProjectStatus::Pending)
                    && current.status == ProjectStatus::InProgress
                {
                    return Err(WorkflowError::validation(
                        "project status may not move back to pending",
                    ));
                }

                let mut updates = Vec::new();
                if moves_progress {
                    let summary = description
                        .clone()
                        .unwrap_or_else(|| current.description.clone());
                    updates.push(record_update(
                        tables,
                        ProjectUpdate {
                            id: ProjectUpdateId(0),
                            project_id,
                            contractor_id: actor.id,
                            kind: UpdateKind::Edit,
                            title: "Project edited".to_string(),
                            description: summary,
                            progress_percentage: patch.percent_complete,
                            files_added: attachments.clone(),
                            parts_listed: None,
                            created_at: now,
                        },
                    ));
                }

                let started = patch.percent_complete.is_some_and(|percent| percent > 0);
                let mut project =
                    advance(tables, project_id, patch.percent_complete, &attachments, started)?;
                if let Some(description) = description.clone() {
                    project.description = description;
                }
                if patch.status == Some(ProjectStatus::InProgress) {
                    project.status = ProjectStatus::InProgress;
                }
                tables.projects.insert(project_id, project.clone());
                audit::record(
                    tables,
                    Some(actor.id),
                    AuditAction::EditProject,
                    ResourceRef::Project(project_id),
                    now,
                );

                if patch.status == Some(ProjectStatus::Completed) {
                    let (project, completion) =
                        complete_in(&self.evaluator, tables, project_id, actor, now)?;
                    updates.push(completion);
                    return Ok((project, updates));
                }
                Ok((project, updates))
            })?;

        info!(
            project = %project.id,
            logged_updates = updates.len(),
            "project edited"
        );
        for update in updates {
            self.announce(PlatformEvent::ProjectUpdated {
                project: project.clone(),
                update,
            });
        }
        Ok(project)
    }

    pub fn get(&self, project_id: ProjectId, actor: &Actor) -> Result<Project, WorkflowError> {
        self.store.read(|tables| -> Result<Project, WorkflowError> {
            self.authorize(tables, project_id, actor, Action::ViewProject)?;
            Ok(tables.project(project_id)?.clone())
        })?
    }

    /// The append-only update log for a project, oldest first.
    pub fn updates(
        &self,
        project_id: ProjectId,
        actor: &Actor,
    ) -> Result<Vec<ProjectUpdate>, WorkflowError> {
        self.store.read(|tables| -> Result<Vec<ProjectUpdate>, WorkflowError> {
            self.authorize(tables, project_id, actor, Action::ViewProject)?;
            Ok(tables.updates_for(project_id))
        })?
    }

    fn authorize(
        &self,
        tables: &Tables,
        project_id: ProjectId,
        actor: &Actor,
        action: Action,
    ) -> Result<(), WorkflowError> {
        authorize_in(&self.evaluator, tables, project_id, actor, action)
    }

    fn announce(&self, event: PlatformEvent) {
        if let Err(err) = self.notifications.notify(&event) {
            warn!(error = %err, "project notice not routed");
        }
    }
}

/// Fields of a project about to be inserted.
pub(crate) struct NewProject {
    pub(crate) property_id: PropertyId,
    pub(crate) contractor_id: ActorId,
    pub(crate) project_type: String,
    pub(crate) description: String,
    pub(crate) status: ProjectStatus,
    pub(crate) source_request: Option<AccessRequestId>,
}

pub(crate) fn insert_project(tables: &mut Tables, new: NewProject, now: DateTime<Utc>) -> Project {
    let id = ProjectId(tables.allocate("projects"));
    let project = Project {
        id,
        property_id: new.property_id,
        contractor_id: new.contractor_id,
        project_type: new.project_type,
        description: new.description,
        status: new.status,
        percent_complete: 0,
        attachments: Vec::new(),
        source_request: new.source_request,
        created_at: now,
        completed_at: None,
    };
    tables.projects.insert(id, project.clone());
    audit::record(
        tables,
        Some(new.contractor_id),
        AuditAction::CreateProject,
        ResourceRef::Project(id),
        now,
    );
    project
}

/// Create the project owed to an approved request, at most once per request.
pub(crate) fn open_from_request_in(
    tables: &mut Tables,
    request_id: AccessRequestId,
    opening: ProjectOpening,
    now: DateTime<Utc>,
) -> Result<Project, WorkflowError> {
    let request = tables.access_request(request_id)?.clone();
    if request.status != AccessRequestStatus::Approved {
        return Err(InvariantViolation::RequestNotApproved {
            status: request.status.label(),
        }
        .into());
    }
    if let Some(existing) = tables
        .projects
        .values()
        .find(|project| project.source_request == Some(request_id))
    {
        return Err(InvariantViolation::ProjectAlreadyOpened(existing.id).into());
    }
    let contractor_id = request.contractor_id.ok_or_else(|| {
        WorkflowError::validation("access request has no requesting contractor")
    })?;

    let address = tables.property(request.property_id)?.address.clone();
    let project_type = match opening.project_type.as_deref().map(str::trim) {
        Some(kind) if !kind.is_empty() => kind.to_string(),
        _ if request.request_type == AccessRequestType::NewPropertySubmission => {
            NEW_CONSTRUCTION.to_string()
        }
        _ => "general".to_string(),
    };
    let description = match opening.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("Work at {address}"),
    };

    Ok(insert_project(
        tables,
        NewProject {
            property_id: request.property_id,
            contractor_id,
            project_type,
            description,
            status: ProjectStatus::Pending,
            source_request: Some(request_id),
        },
        now,
    ))
}

fn authorize_in(
    evaluator: &PermissionEvaluator,
    tables: &Tables,
    project_id: ProjectId,
    actor: &Actor,
    action: Action,
) -> Result<(), WorkflowError> {
    let project = tables.project(project_id)?;
    let property = tables.property(project.property_id)?;
    evaluator
        .evaluate(actor.into(), action, &Resource::Project { project, property })
        .into_result()
}

fn complete_in(
    evaluator: &PermissionEvaluator,
    tables: &mut Tables,
    project_id: ProjectId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(Project, ProjectUpdate), WorkflowError> {
    authorize_in(evaluator, tables, project_id, actor, Action::CompleteProject)?;
    let current = tables.project(project_id)?;
    if current.is_completed() {
        return Err(InvariantViolation::ProjectCompleted.into());
    }
    if current.percent_complete < 100 {
        return Err(InvariantViolation::ProjectNotFinished {
            percent: current.percent_complete,
        }
        .into());
    }
    let description = format!("{} marked complete.", current.description);

    let update = record_update(
        tables,
        ProjectUpdate {
            id: ProjectUpdateId(0),
            project_id,
            contractor_id: actor.id,
            kind: UpdateKind::Completion,
            title: "Project completed".to_string(),
            description,
            progress_percentage: Some(100),
            files_added: Vec::new(),
            parts_listed: None,
            created_at: now,
        },
    );
    let project = tables
        .projects
        .get_mut(&project_id)
        .ok_or(WorkflowError::NotFound(ResourceRef::Project(project_id)))?;
    project.status = ProjectStatus::Completed;
    project.completed_at = Some(now);
    let project = project.clone();

    audit::record(
        tables,
        Some(actor.id),
        AuditAction::CompleteProject,
        ResourceRef::Project(project_id),
        now,
    );
    Ok((project, update))
}

fn record_update(tables: &mut Tables, mut update: ProjectUpdate) -> ProjectUpdate {
    update.id = ProjectUpdateId(tables.allocate("project_updates"));
    tables.project_updates.push(update.clone());
    update
}

/// Move the live percentage forward, union new attachments, and mirror progress onto a
/// property whose construction this project tracks. `start` moves a pending project into
/// progress.
fn advance(
    tables: &mut Tables,
    project_id: ProjectId,
    percent: Option<u8>,
    files: &[String],
    start: bool,
) -> Result<Project, WorkflowError> {
    let tracks_construction = {
        let project = tables.project(project_id)?;
        project
            .source_request
            .and_then(|id| tables.access_requests.get(&id))
            .is_some_and(|request| request.request_type == AccessRequestType::NewPropertySubmission)
    };

    let project = tables
        .projects
        .get_mut(&project_id)
        .ok_or(WorkflowError::NotFound(ResourceRef::Project(project_id)))?;
    if let Some(percent) = percent {
        project.percent_complete = project.percent_complete.max(percent);
    }
    project.attach(files.iter().cloned());
    if start && project.status == ProjectStatus::Pending {
        project.status = ProjectStatus::InProgress;
    }
    let project = project.clone();

    if tracks_construction {
        if let Some(property) = tables.properties.get_mut(&project.property_id) {
            let current = property.completion_percent.unwrap_or(0);
            property.completion_percent = Some(current.max(project.percent_complete));
        }
    }
    Ok(project)
}

fn check_percent(percent: u8) -> Result<(), WorkflowError> {
    if percent > 100 {
        return Err(WorkflowError::validation(
            "percentage must be between 0 and 100",
        ));
    }
    Ok(())
}

fn required_text(value: &str, message: &str) -> Result<String, WorkflowError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WorkflowError::validation(message));
    }
    Ok(value.to_string())
}
