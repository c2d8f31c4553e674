use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;

use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{
    Actor, MaintenanceStatus, MaintenanceTask, MaintenanceTaskId, Principal, PropertyId,
};
use super::error::{ResourceRef, WorkflowError};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::store::{PlatformStore, Tables};

/// Recurrence uses a flat month length rather than calendar months.
pub const DAYS_PER_MONTH: i64 = 30;

/// A century; anything longer is a data-entry mistake.
pub const MAX_FREQUENCY_MONTHS: u32 = 1200;

/// Next due instant for a task completed at `completed_at`. One-off tasks never recur.
pub fn next_due_after(
    completed_at: DateTime<Utc>,
    frequency_months: Option<u32>,
) -> Result<Option<DateTime<Utc>>, WorkflowError> {
    let Some(months) = frequency_months else {
        return Ok(None);
    };
    Duration::try_days(i64::from(months) * DAYS_PER_MONTH)
        .and_then(|interval| completed_at.checked_add_signed(interval))
        .map(Some)
        .ok_or_else(|| {
            WorkflowError::validation(format!(
                "a {months}-month recurrence puts the next due date out of range"
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaintenanceTaskDraft {
    pub title: String,
    #[serde(default)]
    pub frequency_months: Option<u32>,
    #[serde(default = "default_owner_editable")]
    pub owner_editable: bool,
}

fn default_owner_editable() -> bool {
    true
}

/// Partial update accepted by `PUT /maintenance-tasks/:id`. Absent fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MaintenanceTaskPatch {
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<MaintenanceStatus>,
}

impl MaintenanceTaskPatch {
    fn is_empty(&self) -> bool {
        self.last_completed.is_none() && self.next_due_date.is_none() && self.status.is_none()
    }

    fn completes(&self) -> bool {
        match self.status {
            Some(status) => status == MaintenanceStatus::Completed,
            None => self.last_completed.is_some(),
        }
    }
}

pub struct MaintenanceScheduler<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    evaluator: PermissionEvaluator,
}

impl<S> MaintenanceScheduler<S>
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

    pub fn add_task(
        &self,
        actor: &Actor,
        property_id: PropertyId,
        draft: MaintenanceTaskDraft,
    ) -> Result<MaintenanceTask, WorkflowError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(WorkflowError::validation("task title is required"));
        }
        if draft.frequency_months == Some(0) {
            return Err(WorkflowError::validation(
                "frequency_months must be positive when present",
            ));
        }
        if draft
            .frequency_months
            .is_some_and(|months| months > MAX_FREQUENCY_MONTHS)
        {
            return Err(WorkflowError::validation(format!(
                "frequency_months may not exceed {MAX_FREQUENCY_MONTHS}"
            )));
        }

        let now = self.clock.now();
        self.store.transaction(|tables| -> Result<MaintenanceTask, WorkflowError> {
            let property = tables.property(property_id)?;
            self.evaluator
                .evaluate(
                    actor.into(),
                    Action::AddMaintenanceTask,
                    &Resource::Property {
                        property,
                        operate_rights: false,
                    },
                )
                .into_result()?;

            let id = MaintenanceTaskId(tables.allocate("maintenance_tasks"));
            let task = MaintenanceTask {
                id,
                property_id,
                title,
                frequency_months: draft.frequency_months,
                last_completed: None,
                next_due: None,
                status: if draft.owner_editable {
                    MaintenanceStatus::Pending
                } else {
                    MaintenanceStatus::RequiresContractor
                },
                owner_editable: draft.owner_editable,
            };
            tables.maintenance_tasks.insert(id, task.clone());
            audit::record(
                tables,
                Some(actor.id),
                AuditAction::AddMaintenanceTask,
                ResourceRef::MaintenanceTask(id),
                now,
            );
            Ok(task)
        })
    }

    /// Complete a task now, scheduling its next occurrence when it recurs.
    pub fn mark_complete(
        &self,
        task_id: MaintenanceTaskId,
        actor: &Actor,
    ) -> Result<MaintenanceTask, WorkflowError> {
        let now = self.clock.now();
        let task = self.store.transaction(|tables| -> Result<MaintenanceTask, WorkflowError> {
            self.authorize(tables, task_id, actor)?;
            let task = complete_in(tables, task_id, now)?;
            audit::record(
                tables,
                Some(actor.id),
                AuditAction::CompleteMaintenanceTask,
                ResourceRef::MaintenanceTask(task_id),
                now,
            );
            Ok(task)
        })?;

        info!(task = %task.id, next_due = ?task.next_due, "maintenance task completed");
        Ok(task)
    }

    pub fn update(
        &self,
        task_id: MaintenanceTaskId,
        actor: &Actor,
        patch: MaintenanceTaskPatch,
    ) -> Result<MaintenanceTask, WorkflowError> {
        let now = self.clock.now();
        if patch.last_completed.is_some_and(|at| at > now) {
            return Err(WorkflowError::validation(
                "last_completed may not be in the future",
            ));
        }

        self.store.transaction(|tables| -> Result<MaintenanceTask, WorkflowError> {
            self.authorize(tables, task_id, actor)?;
            if patch.is_empty() {
                return Ok(tables.maintenance_task(task_id)?.clone());
            }

            let action = if patch.completes() {
                complete_in(tables, task_id, patch.last_completed.unwrap_or(now))?;
                AuditAction::CompleteMaintenanceTask
            } else {
                AuditAction::EditMaintenanceTask
            };

            let task = tables
                .maintenance_tasks
                .get_mut(&task_id)
                .ok_or(WorkflowError::NotFound(ResourceRef::MaintenanceTask(task_id)))?;
            if let Some(status) = patch.status.filter(|status| *status != MaintenanceStatus::Completed) {
                task.status = status;
            }
            if let Some(next_due) = patch.next_due_date {
                if task.last_completed.is_some_and(|last| next_due < last) {
                    return Err(WorkflowError::validation(
                        "next_due_date may not precede last_completed",
                    ));
                }
                task.next_due = Some(next_due);
            }
            let task = task.clone();

            audit::record(
                tables,
                Some(actor.id),
                action,
                ResourceRef::MaintenanceTask(task_id),
                now,
            );
            Ok(task)
        })
    }

    /// Tasks still open or whose next occurrence has come due.
    pub fn due(
        &self,
        property_id: PropertyId,
        principal: Principal<'_>,
    ) -> Result<Vec<MaintenanceTask>, WorkflowError> {
        let now = self.clock.now();
        self.store.read(|tables| -> Result<Vec<MaintenanceTask>, WorkflowError> {
            let property = tables.property(property_id)?;
            let operate_rights = principal
                .actor()
                .is_some_and(|actor| actor.is_contractor() && tables.has_operate_rights(actor.id, property_id));
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

            let mut due: Vec<MaintenanceTask> = tables
                .maintenance_tasks
                .values()
                .filter(|task| task.property_id == property_id)
                .filter(|task| is_due(task, now))
                .cloned()
                .collect();
            due.sort_by_key(|task| (task.next_due, task.id));
            Ok(due)
        })?
    }

    fn authorize(
        &self,
        tables: &Tables,
        task_id: MaintenanceTaskId,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        let task = tables.maintenance_task(task_id)?;
        let property = tables.property(task.property_id)?;
        let operate_rights = actor.is_contractor() && tables.has_operate_rights(actor.id, property.id);
        self.evaluator
            .evaluate(
                actor.into(),
                Action::CompleteMaintenanceTask,
                &Resource::MaintenanceTask {
                    task,
                    property,
                    operate_rights,
                },
            )
            .into_result()
    }
}

pub fn is_due(task: &MaintenanceTask, now: DateTime<Utc>) -> bool {
    match task.status {
        MaintenanceStatus::Pending | MaintenanceStatus::RequiresContractor => true,
        MaintenanceStatus::Completed => task.next_due.is_some_and(|due| due <= now),
    }
}

fn complete_in(
    tables: &mut Tables,
    task_id: MaintenanceTaskId,
    at: DateTime<Utc>,
) -> Result<MaintenanceTask, WorkflowError> {
    let task = tables
        .maintenance_tasks
        .get_mut(&task_id)
        .ok_or(WorkflowError::NotFound(ResourceRef::MaintenanceTask(task_id)))?;
    task.next_due = next_due_after(at, task.frequency_months)?;
    task.last_completed = Some(at);
    task.status = MaintenanceStatus::Completed;
    Ok(task.clone())
}
