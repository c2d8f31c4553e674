use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::audit::AuditEntry;
use super::domain::{
    AccessRequest, AccessRequestId, AccessRequestStatus, AccessRequestType, Actor, ActorId,
    AdminKey, AdminKeyId, MaintenanceTask, MaintenanceTaskId, Notice, NoticeId, Project,
    ProjectId, ProjectUpdate, Property, PropertyId,
};
use super::error::{ResourceRef, WorkflowError};
use super::registration::SessionRecord;

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Every table the workflow engine reads and writes.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    sequences: BTreeMap<&'static str, u64>,
    pub actors: BTreeMap<ActorId, Actor>,
    pub properties: BTreeMap<PropertyId, Property>,
    pub access_requests: BTreeMap<AccessRequestId, AccessRequest>,
    pub projects: BTreeMap<ProjectId, Project>,
    pub project_updates: Vec<ProjectUpdate>,
    pub admin_keys: BTreeMap<AdminKeyId, AdminKey>,
    pub maintenance_tasks: BTreeMap<MaintenanceTaskId, MaintenanceTask>,
    pub notices: BTreeMap<NoticeId, Notice>,
    pub sessions: HashMap<String, SessionRecord>,
    pub audit: Vec<AuditEntry>,
}

impl Tables {
    /// Next value of the per-table id sequence. Sequences start at 1.
    pub fn allocate(&mut self, table: &'static str) -> u64 {
        let next = self.sequences.entry(table).or_insert(0);
        *next += 1;
        *next
    }

    pub fn actor(&self, id: ActorId) -> Result<&Actor, WorkflowError> {
        self.actors
            .get(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::Actor(id)))
    }

    pub fn property(&self, id: PropertyId) -> Result<&Property, WorkflowError> {
        self.properties
            .get(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::Property(id)))
    }

    pub fn property_mut(&mut self, id: PropertyId) -> Result<&mut Property, WorkflowError> {
        self.properties
            .get_mut(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::Property(id)))
    }

    pub fn access_request(&self, id: AccessRequestId) -> Result<&AccessRequest, WorkflowError> {
        self.access_requests
            .get(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::AccessRequest(id)))
    }

    pub fn project(&self, id: ProjectId) -> Result<&Project, WorkflowError> {
        self.projects
            .get(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::Project(id)))
    }

    pub fn maintenance_task(&self, id: MaintenanceTaskId) -> Result<&MaintenanceTask, WorkflowError> {
        self.maintenance_tasks
            .get(&id)
            .ok_or(WorkflowError::NotFound(ResourceRef::MaintenanceTask(id)))
    }

    pub fn actor_by_email(&self, email: &str) -> Option<&Actor> {
        self.actors
            .values()
            .find(|actor| actor.email.eq_ignore_ascii_case(email.trim()))
    }

    /// Whether an approved contractor-access request grants `contractor` operate rights on `property`.
    pub fn has_operate_rights(&self, contractor: ActorId, property: PropertyId) -> bool {
        self.access_requests.values().any(|request| {
            request.property_id == property
                && request.contractor_id == Some(contractor)
                && request.request_type == AccessRequestType::ContractorAccess
                && request.status == AccessRequestStatus::Approved
        })
    }

    pub fn updates_for(&self, project: ProjectId) -> Vec<ProjectUpdate> {
        self.project_updates
            .iter()
            .filter(|update| update.project_id == project)
            .cloned()
            .collect()
    }
}

/// Transactional storage boundary for the workflow engine.
///
/// `transaction` must apply every write made by `work` or none of them, and must serialize
/// against other transactions on the same store so that check-then-set sequences inside
/// `work` are atomic.
pub trait PlatformStore: Send + Sync {
    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Tables) -> T;

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tables) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Store holding every table behind a single mutex.
///
/// Transactions run against a staged copy that replaces the live tables only on success.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("store lock poisoned".to_string())
}

impl PlatformStore for InMemoryStore {
    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Tables) -> T,
    {
        let guard = self.tables.lock().map_err(|_| poisoned())?;
        Ok(query(&guard))
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tables) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.tables.lock().map_err(|_| poisoned())?;
        let mut staged = guard.clone();
        let value = work(&mut staged)?;
        *guard = staged;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_transaction_discards_staged_writes() {
        let store = InMemoryStore::new();

        let result: Result<(), WorkflowError> = store.transaction(|tables| {
            tables.allocate("actors");
            Err(WorkflowError::validation("abort"))
        });
        assert!(result.is_err());

        let next = store
            .transaction(|tables| Ok::<_, WorkflowError>(tables.allocate("actors")))
            .expect("commit");
        assert_eq!(next, 1, "aborted allocation must not advance the sequence");
    }

    #[test]
    fn sequences_are_independent_per_table() {
        let mut tables = Tables::default();
        assert_eq!(tables.allocate("actors"), 1);
        assert_eq!(tables.allocate("actors"), 2);
        assert_eq!(tables.allocate("projects"), 1);
    }
}
