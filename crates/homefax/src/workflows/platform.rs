use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use super::access::AccessRequestManager;
use super::admin_keys::AdminKeyIssuer;
use super::audit::AuditEntry;
use super::clock::Clock;
use super::domain::{Actor, Notice};
use super::error::WorkflowError;
use super::maintenance::MaintenanceScheduler;
use super::notifications::{Broadcast, NotificationRouter, PlatformEvent};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::projects::ProjectLifecycleManager;
use super::properties::PropertyRegistry;
use super::registration::{OwnershipMatcher, RegistrationService, TitleStrippingMatcher};
use super::store::PlatformStore;

/// Tunables for the workflow engine.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub session_ttl: Duration,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
        }
    }
}

/// Every workflow component wired against one store and one clock.
pub struct HomefaxPlatform<S> {
    store: Arc<S>,
    evaluator: PermissionEvaluator,
    registration: RegistrationService<S>,
    admin_keys: AdminKeyIssuer<S>,
    access: AccessRequestManager<S>,
    projects: ProjectLifecycleManager<S>,
    maintenance: MaintenanceScheduler<S>,
    properties: PropertyRegistry<S>,
    notifications: Arc<NotificationRouter<S>>,
}

impl<S> HomefaxPlatform<S>
where
    S: PlatformStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: PlatformSettings) -> Self {
        Self::with_matcher(store, clock, settings, Arc::new(TitleStrippingMatcher))
    }

    pub fn with_matcher(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        settings: PlatformSettings,
        matcher: Arc<dyn OwnershipMatcher>,
    ) -> Self {
        let notifications = Arc::new(NotificationRouter::new(store.clone(), clock.clone()));
        Self {
            registration: RegistrationService::new(
                store.clone(),
                clock.clone(),
                matcher,
                notifications.clone(),
                settings.session_ttl,
            ),
            admin_keys: AdminKeyIssuer::new(store.clone(), clock.clone()),
            access: AccessRequestManager::new(store.clone(), clock.clone(), notifications.clone()),
            projects: ProjectLifecycleManager::new(
                store.clone(),
                clock.clone(),
                notifications.clone(),
            ),
            maintenance: MaintenanceScheduler::new(store.clone(), clock.clone()),
            properties: PropertyRegistry::new(store.clone(), clock),
            evaluator: PermissionEvaluator::new(),
            notifications,
            store,
        }
    }

    pub fn registration(&self) -> &RegistrationService<S> {
        &self.registration
    }

    pub fn admin_keys(&self) -> &AdminKeyIssuer<S> {
        &self.admin_keys
    }

    pub fn access(&self) -> &AccessRequestManager<S> {
        &self.access
    }

    pub fn projects(&self) -> &ProjectLifecycleManager<S> {
        &self.projects
    }

    pub fn maintenance(&self) -> &MaintenanceScheduler<S> {
        &self.maintenance
    }

    pub fn properties(&self) -> &PropertyRegistry<S> {
        &self.properties
    }

    pub fn notifications(&self) -> &NotificationRouter<S> {
        &self.notifications
    }

    /// Fan an administrator's announcement out to its audience.
    /// An audience with no members yields no notices.
    pub fn broadcast(&self, admin: &Actor, broadcast: Broadcast) -> Result<Vec<Notice>, WorkflowError> {
        self.evaluator
            .evaluate(admin.into(), Action::BroadcastNotice, &Resource::Platform)
            .into_result()?;
        if broadcast.title.trim().is_empty() || broadcast.message.trim().is_empty() {
            return Err(WorkflowError::validation(
                "broadcast title and message are required",
            ));
        }

        let target = broadcast.target;
        let notices = self.notifications.notify(&PlatformEvent::Broadcast(broadcast))?;
        info!(sent_by = %admin.id, ?target, recipients = notices.len(), "broadcast sent");
        Ok(notices)
    }

    /// The audit trail, oldest first.
    pub fn audit_log(&self, admin: &Actor) -> Result<Vec<AuditEntry>, WorkflowError> {
        self.evaluator
            .evaluate(admin.into(), Action::ViewAuditLog, &Resource::Platform)
            .into_result()?;
        Ok(self.store.read(|tables| tables.audit.clone())?)
    }
}
