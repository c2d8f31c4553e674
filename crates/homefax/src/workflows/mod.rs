//! Access, project-lifecycle, maintenance, and notification workflows over a shared
//! property record.

pub mod access;
pub mod admin_keys;
pub mod audit;
pub mod clock;
pub mod domain;
pub mod error;
pub mod maintenance;
pub mod notifications;
pub mod permissions;
pub mod platform;
pub mod projects;
pub mod properties;
pub mod registration;
pub mod roll;
pub mod router;
pub mod store;

#[cfg(test)]
mod tests;

pub use access::{AccessRequestDraft, AccessRequestManager, Resolution};
pub use admin_keys::{AdminKeyIssuer, ADMIN_KEY_LENGTH};
pub use audit::{AuditAction, AuditEntry};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{InvariantViolation, ResourceRef, WorkflowError};
pub use maintenance::{MaintenanceScheduler, MaintenanceTaskDraft, MaintenanceTaskPatch};
pub use notifications::{Broadcast, BroadcastTarget, NotificationRouter, PlatformEvent};
pub use permissions::{Action, Decision, DenialReason, PermissionEvaluator, Resource};
pub use platform::{HomefaxPlatform, PlatformSettings};
pub use projects::{
    ProjectDraft, ProjectLifecycleManager, ProjectOpening, ProjectPatch, ProjectUpdateDraft,
};
pub use properties::{ComprehensiveProperty, PropertyRegistry, PropertyView, PublicPropertyView};
pub use registration::{
    ActorDraft, OwnershipMatch, OwnershipMatcher, Registration, RegistrationRequest,
    RegistrationService, Session, TitleStrippingMatcher,
};
pub use roll::{read_roll, read_roll_file, RollImportError};
pub use router::{error_response, platform_router, status_for};
pub use store::{InMemoryStore, PlatformStore, RepositoryError, Tables};
