//! Actor registration, credential checks, and bearer sessions.
//!
//! Owners are paired with unclaimed county records through a pluggable
//! [`OwnershipMatcher`]; administrators are admitted only by redeeming an admin key inside
//! the same transaction that creates them.

mod matcher;
mod password;
mod sessions;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use matcher::{OwnerRecord, OwnershipMatcher, TitleStrippingMatcher};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use sessions::{Session, SessionRecord, SESSION_TOKEN_LENGTH};

use super::admin_keys;
use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{Actor, ActorId, PropertyId, PropertyStatus, Role, RoleProfile};
use super::error::{ResourceRef, WorkflowError};
use super::notifications::{NotificationRouter, PlatformEvent};
use super::store::{PlatformStore, Tables};

/// Registration payload accepted from the sign-up form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub trade: Option<String>,
}

/// Validated actor fields ready to insert.
#[derive(Debug, Clone)]
pub struct ActorDraft {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile: RoleProfile,
}

/// Result of pairing a new owner with county records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OwnershipMatch {
    NotApplicable,
    Claimed { property_id: PropertyId },
    Unmatched,
    Ambiguous { candidates: Vec<PropertyId> },
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub actor: Actor,
    pub session: Session,
    pub ownership: OwnershipMatch,
}

pub struct RegistrationService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    matcher: Arc<dyn OwnershipMatcher>,
    notifications: Arc<NotificationRouter<S>>,
    session_ttl: Duration,
}

impl<S> RegistrationService<S>
where
    S: PlatformStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        matcher: Arc<dyn OwnershipMatcher>,
        notifications: Arc<NotificationRouter<S>>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            matcher,
            notifications,
            session_ttl,
        }
    }

    pub fn register(&self, request: RegistrationRequest) -> Result<Registration, WorkflowError> {
        let RegistrationRequest {
            name,
            email,
            password,
            role,
            admin_key,
            company,
            trade,
        } = request;

        let name = name.trim().to_string();
        let email = email.trim().to_string();
        validate_identity(&name, &email, &password)?;

        let profile = match role {
            Role::Owner => RoleProfile::Owner,
            Role::Contractor => {
                let company = required(company, "company is required for contractors")?;
                let trade = required(trade, "trade is required for contractors")?;
                RoleProfile::Contractor { company, trade }
            }
            Role::Administrator => RoleProfile::Administrator { root: false },
            Role::PublicVisitor => {
                return Err(WorkflowError::validation(
                    "public visitors do not register",
                ))
            }
        };
        let admin_key = match role {
            Role::Administrator => Some(required(
                admin_key,
                "admin key is required for administrator registration",
            )?),
            _ => None,
        };

        let draft = ActorDraft {
            name,
            email,
            password_hash: hash_password(&password)?,
            profile,
        };
        let now = self.clock.now();
        let registration = self.store.transaction(|tables| -> Result<Registration, WorkflowError> {
            let actor = match admin_key.as_deref() {
                Some(key_value) => admin_keys::redeem_in(tables, key_value, draft, now)?,
                None => insert_actor(tables, draft, now)?,
            };
            let ownership = if actor.role() == Role::Owner {
                self.claim_matching_property(tables, &actor, now)
            } else {
                OwnershipMatch::NotApplicable
            };
            let session = sessions::open(tables, actor.id, now, self.session_ttl);
            Ok(Registration {
                actor,
                session,
                ownership,
            })
        })?;

        info!(actor = %registration.actor.id, role = registration.actor.role().label(), "actor registered");
        self.flag_for_review(&registration);
        Ok(registration)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Session, WorkflowError> {
        let actor = self
            .store
            .read(|tables| tables.actor_by_email(email).cloned())?
            .ok_or(WorkflowError::Unauthenticated)?;
        if !verify_password(password, &actor.password_hash) {
            return Err(WorkflowError::Unauthenticated);
        }

        let now = self.clock.now();
        self.store.transaction(|tables| {
            Ok::<_, WorkflowError>(sessions::open(tables, actor.id, now, self.session_ttl))
        })
    }

    /// Resolve a bearer token to the actor it was issued for.
    pub fn authenticate(&self, token: &str) -> Result<Actor, WorkflowError> {
        let now = self.clock.now();
        self.store
            .read(|tables| {
                let record = tables.sessions.get(token.trim())?;
                if record.expires_at <= now {
                    return None;
                }
                tables.actors.get(&record.actor_id).cloned()
            })?
            .ok_or(WorkflowError::Unauthenticated)
    }

    pub fn logout(&self, token: &str) -> Result<(), WorkflowError> {
        self.store.transaction(|tables| {
            tables.sessions.remove(token.trim());
            Ok::<_, WorkflowError>(())
        })
    }

    /// Create the seeded root administrator unless one already exists.
    pub fn bootstrap_root_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Actor, WorkflowError> {
        if let Some(existing) = self.store.read(|tables| {
            tables
                .actors
                .values()
                .find(|actor| actor.is_root_admin())
                .cloned()
        })? {
            return Ok(existing);
        }

        validate_identity(name.trim(), email.trim(), password)?;
        let draft = ActorDraft {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password_hash: hash_password(password)?,
            profile: RoleProfile::Administrator { root: true },
        };
        let now = self.clock.now();
        let actor = self.store.transaction(|tables| insert_actor(tables, draft, now))?;
        info!(actor = %actor.id, "root administrator seeded");
        Ok(actor)
    }

    fn claim_matching_property(
        &self,
        tables: &mut Tables,
        owner: &Actor,
        now: DateTime<Utc>,
    ) -> OwnershipMatch {
        let candidates = {
            let records: Vec<OwnerRecord<'_>> = tables
                .properties
                .values()
                .filter(|property| property.owner_id.is_none())
                .filter_map(|property| {
                    property.owner_of_record.as_deref().map(|owner_name| OwnerRecord {
                        property_id: property.id,
                        owner_name,
                    })
                })
                .collect();
            self.matcher.candidates(&owner.name, &records)
        };

        match candidates.as_slice() {
            [] => OwnershipMatch::Unmatched,
            [property_id] => {
                let property_id = *property_id;
                if let Some(property) = tables.properties.get_mut(&property_id) {
                    property.owner_id = Some(owner.id);
                    if property.status == PropertyStatus::PendingVerification {
                        property.status = PropertyStatus::Active;
                    }
                }
                audit::record(
                    tables,
                    Some(owner.id),
                    AuditAction::AssignOwner,
                    ResourceRef::Property(property_id),
                    now,
                );
                OwnershipMatch::Claimed { property_id }
            }
            _ => OwnershipMatch::Ambiguous { candidates },
        }
    }

    fn flag_for_review(&self, registration: &Registration) {
        let candidates = match &registration.ownership {
            OwnershipMatch::Unmatched => Vec::new(),
            OwnershipMatch::Ambiguous { candidates } => candidates.clone(),
            OwnershipMatch::NotApplicable | OwnershipMatch::Claimed { .. } => return,
        };

        warn!(
            actor = %registration.actor.id,
            candidates = candidates.len(),
            "owner registration needs manual ownership review"
        );
        let event = PlatformEvent::OwnershipReview {
            registrant: registration.actor.id,
            registrant_name: registration.actor.name.clone(),
            candidates,
        };
        if let Err(err) = self.notifications.notify(&event) {
            warn!(error = %err, "ownership review notice not routed");
        }
    }
}

/// Insert a new actor, rejecting duplicate emails.
pub(crate) fn insert_actor(
    tables: &mut Tables,
    draft: ActorDraft,
    now: DateTime<Utc>,
) -> Result<Actor, WorkflowError> {
    if tables.actor_by_email(&draft.email).is_some() {
        return Err(WorkflowError::validation("email already registered"));
    }

    let id = ActorId(tables.allocate("actors"));
    let actor = Actor {
        id,
        name: draft.name,
        email: draft.email,
        profile: draft.profile,
        password_hash: draft.password_hash,
        created_at: now,
    };
    tables.actors.insert(id, actor.clone());
    audit::record(tables, Some(id), AuditAction::Register, ResourceRef::Actor(id), now);
    Ok(actor)
}

fn validate_identity(name: &str, email: &str, password: &str) -> Result<(), WorkflowError> {
    if name.is_empty() {
        return Err(WorkflowError::validation("name is required"));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(WorkflowError::validation("email address is invalid"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(WorkflowError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn required(value: Option<String>, message: &str) -> Result<String, WorkflowError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| WorkflowError::validation(message))
}
