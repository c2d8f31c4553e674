use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use super::audit::{self, AuditAction};
use super::clock::Clock;
use super::domain::{Actor, AdminKey, AdminKeyId, RoleProfile};
use super::error::{InvariantViolation, ResourceRef, WorkflowError};
use super::permissions::{Action, PermissionEvaluator, Resource};
use super::registration::{self, ActorDraft};
use super::store::{PlatformStore, Tables};

/// 62^16 possible values, roughly 95 bits.
pub const ADMIN_KEY_LENGTH: usize = 16;

fn generate_key_value() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ADMIN_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// Issues and redeems single-use administrator onboarding keys.
pub struct AdminKeyIssuer<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    evaluator: PermissionEvaluator,
}

impl<S> AdminKeyIssuer<S>
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

    pub fn issue(&self, territory: &str, issuer: &Actor) -> Result<AdminKey, WorkflowError> {
        self.evaluator
            .evaluate(issuer.into(), Action::IssueAdminKey, &Resource::Platform)
            .into_result()?;

        let territory = territory.trim();
        if territory.is_empty() {
            return Err(WorkflowError::validation("territory is required"));
        }

        let now = self.clock.now();
        let key = self.store.transaction(|tables| -> Result<AdminKey, WorkflowError> {
            let mut key_value = generate_key_value();
            while tables
                .admin_keys
                .values()
                .any(|existing| existing.key_value == key_value)
            {
                key_value = generate_key_value();
            }

            let id = AdminKeyId(tables.allocate("admin_keys"));
            let key = AdminKey {
                id,
                key_value,
                territory: territory.to_string(),
                issued_by: issuer.id,
                is_used: false,
                used_by: None,
                used_at: None,
                created_at: now,
            };
            tables.admin_keys.insert(id, key.clone());
            audit::record(
                tables,
                Some(issuer.id),
                AuditAction::IssueAdminKey,
                ResourceRef::AdminKey(id),
                now,
            );
            Ok(key)
        })?;

        info!(key_id = %key.id, territory = %key.territory, issued_by = %issuer.id, "admin key issued");
        Ok(key)
    }

    /// Consume `key_value` and create the administrator it admits.
    ///
    /// The lookup, the used-flag check, the flag write, and the actor insert share one
    /// transaction, so concurrent redemptions of the same key admit exactly one registrant.
    pub fn redeem(&self, key_value: &str, registrant: ActorDraft) -> Result<Actor, WorkflowError> {
        let now = self.clock.now();
        let actor = self
            .store
            .transaction(|tables| redeem_in(tables, key_value, registrant, now))?;
        info!(actor = %actor.id, "admin key redeemed");
        Ok(actor)
    }

    pub fn list(&self, actor: &Actor) -> Result<Vec<AdminKey>, WorkflowError> {
        self.evaluator
            .evaluate(actor.into(), Action::ListAdminKeys, &Resource::Platform)
            .into_result()?;
        let mut keys = self
            .store
            .read(|tables| tables.admin_keys.values().cloned().collect::<Vec<_>>())?;
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(keys)
    }
}

pub(crate) fn redeem_in(
    tables: &mut Tables,
    key_value: &str,
    registrant: ActorDraft,
    now: DateTime<Utc>,
) -> Result<Actor, WorkflowError> {
    let key_id = tables
        .admin_keys
        .values()
        .find(|key| key.key_value == key_value.trim())
        .map(|key| key.id)
        .ok_or(WorkflowError::NotFound(ResourceRef::UnknownAdminKey))?;

    if tables.admin_keys.get(&key_id).is_some_and(|key| key.is_used) {
        return Err(InvariantViolation::KeyAlreadyUsed.into());
    }

    let draft = ActorDraft {
        profile: RoleProfile::Administrator { root: false },
        ..registrant
    };
    let actor = registration::insert_actor(tables, draft, now)?;

    if let Some(key) = tables.admin_keys.get_mut(&key_id) {
        key.is_used = true;
        key.used_by = Some(actor.id);
        key.used_at = Some(now);
    }
    audit::record(
        tables,
        Some(actor.id),
        AuditAction::RedeemAdminKey,
        ResourceRef::AdminKey(key_id),
        now,
    );
    Ok(actor)
}
