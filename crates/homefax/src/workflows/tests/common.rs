use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::domain::{
    AccessRequest, AccessRequestId, AccessRequestStatus, AccessRequestType, Actor, ActorId,
    Notice, Property, PropertyId, PropertyStatus, RoleProfile, StructuralFacts, UtilityKind,
};
use crate::workflows::registration::SessionRecord;
use crate::workflows::store::{InMemoryStore, PlatformStore, RepositoryError, Tables};
use crate::workflows::{Clock, FixedClock, HomefaxPlatform, PlatformSettings, WorkflowError};

pub(super) fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Platform over a fresh in-memory store with a clock frozen at `day_zero`.
pub(super) struct Harness {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) platform: Arc<HomefaxPlatform<InMemoryStore>>,
}

impl Harness {
    pub(super) fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(day_zero()));
        let platform = Arc::new(HomefaxPlatform::new(
            store.clone(),
            clock.clone(),
            PlatformSettings::default(),
        ));
        Self {
            store,
            clock,
            platform,
        }
    }

    pub(super) fn tables(&self) -> Tables {
        self.store.read(|tables| tables.clone()).expect("store readable")
    }

    /// Insert an actor directly, bypassing password hashing.
    pub(super) fn actor(&self, name: &str, profile: RoleProfile) -> Actor {
        let now = self.clock.now();
        self.store
            .transaction(|tables| {
                let id = ActorId(tables.allocate("actors"));
                let actor = Actor {
                    id,
                    name: name.to_string(),
                    email: format!("{}@homefax.test", name.to_lowercase().replace(' ', ".")),
                    profile,
                    password_hash: String::new(),
                    created_at: now,
                };
                tables.actors.insert(id, actor.clone());
                Ok::<_, WorkflowError>(actor)
            })
            .expect("actor seeded")
    }

    pub(super) fn owner(&self, name: &str) -> Actor {
        self.actor(name, RoleProfile::Owner)
    }

    pub(super) fn contractor(&self, name: &str) -> Actor {
        self.actor(
            name,
            RoleProfile::Contractor {
                company: format!("{name} Builders"),
                trade: "general".to_string(),
            },
        )
    }

    pub(super) fn admin(&self, name: &str, root: bool) -> Actor {
        self.actor(name, RoleProfile::Administrator { root })
    }

    pub(super) fn property(&self, owner: Option<&Actor>, utilities: &[UtilityKind]) -> Property {
        self.property_with(owner, utilities, None)
    }

    pub(super) fn property_with(
        &self,
        owner: Option<&Actor>,
        utilities: &[UtilityKind],
        owner_of_record: Option<&str>,
    ) -> Property {
        let now = self.clock.now();
        self.store
            .transaction(|tables| {
                let id = PropertyId(tables.allocate("properties"));
                let property = Property {
                    id,
                    address: format!("{} Willamette St", 100 + id.0),
                    city: "Eugene".to_string(),
                    state: "OR".to_string(),
                    zip_code: "97401".to_string(),
                    facts: StructuralFacts {
                        year_built: Some(1962),
                        zoning: Some("R-1".to_string()),
                        square_feet: Some(1640),
                    },
                    status: PropertyStatus::Active,
                    owner_id: owner.map(|owner| owner.id),
                    owner_of_record: owner_of_record.map(str::to_string),
                    utilities: utilities.to_vec(),
                    assessed_value: Some(385_000),
                    financials_public: false,
                    completion_percent: None,
                    created_at: now,
                };
                tables.properties.insert(id, property.clone());
                Ok::<_, WorkflowError>(property)
            })
            .expect("property seeded")
    }

    /// Record an approved contractor-access request, granting operate rights.
    pub(super) fn grant(&self, contractor: &Actor, property: &Property) -> AccessRequest {
        let now = self.clock.now();
        self.store
            .transaction(|tables| {
                let id = AccessRequestId(tables.allocate("access_requests"));
                let request = AccessRequest {
                    id,
                    property_id: property.id,
                    contractor_id: Some(contractor.id),
                    owner_id: property.owner_id,
                    admin_id: None,
                    requested_by: Some(contractor.id),
                    request_type: AccessRequestType::ContractorAccess,
                    status: AccessRequestStatus::Approved,
                    resolved_by: property.owner_id,
                    resolved_at: Some(now),
                    created_at: now,
                };
                tables.access_requests.insert(id, request.clone());
                Ok::<_, WorkflowError>(request)
            })
            .expect("grant seeded")
    }

    /// Open a bearer session for `actor` and return its token.
    pub(super) fn session(&self, actor: &Actor) -> String {
        let token = format!("token-{}", actor.id.0);
        let expires_at = self.clock.now() + Duration::hours(1);
        self.store
            .transaction(|tables| {
                tables.sessions.insert(
                    token.clone(),
                    SessionRecord {
                        actor_id: actor.id,
                        expires_at,
                    },
                );
                Ok::<_, WorkflowError>(())
            })
            .expect("session seeded");
        token
    }

    pub(super) fn notices_for(&self, actor: &Actor) -> Vec<Notice> {
        self.tables()
            .notices
            .values()
            .filter(|notice| notice.recipient == Some(actor.id))
            .cloned()
            .collect()
    }
}

/// Store whose every call fails as if the database were down.
pub(super) struct UnavailableStore;

impl PlatformStore for UnavailableStore {
    fn read<T, F>(&self, _query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Tables) -> T,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tables) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

/// In-memory store that fails exactly one transaction, counted from 1.
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryStore,
    fail_on: usize,
    seen: AtomicUsize,
}

impl FlakyStore {
    pub(super) fn failing_transaction(inner: InMemoryStore, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            seen: AtomicUsize::new(0),
        }
    }
}

impl PlatformStore for FlakyStore {
    fn read<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Tables) -> T,
    {
        self.inner.read(query)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tables) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let attempt = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_on {
            return Err(RepositoryError::Unavailable("connection reset".to_string()).into());
        }
        self.inner.transaction(work)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json body")
}
