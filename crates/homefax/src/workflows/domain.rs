use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "-{}"), self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a registered participant.
    ActorId,
    "actor"
);
record_id!(PropertyId, "property");
record_id!(AccessRequestId, "access-request");
record_id!(ProjectId, "project");
record_id!(ProjectUpdateId, "project-update");
record_id!(AdminKeyId, "admin-key");
record_id!(MaintenanceTaskId, "maintenance-task");
record_id!(NoticeId, "notice");
record_id!(AuditEntryId, "audit");

/// Role carried by an actor. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Contractor,
    Administrator,
    PublicVisitor,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Contractor => "contractor",
            Role::Administrator => "administrator",
            Role::PublicVisitor => "public_visitor",
        }
    }
}

/// Role-specific attributes captured at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleProfile {
    Owner,
    Contractor { company: String, trade: String },
    Administrator { root: bool },
}

impl RoleProfile {
    pub fn role(&self) -> Role {
        match self {
            RoleProfile::Owner => Role::Owner,
            RoleProfile::Contractor { .. } => Role::Contractor,
            RoleProfile::Administrator { .. } => Role::Administrator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub profile: RoleProfile,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Actor {
    pub fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.profile, RoleProfile::Administrator { .. })
    }

    pub fn is_root_admin(&self) -> bool {
        matches!(self.profile, RoleProfile::Administrator { root: true })
    }

    pub fn is_contractor(&self) -> bool {
        matches!(self.profile, RoleProfile::Contractor { .. })
    }
}

/// The party a request is evaluated for. Anonymous visitors carry no actor record.
#[derive(Debug, Clone, Copy)]
pub enum Principal<'a> {
    Public,
    Actor(&'a Actor),
}

impl<'a> Principal<'a> {
    pub fn actor(&self) -> Option<&'a Actor> {
        match self {
            Principal::Public => None,
            Principal::Actor(actor) => Some(actor),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Public => Role::PublicVisitor,
            Principal::Actor(actor) => actor.role(),
        }
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        self.actor().map(|actor| actor.id)
    }
}

impl<'a> From<&'a Actor> for Principal<'a> {
    fn from(actor: &'a Actor) -> Self {
        Principal::Actor(actor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    PendingVerification,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityKind {
    Water,
    Electric,
    Gas,
    Sewer,
    Internet,
}

impl UtilityKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "water" => Some(Self::Water),
            "electric" | "electricity" | "power" => Some(Self::Electric),
            "gas" | "natural gas" => Some(Self::Gas),
            "sewer" | "wastewater" => Some(Self::Sewer),
            "internet" | "broadband" => Some(Self::Internet),
            _ => None,
        }
    }
}

/// Structural facts recorded for a property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFacts {
    pub year_built: Option<u16>,
    pub zoning: Option<String>,
    pub square_feet: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub facts: StructuralFacts,
    pub status: PropertyStatus,
    pub owner_id: Option<ActorId>,
    /// Name on the county record, used to match registering owners.
    pub owner_of_record: Option<String>,
    pub utilities: Vec<UtilityKind>,
    pub assessed_value: Option<u64>,
    pub financials_public: bool,
    /// Only tracked while the property is under construction.
    pub completion_percent: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl Property {
    pub fn is_owned_by(&self, actor: ActorId) -> bool {
        self.owner_id == Some(actor)
    }

    pub fn has_utility(&self, utility: UtilityKind) -> bool {
        self.utilities.contains(&utility)
    }
}

/// Input for creating a property record, from a roll import or a contractor submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDraft {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default)]
    pub facts: StructuralFacts,
    #[serde(default)]
    pub owner_of_record: Option<String>,
    #[serde(default)]
    pub utilities: Vec<UtilityKind>,
    #[serde(default)]
    pub assessed_value: Option<u64>,
    #[serde(default)]
    pub financials_public: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestType {
    ContractorAccess,
    PublicInfoRequest,
    NewPropertySubmission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Denied,
}

impl AccessRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AccessRequestStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessRequestStatus::Pending => "pending",
            AccessRequestStatus::Approved => "approved",
            AccessRequestStatus::Denied => "denied",
        }
    }
}

/// Disposition chosen by an owner or administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Approved,
    Denied,
}

impl From<AccessOutcome> for AccessRequestStatus {
    fn from(outcome: AccessOutcome) -> Self {
        match outcome {
            AccessOutcome::Approved => AccessRequestStatus::Approved,
            AccessOutcome::Denied => AccessRequestStatus::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: AccessRequestId,
    pub property_id: PropertyId,
    pub contractor_id: Option<ActorId>,
    pub owner_id: Option<ActorId>,
    pub admin_id: Option<ActorId>,
    /// Whoever filed the request; resolution notices go here too.
    #[serde(default)]
    pub requested_by: Option<ActorId>,
    pub request_type: AccessRequestType,
    pub status: AccessRequestStatus,
    pub resolved_by: Option<ActorId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub property_id: PropertyId,
    pub contractor_id: ActorId,
    pub project_type: String,
    pub description: String,
    pub status: ProjectStatus,
    pub percent_complete: u8,
    pub attachments: Vec<String>,
    /// Set when the project was opened from an approved access request.
    pub source_request: Option<AccessRequestId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn is_completed(&self) -> bool {
        self.status == ProjectStatus::Completed
    }

    /// Append file references not already attached, keeping first-seen order.
    pub fn attach<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = String>,
    {
        for file in files {
            let file = file.trim();
            if !file.is_empty() && !self.attachments.iter().any(|existing| existing == file) {
                self.attachments.push(file.to_string());
            }
        }
    }
}

/// One line of a structured parts list attached to an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartEntry {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Progress,
    /// Progress or attachments moved through `PUT /projects/:id`.
    Edit,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub id: ProjectUpdateId,
    pub project_id: ProjectId,
    pub contractor_id: ActorId,
    pub kind: UpdateKind,
    pub title: String,
    pub description: String,
    pub progress_percentage: Option<u8>,
    pub files_added: Vec<String>,
    pub parts_listed: Option<Vec<PartEntry>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminKey {
    pub id: AdminKeyId,
    pub key_value: String,
    pub territory: String,
    pub issued_by: ActorId,
    pub is_used: bool,
    pub used_by: Option<ActorId>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Pending,
    Completed,
    RequiresContractor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceTask {
    pub id: MaintenanceTaskId,
    pub property_id: PropertyId,
    pub title: String,
    pub frequency_months: Option<u32>,
    pub last_completed: Option<DateTime<Utc>>,
    pub next_due: Option<DateTime<Utc>>,
    pub status: MaintenanceStatus,
    pub owner_editable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticePriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: NoticeId,
    /// `None` addresses every actor.
    pub recipient: Option<ActorId>,
    pub property_id: Option<PropertyId>,
    pub status: NoticeStatus,
    pub priority: NoticePriority,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_visible_to(&self, actor: ActorId) -> bool {
        match self.recipient {
            Some(recipient) => recipient == actor,
            None => true,
        }
    }
}
