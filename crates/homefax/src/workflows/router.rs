use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::access::AccessRequestDraft;
use super::domain::{
    AccessOutcome, AccessRequestId, AccessRequestStatus, Actor, ActorId, MaintenanceTaskId,
    NoticeId, Principal, ProjectId, PropertyDraft, PropertyId,
};
use super::error::WorkflowError;
use super::maintenance::{MaintenanceTaskDraft, MaintenanceTaskPatch};
use super::notifications::Broadcast;
use super::permissions::DenialReason;
use super::platform::HomefaxPlatform;
use super::projects::{ProjectDraft, ProjectOpening, ProjectPatch, ProjectUpdateDraft};
use super::registration::RegistrationRequest;
use super::roll;
use super::store::{PlatformStore, RepositoryError};

/// Router exposing the workflow engine over HTTP.
pub fn platform_router<S>(platform: Arc<HomefaxPlatform<S>>) -> Router
where
    S: PlatformStore + 'static,
{
    Router::new()
        .route("/auth/register", post(register_handler::<S>))
        .route("/auth/login", post(login_handler::<S>))
        .route("/auth/logout", post(logout_handler::<S>))
        .route("/auth/me", get(me_handler::<S>))
        .route(
            "/access-requests",
            post(create_access_request_handler::<S>).get(list_access_requests_handler::<S>),
        )
        .route(
            "/access-requests/:id",
            get(get_access_request_handler::<S>).put(resolve_access_request_handler::<S>),
        )
        .route(
            "/access-requests/:id/project",
            post(open_project_handler::<S>),
        )
        .route("/projects", post(create_project_handler::<S>))
        .route(
            "/projects/:id",
            get(get_project_handler::<S>).put(edit_project_handler::<S>),
        )
        .route("/projects/:id/updates", get(project_updates_handler::<S>))
        .route("/projects/:id/complete", post(complete_project_handler::<S>))
        .route("/project-updates", post(append_update_handler::<S>))
        .route("/properties", post(submit_property_handler::<S>))
        .route("/properties/:id", get(view_property_handler::<S>))
        .route(
            "/properties/:id/comprehensive",
            get(comprehensive_property_handler::<S>),
        )
        .route("/properties/:id/owner", put(assign_owner_handler::<S>))
        .route(
            "/properties/:id/maintenance-tasks",
            post(add_maintenance_task_handler::<S>),
        )
        .route(
            "/properties/:id/maintenance-tasks/due",
            get(due_maintenance_handler::<S>),
        )
        .route(
            "/maintenance-tasks/:id",
            put(update_maintenance_task_handler::<S>),
        )
        .route(
            "/admin-keys",
            post(issue_admin_key_handler::<S>).get(list_admin_keys_handler::<S>),
        )
        .route("/admin/notifications", post(broadcast_handler::<S>))
        .route("/admin/audit", get(audit_log_handler::<S>))
        .route("/admin/property-roll", post(import_roll_handler::<S>))
        .route("/notifications", get(inbox_handler::<S>))
        .route("/notifications/:id/read", put(mark_read_handler::<S>))
        .with_state(platform)
}

type Platform<S> = State<Arc<HomefaxPlatform<S>>>;

/// Status code for each workflow failure.
pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Unauthenticated
        | WorkflowError::NotAuthorized(DenialReason::AuthenticationRequired) => {
            StatusCode::UNAUTHORIZED
        }
        WorkflowError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidState(_) => StatusCode::CONFLICT,
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Repository(RepositoryError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        WorkflowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: WorkflowError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "workflow request failed");
    }
    let payload = match &err {
        WorkflowError::NotAuthorized(reason) => json!({
            "error": err.to_string(),
            "reason": reason,
        }),
        _ => json!({
            "error": err.to_string(),
        }),
    };
    (status, Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Run password hashing work on the blocking pool so it never stalls the executor.
pub(crate) async fn off_runtime<T, F>(work: F) -> Result<T, WorkflowError>
where
    F: FnOnce() -> Result<T, WorkflowError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "blocking credential task failed");
            Err(WorkflowError::Internal("credential task failed".to_string()))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The session actor. Missing or unknown tokens are rejected.
fn session_actor<S>(platform: &HomefaxPlatform<S>, headers: &HeaderMap) -> Result<Actor, WorkflowError>
where
    S: PlatformStore + 'static,
{
    let token = bearer_token(headers).ok_or(WorkflowError::Unauthenticated)?;
    platform.registration().authenticate(token)
}

/// The session actor when a token is supplied, otherwise an anonymous visitor.
fn optional_actor<S>(
    platform: &HomefaxPlatform<S>,
    headers: &HeaderMap,
) -> Result<Option<Actor>, WorkflowError>
where
    S: PlatformStore + 'static,
{
    match bearer_token(headers) {
        Some(token) => platform.registration().authenticate(token).map(Some),
        None if headers.contains_key(header::AUTHORIZATION) => Err(WorkflowError::Unauthenticated),
        None => Ok(None),
    }
}

fn principal_of(actor: &Option<Actor>) -> Principal<'_> {
    match actor {
        Some(actor) => Principal::Actor(actor),
        None => Principal::Public,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBody {
    status: AccessOutcome,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusFilter {
    #[serde(default)]
    status: Option<AccessRequestStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignOwnerBody {
    owner_id: ActorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminKeyBody {
    territory: String,
    #[serde(default)]
    created_by: Option<ActorId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InboxFilter {
    #[serde(default)]
    unread: bool,
}

pub(crate) async fn register_handler<S>(
    State(platform): Platform<S>,
    Json(request): Json<RegistrationRequest>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = off_runtime(move || platform.registration().register(request)).await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn login_handler<S>(
    State(platform): Platform<S>,
    Json(body): Json<LoginBody>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result =
        off_runtime(move || platform.registration().login(&body.email, &body.password)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn logout_handler<S>(State(platform): Platform<S>, headers: HeaderMap) -> Response
where
    S: PlatformStore + 'static,
{
    let result = bearer_token(&headers)
        .ok_or(WorkflowError::Unauthenticated)
        .and_then(|token| platform.registration().logout(token));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn me_handler<S>(State(platform): Platform<S>, headers: HeaderMap) -> Response
where
    S: PlatformStore + 'static,
{
    respond(StatusCode::OK, session_actor(&platform, &headers))
}

pub(crate) async fn create_access_request_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(draft): Json<AccessRequestDraft>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = optional_actor(&platform, &headers)
        .and_then(|actor| platform.access().create(principal_of(&actor), draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn list_access_requests_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Query(filter): Query<StatusFilter>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.access().list(&actor, filter.status));
    respond(StatusCode::OK, result)
}

pub(crate) async fn get_access_request_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.access().get(AccessRequestId(id), &actor));
    respond(StatusCode::OK, result)
}

pub(crate) async fn resolve_access_request_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<ResolveBody>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers).and_then(|actor| {
        platform
            .access()
            .resolve(AccessRequestId(id), &actor, body.status)
            .map(|resolution| resolution.request)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn open_project_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<ProjectOpening>>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let opening = body.map(|Json(opening)| opening).unwrap_or_default();
    let result = session_actor(&platform, &headers).and_then(|actor| {
        platform
            .projects()
            .create_from_access_approval(AccessRequestId(id), &actor, opening)
    });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn create_project_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(draft): Json<ProjectDraft>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().create_direct(&actor, draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn get_project_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().get(ProjectId(id), &actor));
    respond(StatusCode::OK, result)
}

pub(crate) async fn edit_project_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(patch): Json<ProjectPatch>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().edit(ProjectId(id), &actor, patch));
    respond(StatusCode::OK, result)
}

pub(crate) async fn project_updates_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().updates(ProjectId(id), &actor));
    respond(StatusCode::OK, result)
}

pub(crate) async fn complete_project_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().complete(ProjectId(id), &actor));
    respond(StatusCode::OK, result)
}

pub(crate) async fn append_update_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(draft): Json<ProjectUpdateDraft>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.projects().append_update(&actor, draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn submit_property_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(draft): Json<PropertyDraft>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.properties().submit_property(&actor, draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn view_property_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = optional_actor(&platform, &headers)
        .and_then(|actor| platform.properties().view(principal_of(&actor), PropertyId(id)));
    respond(StatusCode::OK, result)
}

pub(crate) async fn comprehensive_property_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = optional_actor(&platform, &headers).and_then(|actor| {
        platform
            .properties()
            .comprehensive(principal_of(&actor), PropertyId(id))
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn assign_owner_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<AssignOwnerBody>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers).and_then(|actor| {
        platform
            .properties()
            .assign_owner(&actor, PropertyId(id), body.owner_id)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn add_maintenance_task_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(draft): Json<MaintenanceTaskDraft>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.maintenance().add_task(&actor, PropertyId(id), draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn due_maintenance_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = optional_actor(&platform, &headers)
        .and_then(|actor| platform.maintenance().due(PropertyId(id), principal_of(&actor)));
    respond(StatusCode::OK, result)
}

pub(crate) async fn update_maintenance_task_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(patch): Json<MaintenanceTaskPatch>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.maintenance().update(MaintenanceTaskId(id), &actor, patch));
    respond(StatusCode::OK, result)
}

pub(crate) async fn issue_admin_key_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(body): Json<AdminKeyBody>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers).and_then(|actor| {
        if body.created_by.is_some_and(|id| id != actor.id) {
            return Err(WorkflowError::Validation(
                "created_by must match the session actor".to_string(),
            ));
        }
        platform.admin_keys().issue(&body.territory, &actor)
    });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn list_admin_keys_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result =
        session_actor(&platform, &headers).and_then(|actor| platform.admin_keys().list(&actor));
    respond(StatusCode::OK, result)
}

pub(crate) async fn broadcast_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Json(broadcast): Json<Broadcast>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.broadcast(&actor, broadcast))
        .map(|notices| {
            json!({
                "delivered": notices.len(),
                "notices": notices,
            })
        });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn audit_log_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers).and_then(|actor| platform.audit_log(&actor));
    respond(StatusCode::OK, result)
}

/// Accepts a CSV roll export as the raw request body.
pub(crate) async fn import_roll_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    body: String,
) -> Response
where
    S: PlatformStore + 'static,
{
    let actor = match session_actor(&platform, &headers) {
        Ok(actor) => actor,
        Err(err) => return error_response(err),
    };
    let drafts = match roll::read_roll(body.as_bytes()) {
        Ok(drafts) => drafts,
        Err(err) => {
            let payload = json!({
                "error": err.to_string(),
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
        }
    };
    let result = platform
        .properties()
        .import(&actor, drafts)
        .map(|imported| {
            json!({
                "imported": imported.len(),
                "properties": imported,
            })
        });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn inbox_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Query(filter): Query<InboxFilter>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.notifications().inbox(&actor, filter.unread));
    respond(StatusCode::OK, result)
}

pub(crate) async fn mark_read_handler<S>(
    State(platform): Platform<S>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response
where
    S: PlatformStore + 'static,
{
    let result = session_actor(&platform, &headers)
        .and_then(|actor| platform.notifications().mark_read(NoticeId(id), &actor));
    respond(StatusCode::OK, result)
}
