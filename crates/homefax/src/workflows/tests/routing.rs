use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

use crate::workflows::domain::{AccessRequestStatus, AccessRequestType, ProjectStatus};
use crate::workflows::projects::ProjectDraft;
use crate::workflows::router::{off_runtime, status_for};
use crate::workflows::{
    platform_router, AccessRequestDraft, FixedClock, HomefaxPlatform, PlatformSettings,
    WorkflowError,
};

fn router(harness: &Harness) -> Router {
    platform_router(harness.platform.clone())
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    }
}

#[tokio::test]
async fn session_routes_reject_missing_or_unknown_tokens() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(request(Method::GET, "/auth/me", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&harness)
        .oneshot(request(Method::GET, "/auth/me", Some("not-a-session"), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let malformed = Request::builder()
        .uri("/properties/1")
        .header(header::AUTHORIZATION, "Basic b2xpdmU6c2VjcmV0")
        .body(Body::empty())
        .expect("request builds");
    let response = router(&harness).oneshot(malformed).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn credential_work_runs_on_the_blocking_pool() {
    let worker = off_runtime(|| Ok(std::thread::current().id()))
        .await
        .expect("task joins");
    assert_ne!(worker, std::thread::current().id());

    let crashed = off_runtime::<(), _>(|| panic!("hasher crashed")).await;
    match crashed {
        Err(err @ WorkflowError::Internal(_)) => {
            assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR)
        }
        other => panic!("expected internal error, got {other:?}"),
    }
}

#[tokio::test]
async fn register_login_and_me_round_trip() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "name": "Cal Contractor",
                "email": "cal@homefax.test",
                "password": "correct-horse",
                "role": "contractor",
                "company": "Cedar Build",
                "trade": "roofing",
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = read_json_body(response).await;
    assert_eq!(registered["ownership"]["outcome"], "not_applicable");

    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "cal@homefax.test", "password": "correct-horse"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let session = read_json_body(response).await;
    let token = session["token"].as_str().expect("token issued").to_string();

    let response = router(&harness)
        .oneshot(request(Method::GET, "/auth/me", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let me = read_json_body(response).await;
    assert_eq!(me["email"], "cal@homefax.test");
    assert_eq!(me["role"], "contractor");
    assert!(me.get("password_hash").is_none());

    let response = router(&harness)
        .oneshot(request(Method::POST, "/auth/logout", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = router(&harness)
        .oneshot(request(Method::GET, "/auth/me", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_contractor_access_request_is_unauthorized() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let property = harness.property(Some(&owner), &[]);

    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            "/access-requests",
            None,
            Some(json!({"property_id": property.id.0, "request_type": "contractor_access"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            "/access-requests",
            None,
            Some(json!({"property_id": property.id.0, "request_type": "public_info_request"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn resolving_someone_elses_request_is_forbidden_with_reason() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let neighbour = harness.owner("Ned Neighbour");
    let builder = harness.contractor("Cal Contractor");
    let property = harness.property(Some(&owner), &[]);
    let builder_token = harness.session(&builder);
    let neighbour_token = harness.session(&neighbour);

    let response = router(&harness)
        .oneshot(request(
            Method::POST,
            "/access-requests",
            Some(&builder_token),
            Some(json!({"property_id": property.id.0, "request_type": "contractor_access"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    let uri = format!("/access-requests/{}", created["id"]);

    let response = router(&harness)
        .oneshot(request(
            Method::PUT,
            &uri,
            Some(&neighbour_token),
            Some(json!({"status": "approved"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json_body(response).await;
    assert_eq!(body["reason"], "not_property_owner");
    assert!(body["error"].as_str().is_some_and(|text| !text.is_empty()));
}

#[tokio::test]
async fn repeated_resolution_returns_the_settled_request() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let builder = harness.contractor("Cal Contractor");
    let property = harness.property(Some(&owner), &[]);
    let owner_token = harness.session(&owner);
    let request_id = harness
        .platform
        .access()
        .create(
            (&builder).into(),
            AccessRequestDraft {
                property_id: property.id,
                contractor_id: None,
                owner_id: None,
                admin_id: None,
                request_type: AccessRequestType::ContractorAccess,
            },
        )
        .expect("request created")
        .id;
    let uri = format!("/access-requests/{}", request_id.0);

    let mut bodies = Vec::new();
    for status in ["denied", "approved"] {
        let response = router(&harness)
            .oneshot(request(
                Method::PUT,
                &uri,
                Some(&owner_token),
                Some(json!({ "status": status })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(read_json_body(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1]["status"], "denied");
    assert_eq!(
        harness.tables().access_requests[&request_id].status,
        AccessRequestStatus::Denied
    );
}

#[tokio::test]
async fn missing_records_are_not_found() {
    let harness = Harness::new();
    let admin = harness.admin("Ada Admin", true);
    let token = harness.session(&admin);

    for uri in ["/projects/999", "/access-requests/999", "/properties/999"] {
        let response = router(&harness)
            .oneshot(request(Method::GET, uri, Some(&token), None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn progress_regression_is_a_conflict() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let builder = harness.contractor("Cal Contractor");
    let property = harness.property(Some(&owner), &[]);
    harness.grant(&builder, &property);
    let token = harness.session(&builder);
    let project = harness
        .platform
        .projects()
        .create_direct(
            &builder,
            ProjectDraft {
                property_id: property.id,
                contractor_id: None,
                project_type: "siding".to_string(),
                description: "Re-side north wall".to_string(),
                status: Some(ProjectStatus::InProgress),
                percent_complete: None,
                attachments: Vec::new(),
            },
        )
        .expect("project created");

    let update = |percent: u8| {
        json!({
            "project_id": project.id.0,
            "title": "Progress",
            "description": "Boards up",
            "progress_percentage": percent,
        })
    };
    let response = router(&harness)
        .oneshot(request(Method::POST, "/project-updates", Some(&token), Some(update(50))))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router(&harness)
        .oneshot(request(Method::POST, "/project-updates", Some(&token), Some(update(20))))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router(&harness)
        .oneshot(request(
            Method::GET,
            &format!("/projects/{}", project.id.0),
            Some(&token),
            None,
        ))
        .await
        .expect("response");
    let body = read_json_body(response).await;
    assert_eq!(body["percent_complete"], 50);
}

#[tokio::test]
async fn anonymous_property_view_is_the_public_projection() {
    let harness = Harness::new();
    let owner = harness.owner("Olive Owner");
    let property = harness.property(Some(&owner), &[]);
    let owner_token = harness.session(&owner);
    let uri = format!("/properties/{}", property.id.0);

    let response = router(&harness)
        .oneshot(request(Method::GET, &uri, None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let public = read_json_body(response).await;
    assert_eq!(public["visibility"], "public");
    assert!(public.get("owner_id").is_none());
    assert!(public.get("assessed_value").is_none());

    let response = router(&harness)
        .oneshot(request(Method::GET, &uri, Some(&owner_token), None))
        .await
        .expect("response");
    let full = read_json_body(response).await;
    assert_eq!(full["visibility"], "full");
    assert_eq!(full["owner_id"], owner.id.0);
}

#[tokio::test]
async fn roll_upload_imports_csv_rows() {
    let harness = Harness::new();
    let admin = harness.admin("Ada Admin", false);
    let token = harness.session(&admin);
    let csv = "Address,City,State,Zip,Owner Name,Year Built,Zoning,Square Feet,Utilities,Assessed Value\n\
               410 Court St NE,Salem,or,97301,Maria Alvarez,1948,RS,1210,water;sewer,\"$298,000\"\n";

    let upload = |body: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/admin/property-roll")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    };

    let response = router(&harness).oneshot(upload(csv)).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["imported"], 1);
    assert_eq!(body["properties"][0]["state"], "OR");
    assert_eq!(body["properties"][0]["assessed_value"], 298_000);

    let broken = "Address,City,State,Zip,Utilities\n1 Elm St,Salem,OR,97301,propane\n";
    let response = router(&harness).oneshot(upload(broken)).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let platform = Arc::new(HomefaxPlatform::new(
        Arc::new(UnavailableStore),
        Arc::new(FixedClock::new(day_zero())),
        PlatformSettings::default(),
    ));

    let response = platform_router(platform)
        .oneshot(request(Method::GET, "/properties/1", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|text| text.contains("database offline")));
}
