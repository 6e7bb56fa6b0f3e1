/// Integration tests for the TravelPanel API
///
/// These run the full router (middleware included) over the in-memory
/// store:
/// - Access request review and code-gated signup
/// - Code rejection statuses and remedies
/// - Admin key and JWT authentication
/// - Tenant isolation of agency data
/// - Rate limiting and the admin SSE stream

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{code_check_from, read_json, TestContext, PASSWORD};
use serde_json::json;
use travelpanel_shared::auth::jwt::issue_token_pair;
use travelpanel_shared::models::user::UserRole;
use travelpanel_shared::store::Store;
use uuid::Uuid;

fn access_token(signup: &serde_json::Value) -> String {
    signup["tokens"]["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new();
    let response = ctx
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "connected");
}

#[tokio::test]
async fn test_onboarding_flow() {
    let ctx = TestContext::new();

    // Applicant submits
    let (status, submitted) = ctx
        .post_json(
            "/v1/access-requests",
            json!({
                "agencyName": "Acme Travel",
                "contactEmail": "Owner@Acme.com",
                "groupType": "school"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submitted["status"], "pending");
    let id = submitted["id"].as_str().unwrap().to_string();

    // Admin sees it in the pending queue and approves
    let (status, pending) = ctx
        .admin("GET", "/v1/admin/access-requests?status=pending", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, approved) = ctx
        .admin("POST", &format!("/v1/admin/access-requests/{id}/approve"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["approvedBy"], "ops@travelpanel.test");
    let code = approved["approvalCode"].as_str().unwrap().to_string();
    let link = approved["signupLink"].as_str().unwrap();
    assert!(link.starts_with("https://app.travelpanel.test/signup?code="));
    assert!(link.contains(&code));

    // Applicant checks the code, then signs up
    let (status, check) = ctx
        .post_json(
            "/v1/access-requests/validate",
            json!({ "code": code.to_lowercase(), "email": "owner@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["valid"], true);
    assert_eq!(check["agencyName"], "Acme Travel");

    let (status, signup) = ctx
        .post_json(
            "/v1/signup",
            json!({
                "code": code,
                "email": "owner@acme.com",
                "password": PASSWORD,
                "name": "Ada Owner"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{signup}");
    assert_eq!(signup["agency"]["name"], "Acme Travel");
    assert_eq!(signup["agency"]["betaAccess"], true);
    assert_eq!(signup["user"]["role"], "admin");

    // The request now records the redemption
    let (_, detail) = ctx
        .admin("GET", &format!("/v1/admin/access-requests/{id}"), None)
        .await;
    assert_eq!(detail["codeUsed"], true);
    assert_eq!(detail["agencyId"], signup["agency"]["id"]);

    // Login and refresh
    let (status, login) = ctx
        .post_json(
            "/v1/auth/login",
            json!({ "email": "owner@acme.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{login}");
    assert_eq!(login["user"]["id"], signup["user"]["id"]);

    let (status, refreshed) = ctx
        .post_json(
            "/v1/auth/refresh",
            json!({ "refreshToken": login["tokens"]["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["accessToken"].is_string());

    let token = refreshed["accessToken"].as_str().unwrap();
    let (status, agency) = ctx.authed("GET", "/v1/agency", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agency["id"], signup["agency"]["id"]);
}

#[tokio::test]
async fn test_code_rejections_carry_status_and_remedy() {
    let ctx = TestContext::new();
    let (_, code) = ctx.approved_request("Acme Travel", "a@acme.com").await;

    let signup = |code: &str, email: &str| {
        json!({ "code": code, "email": email, "password": PASSWORD })
    };

    let (status, body) = ctx.post_json("/v1/signup", signup("", "a@acme.com")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "CODE_MISSING");
    assert_eq!(body["remedy"], "enter_code");

    let (status, body) = ctx
        .post_json("/v1/signup", signup("TP-0OI1XX", "a@acme.com"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "CODE_INVALID");
    assert_eq!(body["remedy"], "request_new_access");

    let (status, body) = ctx
        .post_json("/v1/signup", signup(&code, "wrong@acme.com"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "EMAIL_MISMATCH");
    assert_eq!(body["remedy"], "contact_support");

    let (status, _) = ctx.post_json("/v1/signup", signup(&code, "a@acme.com")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx.post_json("/v1/signup", signup(&code, "a@acme.com")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CODE_USED");

    // The validate endpoint reports the same outcome without failing
    let (status, body) = ctx
        .post_json(
            "/v1/access-requests/validate",
            json!({ "code": code, "email": "a@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "CODE_USED");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_weak_password_is_unprocessable() {
    let ctx = TestContext::new();
    let (_, code) = ctx.approved_request("Acme Travel", "a@acme.com").await;

    let (status, body) = ctx
        .post_json(
            "/v1/signup",
            json!({ "code": code, "email": "a@acme.com", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "password");
}

#[tokio::test]
async fn test_rejected_request_cannot_sign_up() {
    let ctx = TestContext::new();
    let (_, submitted) = ctx
        .post_json(
            "/v1/access-requests",
            json!({ "agencyName": "Acme Travel", "contactEmail": "a@acme.com" }),
        )
        .await;
    let id = submitted["id"].as_str().unwrap();

    let (status, rejected) = ctx
        .admin(
            "POST",
            &format!("/v1/admin/access-requests/{id}/reject"),
            Some(json!({ "notes": "insufficient info" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejectionNotes"], "insufficient info");
    assert!(rejected["approvalCode"].is_null());

    // Terminal
    let (status, body) = ctx
        .admin("POST", &format!("/v1/admin/access-requests/{id}/approve"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_submission() {
    let ctx = TestContext::new();
    let (status, body) = ctx
        .post_json(
            "/v1/access-requests",
            json!({ "agencyName": "  ", "contactEmail": "not-an-email" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_admin_key_required() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            Request::get("/v1/admin/access-requests")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ctx
        .send(
            Request::get("/v1/admin/access-requests")
                .header("X-Admin-Key", "not-the-admin-key-but-just-as-long!")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .admin("GET", "/v1/admin/access-requests?status=archived", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_revokes_beta_access() {
    let ctx = TestContext::new();
    let (id, code) = ctx.approved_request("Acme Travel", "a@acme.com").await;

    // Not redeemed yet
    let (status, _) = ctx
        .admin(
            "POST",
            &format!("/v1/admin/access-requests/{id}/cancel"),
            Some(json!({ "agencyId": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, signup) = ctx
        .post_json(
            "/v1/signup",
            json!({ "code": code, "email": "a@acme.com", "password": PASSWORD }),
        )
        .await;
    let agency_id = signup["agency"]["id"].as_str().unwrap().to_string();

    // Wrong agency
    let (status, _) = ctx
        .admin(
            "POST",
            &format!("/v1/admin/access-requests/{id}/cancel"),
            Some(json!({ "agencyId": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = ctx
        .admin(
            "POST",
            &format!("/v1/admin/access-requests/{id}/cancel"),
            Some(json!({ "agencyId": agency_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let agency = ctx
        .store
        .find_agency(agency_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!agency.beta_access);
}

#[tokio::test]
async fn test_login_failures() {
    let ctx = TestContext::new();
    ctx.onboard("Acme Travel", "a@acme.com").await;

    let (status, _) = ctx
        .post_json(
            "/v1/auth/login",
            json!({ "email": "a@acme.com", "password": "Wrong!pass1" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .post_json(
            "/v1/auth/login",
            json!({ "email": "nobody@acme.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let ctx = TestContext::new();
    let signup = ctx.onboard("Acme Travel", "a@acme.com").await;

    let (status, _) = ctx
        .post_json(
            "/v1/auth/refresh",
            json!({ "refreshToken": access_token(&signup) }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tenant_routes_require_token() {
    let ctx = TestContext::new();
    let response = ctx
        .send(
            Request::get("/v1/collections/families")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .authed("GET", "/v1/collections/families", "not.a.jwt", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_agencies_cannot_see_each_other() {
    let ctx = TestContext::new();
    let acme = ctx.onboard("Acme Travel", "a@acme.com").await;
    let globe = ctx.onboard("Globe Tours", "b@globe.com").await;
    let acme_token = access_token(&acme);
    let globe_token = access_token(&globe);

    let (status, family) = ctx
        .authed(
            "POST",
            "/v1/collections/families",
            &acme_token,
            Some(json!({ "lastName": "Okafor", "travelers": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(family["agencyId"], acme["agency"]["id"]);
    let family_uri = format!("/v1/collections/families/{}", family["id"].as_str().unwrap());

    // Globe gets 404 for Acme's document, same as for a missing one
    let (status, _) = ctx.authed("GET", &family_uri, &globe_token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = ctx
        .authed("PUT", &family_uri, &globe_token, Some(json!({ "lastName": "X" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = ctx.authed("DELETE", &family_uri, &globe_token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = ctx
        .authed("GET", "/v1/collections/families", &globe_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());

    // Writing into another agency is refused
    let (status, _) = ctx
        .authed(
            "POST",
            "/v1/collections/families",
            &globe_token,
            Some(json!({ "lastName": "Okafor", "agencyId": acme["agency"]["id"] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Filtering on another agency is refused too
    let uri = format!(
        "/v1/collections/families?agencyId={}",
        acme["agency"]["id"].as_str().unwrap()
    );
    let (status, _) = ctx.authed("GET", &uri, &globe_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Acme still sees, filters and deletes its own
    let (_, filtered) = ctx
        .authed(
            "GET",
            "/v1/collections/families?travelers=gte:3",
            &acme_token,
            None,
        )
        .await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let (status, _) = ctx.authed("DELETE", &family_uri, &acme_token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_groups_get_join_codes() {
    let ctx = TestContext::new();
    let acme = ctx.onboard("Acme Travel", "a@acme.com").await;

    let (status, group) = ctx
        .authed(
            "POST",
            "/v1/collections/groups",
            &access_token(&acme),
            Some(json!({ "name": "Lisbon 2027" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(group["data"]["groupCode"].as_str().unwrap().starts_with("GRP-"));

    let (status, _) = ctx
        .authed("GET", "/v1/collections/bookings", &access_token(&acme), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_branding_requires_agency_admin() {
    let ctx = TestContext::new();
    let acme = ctx.onboard("Acme Travel", "a@acme.com").await;
    let branding = json!({ "primaryColor": "#1a73e8", "portalName": "Acme Trips" });

    let (status, agency) = ctx
        .authed(
            "PUT",
            "/v1/agency/branding",
            &access_token(&acme),
            Some(branding.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agency["branding"]["portalName"], "Acme Trips");

    let member = issue_token_pair(
        Uuid::new_v4(),
        acme["agency"]["id"].as_str().unwrap().parse().unwrap(),
        UserRole::Member,
        &common::test_config(100).jwt.secret,
    )
    .unwrap();
    let (status, _) = ctx
        .authed("PUT", "/v1/agency/branding", &member.access_token, Some(branding))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_code_checks_are_rate_limited() {
    let ctx = TestContext::with_rate_limit(2);

    for _ in 0..2 {
        let response = ctx.send(code_check_from("203.0.113.9:40000", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let response = ctx.send(code_check_from("203.0.113.9:40001", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Other peers are unaffected
    let response = ctx.send(code_check_from("198.51.100.4:40000", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_bypass_limit() {
    let ctx = TestContext::with_rate_limit(2);

    let mut limited = 0;
    for i in 0..50 {
        let forwarded = format!("10.{}.{}.1", i / 256, i % 256);
        let response = ctx
            .send(code_check_from("203.0.113.9:40000", Some(&forwarded)))
            .await;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 48);
}

#[tokio::test]
async fn test_forwarded_for_keys_clients_behind_trusted_proxy() {
    let mut config = common::test_config(2);
    config.rate_limit.trust_proxy = true;
    let ctx = TestContext::with_config(config);

    for _ in 0..2 {
        let response = ctx
            .send(code_check_from("10.0.0.1:443", Some("203.0.113.9")))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = ctx
        .send(code_check_from("10.0.0.1:443", Some("203.0.113.9")))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Same proxy, different forwarded client
    let response = ctx
        .send(code_check_from("10.0.0.1:443", Some("198.51.100.4")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_code_lookup_outage_asks_for_retry() {
    let ctx = TestContext::with_code_lookup_outage();

    let (status, body) = ctx
        .post_json(
            "/v1/access-requests/validate",
            json!({ "code": "TP-AAAAAA", "email": "a@acme.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["remedy"], "retry");

    let (status, body) = ctx
        .post_json(
            "/v1/signup",
            json!({ "code": "TP-AAAAAA", "email": "a@acme.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["remedy"], "retry");
    assert!(ctx
        .store
        .find_identity_by_email("a@acme.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_admin_stream_is_event_stream() {
    let ctx = TestContext::new();
    let response = ctx
        .send(
            Request::get("/v1/admin/access-requests/stream")
                .header("X-Admin-Key", common::ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
}
