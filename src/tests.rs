//! End-to-end flows through the full router, backed by the in-memory store.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::FromRef,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::{build_app, route_table},
    auth::{
        claims::Role,
        jwt::JwtKeys,
        policy::{Access, Verb, ADMIN, STUDENT},
        repo::{AuditRepo, UserRepo},
        repo_types::{Activity, AuditLogEntry, FailedLoginEntry, NewUser, ProfileUpdate, User},
    },
    config::AppConfig,
    courses::{
        repo::{CourseRepo, EnrollmentRepo},
        repo_types::{Course, Enrollment, EnrollmentUpdate, EnrollmentWithCourse, NewCourse},
    },
    state::AppState,
    store::{MemoryStore, Store},
};

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::from_state(AppState::fake())
    }

    fn with_store(store: Arc<dyn Store>) -> Self {
        Self::from_state(AppState::from_parts(Arc::new(AppConfig::for_tests()), store))
    }

    fn from_state(state: AppState) -> Self {
        let router = build_app(state.clone());
        Self { state, router }
    }

    async fn user_id(&self, email: &str) -> Uuid {
        self.state
            .store
            .find_user_by_email(email)
            .await
            .unwrap()
            .expect("user exists")
            .id
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.expect("router is infallible");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("read body");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .expect("valid request");
        self.send(req).await
    }

    async fn signup(&self, name: &str, email: &str, role: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/signup",
                None,
                Some(json!({"name": name, "email": email, "password": "secret1", "role": role})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().expect("token").to_string()
    }

    async fn create_course(&self, token: &str, course_id: &str) {
        let (status, body) = self
            .call(
                "POST",
                "/api/courses",
                Some(token),
                Some(json!({
                    "course_id": course_id,
                    "title": "Intro to CS",
                    "category": "Computer Science",
                    "difficulty_level": "Beginner",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    fn current_code(&self, email: &str, secret: &str) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        self.state.authenticator().code_at(secret, email, now)
    }

    async fn mfa_secret(&self, email: &str) -> String {
        self.state
            .store
            .find_user_by_email(email)
            .await
            .unwrap()
            .and_then(|u| u.mfa_secret)
            .expect("secret stored")
    }
}

fn login_body(email: &str, password: &str) -> Option<Value> {
    Some(json!({"email": email, "password": password}))
}

#[tokio::test]
async fn signup_then_login_returns_token_for_same_role() {
    let app = TestApp::new();
    app.signup("Ann", "ann@x.com", "student").await;

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ann@x.com", "secret1"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "student");

    let keys = JwtKeys::from_ref(&app.state);
    let claims = keys.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.role, Role::Student);
}

#[tokio::test]
async fn login_email_is_case_insensitive() {
    let app = TestApp::new();
    app.signup("Ann", "ann@x.com", "student").await;
    let (status, _) = app
        .call("POST", "/api/auth/login", None, login_body(" ANN@x.com ", "secret1"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_is_recorded_once_with_forwarded_ip() {
    let app = TestApp::new();
    app.signup("Ann", "ann@x.com", "student").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(Body::from(
            json!({"email": "ann@x.com", "password": "wrong-pass"}).to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, rows) = app
        .call("GET", "/api/auth/failed-logins", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["email"], "ann@x.com");
    assert_eq!(rows[0]["ipAddress"], "203.0.113.9");
}

#[tokio::test]
async fn unknown_email_fails_like_wrong_password() {
    let app = TestApp::new();
    let admin = app.signup("Root", "root@x.com", "admin").await;

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ghost@x.com", "secret1"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (_, rows) = app
        .call("GET", "/api/auth/failed-logins", Some(&admin), None)
        .await;
    assert_eq!(rows[0]["email"], "ghost@x.com");
    assert_eq!(rows[0]["ipAddress"], "unknown");
}

#[tokio::test]
async fn malformed_login_is_a_validation_error_and_not_recorded() {
    let app = TestApp::new();
    let admin = app.signup("Root", "root@x.com", "admin").await;

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("not-an-email", ""))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());

    let (_, rows) = app
        .call("GET", "/api/auth/failed-logins", Some(&admin), None)
        .await;
    assert!(rows.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn signup_validation_and_duplicates() {
    let app = TestApp::new();
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({"name": "Ann", "email": "ann@x.com", "password": "123", "role": "guest"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["password"].is_array());
    assert!(body["errors"]["role"].is_array());

    app.signup("Ann", "ann@x.com", "student").await;
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({"name": "Other", "email": "ANN@x.com", "password": "secret1", "role": "student"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test]
async fn enrollment_is_admitted_once() {
    let app = TestApp::new();
    let prof = app.signup("Prof", "prof@x.com", "instructor").await;
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    app.create_course(&prof, "CS101").await;

    let (status, body) = app
        .call("POST", "/api/courses/CS101/enroll", Some(&ann), None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["message"].as_str().unwrap().contains("CS101"));

    let (status, body) = app
        .call("POST", "/api/courses/CS101/enroll", Some(&ann), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Already enrolled in this course");

    let (status, list) = app
        .call("GET", "/api/courses/enrollments/test", Some(&ann), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    let for_cs101: Vec<_> = list.iter().filter(|e| e["course_id"] == "CS101").collect();
    assert_eq!(for_cs101.len(), 1);
    assert_eq!(for_cs101[0]["status"], "active");
    assert_eq!(for_cs101[0]["course"]["title"], "Intro to CS");
}

#[tokio::test]
async fn enrolling_in_unknown_course_is_not_found() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    let (status, body) = app
        .call("POST", "/api/courses/NOPE/enroll", Some(&ann), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Course not found");
}

#[tokio::test]
async fn guard_rejects_missing_invalid_and_orphaned_tokens() {
    let app = TestApp::new();
    let prof = app.signup("Prof", "prof@x.com", "instructor").await;
    app.create_course(&prof, "CS101").await;

    let (status, _) = app.call("POST", "/api/courses/CS101/enroll", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call("POST", "/api/courses/CS101/enroll", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let orphan = JwtKeys::from_ref(&app.state)
        .sign(Uuid::new_v4(), Role::Student)
        .unwrap();
    let (status, _) = app
        .call("POST", "/api/courses/CS101/enroll", Some(&orphan), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid identity, wrong role.
    let (status, body) = app
        .call("POST", "/api/courses/CS101/enroll", Some(&prof), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You do not have permission to access this resource");
}

#[tokio::test]
async fn admin_endpoints_are_admin_only() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    for path in ["/api/auth/audit-logs", "/api/auth/failed-logins", "/api/auth/mfa-statuses"] {
        let (status, _) = app.call("GET", path, Some(&ann), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        let (status, _) = app.call("GET", path, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn mfa_flow_withholds_token_until_otp() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;

    let (status, body) = app
        .call("POST", "/api/auth/enable-mfa", Some(&ann), Some(json!({"email": "ann@x.com"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let qr = body["qrCode"].as_str().unwrap();
    assert!(qr.starts_with("otpauth://totp/"));
    assert!(qr.contains("ann@x.com"));

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ann@x.com", "secret1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"mfaEnabled": true}));

    let secret = app.mfa_secret("ann@x.com").await;
    let code = app.current_code("ann@x.com", &secret);

    let mut wrong = code.clone().into_bytes();
    wrong[5] = b'0' + (wrong[5] - b'0' + 1) % 10;
    let wrong = String::from_utf8(wrong).unwrap();
    let (status, body) = app
        .call("POST", "/api/auth/verify-otp", None, Some(json!({"email": "ann@x.com", "otp": wrong})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid OTP");

    let (status, body) = app
        .call("POST", "/api/auth/verify-otp", None, Some(json!({"email": "ann@x.com", "otp": code})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "student");
    let token = body["token"].as_str().unwrap().to_string();

    // Same code a second time inside its window.
    let (status, _) = app
        .call("POST", "/api/auth/verify-otp", None, Some(json!({"email": "ann@x.com", "otp": code})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ann@x.com");
    assert_eq!(me["mfaEnabled"], true);
}

#[tokio::test]
async fn verify_otp_without_mfa_is_rejected() {
    let app = TestApp::new();
    app.signup("Ann", "ann@x.com", "student").await;
    for email in ["ann@x.com", "ghost@x.com"] {
        let (status, body) = app
            .call("POST", "/api/auth/verify-otp", None, Some(json!({"email": email, "otp": "123456"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "MFA not enabled");
    }
}

#[tokio::test]
async fn enable_mfa_for_others_requires_admin() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    app.signup("Bob", "bob@x.com", "student").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;

    let (status, _) = app
        .call("POST", "/api/auth/enable-mfa", Some(&ann), Some(json!({"email": "bob@x.com"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("POST", "/api/auth/enable-mfa", Some(&admin), Some(json!({"email": "bob@x.com"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["qrCode"].as_str().unwrap().contains("bob@x.com"));

    let (status, body) = app
        .call("POST", "/api/auth/enable-mfa", Some(&admin), Some(json!({"email": "ghost@x.com"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User not found");

    let (_, statuses) = app
        .call("GET", "/api/auth/mfa-statuses", Some(&admin), None)
        .await;
    let enabled: HashSet<&str> = statuses
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["mfaEnabled"] == true)
        .map(|s| s["email"].as_str().unwrap())
        .collect();
    assert_eq!(enabled, HashSet::from(["bob@x.com"]));
}

#[tokio::test]
async fn audit_log_is_newest_first() {
    let app = TestApp::new();
    app.signup("Ann", "ann@x.com", "student").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;
    app.call("POST", "/api/auth/login", None, login_body("ann@x.com", "secret1"))
        .await;

    let (status, logs) = app
        .call("GET", "/api/auth/audit-logs", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["activity"], "login");
    assert_eq!(logs[0]["userEmail"], "ann@x.com");

    let stamps: Vec<OffsetDateTime> = logs
        .iter()
        .map(|l| {
            OffsetDateTime::parse(
                l["timestamp"].as_str().unwrap(),
                &time::format_description::well_known::Rfc3339,
            )
            .unwrap()
        })
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn lesson_progress_and_enrollment_updates() {
    let app = TestApp::new();
    let prof = app.signup("Prof", "prof@x.com", "instructor").await;
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    app.create_course(&prof, "CS101").await;

    let (status, _) = app
        .call("POST", "/api/courses/CS101/lessons/intro/complete", Some(&ann), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.call("POST", "/api/courses/CS101/enroll", Some(&ann), None).await;
    for _ in 0..2 {
        let (status, body) = app
            .call("POST", "/api/courses/CS101/lessons/intro/complete", Some(&ann), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"].as_array().unwrap().len(), 1);
    }

    let (status, body) = app
        .call(
            "PUT",
            "/api/courses/CS101/enrollment",
            Some(&ann),
            Some(json!({"status": "completed", "rating": 5, "feedback": "Loved it"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["rating"], 5);

    let (status, _) = app
        .call("PUT", "/api/courses/CS101/enrollment", Some(&ann), Some(json!({"rating": 9})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn courses_are_public_to_read_and_staff_to_write() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    let prof = app.signup("Prof", "prof@x.com", "instructor").await;

    let (status, _) = app
        .call(
            "POST",
            "/api/courses",
            Some(&ann),
            Some(json!({"course_id": "X", "title": "t", "category": "c", "difficulty_level": "Beginner"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.create_course(&prof, "CS101").await;
    let (status, body) = app
        .call(
            "POST",
            "/api/courses",
            Some(&prof),
            Some(json!({"course_id": "CS101", "title": "t", "category": "c", "difficulty_level": "Beginner"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, course) = app.call("GET", "/api/courses/CS101", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(course["created_by"], "prof@x.com");

    let (status, _) = app.call("GET", "/api/courses/NOPE", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, all) = app.call("GET", "/api/courses", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[test]
fn route_table_declares_each_route_once_with_expected_access() {
    let table = route_table();
    let mut seen = HashSet::new();
    for route in &table {
        assert!(seen.insert((route.verb, route.path)), "duplicate {:?} {}", route.verb, route.path);
    }

    let access = |verb: Verb, path: &str| {
        table
            .iter()
            .find(|s| s.verb == verb && s.path == path)
            .map(|s| s.access)
            .unwrap_or_else(|| panic!("{verb:?} {path} not declared"))
    };
    assert_eq!(access(Verb::Post, "/auth/signup"), Access::Public);
    assert_eq!(access(Verb::Post, "/auth/login"), Access::Public);
    assert_eq!(access(Verb::Post, "/auth/verify-otp"), Access::Public);
    assert_eq!(access(Verb::Get, "/auth/audit-logs"), ADMIN);
    assert_eq!(access(Verb::Get, "/auth/failed-logins"), ADMIN);
    assert_eq!(access(Verb::Post, "/courses/:course_id/enroll"), STUDENT);
    assert_eq!(access(Verb::Get, "/courses/enrollments/test"), Access::Authenticated);
    assert_eq!(access(Verb::Get, "/users"), ADMIN);
    assert_eq!(access(Verb::Get, "/users/search"), ADMIN);
    assert_eq!(access(Verb::Put, "/users/:user_id"), Access::Authenticated);
    assert_eq!(access(Verb::Delete, "/users/:user_id"), ADMIN);
}

#[tokio::test]
async fn wrong_typed_field_gets_the_validation_body() {
    let app = TestApp::new();
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({"name": 5, "email": "ann@x.com", "password": "secret1", "role": "student"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "Validation failed");
    assert!(body["errors"]["name"][0].as_str().unwrap().contains("invalid type"));
}

#[tokio::test]
async fn unparsable_body_gets_the_validation_body() {
    let app = TestApp::new();
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");
    assert!(body["errors"]["body"].is_array());

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .body(Body::from(r#"{"email":"ann@x.com","password":"secret1"}"#))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["body"].is_array());
}

#[tokio::test]
async fn numeric_otp_is_verified() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    app.call("POST", "/api/auth/enable-mfa", Some(&ann), Some(json!({"email": "ann@x.com"})))
        .await;

    let secret = app.mfa_secret("ann@x.com").await;
    let code: u64 = app.current_code("ann@x.com", &secret).parse().unwrap();
    let (status, body) = app
        .call("POST", "/api/auth/verify-otp", None, Some(json!({"email": "ann@x.com", "otp": code})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "student");
}

#[tokio::test]
async fn deleted_user_loses_access_and_enrollments() {
    let app = TestApp::new();
    let prof = app.signup("Prof", "prof@x.com", "instructor").await;
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;
    app.create_course(&prof, "CS101").await;
    app.call("POST", "/api/courses/CS101/enroll", Some(&ann), None).await;
    let ann_id = app.user_id("ann@x.com").await;

    let (status, _) = app.call("GET", "/api/auth/me", Some(&ann), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/users/{ann_id}");
    let (status, _) = app.call("DELETE", &uri, Some(&prof), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.call("GET", "/api/auth/me", Some(&ann), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Login first to access this!");
    assert!(app.state.store.list_enrollments(ann_id).await.unwrap().is_empty());

    let (status, _) = app.call("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = app.call("GET", "/api/auth/audit-logs", Some(&admin), None).await;
    assert_eq!(logs[0]["activity"], "user_deleted");
    assert_eq!(logs[0]["userEmail"], "ann@x.com");
}

#[tokio::test]
async fn profile_is_updated_by_owner_or_admin_only() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    let bob = app.signup("Bob", "bob@x.com", "student").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;
    let uri = format!("/api/users/{}", app.user_id("ann@x.com").await);

    let (status, body) = app
        .call("PUT", &uri, Some(&ann), Some(json!({"name": "Ann Lee"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "Ann Lee");
    assert_eq!(body["email"], "ann@x.com");

    let (status, _) = app
        .call("PUT", &uri, Some(&bob), Some(json!({"name": "Hacked"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("PUT", &uri, Some(&admin), Some(json!({"profile_picture_url": "not a url"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["profile_picture_url"].is_array());

    let (status, body) = app.call("GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ann Lee");

    let (status, body) = app.call("GET", "/api/users/not-a-uuid", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User with ID not-a-uuid not found.");
}

#[tokio::test]
async fn admin_lists_and_searches_users() {
    let app = TestApp::new();
    let ann = app.signup("Ann", "ann@x.com", "student").await;
    app.signup("Bob", "bob@y.org", "instructor").await;
    let admin = app.signup("Root", "root@x.com", "admin").await;

    let (status, all) = app.call("GET", "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);
    assert!(all[0].get("password_hash").is_none());

    let (status, hits) = app
        .call("GET", "/api/users/search?q=Y.ORG", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["email"], "bob@y.org");

    let (status, _) = app.call("GET", "/api/users/search?q=a", Some(&ann), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

/// In-memory store whose audit and failed-login writes always fail.
struct FailingAuditLog(MemoryStore);

#[async_trait]
impl UserRepo for FailingAuditLog {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.0.find_user_by_email(email).await
    }
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        self.0.find_user_by_id(id).await
    }
    async fn create_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        self.0.create_user(new).await
    }
    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        self.0.list_users().await
    }
    async fn search_users(&self, query: &str) -> anyhow::Result<Vec<User>> {
        self.0.search_users(query).await
    }
    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> anyhow::Result<Option<User>> {
        self.0.update_profile(id, update).await
    }
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        self.0.delete_user(id).await
    }
    async fn set_mfa_secret(&self, id: Uuid, secret: &str) -> anyhow::Result<()> {
        self.0.set_mfa_secret(id, secret).await
    }
    async fn consume_otp_step(&self, id: Uuid, step: i64) -> anyhow::Result<bool> {
        self.0.consume_otp_step(id, step).await
    }
}

#[async_trait]
impl AuditRepo for FailingAuditLog {
    async fn record_audit(&self, _: &str, _: Activity) -> anyhow::Result<()> {
        anyhow::bail!("audit table unavailable")
    }
    async fn record_failed_login(&self, _: &str, _: &str) -> anyhow::Result<()> {
        anyhow::bail!("failed_logins table unavailable")
    }
    async fn list_audit_logs(&self) -> anyhow::Result<Vec<AuditLogEntry>> {
        self.0.list_audit_logs().await
    }
    async fn list_failed_logins(&self) -> anyhow::Result<Vec<FailedLoginEntry>> {
        self.0.list_failed_logins().await
    }
}

#[async_trait]
impl CourseRepo for FailingAuditLog {
    async fn find_course(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        self.0.find_course(course_id).await
    }
    async fn create_course(&self, new: NewCourse) -> anyhow::Result<Option<Course>> {
        self.0.create_course(new).await
    }
    async fn list_courses(&self) -> anyhow::Result<Vec<Course>> {
        self.0.list_courses().await
    }
}

#[async_trait]
impl EnrollmentRepo for FailingAuditLog {
    async fn insert_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        self.0.insert_enrollment(user_id, course_id).await
    }
    async fn list_enrollments(&self, user_id: Uuid) -> anyhow::Result<Vec<EnrollmentWithCourse>> {
        self.0.list_enrollments(user_id).await
    }
    async fn complete_lesson(
        &self,
        user_id: Uuid,
        course_id: &str,
        lesson_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        self.0.complete_lesson(user_id, course_id, lesson_id).await
    }
    async fn update_enrollment(
        &self,
        user_id: Uuid,
        course_id: &str,
        update: EnrollmentUpdate,
    ) -> anyhow::Result<Option<Enrollment>> {
        self.0.update_enrollment(user_id, course_id, update).await
    }
}

#[tokio::test]
async fn audit_outage_does_not_change_auth_outcomes() {
    let app = TestApp::with_store(Arc::new(FailingAuditLog(MemoryStore::new())));
    let ann = app.signup("Ann", "ann@x.com", "student").await;

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ann@x.com", "secret1"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["token"].is_string());

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ann@x.com", "wrong-pass"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, body) = app
        .call("POST", "/api/auth/enable-mfa", Some(&ann), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .call("POST", "/api/auth/login", None, login_body("ann@x.com", "secret1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"mfaEnabled": true}));
}
