//! 认证流程集成测试：内存存储 + 手动时钟

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use authgate::auth::effective_settings::{
    KEY_ACCESS_LIFETIME_SECONDS, KEY_IDLE_TIMEOUT_SECONDS, KEY_ROTATE_REFRESH_TOKENS,
};
use authgate::auth::password::hash_password_with_cost;
use authgate::auth::{
    AuthFailure, AuthOutcome, BootEpoch, Clock, Denylist, ManualClock, MokaDenylist, Principal,
    RejectReason, SettingsUpdate, TokenType,
};
use authgate::config::AuthConfig;
use authgate::http::build_router;
use authgate::repository::{InMemorySettingsStore, InMemoryUserStore, SettingsStore};
use authgate::{AuthServices, ServerError};

const START: i64 = 1_700_000_000;
const SERVICE_KEY: &str = "test-service-key";

struct Harness {
    clock: Arc<ManualClock>,
    epoch: Arc<AtomicI64>,
    users: Arc<InMemoryUserStore>,
    settings_store: Arc<InMemorySettingsStore>,
    services: AuthServices,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    fn with_config(config: AuthConfig) -> Self {
        Self::with_denylist(config, |clock| Arc::new(MokaDenylist::new(10_000, clock)))
    }

    fn with_denylist(config: AuthConfig, denylist: impl FnOnce(Arc<dyn Clock>) -> Arc<dyn Denylist>) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let epoch = Arc::new(AtomicI64::new(7));
        let users = Arc::new(InMemoryUserStore::new());
        let settings_store = Arc::new(InMemorySettingsStore::new());
        let denylist = denylist(dyn_clock.clone());

        users.insert(Principal::new(42, "alice"), hash_password_with_cost("pw-alice", 4).unwrap());

        let services = AuthServices::build(
            &config,
            dyn_clock,
            Arc::new(BootEpoch::shared(epoch.clone())),
            users.clone(),
            settings_store.clone(),
            denylist,
        );

        Self {
            clock,
            epoch,
            users,
            settings_store,
            services,
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    async fn authenticate(&self, token: &str) -> AuthOutcome {
        self.services
            .gateway
            .authenticate(Some(&Self::bearer(token)))
            .await
            .unwrap()
    }
}

/// 每次访问前让出调度，放大并发兑换的交错窗口
struct YieldingDenylist(MokaDenylist);

#[async_trait]
impl Denylist for YieldingDenylist {
    async fn revoke(&self, jti: &str, expires_at: i64) -> authgate::Result<()> {
        tokio::task::yield_now().await;
        self.0.revoke(jti, expires_at).await
    }

    async fn is_revoked(&self, jti: &str) -> authgate::Result<bool> {
        tokio::task::yield_now().await;
        self.0.is_revoked(jti).await
    }

    async fn try_revoke(&self, jti: &str, expires_at: i64) -> authgate::Result<bool> {
        tokio::task::yield_now().await;
        self.0.try_revoke(jti, expires_at).await
    }
}

/// 后端始终不可用的撤销列表
struct OfflineDenylist;

impl OfflineDenylist {
    fn offline() -> ServerError {
        ServerError::DenylistUnavailable("denylist backend offline".to_string())
    }
}

#[async_trait]
impl Denylist for OfflineDenylist {
    async fn revoke(&self, _jti: &str, _expires_at: i64) -> authgate::Result<()> {
        Err(Self::offline())
    }

    async fn is_revoked(&self, _jti: &str) -> authgate::Result<bool> {
        Err(Self::offline())
    }

    async fn try_revoke(&self, _jti: &str, _expires_at: i64) -> authgate::Result<bool> {
        Err(Self::offline())
    }
}

fn assert_rejected(outcome: AuthOutcome, expected: RejectReason) {
    match outcome {
        AuthOutcome::Rejected(reason) => assert_eq!(reason, expected),
        other => panic!("expected rejection {:?}, got {:?}", expected, other),
    }
}

#[tokio::test]
async fn test_valid_token_authenticates_principal() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    match h.authenticate(&pair.access).await {
        AuthOutcome::Authenticated(session) => {
            assert_eq!(session.principal.id, 42);
            assert_eq!(session.seconds_to_expiry, 300);
            assert!(!session.near_expiry);
        }
        other => panic!("expected authenticated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_or_malformed_header_is_unauthenticated() {
    let h = Harness::new();
    let gateway = &h.services.gateway;
    assert!(matches!(gateway.authenticate(None).await.unwrap(), AuthOutcome::Unauthenticated));
    assert!(matches!(
        gateway.authenticate(Some("Token abc")).await.unwrap(),
        AuthOutcome::Unauthenticated
    ));
    assert_rejected(
        gateway.authenticate(Some("Bearer not-a-jwt")).await.unwrap(),
        RejectReason::AuthFailed(AuthFailure::TokenInvalid),
    );
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_uniformly() {
    let h = Harness::new();
    let issue = &h.services.token_issue_service;

    let wrong_password = issue.login("alice", "nope").await.unwrap_err();
    let unknown_user = issue.login("mallory", "pw-alice").await.unwrap_err();
    assert_eq!(wrong_password.public_message(), unknown_user.public_message());
    assert!(matches!(wrong_password, ServerError::Unauthorized(_)));

    h.users.set_active(42, false);
    assert!(issue.login("alice", "pw-alice").await.is_err());
}

/// P=42，access 有效期 5 秒，epoch 7 -> 8
#[tokio::test]
async fn test_restart_scenario() {
    let h = Harness::new();
    h.settings_store.set(KEY_ACCESS_LIFETIME_SECONDS, "5").await.unwrap();

    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    assert_eq!(pair.access_expires_in, 5);

    let claims = h.services.jwt.validate(&pair.access, TokenType::Access).unwrap();
    assert_eq!(claims.sub, "42");
    assert_eq!(claims.boot_epoch, Some(7));

    h.clock.advance(2);
    assert!(h.authenticate(&pair.access).await.is_authenticated());

    h.epoch.store(8, Ordering::SeqCst);
    let outcome = h.authenticate(&pair.access).await;
    assert_rejected(outcome, RejectReason::SessionExpiredByRestart);
    let err: ServerError = RejectReason::SessionExpiredByRestart.into();
    assert_eq!(err.session_reason(), Some("session_expired_restart"));

    // 重新签发的 access 带新纪元
    let refreshed = h.services.refresh_coordinator.refresh(&pair.refresh).await.unwrap();
    let claims = h.services.jwt.validate(&refreshed.access, TokenType::Access).unwrap();
    assert_eq!(claims.boot_epoch, Some(8));
    assert!(h.authenticate(&refreshed.access).await.is_authenticated());
}

#[tokio::test]
async fn test_expired_token_rejected_even_if_revoked() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    let claims = h.services.jwt.validate(&pair.access, TokenType::Access).unwrap();

    h.services.denylist.revoke(&claims.jti, claims.exp).await.unwrap();
    h.clock.set(claims.exp);
    assert_rejected(
        h.authenticate(&pair.access).await,
        RejectReason::AuthFailed(AuthFailure::TokenExpired),
    );

    let other = h.services.jwt.issue_access(42, 7, 10).unwrap();
    h.clock.advance(11);
    assert_rejected(
        h.authenticate(&other.token).await,
        RejectReason::AuthFailed(AuthFailure::TokenExpired),
    );
}

#[tokio::test]
async fn test_logout_twice_is_idempotent() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    let header = Harness::bearer(&pair.access);

    h.services.gateway.logout(Some(&header)).await.unwrap();
    h.services.gateway.logout(Some(&header)).await.unwrap();

    assert_rejected(
        h.authenticate(&pair.access).await,
        RejectReason::AuthFailed(AuthFailure::Revoked),
    );
    assert!(matches!(
        h.services.gateway.logout(None).await,
        Err(ServerError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_logout_with_expired_token_is_unauthorized() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    h.clock.advance(301);

    let err = h
        .services
        .gateway
        .logout(Some(&Harness::bearer(&pair.access)))
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_inactive_or_deleted_principal_is_rejected() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    h.users.set_active(42, false);
    assert_rejected(
        h.authenticate(&pair.access).await,
        RejectReason::AuthFailed(AuthFailure::PrincipalMissing),
    );
    assert!(matches!(
        h.services.refresh_coordinator.refresh(&pair.refresh).await,
        Err(ServerError::PrincipalMissing)
    ));

    h.users.remove(42);
    assert_rejected(
        h.authenticate(&pair.access).await,
        RejectReason::AuthFailed(AuthFailure::PrincipalMissing),
    );
}

/// 空闲 30 秒：第 29 秒可以 refresh，第 31 秒不行
#[tokio::test]
async fn test_idle_timeout_scenario() {
    let h = Harness::new();
    h.settings_store.set(KEY_IDLE_TIMEOUT_SECONDS, "30").await.unwrap();

    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    h.clock.advance(29);
    assert!(h.services.refresh_coordinator.refresh(&pair.refresh).await.is_ok());

    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    h.clock.advance(31);
    let err = h.services.refresh_coordinator.refresh(&pair.refresh).await.unwrap_err();
    assert!(matches!(err, ServerError::SessionExpiredByInactivity));
    assert_eq!(err.session_reason(), Some("session_expired_inactivity"));
}

#[tokio::test]
async fn test_rotation_makes_refresh_single_use() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    let first = h.services.refresh_coordinator.refresh(&pair.refresh).await.unwrap();
    let rotated = first.refresh.expect("rotation returns a new refresh token");
    assert_ne!(rotated, pair.refresh);

    assert!(matches!(
        h.services.refresh_coordinator.refresh(&pair.refresh).await,
        Err(ServerError::TokenRevoked)
    ));
    assert!(h.services.refresh_coordinator.refresh(&rotated).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_refresh_redeems_once() {
    let h = Harness::with_denylist(AuthConfig::default(), |clock| {
        Arc::new(YieldingDenylist(MokaDenylist::new(10_000, clock)))
    });
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    let coordinator = &h.services.refresh_coordinator;
    let (a, b) = tokio::join!(coordinator.refresh(&pair.refresh), coordinator.refresh(&pair.refresh));

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServerError::TokenRevoked))));
}

#[tokio::test]
async fn test_denylist_outage_fails_closed() {
    let h = Harness::with_denylist(AuthConfig::default(), |_| Arc::new(OfflineDenylist));
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    let err = h
        .services
        .gateway
        .authenticate(Some(&Harness::bearer(&pair.access)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::DenylistUnavailable(_)));

    assert!(matches!(
        h.services.refresh_coordinator.refresh(&pair.refresh).await,
        Err(ServerError::DenylistUnavailable(_))
    ));

    let app = build_router(h.services.http_state(SERVICE_KEY));
    let (status, _, body) = send(&app, bearer_request("GET", "/api/auth/me", &pair.access)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.get("user_id").is_none());
}

#[tokio::test]
async fn test_oversized_stored_access_lifetime_is_capped() {
    let h = Harness::new();
    h.settings_store
        .set(KEY_ACCESS_LIFETIME_SECONDS, &i64::MAX.to_string())
        .await
        .unwrap();

    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    assert_eq!(pair.access_expires_in, 86_400);
    match h.authenticate(&pair.access).await {
        AuthOutcome::Authenticated(session) => assert_eq!(session.seconds_to_expiry, 86_400),
        other => panic!("expected authenticated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_reusable_without_rotation() {
    let h = Harness::new();
    h.settings_store.set(KEY_ROTATE_REFRESH_TOKENS, "off").await.unwrap();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    for _ in 0..3 {
        let result = h.services.refresh_coordinator.refresh(&pair.refresh).await.unwrap();
        assert!(result.refresh.is_none());
        assert!(h.authenticate(&result.access).await.is_authenticated());
    }
}

#[tokio::test]
async fn test_rotation_without_denylist_skips_revocation() {
    let config = AuthConfig {
        enforce_denylist: false,
        ..AuthConfig::default()
    };
    let h = Harness::with_config(config);
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    let first = h.services.refresh_coordinator.refresh(&pair.refresh).await.unwrap();
    assert!(first.refresh.is_some());
    assert!(h.services.refresh_coordinator.refresh(&pair.refresh).await.is_ok());
}

#[tokio::test]
async fn test_token_types_are_not_interchangeable() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    assert_rejected(
        h.authenticate(&pair.refresh).await,
        RejectReason::AuthFailed(AuthFailure::TokenInvalid),
    );
    assert!(matches!(
        h.services.refresh_coordinator.refresh(&pair.access).await,
        Err(ServerError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_near_expiry_follows_live_settings() {
    let h = Harness::new();
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();
    h.clock.advance(250);

    match h.authenticate(&pair.access).await {
        AuthOutcome::Authenticated(session) => {
            assert_eq!(session.seconds_to_expiry, 50);
            assert!(session.near_expiry);
        }
        other => panic!("expected authenticated, got {:?}", other),
    }

    let update = SettingsUpdate {
        renew_at_seconds: Some(10),
        ..Default::default()
    };
    h.services.settings.update(&update).await.unwrap();
    match h.authenticate(&pair.access).await {
        AuthOutcome::Authenticated(session) => assert!(!session.near_expiry),
        other => panic!("expected authenticated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_boot_epoch_check_can_be_disabled() {
    let config = AuthConfig {
        enforce_boot_epoch: false,
        ..AuthConfig::default()
    };
    let h = Harness::with_config(config);
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    h.epoch.store(99, Ordering::SeqCst);
    assert!(h.authenticate(&pair.access).await.is_authenticated());
}

// =====================================================
// HTTP 路由
// =====================================================

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, Harness::bearer(token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_http_login_me_restart_flow() {
    let h = Harness::new();
    let app = build_router(h.services.http_state(SERVICE_KEY));

    let (status, _, body) = send(
        &app,
        json_request("POST", "/api/auth/login", json!({"username": "alice", "password": "pw-alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["access"].as_str().unwrap().to_string();

    let (status, headers, body) = send(&app, bearer_request("GET", "/api/auth/me", &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 42);
    assert!(headers.get("x-token-near-expiry").is_none());

    h.clock.advance(250);
    let (_, headers, _) = send(&app, bearer_request("GET", "/api/auth/me", &access)).await;
    assert_eq!(headers.get("x-token-near-expiry").unwrap(), "1");

    h.epoch.store(8, Ordering::SeqCst);
    let (status, _, body) = send(&app, bearer_request("GET", "/api/auth/me", &access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "session_expired_restart");
    assert_eq!(body["message"], "not authenticated");
}

#[tokio::test]
async fn test_http_auth_failures_are_uniform() {
    let h = Harness::new();
    let app = build_router(h.services.http_state(SERVICE_KEY));

    let (status, _, body) = send(&app, bearer_request("GET", "/api/auth/me", "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "not authenticated");
    assert!(body.get("reason").is_none());

    let request = Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_http_non_ascii_authorization_is_unauthenticated() {
    let h = Harness::new();
    let app = build_router(h.services.http_state(SERVICE_KEY));
    let value = HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap();

    for (method, uri) in [("GET", "/api/auth/me"), ("POST", "/api/auth/logout")] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, value.clone())
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "not authenticated");
    }
}

#[tokio::test]
async fn test_http_logout_and_refresh() {
    let h = Harness::new();
    let app = build_router(h.services.http_state(SERVICE_KEY));
    let pair = h.services.token_issue_service.login("alice", "pw-alice").await.unwrap();

    let (status, _, body) = send(
        &app,
        json_request("POST", "/api/auth/refresh", json!({"refresh": pair.refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["refresh"].is_string());

    let (status, _, _) = send(&app, bearer_request("POST", "/api/auth/logout", &pair.access)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, bearer_request("GET", "/api/auth/me", &pair.access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_http_admin_settings() {
    let h = Harness::new();
    let app = build_router(h.services.http_state(SERVICE_KEY));

    let request = Request::builder()
        .uri("/api/admin/settings")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = json_request(
        "PUT",
        "/api/admin/settings",
        json!({"idle_timeout_seconds": 10, "renew_at_seconds": 5000}),
    );
    request.headers_mut().insert("x-service-key", SERVICE_KEY.parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"].as_array().unwrap().len(), 3);

    let mut request = json_request("PUT", "/api/admin/settings", json!({"idle_timeout_seconds": 600}));
    request.headers_mut().insert("x-service-key", SERVICE_KEY.parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["idle_timeout_seconds"], 600);
}
