// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::authorization::AuthorizationService;
use crate::application::slo_monitor::SloMonitor;
use crate::domain::audit::RequestContext;
use crate::domain::decision::{AuthorizationRequest, Decision};
use crate::infrastructure::audit::AuditDispatcher;

pub struct AppState {
    pub authorization: Arc<AuthorizationService>,
    pub slo_monitor: Arc<SloMonitor>,
    pub audit: AuditDispatcher,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/v1/authorize", post(authorize))
        .route("/v1/admin/policy/reload", post(reload_policy))
        .route("/v1/slo", get(slo_status))
        .route("/v1/admin/slo/reset", post(reset_slo))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// The request being authorized, as seen by the calling service.
#[derive(Debug, Default, Deserialize)]
pub struct OriginalRequest {
    pub method: Option<String>,
    pub path: Option<String>,
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    #[serde(flatten)]
    pub request: AuthorizationRequest,
    #[serde(default)]
    pub original_request: Option<OriginalRequest>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub decision_id: String,
    pub allow: bool,
    pub rule: String,
    pub reason: String,
    pub policy_id: String,
    pub evaluation_time_ms: f64,
}

impl From<&Decision> for AuthorizeResponse {
    fn from(decision: &Decision) -> Self {
        Self {
            decision_id: decision.id.to_string(),
            allow: decision.allow,
            rule: decision.matched_rule.to_string(),
            reason: decision.reason.clone(),
            policy_id: decision.policy_id.clone(),
            evaluation_time_ms: decision.evaluation_time_ms(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .unwrap_or("")
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let context = RequestContext {
        request_id: header_str(headers, "x-request-id"),
        correlation_id: header_str(headers, "x-correlation-id"),
        client_ip: header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string())),
        user_agent: header_str(headers, "user-agent"),
        ..Default::default()
    };
    match header_str(headers, "traceparent") {
        Some(traceparent) => context.with_traceparent(&traceparent),
        None => context,
    }
}

async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AuthorizeBody>,
) -> impl IntoResponse {
    let mut context = request_context(&headers);
    if let Some(original) = payload.original_request {
        context.method = original.method;
        context.path = original.path;
        context.body = original.body;
        context.headers = original.headers;
    }

    let decision = state
        .authorization
        .authorize(bearer_token(&headers), &payload.request, context);
    Json(AuthorizeResponse::from(&decision))
}

/// Deny response for administrative routes. Only the decision's public
/// reason is returned.
fn forbidden(decision: &Decision) -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "forbidden",
            "decision_id": decision.id.to_string(),
            "reason": decision.reason,
        })),
    )
}

async fn reload_policy(State(state): State<Arc<AppState>>, headers: HeaderMap, body: String) -> impl IntoResponse {
    let decision = state.authorization.authorize_platform_action(
        bearer_token(&headers),
        "policy",
        "admin",
        request_context(&headers),
    );
    if !decision.allow {
        return forbidden(&decision);
    }

    match state.authorization.reload_policy_document(&body) {
        Ok(diff) => (StatusCode::OK, Json(json!({ "status": "reloaded", "diff": diff }))),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "status": "rejected",
                "error": e.to_string(),
                "active_policy": state.authorization.current_policy().policy_id(),
            })),
        ),
    }
}

async fn slo_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.slo_monitor.status())
}

async fn reset_slo(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let decision = state.authorization.authorize_platform_action(
        bearer_token(&headers),
        "slo",
        "admin",
        request_context(&headers),
    );
    if !decision.allow {
        return forbidden(&decision);
    }
    state.slo_monitor.reset();
    (StatusCode::OK, Json(json!({ "status": "reset" })))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let degraded = state.slo_monitor.is_degraded();
    let stale: Vec<String> = state
        .slo_monitor
        .status()
        .into_iter()
        .filter(|s| s.stale_metrics)
        .map(|s| s.name)
        .collect();
    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "policy_id": state.authorization.current_policy().policy_id(),
        "stale_slos": stale,
        "audit": state.audit.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::claims_resolver::ClaimsResolver;
    use crate::domain::engine_config::{ClaimNames, SloConfig, TokenConfig};
    use crate::domain::policy_config::{PolicyBundle, PolicyManifest};
    use crate::infrastructure::audit::{DispatchSettings, TracingAuditSink};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::jwt_verifier::JwtTokenVerifier;
    use crate::infrastructure::policy_store::PolicyStore;
    use axum::body::Body;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"api-test-secret-0123456789abcdef";

    const POLICY: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: AuthorizationPolicy
metadata: { name: notes, version: "1" }
spec:
  roles:
    - name: workspace_editor
      scope: workspace
      permissions:
        - { resource_type: notes, action: create, scope: workspace }
    - name: tenant_admin
      scope: tenant
      permanent: true
      permissions:
        - { resource_type: notes, action: delete, scope: tenant }
    - name: platform_operator
      scope: system
      permanent: true
      permissions:
        - { resource_type: policy, action: admin, scope: all }
        - { resource_type: slo, action: admin, scope: all }
"#;

    fn token(roles: Value) -> String {
        let claims = json!({
            "sub": "user-1",
            "tenant": "acme-corp",
            "roles": roles,
            "exp": chrono::Utc::now().timestamp() + 600,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn test_app() -> (Router, Arc<AuthorizationService>) {
        let bus = EventBus::new(64);
        let verifier = JwtTokenVerifier::hs256(SECRET, &TokenConfig::default());
        let resolver = ClaimsResolver::new(Arc::new(verifier), ClaimNames::default());
        let bundle = PolicyBundle::from_manifest(&PolicyManifest::from_yaml_str(POLICY).unwrap()).unwrap();
        let audit = AuditDispatcher::new(
            vec![Arc::new(TracingAuditSink::new())],
            100,
            DispatchSettings {
                batch_size: 10,
                flush_interval: Duration::from_millis(50),
                max_attempts: 1,
                base_backoff: Duration::from_millis(1),
                sink_timeout: Duration::from_millis(100),
            },
        );
        let authorization = Arc::new(AuthorizationService::new(
            resolver,
            Arc::new(PolicyStore::new(bundle)),
            audit.clone(),
            bus.clone(),
        ));
        let slo_monitor = Arc::new(SloMonitor::new(&SloConfig::default(), bus));
        let router = app(AppState {
            authorization: authorization.clone(),
            slo_monitor,
            audit,
        });
        (router, authorization)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_authorize_endpoint() {
        let (router, _) = test_app();
        let token = token(json!({ "workspace:project-alpha": ["workspace_editor"] }));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/authorize")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token))
            .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
            .body(Body::from(
                json!({
                    "resource_type": "notes",
                    "action": "create",
                    "resource": { "tenant": "acme-corp", "workspace": "project-alpha" }
                })
                .to_string(),
            ))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["allow"], true);
        assert_eq!(body["rule"], "allow_workspace_editor_create");
        assert_eq!(body["policy_id"], "notes@1");
    }

    #[tokio::test]
    async fn test_missing_token_is_denied_not_errored() {
        let (router, _) = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/authorize")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "resource_type": "notes", "action": "create", "resource": { "tenant": "acme-corp" } })
                    .to_string(),
            ))
            .unwrap();

        let body = body_json(router.oneshot(request).await.unwrap()).await;
        assert_eq!(body["allow"], false);
        assert_eq!(body["rule"], "invalid_token");
    }

    #[tokio::test]
    async fn test_reload_requires_admin_and_validates() {
        let (router, authorization) = test_app();

        let editor = token(json!({ "workspace:project-alpha": ["workspace_editor"] }));
        let forbidden = Request::builder()
            .method("POST")
            .uri("/v1/admin/policy/reload")
            .header("authorization", format!("Bearer {}", editor))
            .body(Body::from(POLICY.replace("version: \"1\"", "version: \"2\"")))
            .unwrap();
        let response = router.clone().oneshot(forbidden).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin = token(json!({ "system": ["platform_operator"] }));
        let invalid = Request::builder()
            .method("POST")
            .uri("/v1/admin/policy/reload")
            .header("authorization", format!("Bearer {}", admin))
            .body(Body::from(POLICY.replace("action: create", "action: \"*\"")))
            .unwrap();
        let response = router.clone().oneshot(invalid).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(authorization.current_policy().policy_id(), "notes@1");

        let valid = Request::builder()
            .method("POST")
            .uri("/v1/admin/policy/reload")
            .header("authorization", format!("Bearer {}", admin))
            .body(Body::from(POLICY.replace("version: \"1\"", "version: \"2\"")))
            .unwrap();
        let response = router.oneshot(valid).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["diff"]["new_policy"], "notes@2");
        assert_eq!(authorization.current_policy().policy_id(), "notes@2");
    }

    #[tokio::test]
    async fn test_tenant_admin_cannot_replace_shared_policy() {
        let (router, authorization) = test_app();
        let tenant_admin = token(json!({ "tenant:acme-corp": ["tenant_admin"] }));

        // Even a tenant role that lists the tuple is not enough
        let widened = POLICY.replace(
            "        - { resource_type: notes, action: delete, scope: tenant }",
            "        - { resource_type: notes, action: delete, scope: tenant }\n        - { resource_type: policy, action: admin, scope: tenant }\n        - { resource_type: slo, action: admin, scope: tenant }",
        );
        authorization.reload_policy_document(&widened).unwrap();
        let replaced = POLICY.replace("version: \"1\"", "version: \"9\"");

        let request = Request::builder()
            .method("POST")
            .uri("/v1/admin/policy/reload")
            .header("authorization", format!("Bearer {}", tenant_admin))
            .body(Body::from(replaced))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(authorization.current_policy().policy_id(), "notes@1");

        let reset = Request::builder()
            .method("POST")
            .uri("/v1/admin/slo/reset")
            .header("authorization", format!("Bearer {}", tenant_admin))
            .body(Body::empty())
            .unwrap();
        assert_eq!(router.oneshot(reset).await.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_slo_and_health() {
        let (router, _) = test_app();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/v1/slo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[0]["state"], "nominal");

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["policy_id"], "notes@1");
    }
}
