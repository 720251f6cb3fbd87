// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{LogoutResponse, MeResponse, NonceResponse, VerifyRequest, VerifyResponse},
    session::Session,
    state::AppState,
};

pub mod health;
pub mod siwe;

pub fn router(state: AppState) -> Router {
    let siwe_routes = Router::new()
        .route("/nonce", get(siwe::nonce))
        .route("/verify", post(siwe::verify))
        .route("/me", get(siwe::me))
        .route("/logout", post(siwe::logout));

    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    Router::new()
        .nest("/api/siwe", siwe_routes)
        .nest("/health", health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        siwe::nonce,
        siwe::verify,
        siwe::me,
        siwe::logout,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Session,
            NonceResponse,
            VerifyRequest,
            VerifyResponse,
            MeResponse,
            LogoutResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "SIWE", description = "Sign-In With Ethereum"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let app = router(AppState::default());
        let response = app
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn openapi_lists_siwe_paths() {
        let app = router(AppState::default());
        let response = app
            .oneshot(Request::get("/api-doc/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        for path in ["/api/siwe/nonce", "/api/siwe/verify", "/api/siwe/me", "/api/siwe/logout"] {
            assert!(doc["paths"].get(path).is_some(), "{path} missing");
        }
    }
}
