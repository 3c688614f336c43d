use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let resp = services::register(state.users.as_ref(), &keys, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let resp = services::login(state.users.as_ref(), &keys, payload).await?;
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = services::validate_user_by_id(state.users.as_ref(), user_id).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    fn app() -> (Router, AppState) {
        let state = AppState::fake();
        let router = Router::new()
            .merge(auth_routes())
            .merge(me_routes())
            .with_state(state.clone());
        (router, state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_me_with(auth: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri("/auth/me");
        if let Some(value) = auth {
            req = req.header(header::AUTHORIZATION, value);
        }
        req.body(Body::empty()).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ada() -> Value {
        json!({"name": "Ada", "email": "ada@example.com", "password": "password123"})
    }

    #[tokio::test]
    async fn register_login_me_flow() {
        let (app, _) = app();

        let resp = app.clone().oneshot(post_json("/auth/register", ada())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let registered = json_body(resp).await;
        assert_eq!(registered["user"]["email"], "ada@example.com");
        assert!(registered["user"].get("password_hash").is_none());
        assert!(registered["access_token"].is_string());

        let resp = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "ada@example.com", "password": "password123"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let logged_in = json_body(resp).await;
        let token = logged_in["access_token"].as_str().unwrap().to_string();
        assert_eq!(logged_in["user"]["id"], registered["user"]["id"]);

        let resp = app
            .oneshot(get_me_with(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let me = json_body(resp).await;
        assert_eq!(me["id"], registered["user"]["id"]);
        assert_eq!(me["name"], "Ada");
    }

    #[tokio::test]
    async fn duplicate_register_is_409() {
        let (app, _) = app();
        let first = app.clone().oneshot(post_json("/auth/register", ada())).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(post_json("/auth/register", ada())).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["error"], "conflict");
    }

    #[tokio::test]
    async fn short_password_is_400() {
        let (app, _) = app();
        let resp = app
            .oneshot(post_json(
                "/auth/register",
                json!({"name": "Ada", "email": "ada@example.com", "password": "short"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let (app, _) = app();
        app.clone().oneshot(post_json("/auth/register", ada())).await.unwrap();

        let resp = app
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "ada@example.com", "password": "password124"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let (app, _) = app();

        let resp = app.clone().oneshot(get_me_with(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(get_me_with(Some("Basic abc"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.oneshot(get_me_with(Some("Bearer not.a.jwt"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_with_token_for_unknown_user_is_401() {
        let (app, state) = app();
        let token = JwtKeys::from_ref(&state)
            .sign(Uuid::new_v4(), "ghost@example.com")
            .unwrap();

        let resp = app
            .oneshot(get_me_with(Some(&format!("bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
