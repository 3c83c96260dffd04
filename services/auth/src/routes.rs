//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::token::{Claims, TokenType};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::auth_middleware,
    models::{LoginCredentials, NewUser, User, UserResponse},
    repositories::user::{is_unique_violation, verify_password},
    validation::{validate_display_name, validate_email, validate_password},
};

/// Response for token generation
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Response for sign-up and login
#[derive(Serialize)]
pub struct SessionResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

/// Request for token refresh and logout
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Issue a token pair and record the refresh token as the user's session
async fn open_session(state: &AppState, user: &User) -> AuthResult<TokenResponse> {
    let access_token = state.jwt_service.generate_access_token(user)?;
    let refresh_token = state.jwt_service.generate_refresh_token(user)?;

    state
        .session_manager
        .store_session(user.id, &refresh_token)
        .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    })
}

/// User sign-up endpoint
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> AuthResult<impl IntoResponse> {
    let new_user = NewUser {
        email: normalize_email(&payload.email),
        ..payload
    };
    info!("Sign-up attempt for {}", new_user.email);

    validate_email(&new_user.email).map_err(AuthError::Validation)?;
    validate_password(&new_user.password).map_err(AuthError::Validation)?;
    validate_display_name(new_user.display_name.as_deref()).map_err(AuthError::Validation)?;

    if state
        .user_repository
        .find_by_email(&new_user.email)
        .await?
        .is_some()
    {
        return Err(AuthError::EmailTaken(new_user.email));
    }

    let user = match state.user_repository.create(&new_user).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => return Err(AuthError::EmailTaken(new_user.email)),
        Err(e) => return Err(e.into()),
    };

    // The insert trigger normally created the profile already.
    if let Err(e) = state
        .event_service
        .register_profile(user.id, &user.email, user.display_name.as_deref())
        .await
    {
        error!("Failed to create profile of {}: {}", user.id, e);
    }

    let tokens = open_session(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user: UserResponse::from(&user),
            tokens,
        }),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> AuthResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);
    info!("Login attempt for user: {}", email);

    let user = state
        .user_repository
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&user.password_hash, &payload.password)? {
        warn!("Wrong password for {}", email);
        return Err(AuthError::InvalidCredentials);
    }

    let tokens = open_session(&state, &user).await?;

    Ok(Json(SessionResponse {
        user: UserResponse::from(&user),
        tokens,
    }))
}

/// Refresh token endpoint
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Token refresh request");

    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token, TokenType::Refresh)
        .map_err(|_| AuthError::Unauthorized)?;

    if state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, &payload.refresh_token)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }

    if !state
        .session_manager
        .is_session_valid(claims.sub, &payload.refresh_token)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthorized)?;

    let access_token = state.jwt_service.generate_access_token(&user)?;
    let refresh_token = state
        .jwt_service
        .rotate_refresh_token(&state.redis_pool, &user, &payload.refresh_token, &claims)
        .await?;

    state
        .session_manager
        .store_session(user.id, &refresh_token)
        .await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    }))
}

/// Logout endpoint
///
/// Revokes the refresh token and, when sent along, the bearer access token.
pub async fn logout(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Logout request");

    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token, TokenType::Refresh)
        .map_err(|_| AuthError::Unauthorized)?;

    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &payload.refresh_token, &claims)
        .await?;

    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        match state
            .jwt_service
            .validate_token(bearer.token(), TokenType::Access)
        {
            Ok(access) if access.sub == claims.sub => {
                state
                    .jwt_service
                    .blacklist_token(&state.redis_pool, bearer.token(), &access)
                    .await?;
            }
            Ok(_) => warn!("Logout access token belongs to another user"),
            Err(e) => warn!("Ignoring invalid access token on logout: {}", e),
        }
    }

    state.session_manager.delete_session(claims.sub).await?;

    Ok(Json(
        serde_json::json!({"message": "Logged out successfully"}),
    ))
}

/// Current user endpoint
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthorized)?;

    Ok(Json(UserResponse::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane.Doe@Corp.COM "), "jane.doe@corp.com");
    }

    #[test]
    fn test_session_response_is_flat() {
        let response = SessionResponse {
            user: UserResponse {
                id: uuid::Uuid::nil(),
                email: "jane@corp.com".to_string(),
                name: "jane".to_string(),
                created_at: chrono::Utc::now(),
            },
            tokens: TokenResponse {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 900,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["access_token"], "a");
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["user"]["name"], "jane");
    }
}
