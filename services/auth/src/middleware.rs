//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::token::TokenType;
use tracing::warn;

use crate::{AppState, error::AuthError};

/// Validate the bearer access token and add its claims to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = auth.ok_or(AuthError::Unauthorized)?;
    let token = bearer.token();

    let claims = state
        .jwt_service
        .validate_token(token, TokenType::Access)
        .map_err(|e| {
            warn!("Rejected access token: {}", e);
            AuthError::Unauthorized
        })?;

    if state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, token)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
