//! Authentication middleware for JWT token validation

use agenda::Viewer;
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
use common::token::{Claims, TokenType, blacklist_key};
use tracing::warn;

use crate::{error::ApiError, state::AppState};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

/// The user a verified access token speaks for
pub fn viewer_from_claims(claims: Claims) -> Viewer {
    Viewer {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
    }
}

async fn authenticate(state: &AppState, token: &str) -> Result<Viewer, ApiError> {
    let claims = state
        .verifier
        .verify_as(token, TokenType::Access)
        .map_err(|e| {
            warn!("Rejected access token: {}", e);
            ApiError::Unauthorized
        })?;

    if state.redis_pool.exists(&blacklist_key(token)).await? {
        return Err(ApiError::Unauthorized);
    }

    Ok(viewer_from_claims(claims))
}

/// Require a valid bearer token and add the [`Viewer`] to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: BearerHeader,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = auth.ok_or(ApiError::Unauthorized)?;
    let viewer = authenticate(&state, bearer.token()).await?;

    req.extensions_mut().insert(viewer);
    Ok(next.run(req).await)
}

/// Like [`auth_middleware`] but lets anonymous requests through. A token
/// that is present must still be valid.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    auth: BearerHeader,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(TypedHeader(Authorization(bearer))) = auth {
        let viewer = authenticate(&state, bearer.token()).await?;
        req.extensions_mut().insert(viewer);
    }
    Ok(next.run(req).await)
}
