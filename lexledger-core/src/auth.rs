use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::api::AppState;
use crate::models::Actor;

/// The authenticated caller, stored in request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub firm_id: Uuid,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.firm_id, self.user_id)
    }
}

/// Claims expected inside the JWT for authenticated users.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's UUID as a string.
    pub sub: String,

    /// Tenant the user acts for
    pub firm_id: Uuid,

    pub exp: usize,
}

/// Validates an HS256 token and extracts the caller.
pub fn decode_current_user(token: &str, secret: &str) -> Option<CurrentUser> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let claims = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| debug!("Rejected bearer token: {}", e))
        .ok()?
        .claims;

    let user_id = Uuid::parse_str(&claims.sub).ok()?;
    Some(CurrentUser {
        user_id,
        firm_id: claims.firm_id,
    })
}

/// Middleware to validate a Bearer JWT in the `Authorization` header.
///
/// On success the request is forwarded with a [`CurrentUser`] extension; on
/// failure a `401` is returned.
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = decode_current_user(token, &state.config.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
