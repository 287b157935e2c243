//! Bearer-credential verification at the API boundary.
//!
//! Token issuance, refresh, and user management belong to the external auth
//! collaborator; this module only verifies a presented token's signature and
//! checks it against the revocation store before trusting its subject.

use axum::extract::FromRequestParts;
use http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{session_token, SessionToken};
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    /// Expiry, seconds since epoch
    pub exp: usize,
}

/// Verifies HS256 bearer tokens against the shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))
    }
}

/// Full bearer check: signature, then the revocation store. Returns the
/// authenticated user id.
pub async fn verify_bearer(
    db: &DatabaseConnection,
    verifier: &TokenVerifier,
    token: &str,
) -> Result<Uuid, ServiceError> {
    let claims = verifier.decode(token)?;

    let record = SessionToken::find()
        .filter(session_token::Column::UserId.eq(claims.sub))
        .filter(session_token::Column::Token.eq(token))
        .filter(session_token::Column::IsValid.eq(true))
        .one(db)
        .await?;

    if record.is_none() {
        return Err(ServiceError::Unauthorized(
            "token revoked or unknown".to_string(),
        ));
    }

    Ok(claims.sub)
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Result<&str, ServiceError> {
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))
}

/// Authenticated caller, extracted from the `Authorization` header on
/// protected routes.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing Authorization header".to_string())
            })?;

        let token = bearer_token(header)?;
        let user_id = verify_bearer(&state.db, &state.token_verifier, token).await?;
        Ok(AuthenticatedUser(user_id))
    }
}
