//! Identity tokens and the request extractors built on them.
//!
//! The caller's identity arrives as an HS256 JWT, either in the `token`
//! cookie set by the login flow or as an `Authorization: Bearer` header.
//! Only three claims matter to the report: username, email and gender.

use crate::output::UploadResponse;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::debug;

/// Cookie carrying the identity token.
pub const TOKEN_COOKIE: &str = "token";

/// Who the report is for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: Option<String>,
    pub email: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl From<Claims> for UserIdentity {
    fn from(c: Claims) -> Self {
        Self {
            username: c.username,
            email: c.email,
            gender: c.gender,
        }
    }
}

/// Signs and verifies identity tokens with a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenVerifier { .. }")
    }
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token for `identity`, valid for `ttl`.
    pub fn issue(
        &self,
        identity: &UserIdentity,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity
                .username
                .clone()
                .or_else(|| identity.email.clone())
                .unwrap_or_default(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            gender: identity.gender.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Check signature and expiry and return the identity.
    pub fn verify(&self, token: &str) -> Result<UserIdentity, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims.into())
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            let (scheme, rest) = auth.split_once(' ')?;
            scheme
                .eq_ignore_ascii_case("bearer")
                .then(|| rest.trim().to_string())
        })
}

/// The verified identity of the caller, if any.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<UserIdentity>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<TokenVerifier>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);

        let token = if let Some(bearer) = extract_bearer_token(&parts.headers) {
            Some(bearer)
        } else if let Ok(cookies) = parts.extract::<Cookies>().await {
            cookies.get(TOKEN_COOKIE).map(|c| c.value().to_string())
        } else {
            None
        };

        let identity = token.and_then(|t| match verifier.verify(&t) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!("Rejected identity token: {}", e);
                None
            }
        });
        Ok(CurrentUser(identity))
    }
}

/// Like [`CurrentUser`], but rejects unauthenticated requests with 401.
#[derive(Debug, Clone)]
pub struct RequireUser(pub UserIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
    Arc<TokenVerifier>: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(CurrentUser(Some(identity))) => Ok(RequireUser(identity)),
            _ => Err(AuthRejection),
        }
    }
}

/// 401 with the usual upload failure body.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(UploadResponse::failure("Authentication required.")),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> UserIdentity {
        UserIdentity {
            username: Some("ada".into()),
            email: Some("ada@example.com".into()),
            gender: Some("Female".into()),
        }
    }

    #[test]
    fn issue_then_verify() {
        let v = TokenVerifier::new("secret");
        let token = v.issue(&ada(), Duration::minutes(5)).unwrap();
        assert_eq!(v.verify(&token).unwrap(), ada());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = TokenVerifier::new("a")
            .issue(&ada(), Duration::minutes(5))
            .unwrap();
        assert!(TokenVerifier::new("b").verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let v = TokenVerifier::new("secret");
        let token = v.issue(&ada(), Duration::hours(-2)).unwrap();
        assert!(v.verify(&token).is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(extract_bearer_token(&h), None);
        h.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&h).as_deref(), Some("abc.def"));
        h.insert(header::AUTHORIZATION, "Basic Zm9v".parse().unwrap());
        assert_eq!(extract_bearer_token(&h), None);
    }
}
