// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Optional JWT identity middleware.
//!
//! Requests without a token are anonymous; the tracker then skips all remote
//! operations. A token that is present but invalid is rejected.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the identity token.
pub const TOKEN_COOKIE: &str = "run_token";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Caller identity extracted from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Middleware that attaches an [`Identity`] to every request.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        Some(cookie.value().to_string())
    } else {
        match request
            .headers()
            .get(header::AUTHORIZATION)
            .map(|h| h.to_str())
        {
            None => None,
            Some(Ok(h)) if h.starts_with("Bearer ") => Some(h[7..].to_string()),
            Some(_) => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let identity = match token {
        None => Identity::anonymous(),
        Some(token) => Identity {
            user_id: Some(verify_jwt(&token, &state.config.jwt_signing_key)?),
        },
    };

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Verify a token and return its subject.
fn verify_jwt(token: &str, signing_key: &[u8]) -> Result<String, StatusCode> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let sub = token_data.claims.sub.trim().to_string();
    if sub.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(sub)
}

/// Create an identity token for a user.
pub fn create_jwt(user_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 30 * 24 * 60 * 60, // 30 days
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    #[test]
    fn test_round_trip_subject() {
        let token = create_jwt("user-42", KEY).unwrap();
        assert_eq!(verify_jwt(&token, KEY).unwrap(), "user-42");
    }

    #[test]
    fn test_rejects_wrong_key() {
        let token = create_jwt("user-42", b"some_other_key_that_is_long_enough").unwrap();
        assert_eq!(verify_jwt(&token, KEY), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_rejects_blank_subject() {
        let token = create_jwt("  ", KEY).unwrap();
        assert_eq!(verify_jwt(&token, KEY), Err(StatusCode::UNAUTHORIZED));
    }
}
