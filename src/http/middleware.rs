//! Authentication middleware and JWT verification

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Cookie the web client stores its token in
const JWT_COOKIE: &str = "jwt";

/// JWT claims issued by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub user_id: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

/// Verify an HS256 token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let message = format!("{}.{}", header_b64, payload_b64);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Token from `Authorization: Bearer`, else from the `jwt` cookie (whose
/// value may carry its own `Bearer ` prefix)
pub fn extract_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let value = auth_header.to_str().map_err(|_| AuthError::InvalidFormat)?;
        return value.strip_prefix("Bearer ").ok_or(AuthError::InvalidFormat);
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == JWT_COOKIE)
        .map(|(_, value)| value.strip_prefix("Bearer ").unwrap_or(value))
        .ok_or(AuthError::MissingToken)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        };

        (status, self.to_string()).into_response()
    }
}

/// Authenticated user extractor result
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: u64,
    pub claims: JwtClaims,
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(request.headers())?;
    let claims = verify_jwt(token, &state.config.jwt_secret)?;

    let auth_user = AuthenticatedUser {
        user_id: claims.user_id,
        claims,
    };

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;

    /// Signs an HS256 token the way the account service does
    pub(crate) fn sign(claims: &JwtClaims, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{header}.{payload}").as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{header}.{payload}.{signature}")
    }

    pub(crate) fn claims_for(user_id: u64) -> JwtClaims {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        JwtClaims {
            user_id,
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn valid_token_round_trips() {
        let token = sign(&claims_for(42), "s3cret");
        assert_eq!(verify_jwt(&token, "s3cret").unwrap().user_id, 42);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let token = sign(&claims_for(42), "s3cret");
        assert!(matches!(verify_jwt(&token, "other"), Err(AuthError::InvalidToken)));
        assert!(matches!(verify_jwt("a.b", "s3cret"), Err(AuthError::InvalidToken)));
        assert!(matches!(verify_jwt("a.b.c.d", "s3cret"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn rejects_expired_token() {
        let claims = JwtClaims {
            user_id: 1,
            exp: 10,
            iat: 0,
        };
        let token = sign(&claims, "s3cret");
        assert!(matches!(verify_jwt(&token, "s3cret"), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn token_from_header_or_cookie() {
        let mut headers = HeaderMap::new();
        assert!(matches!(extract_token(&headers), Err(AuthError::MissingToken)));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; jwt=Bearer abc.def.ghi"),
        );
        assert_eq!(extract_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer xyz"),
        );
        assert_eq!(extract_token(&headers).unwrap(), "xyz");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Token xyz"));
        assert!(matches!(extract_token(&headers), Err(AuthError::InvalidFormat)));
    }
}
