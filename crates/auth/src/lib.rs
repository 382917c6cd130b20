use std::time::Duration;

use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::Value;

pub const LOCAL_USER_ID_HEADER: &str = "x-swiftclaim-user-id";
pub const LOCAL_ROLE_HEADER: &str = "x-swiftclaim-role";

const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub clock_skew: Duration,
    pub user_id_claim: String,
    pub role_claim: String,
}

impl JwtConfig {
    pub fn hs256(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            clock_skew: Duration::from_secs(30),
            user_id_claim: "userId".to_string(),
            role_claim: "role".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Validates HS256 bearer tokens minted by the user service.
#[derive(Clone)]
pub struct JwtAuthenticator {
    config: JwtConfig,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("user_id_claim", &self.config.user_id_claim)
            .field("role_claim", &self.config.role_claim)
            .finish_non_exhaustive()
    }
}

impl JwtAuthenticator {
    pub fn new(config: JwtConfig) -> Result<Self, AuthError> {
        if config.secret.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "jwt secret must be non-empty".to_string(),
            });
        }
        if config.user_id_claim.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "jwt user_id_claim must be non-empty".to_string(),
            });
        }

        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(Self {
            config,
            decoding_key,
        })
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = bearer_token(headers)?;

        let header = decode_header(&token).map_err(|_| AuthError {
            code: "ERR_AUTH_INVALID",
            message: "invalid JWT header".to_string(),
        })?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError {
                code: "ERR_AUTH_INVALID",
                message: "unsupported JWT alg (expected HS256)".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let decoded = decode::<Value>(&token, &self.decoding_key, &validation).map_err(|err| {
            let message = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "JWT has expired",
                _ => "JWT validation failed",
            };
            AuthError {
                code: "ERR_AUTH_INVALID",
                message: message.to_string(),
            }
        })?;

        let claims = decoded.claims;
        let user_id = claim_identifier(&claims, &self.config.user_id_claim)?;
        let role = claims
            .get(&self.config.role_claim)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string();

        Ok(Principal { user_id, role })
    }
}

/// Principal taken from trusted headers; only meaningful behind a loopback bind.
pub fn local_principal(headers: &HeaderMap) -> Result<Principal, AuthError> {
    let user_id = header_value(headers, LOCAL_USER_ID_HEADER).ok_or_else(|| AuthError {
        code: "ERR_AUTH_REQUIRED",
        message: format!("missing {} header", LOCAL_USER_ID_HEADER),
    })?;
    let role = header_value(headers, LOCAL_ROLE_HEADER).unwrap_or_else(|| DEFAULT_ROLE.to_string());

    Ok(Principal { user_id, role })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_REQUIRED",
            message: "missing Authorization header".to_string(),
        })?;

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_INVALID",
            message: "Authorization must be a Bearer token".to_string(),
        })?;

    if token.trim().is_empty() {
        return Err(AuthError {
            code: "ERR_AUTH_INVALID",
            message: "Bearer token is empty".to_string(),
        });
    }

    Ok(token.trim().to_string())
}

// User ids are issued as integers but some clients re-mint them as strings.
fn claim_identifier(claims: &Value, claim: &str) -> Result<String, AuthError> {
    let value = match claims.get(claim) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
        _ => String::new(),
    };
    if value.is_empty() {
        return Err(AuthError {
            code: "ERR_AUTH_INVALID",
            message: format!("required claim `{}` is missing or not an identifier", claim),
        });
    }
    Ok(value)
}
