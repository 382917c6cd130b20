use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use swiftclaim_auth::{JwtAuthenticator, JwtConfig};

const SECRET: &str = "test-secret-for-swiftclaim";

fn headers_with_token(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token)
            .parse()
            .expect("authorization header must parse"),
    );
    headers
}

fn sign(claims: &serde_json::Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encode should succeed")
}

#[test]
fn authenticate_extracts_principal_from_valid_hs256_jwt() {
    let token = sign(
        &serde_json::json!({
            "userId": 7,
            "email": "holder@example.com",
            "role": "policyholder",
            "exp": 4000000000u64,
        }),
        SECRET,
    );

    let auth = JwtAuthenticator::new(JwtConfig::hs256(SECRET)).expect("auth init should succeed");
    let principal = auth
        .authenticate(&headers_with_token(&token))
        .expect("authenticate should succeed");

    assert_eq!(principal.user_id, "7");
    assert_eq!(principal.role, "policyholder");
}

#[test]
fn authenticate_rejects_wrong_secret() {
    let token = sign(
        &serde_json::json!({"userId": 7, "exp": 4000000000u64}),
        "some-other-secret",
    );

    let auth = JwtAuthenticator::new(JwtConfig::hs256(SECRET)).expect("auth init should succeed");
    let err = auth
        .authenticate(&headers_with_token(&token))
        .expect_err("signature mismatch must fail");
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[test]
fn authenticate_rejects_expired_token() {
    let token = sign(&serde_json::json!({"userId": 7, "exp": 1000000000u64}), SECRET);

    let auth = JwtAuthenticator::new(JwtConfig::hs256(SECRET)).expect("auth init should succeed");
    let err = auth
        .authenticate(&headers_with_token(&token))
        .expect_err("expired token must fail");
    assert_eq!(err.code, "ERR_AUTH_INVALID");
    assert_eq!(err.message, "JWT has expired");
}

#[test]
fn authenticate_requires_user_id_claim() {
    let token = sign(&serde_json::json!({"role": "admin", "exp": 4000000000u64}), SECRET);

    let auth = JwtAuthenticator::new(JwtConfig::hs256(SECRET)).expect("auth init should succeed");
    let err = auth
        .authenticate(&headers_with_token(&token))
        .expect_err("missing userId must fail");
    assert!(err.message.contains("userId"));
}
