use super::*;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::env;

const SECRET: &str = "supersecretjwtsecretforunittesting123";

fn set_env_vars() {
    unsafe {
        env::set_var("JWT_SECRET", SECRET);
    }
}

fn token(secret: &str, role: &str, exp: usize) -> String {
    let claims = AccessClaims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        role: role.to_string(),
        email: Some("student@example.com".to_string()),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[test]
fn test_validate_access_token_success() {
    set_env_vars();

    let claims = validate_access_token(&token(SECRET, "counsellor", 9999999999))
        .expect("Valid token should pass");

    assert_eq!(claims.sub, "123e4567-e89b-12d3-a456-426614174000");
    assert_eq!(claims.email.as_deref(), Some("student@example.com"));
    assert_eq!(Role::from_str(&claims.role), Role::Counsellor);
}

#[test]
fn test_validate_access_token_expired() {
    set_env_vars();

    let result = validate_access_token(&token(SECRET, "student", 1));
    assert!(result.is_err());
}

#[test]
fn test_validate_access_token_invalid_signature() {
    set_env_vars();

    let result = validate_access_token(&token("wrongsecret", "student", 9999999999));
    assert!(result.is_err());
}

#[test]
fn unknown_role_claim_falls_back_to_student() {
    let user = AuthUser {
        user_id: Uuid::new_v4(),
        email: None,
        role: Role::from_str("authenticated"),
    };

    let principal = user.principal();
    assert_eq!(principal.role, Role::Student);
    assert!(!principal.is_admin());
}
