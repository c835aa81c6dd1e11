//! JWT Authentication
//!
//! Validates JWTs from external auth providers. The server does not issue
//! tokens, only validates them and derives a stable `PrincipalId`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::game::PrincipalId;

/// Authentication configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            public_key_pem: None,
            secret: None,
            skip_expiry: false,
        }
    }
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("RUNE_FORGE_AUTH_ISSUER").ok(),
            audience: std::env::var("RUNE_FORGE_AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("RUNE_FORGE_AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("RUNE_FORGE_AUTH_SECRET").ok(),
            skip_expiry: std::env::var("RUNE_FORGE_AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims expected from auth providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject - the user id from the auth provider.
    pub sub: String,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Whether this principal may issue `DmCommand`s.
    #[serde(default)]
    pub dm: bool,
}

impl TokenClaims {
    /// Derive a stable `PrincipalId` from the subject claim.
    pub fn principal_id(&self) -> PrincipalId {
        let mut hasher = Sha256::new();
        hasher.update(b"rune-forge-principal:");
        hasher.update(self.sub.as_bytes());
        PrincipalId::new(hex::encode(hasher.finalize()))
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication not configured")]
    NotConfigured,
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {e}")))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn test_claims() -> TokenClaims {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        TokenClaims {
            sub: "user123".into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
            dm: false,
        }
    }

    #[test]
    fn valid_token_is_accepted() {
        let secret = "test-secret-key-256-bits-long!!";
        let token = create_test_token(&test_claims(), secret);
        let config = AuthConfig { secret: Some(secret.into()), ..Default::default() };
        let result = validate_token(&token, &config);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().sub, "user123");
    }

    #[test]
    fn expired_token_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, secret);
        let config = AuthConfig { secret: Some(secret.into()), ..Default::default() };
        assert!(matches!(validate_token(&token, &config), Err(AuthError::Expired)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let claims = test_claims();
        let token = create_test_token(&claims, "correct-secret-key-here!!!!!");
        let config = AuthConfig { secret: Some("wrong-secret-key-here!!!!!!".into()), ..Default::default() };
        assert!(matches!(validate_token(&token, &config), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn principal_id_is_stable_and_distinct_per_subject() {
        let a = TokenClaims { sub: "user123".into(), exp: 0, iat: 0, iss: None, aud: None, dm: false };
        let b = TokenClaims { sub: "user456".into(), ..a.clone() };
        assert_eq!(a.principal_id(), a.principal_id());
        assert_ne!(a.principal_id(), b.principal_id());
    }

    #[test]
    fn not_configured_without_keys() {
        let config = AuthConfig::default();
        assert!(matches!(validate_token("x.y.z", &config), Err(AuthError::NotConfigured)));
    }
}
