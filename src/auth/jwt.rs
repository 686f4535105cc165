//! Ed25519 access and refresh tokens.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCustomClaims {
    pub token_id: String,
}

/// Verified access token, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    /// Reads the base64 Ed25519 key from `JWT_PRIVATE_KEY`.
    pub fn from_env_with_expiry(
        access_token_expiry: i64,
        refresh_token_expiry: i64,
        issuer: Option<String>,
        audience: Option<String>,
    ) -> Self {
        use base64::Engine;

        let private_key_b64 =
            std::env::var("JWT_PRIVATE_KEY").expect("JWT_PRIVATE_KEY must be set");

        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(&private_key_b64)
            .expect("JWT_PRIVATE_KEY must be valid base64");

        let key_pair = Ed25519KeyPair::from_bytes(&key_bytes)
            .expect("JWT_PRIVATE_KEY must be a valid Ed25519 key");

        Self {
            access_token_expiry,
            refresh_token_expiry,
            issuer,
            audience,
            ..Self::from_key_pair(key_pair)
        }
    }

    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: None,
            audience: None,
        }
    }

    /// Returns a fresh base64 private key, suitable for `JWT_PRIVATE_KEY`.
    pub fn generate_private_key() -> String {
        use base64::Engine;

        let key_pair = Ed25519KeyPair::generate();
        base64::engine::general_purpose::STANDARD.encode(key_pair.to_bytes())
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        (self.refresh_token_expiry / 86_400).max(1)
    }

    fn stamp<T>(&self, claims: JWTClaims<T>, user_id: Uuid) -> JWTClaims<T> {
        let mut claims = claims.with_subject(user_id.to_string());
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        claims
    }

    fn verification_options(&self) -> VerificationOptions {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            options.allowed_issuers = Some(HashSet::from([issuer.clone()]));
        }
        if let Some(audience) = &self.audience {
            options.allowed_audiences = Some(HashSet::from([audience.clone()]));
        }
        options
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<String, jwt_simple::Error> {
        let claims = jwt_simple::claims::Claims::with_custom_claims(
            AccessClaims {
                username: username.to_string(),
            },
            Duration::from_secs(self.access_token_expiry as u64),
        );

        self.key_pair.sign(self.stamp(claims, user_id))
    }

    pub fn generate_refresh_token(&self, user_id: Uuid) -> Result<String, jwt_simple::Error> {
        let claims = jwt_simple::claims::Claims::with_custom_claims(
            RefreshCustomClaims {
                token_id: Uuid::new_v4().to_string(),
            },
            Duration::from_secs(self.refresh_token_expiry as u64),
        );

        self.key_pair.sign(self.stamp(claims, user_id))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<AccessClaims>(token, Some(self.verification_options()))?;

        Ok(Claims {
            sub: token_data.subject.unwrap_or_default(),
            username: token_data.custom.username,
            exp: token_data.expires_at.map(|t| t.as_secs() as i64).unwrap_or(0),
            iat: token_data.issued_at.map(|t| t.as_secs() as i64).unwrap_or(0),
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let token_data = self
            .public_key
            .verify_token::<RefreshCustomClaims>(token, Some(self.verification_options()))?;

        Ok(RefreshClaims {
            sub: token_data.subject.unwrap_or_default(),
            token_id: token_data.custom.token_id,
            exp: token_data.expires_at.map(|t| t.as_secs() as i64).unwrap_or(0),
            iat: token_data.issued_at.map(|t| t.as_secs() as i64).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_access_token_carries_username() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "webmaster")
            .expect("Token generation should succeed");
        let claims = config
            .verify_access_token(&token)
            .expect("Token verification should succeed");

        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.username, "webmaster");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let first = config.generate_refresh_token(user_id).unwrap();
        let second = config.generate_refresh_token(user_id).unwrap();
        assert_ne!(first, second);

        let claims = config.verify_refresh_token(&first).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let config = test_config();
        let token = config.generate_refresh_token(Uuid::new_v4()).unwrap();
        assert!(config.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let signer = test_config();
        let other = test_config();

        let token = signer
            .generate_access_token(Uuid::new_v4(), "member")
            .unwrap();
        assert!(other.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_issuer_is_enforced() {
        let mut signer = test_config();
        signer.issuer = Some("robotech".to_string());
        let token = signer.generate_access_token(Uuid::new_v4(), "member").unwrap();

        let mut verifier = signer.clone();
        assert!(verifier.verify_access_token(&token).is_ok());

        verifier.issuer = Some("someone-else".to_string());
        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_generated_private_key_round_trips() {
        use base64::Engine;

        let encoded = JwtConfig::generate_private_key();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let config = JwtConfig::from_key_pair(Ed25519KeyPair::from_bytes(&bytes).unwrap());

        let token = config.generate_access_token(Uuid::new_v4(), "admin").unwrap();
        assert!(config.verify_access_token(&token).is_ok());
    }

    #[test]
    fn test_refresh_expiry_days() {
        let config = test_config();
        assert_eq!(config.refresh_token_expiry_days(), 7);
    }
}
