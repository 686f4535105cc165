//! Password hashing with Argon2id and the account password policy.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;

use crate::config::SecurityConfig;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_mixed_case: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_mixed_case: false,
            require_digit: false,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    pub fn from_config(security: &SecurityConfig) -> Self {
        let strict = security.require_password_complexity;
        Self {
            min_length: security.min_password_length,
            require_mixed_case: strict,
            require_digit: strict,
            require_special: strict,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_lower = password.chars().any(|c| c.is_lowercase());
        if self.require_mixed_case && !(has_upper && has_lower) {
            return Err(PasswordPolicyError::MissingMixedCase);
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyError::MissingDigit);
        }

        if self.require_special && password.chars().all(|c| c.is_alphanumeric()) {
            return Err(PasswordPolicyError::MissingSpecial);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PasswordPolicyError {
    TooShort { min_length: usize },
    MissingMixedCase,
    MissingDigit,
    MissingSpecial,
}

impl std::fmt::Display for PasswordPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordPolicyError::TooShort { min_length } => {
                write!(f, "Password must be at least {} characters", min_length)
            }
            PasswordPolicyError::MissingMixedCase => {
                write!(f, "Password must mix uppercase and lowercase letters")
            }
            PasswordPolicyError::MissingDigit => {
                write!(f, "Password must contain at least one digit")
            }
            PasswordPolicyError::MissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
        }
    }
}

impl std::error::Error for PasswordPolicyError {}

pub struct PasswordService;

impl PasswordService {
    /// Hashes with Argon2id using `2^memory_cost_log2` KiB of memory.
    ///
    /// Tests run with a cost of 4; production deployments should use 16 or more.
    pub fn hash_password_with_cost(
        password: &str,
        memory_cost_log2: u32,
    ) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);

        // Argon2 rejects m_cost below 8 * parallelism.
        let m_cost = (1u32 << memory_cost_log2.min(22)).max(8);

        let params =
            Params::new(m_cost, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
        Ok(password_hash.to_string())
    }

    pub fn verify_password(
        password: &str,
        password_hash: &str,
    ) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_hash_and_verify() {
        let hash = PasswordService::hash_password_with_cost("club-portal-2024", 4).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordService::verify_password("club-portal-2024", &hash).unwrap());
        assert!(!PasswordService::verify_password("club-portal-2025", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let first = PasswordService::hash_password_with_cost("same", 4).unwrap();
        let second = PasswordService::hash_password_with_cost("same", 4).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(PasswordService::verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_relaxed_policy_only_checks_length() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("password").is_ok());
        assert_eq!(
            policy.validate("short"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
    }

    #[test]
    fn test_strict_policy_from_config() {
        let mut config = Config::default_for_testing();
        config.security.require_password_complexity = true;
        let policy = PasswordPolicy::from_config(&config.security);

        assert_eq!(
            policy.validate("password1!"),
            Err(PasswordPolicyError::MissingMixedCase)
        );
        assert_eq!(
            policy.validate("Password!"),
            Err(PasswordPolicyError::MissingDigit)
        );
        assert_eq!(
            policy.validate("Password1"),
            Err(PasswordPolicyError::MissingSpecial)
        );
        assert!(policy.validate("Password1!").is_ok());
    }

    #[test]
    fn test_error_message_mentions_length() {
        let policy = PasswordPolicy {
            min_length: 10,
            ..Default::default()
        };
        let err = policy.validate("short").unwrap_err();
        assert!(err.to_string().contains("10 characters"));
    }
}
