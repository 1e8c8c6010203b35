use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::{SessionClaims, TokenValidationError, validate_claims};

/// Verifies a session token and decodes it into claims.
pub trait JwtValidator: Send + Sync {
    fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, TokenValidationError>;
}

/// HS256 validator with a shared secret.
///
/// Time-window checks run on the decoded claims via [`validate_claims`], not
/// on registered JWT claims, so decoding verifies the signature only.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.key, &validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use farmstand_core::PrincipalId;
    use jsonwebtoken::{EncodingKey, Header};

    fn mint(secret: &str, claims: &SessionClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_a_signed_token() {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: PrincipalId::new(),
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        };
        let token = mint("secret", &claims);

        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        let decoded = validator.validate(&token, now).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: PrincipalId::new(),
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        };
        let token = mint("other-secret", &claims);

        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        assert!(matches!(
            validator.validate(&token, now).unwrap_err(),
            TokenValidationError::Malformed(_)
        ));
    }

    #[test]
    fn rejects_an_expired_token_after_signature_check() {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: PrincipalId::new(),
            issued_at: now - Duration::minutes(20),
            expires_at: now - Duration::minutes(10),
        };
        let token = mint("secret", &claims);

        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        assert_eq!(
            validator.validate(&token, now).unwrap_err(),
            TokenValidationError::Expired
        );
    }
}
