use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{CredentialVerifier, Subject};

const ISSUER: &str = "accountd/jwt-tokenizer";

const REQUIRED_CLAIMS: [&str; 5] = ["exp", "iat", "iss", "nbf", "sub"];

/// Registered claims of an access token, `sub` is the account id.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: usize,
    iat: usize,
    iss: String,
    nbf: usize,
    sub: String,
}

/// Body of a successful `/token` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,

    /// Unix time after which the token is rejected.
    pub expire_after: u64,
}

/// Signs RS256 access tokens for authenticated accounts.
pub struct JwtTokenGenerator {
    key: EncodingKey,
    ttl_secs: usize,
}

impl JwtTokenGenerator {
    /// # Arguments
    ///
    /// * `private_key` - PEM encoded RSA private key
    /// * `ttl_secs` - How long an issued token stays valid
    pub fn new(private_key: &[u8], ttl_secs: u64) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key).context("parse token private key")?;
        Ok(Self {
            key,
            ttl_secs: ttl_secs as usize,
        })
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        Self::new(include_bytes!("testdata/private_key.pem"), 60).unwrap()
    }

    pub fn generate_token(&self, subject: &Subject, now: u64) -> Result<TokenResponse> {
        if subject.id.is_empty() {
            bail!("cannot issue a token without subject");
        }
        let now = now as usize;
        let claims = Claims {
            exp: now + self.ttl_secs,
            iat: now,
            iss: String::from(ISSUER),
            nbf: now,
            sub: subject.id.clone(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("sign token")?;
        Ok(TokenResponse {
            token,
            expire_after: claims.exp as u64,
        })
    }
}

/// Checks RS256 access tokens and resolves their subject. This is the
/// credential verifier behind the `Authorization: Bearer` header.
pub struct JwtTokenValidator {
    key: DecodingKey,
}

impl JwtTokenValidator {
    /// # Arguments
    ///
    /// * `public_key` - PEM encoded RSA public key matching the generator's
    ///   private key
    pub fn new(public_key: &[u8]) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(public_key).context("parse token public key")?;
        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn new_test() -> Self {
        Self::new(include_bytes!("testdata/public_key.pem")).unwrap()
    }

    /// Verifies signature, issuer and required claims, then the validity
    /// window against `now`.
    pub fn validate_token(&self, token: &str, now: u64) -> Result<Subject> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);

        let claims = decode::<Claims>(token, &self.key, &validation)
            .context("decode token")?
            .claims;

        if claims.sub.is_empty() {
            bail!("token has an empty subject");
        }
        let now = now as usize;
        if now >= claims.exp {
            bail!("token expired");
        }
        if now < claims.nbf {
            bail!("token not yet valid");
        }

        Ok(Subject::new(claims.sub))
    }
}

#[async_trait]
impl CredentialVerifier for JwtTokenValidator {
    async fn verify(&self, raw: &str) -> Result<Subject> {
        self.validate_token(raw, Utc::now().timestamp() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt() {
        let jwt_generator = JwtTokenGenerator::new_test();
        let jwt_validator = JwtTokenValidator::new_test();

        let subjects = [
            Subject::new("alice"),
            Subject::new("0f7c2a8e-3b1d-4c55-9d7e-1a2b3c4d5e6f"),
            Subject::new("Bob"),
        ];

        let now = Utc::now().timestamp() as u64;
        for subject in subjects {
            let token = jwt_generator.generate_token(&subject, now).unwrap();
            assert_eq!(token.expire_after, now + 60);

            let result = jwt_validator.validate_token(&token.token, now).unwrap();
            assert_eq!(result, subject);

            let result = jwt_validator.validate_token(&token.token, now + 80);
            assert!(result.is_err());
        }

        assert!(jwt_generator
            .generate_token(&Subject::new(""), now)
            .is_err());
        assert!(jwt_validator.validate_token("", now).is_err());
        assert!(jwt_validator.validate_token("not.a.token", now).is_err());
    }

    #[tokio::test]
    async fn test_verify() {
        let jwt_generator = JwtTokenGenerator::new_test();
        let jwt_validator = JwtTokenValidator::new_test();

        let now = Utc::now().timestamp() as u64;
        let token = jwt_generator
            .generate_token(&Subject::new("u1"), now)
            .unwrap();

        let subject = jwt_validator.verify(&token.token).await.unwrap();
        assert_eq!(subject.id, "u1");

        let mut tampered = token.token.clone();
        tampered.push('x');
        assert!(jwt_validator.verify(&tampered).await.is_err());
    }
}
