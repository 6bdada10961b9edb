pub mod jwt;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::{Denial, Guard, GuardContext, GuardKind, GuardResult, RequestParts};

/// The authenticated identity making a request, e.g. an account id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Verifies a raw credential (the token of a bearer header) and resolves the
/// subject it was issued to.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, raw: &str) -> Result<Subject>;
}

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("missing credential")]
    Missing,

    #[error("malformed credential")]
    Malformed,

    #[error("invalid credential")]
    Rejected(#[source] anyhow::Error),
}

impl From<AuthnError> for Denial {
    fn from(err: AuthnError) -> Self {
        Denial::unauthenticated(err.to_string())
    }
}

/// Guard establishing who the caller is from an `Authorization: Bearer`
/// header. A failure is final for the request.
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn authenticate(&self, req: &RequestParts) -> Result<Subject, AuthnError> {
        let auth = match req.authorization.as_deref() {
            Some(auth) => auth.trim(),
            None => return Err(AuthnError::Missing),
        };
        if auth.is_empty() {
            return Err(AuthnError::Missing);
        }

        let mut iter = auth.split_whitespace();
        let scheme = iter.next().ok_or(AuthnError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthnError::Malformed);
        }

        let token = iter.next().ok_or(AuthnError::Malformed)?;
        if iter.next().is_some() {
            return Err(AuthnError::Malformed);
        }

        let subject = self
            .verifier
            .verify(token)
            .await
            .map_err(AuthnError::Rejected)?;
        if subject.id.is_empty() {
            return Err(AuthnError::Rejected(anyhow::anyhow!(
                "empty subject identifier in credential"
            )));
        }

        Ok(subject)
    }
}

#[async_trait]
impl Guard for Authenticator {
    fn kind(&self) -> GuardKind {
        GuardKind::Authentication
    }

    fn name(&self) -> &str {
        "authenticate"
    }

    async fn evaluate(&self, req: &RequestParts, ctx: &mut GuardContext) -> GuardResult {
        match self.authenticate(req).await {
            Ok(subject) => {
                debug!("Authenticated {req} as '{}'", subject.id);
                ctx.set_subject(subject);
                GuardResult::Allow
            }
            Err(err) => {
                if let AuthnError::Rejected(ref cause) = err {
                    debug!("Credential for {req} rejected: {cause:#}");
                }
                GuardResult::Deny(err.into())
            }
        }
    }
}

/// Verifier accepting tokens of the form `simple-token-<subject>`.
#[cfg(test)]
pub struct SimpleToken;

#[cfg(test)]
#[async_trait]
impl CredentialVerifier for SimpleToken {
    async fn verify(&self, raw: &str) -> Result<Subject> {
        match raw.strip_prefix("simple-token-") {
            Some(id) => Ok(Subject::new(id)),
            None => anyhow::bail!("invalid simple token"),
        }
    }
}
