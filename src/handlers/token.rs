use std::sync::Arc;

use actix_web::web::Bytes;
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;

use crate::authn::jwt::JwtTokenGenerator;
use crate::authn::Subject;
use crate::guard::{GuardContext, RequestParts};
use crate::response::Response;
use crate::storage::{Storage, StorageError};

use super::{parse_json, storage_error, Handler};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

/// Exchanges account credentials for a signed access token whose subject is
/// the account id.
pub struct TokenHandler {
    storage: Arc<dyn Storage>,
    generator: Arc<JwtTokenGenerator>,
}

impl TokenHandler {
    pub fn new(storage: Arc<dyn Storage>, generator: Arc<JwtTokenGenerator>) -> Self {
        Self { storage, generator }
    }
}

#[async_trait(?Send)]
impl Handler for TokenHandler {
    async fn handle(&self, _ctx: &GuardContext, req: &RequestParts, body: Bytes) -> Response {
        let payload: TokenRequest = match parse_json(&body) {
            Ok(payload) => payload,
            Err(resp) => return resp,
        };
        if payload.email.is_empty() || payload.password.is_empty() {
            return Response::bad_request("Email and password are required");
        }

        let account = match self
            .storage
            .authenticate(&payload.email, &payload.password)
            .await
        {
            Ok(account) => account,
            Err(StorageError::InvalidCredentials) => {
                let peer = req.peer.as_deref().unwrap_or("unknown");
                info!("Login failed for '{}', from '{peer}'", payload.email);
                return Response::unauthenticated("Invalid email or password");
            }
            Err(e) => return storage_error("authenticate", e),
        };

        let now = Utc::now().timestamp() as u64;
        match self.generator.generate_token(&Subject::new(account.id), now) {
            Ok(token) => Response::json(token),
            Err(e) => {
                error!("Failed to generate token: {e:#}");
                Response::error("Generate token failed")
            }
        }
    }
}
