use std::sync::Arc;

use actix_web::web::Bytes;
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::guard::{GuardContext, RequestParts};
use crate::response::Response;
use crate::storage::{NewAccount, Storage};

use super::{parse_json, storage_error, Handler};

/// Route parameter holding the account id.
pub const ID_PARAM: &str = "id";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 6, max = 254))]
    pub password: String,

    /// Free-form account data, a JSON document encoded as a string.
    #[serde(default)]
    #[validate(custom(function = "validate_data"))]
    pub data: Option<String>,
}

impl CreateAccountRequest {
    /// Returns the account data to store, `{}` when none was given.
    pub fn account_data(&self) -> serde_json::Result<serde_json::Value> {
        match self.data.as_deref() {
            None | Some("") => Ok(serde_json::json!({})),
            Some(raw) => serde_json::from_str(raw),
        }
    }
}

fn validate_data(data: &str) -> Result<(), ValidationError> {
    if data.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("json")),
    }
}

pub struct CreateAccountHandler {
    storage: Arc<dyn Storage>,
}

impl CreateAccountHandler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait(?Send)]
impl Handler for CreateAccountHandler {
    async fn handle(&self, _ctx: &GuardContext, _req: &RequestParts, body: Bytes) -> Response {
        let payload: CreateAccountRequest = match parse_json(&body) {
            Ok(payload) => payload,
            Err(resp) => return resp,
        };
        if let Err(e) = payload.validate() {
            return Response::bad_request(format!("Invalid account: {e}"));
        }
        let data = match payload.account_data() {
            Ok(data) => data,
            Err(e) => return Response::bad_request(format!("Invalid account data: {e}")),
        };

        let account = NewAccount {
            id: Uuid::new_v4().to_string(),
            email: payload.email,
            password: payload.password,
            data,
            create_time: Utc::now().timestamp() as u64,
        };
        match self.storage.create(account).await {
            Ok(account) => {
                info!("Account '{}' created", account.id);
                let location = format!("/accounts/{}", account.id);
                Response::created(location, account)
            }
            Err(e) => storage_error("create", e),
        }
    }
}

pub struct GetAccountHandler {
    storage: Arc<dyn Storage>,
}

impl GetAccountHandler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait(?Send)]
impl Handler for GetAccountHandler {
    async fn handle(&self, _ctx: &GuardContext, req: &RequestParts, _body: Bytes) -> Response {
        let id = match req.param(ID_PARAM) {
            Some(id) => id,
            None => return Response::bad_request("No id given"),
        };
        match self.storage.get(id).await {
            Ok(account) => Response::json(account),
            Err(e) => storage_error("get", e),
        }
    }
}

pub struct DeleteAccountHandler {
    storage: Arc<dyn Storage>,
}

impl DeleteAccountHandler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait(?Send)]
impl Handler for DeleteAccountHandler {
    async fn handle(&self, _ctx: &GuardContext, req: &RequestParts, _body: Bytes) -> Response {
        let id = match req.param(ID_PARAM) {
            Some(id) => id,
            None => return Response::bad_request("No id given"),
        };
        // Whatever the cause, a failed delete is a server error
        match self.storage.delete(id).await {
            Ok(()) => {
                info!("Account '{id}' deleted");
                Response::accepted()
            }
            Err(e) => {
                error!("Delete account '{id}': {e:#}");
                Response::error("Delete account failed")
            }
        }
    }
}
