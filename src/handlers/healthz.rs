use actix_web::web::Bytes;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::guard::{GuardContext, RequestParts};
use crate::response::Response;

use super::Handler;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthzResponse {
    pub version: String,
    pub timestamp: u64,
}

pub struct HealthzHandler;

#[async_trait(?Send)]
impl Handler for HealthzHandler {
    async fn handle(&self, _ctx: &GuardContext, _req: &RequestParts, _body: Bytes) -> Response {
        Response::json(HealthzResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().timestamp() as u64,
        })
    }
}
