pub mod accounts;
pub mod healthz;
pub mod token;

use actix_web::web::Bytes;
use async_trait::async_trait;
use log::error;
use serde::de::DeserializeOwned;

use crate::guard::{GuardContext, RequestParts};
use crate::response::Response;
use crate::storage::StorageError;

/// Terminal request handler, run only after every guard of its chain allowed
/// the request.
#[async_trait(?Send)]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &GuardContext, req: &RequestParts, body: Bytes) -> Response;
}

/// Decodes a JSON request body, the error is a ready-to-send 400.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    if body.is_empty() {
        return Err(Response::bad_request("Request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| Response::bad_request(format!("Invalid request body: {e}")))
}

/// Maps a storage failure to its response. Backend details are logged, never
/// returned.
pub fn storage_error(op: &str, err: StorageError) -> Response {
    match err {
        StorageError::NotFound => Response::not_found(err.to_string()),
        StorageError::Conflict(_) => Response::conflict(err.to_string()),
        StorageError::InvalidCredentials => Response::unauthenticated(err.to_string()),
        StorageError::Backend(e) => {
            error!("Storage {op} failed: {e:#}");
            Response::error("Storage error")
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Payload {
        name: String,
    }

    #[test]
    fn test_parse_json() {
        let payload: Payload = parse_json(br#"{"name": "u1"}"#).unwrap();
        assert_eq!(payload.name, "u1");

        let bodies: [&[u8]; 4] = [b"", b"{", b"[]", br#"{"other": 1}"#];
        for body in bodies {
            let resp = parse_json::<Payload>(body).unwrap_err();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_storage_error() {
        let cases = [
            (StorageError::NotFound, StatusCode::NOT_FOUND),
            (
                StorageError::Conflict(String::from("a@b.c")),
                StatusCode::CONFLICT,
            ),
            (StorageError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                StorageError::Backend(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(storage_error("test", err).status(), status);
        }
    }
}
