use actix_web::http::header::LOCATION;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};
use serde::{Deserialize, Serialize};

use crate::guard::{Denial, REASON_BAD_REQUEST, REASON_UNAUTHENTICATED};

pub const REASON_NOT_FOUND: &str = "not_found";
pub const REASON_CONFLICT: &str = "conflict";
pub const REASON_SERVER_ERROR: &str = "server_error";
pub const REASON_BAD_PAYLOAD: &str = "bad_payload";

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommonResponse {
    pub code: u16,

    pub reason: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A wrapper struct for HTTP responses that provides convenient methods
/// for creating common response types
#[derive(Debug)]
pub struct Response {
    http_response: HttpResponse,
}

impl Response {
    pub fn bad_request(message: impl AsRef<str>) -> Self {
        Self::err_response(
            StatusCode::BAD_REQUEST,
            REASON_BAD_REQUEST,
            message.as_ref(),
        )
    }

    pub fn unauthenticated(message: impl AsRef<str>) -> Self {
        Self::err_response(
            StatusCode::UNAUTHORIZED,
            REASON_UNAUTHENTICATED,
            message.as_ref(),
        )
    }

    pub fn not_found(message: impl AsRef<str>) -> Self {
        Self::err_response(StatusCode::NOT_FOUND, REASON_NOT_FOUND, message.as_ref())
    }

    pub fn conflict(message: impl AsRef<str>) -> Self {
        Self::err_response(StatusCode::CONFLICT, REASON_CONFLICT, message.as_ref())
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self::err_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            REASON_SERVER_ERROR,
            message.as_ref(),
        )
    }

    /// Response for a body that could not be read, e.g. 413 when it is
    /// larger than the configured payload limit.
    pub fn payload_error(err: &actix_web::Error) -> Self {
        let status = err.as_response_error().status_code();
        Self::err_response(status, REASON_BAD_PAYLOAD, &err.to_string())
    }

    pub fn json<T: Serialize>(data: T) -> Self {
        Self {
            http_response: HttpResponse::Ok().json(data),
        }
    }

    pub fn created<T: Serialize>(location: impl AsRef<str>, data: T) -> Self {
        Self {
            http_response: HttpResponse::Created()
                .insert_header((LOCATION, location.as_ref()))
                .json(data),
        }
    }

    pub fn accepted() -> Self {
        Self {
            http_response: HttpResponse::Accepted().finish(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.http_response.status()
    }

    fn err_response(status: StatusCode, reason: &str, message: &str) -> Self {
        let resp = CommonResponse {
            code: status.as_u16(),
            reason: reason.to_string(),
            message: Some(message.to_string()),
        };
        Self {
            http_response: HttpResponseBuilder::new(status).json(resp),
        }
    }
}

impl From<Denial> for Response {
    fn from(denial: Denial) -> Self {
        let status =
            StatusCode::from_u16(denial.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::err_response(status, denial.reason, &denial.message)
    }
}

impl From<Response> for HttpResponse {
    fn from(val: Response) -> Self {
        val.http_response
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    async fn body_of(resp: Response) -> CommonResponse {
        let http: HttpResponse = resp.into();
        let bytes = to_bytes(http.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_denial_response() {
        let resp = Response::from(Denial::forbidden());
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = body_of(resp).await;
        assert_eq!(body.code, 403);
        assert_eq!(body.reason, "forbidden");

        let resp = Response::from(Denial::backend_error());
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(resp).await;
        assert_eq!(body.reason, "authorization_backend_error");
        assert_eq!(body.message.as_deref(), Some("Authorization backend error"));
    }

    #[tokio::test]
    async fn test_created() {
        let resp = Response::created("/accounts/u1", serde_json::json!({"id": "u1"}));
        assert_eq!(resp.status(), StatusCode::CREATED);
        let http: HttpResponse = resp.into();
        assert_eq!(http.headers().get(LOCATION).unwrap(), "/accounts/u1");
    }

    #[test]
    fn test_accepted() {
        assert_eq!(Response::accepted().status(), StatusCode::ACCEPTED);
    }
}
