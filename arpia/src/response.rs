//! Response body plumbing shared by the adapter and built-in endpoints.

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::Error;

pub type BoxBody = Full<Bytes>;

/// Builds a JSON response, falling back to a bare 500 if serialization
/// of the payload itself fails.
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<BoxBody> {
    match serde_json::to_vec(payload) {
        Ok(body) => Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| empty(StatusCode::INTERNAL_SERVER_ERROR)),
        Err(_) => empty(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub fn html_response(status: StatusCode, body: impl Into<String>) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(body.into())))
        .unwrap_or_else(|_| empty(StatusCode::INTERNAL_SERVER_ERROR))
}

fn empty(status: StatusCode) -> Response<BoxBody> {
    let mut res = Response::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    res
}

impl Error {
    /// Converts this error into its wire response: status per the error
    /// taxonomy, body in the `{error, details}` shape.
    pub fn into_response(self) -> Response<BoxBody> {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        json_response(status, &self.wire())
    }
}
