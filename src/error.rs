use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IAP service manager is not initialized")]
    NotInitialized,

    #[error("failed to reach the IAP service: {0}")]
    Connect(String),

    #[error("product catalog fetch rejected: {0}")]
    Fetch(ResponseError),

    #[error("purchase submission rejected: {0}")]
    Submit(ResponseError),

    #[error("status poll rejected: {0}")]
    Poll(ResponseError),

    /// A receipt reported a status value outside the enumerated state
    /// machine. Unlike `Invalid`/`Unknown`, this is a contract violation
    /// and aborts processing of that record.
    #[error("receipt {uuid} reported {field} outside the known set: {raw}")]
    LogicFault {
        uuid: String,
        field: &'static str,
        raw: i64,
    },
}

/// Why a service response was rejected before its payload was used.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("unexpected status code {code} (error: {error:?})")]
    Status { code: StatusCode, error: String },

    #[error("unexpected media type {0:?}")]
    MediaType(String),

    #[error("empty response body")]
    EmptyBody,

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
