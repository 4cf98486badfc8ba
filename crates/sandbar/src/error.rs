use crate::protocol::{error_codes, JsonRpcError};

/// Protocol-level failures. Tool failures are never reported this way; they
/// travel inside a successful response as an error result.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("parse error")]
    Parse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ServerError {
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            ServerError::Parse => error_codes::PARSE_ERROR,
            ServerError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            ServerError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            ServerError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            ServerError::Json(_) | ServerError::Transport(_) => error_codes::INTERNAL_ERROR,
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}
