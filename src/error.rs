use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Failures talking to the SQLite file. The detail is for logs only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("create schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("insert submission: {0}")]
    Insert(#[source] rusqlite::Error),

    #[error("query submissions: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("scan submission row: {0}")]
    Scan(#[source] rusqlite::Error),
}

/// Failures while producing the CSV export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv write: {0}")]
    Csv(#[from] csv::Error),

    #[error("client disconnected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level '{0}' (expected trace, debug, info, warn or error)")]
    LogLevel(String),

    #[error("logging already initialized: {0}")]
    Logging(String),
}

/// Errors surfaced to HTTP callers. Display strings are what the caller sees.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("invalid JSON body")]
    InvalidBody,

    #[error("first_name, last_name, and email are required")]
    MissingFields,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("failed to save submission")]
    Store(#[source] StoreError),

    #[error("failed to query data")]
    Export(#[source] ExportError),

    #[error("internal server error")]
    Internal,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InvalidBody | AppError::MissingFields => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Export(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());
        if let AppError::Unauthorized = self {
            res.insert_header((header::WWW_AUTHENTICATE, r#"Basic realm="Export Protected""#));
        }
        res.content_type("text/plain; charset=utf-8")
            .body(format!("{}\n", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_storage_detail() {
        let err = AppError::Store(StoreError::Insert(rusqlite::Error::InvalidQuery));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "failed to save submission");
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let res = AppError::Unauthorized.error_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let challenge = res.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert_eq!(challenge, r#"Basic realm="Export Protected""#);
    }

    #[test]
    fn client_errors_are_bad_request() {
        assert_eq!(AppError::InvalidBody.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::MissingFields.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
