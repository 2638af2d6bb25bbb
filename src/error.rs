//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{name}'")]
    MissingReference { kind: &'static str, name: String },
    #[error("duplicate base path: {0}")]
    DuplicateBasePath(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Caller-caused failures. Messages are stable and returned verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("\"ids\" or \"filters\" may be used, not both. If more refined filtering is needed along with IDs, move the IDs into \"filters\". For example, ?filters={{\"$or\":[{{\"_id\":{{\"$in\":[\"id1\",\"id2\"]}}}},{{\"prop1\":\"val1\"}}]}}.")]
    ConflictingSelector,
    #[error("\"ids\" or \"filters\" are required.")]
    MissingSelector,
    #[error("One or more ID is not valid.")]
    InvalidIdentifier,
    #[error("\"filters\" are unparsable.")]
    UnparsableFilter,
    #[error("\"sort\" is unparsable.")]
    UnparsableSort,
    #[error("If \"page\" is given, then \"perPage\" is required.")]
    MissingPerPage,
    #[error("The maximum number of records allowed in one request is {max}.")]
    MaxExceeded { max: usize },
    #[error("The maximum number of records allowed in one request is \"{max}\". Please set or reduce the \"perPage\" number of records.")]
    MaxExceededPerPage { max: usize },
    #[error("\"tokenKey\" and \"recordKey\" are required.")]
    IncompleteScopeConfig,
    #[error("Token is invalid.")]
    InvalidToken,
    #[error("\"tokenKey\" value does not exist.")]
    MissingTokenField,
    #[error("\"body\" is required.")]
    EmptyBody,
    #[error("\"body\" must be an object or an array of objects.")]
    InvalidBody,
    #[error("To update multiple records separately, omit \"ids\" and \"filters\" and send the IDs on each object in the \"body\" array. Otherwise, to update multiple objects with the same body, send the body as one object literal.")]
    ArrayBodyWithSelector,
    #[error("If \"ids\" and \"filters\" are not given, then \"_id\" or \"id\" must exist on the \"body\" object(s).")]
    MissingRecordIdentifier,
    #[error("If \"body\" is an array, then \"_id\" or \"id\" must exist on each object.")]
    MissingElementIdentifier,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A value could not be cast to the store's key type.
    #[error("cast failed for value '{0}'")]
    Cast(String),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("lock poisoned: {0}")]
    Lock(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token rejected")]
    Rejected,
    #[error("token expired")]
    Expired,
    #[error("authorizer unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error("store: {0}")]
    Store(StoreError),
    #[error("authorizer: {0}")]
    Auth(AuthError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Cast(value) => {
                tracing::debug!(value = %value, "store cast failure reported as invalid identifier");
                AppError::User(UserError::InvalidIdentifier)
            }
            other => AppError::Store(other),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::User(UserError::InvalidToken) | AppError::User(UserError::MissingTokenField) => {
                (StatusCode::UNAUTHORIZED, "user_error")
            }
            AppError::User(_) => (StatusCode::BAD_REQUEST, "user_error"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            AppError::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, "auth_error"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    /// Text shown to the caller. System errors are not leaked.
    pub fn public_message(&self) -> String {
        match self {
            AppError::User(e) => e.to_string(),
            AppError::Unauthorized => UserError::InvalidToken.to_string(),
            AppError::NotFound(_) | AppError::BadRequest(_) => self.to_string(),
            AppError::Config(_) | AppError::Store(_) | AppError::Auth(_) => "internal error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.public_message(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_failure_becomes_invalid_identifier() {
        let err: AppError = StoreError::Cast("nope".into()).into();
        assert!(matches!(err, AppError::User(UserError::InvalidIdentifier)));
        assert_eq!(err.public_message(), "One or more ID is not valid.");
    }

    #[test]
    fn store_failures_are_opaque() {
        let err: AppError = StoreError::UnknownCollection("Widgets".into()).into();
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn max_message_carries_limit() {
        assert_eq!(
            UserError::MaxExceeded { max: 5 }.to_string(),
            "The maximum number of records allowed in one request is 5."
        );
    }

    #[test]
    fn conflicting_selector_suggests_filters() {
        let msg = UserError::ConflictingSelector.to_string();
        assert!(msg.contains("move the IDs into \"filters\""));
        assert!(msg.contains(r#"?filters={"$or":[{"_id":{"$in":["id1","id2"]}},{"prop1":"val1"}]}"#));
    }
}
