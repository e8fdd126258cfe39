use axum::{
    http::StatusCode, response::{IntoResponse, Json}
};
use serde_json::json;


#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Custom {0}")]
    Custom(String),

    #[error("Parse Error {0}")]
    ParseError(String),

    /// The classifier could not render a verdict. Never folded into a default label.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error(transparent)]
    Io(#[from] tokio::io::Error)
}

impl Error {
    pub fn custom(val: impl std::fmt::Display) -> Self {
        Self::Custom(val.to_string())
    }

    pub fn classifier(val: impl std::fmt::Display) -> Self {
        Self::ClassifierUnavailable(val.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Error::Custom(message) | Error::ParseError(message) => (StatusCode::BAD_REQUEST, message),
            Error::ClassifierUnavailable(message) => {
                tracing::error!(%message, "classifier unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, format!("classifier unavailable: {message}"))
            }
            Error::Io(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Error::ModelLoad(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        let payload = Json(json!({
            "status": "error",
            "message": message,
        }));

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_failure_maps_to_service_unavailable() {
        let resp = Error::classifier("model offline").into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn parse_error_is_client_error() {
        let resp = Error::ParseError("bad".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
