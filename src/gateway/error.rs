//! Route-boundary error type.
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as
//! `{"error": "<message>"}` with the matching status. Messages are the
//! user-facing strings the admin panel displays.

use crate::roster::RosterError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Email ou senha incorretos")]
    InvalidCredentials,
    #[error("Não autorizado")]
    Unauthorized,
    #[error("Usuário já existe")]
    Duplicate,
    #[error("Usuário não encontrado")]
    NotFound,
    #[error("Rota não encontrada")]
    RouteNotFound,
    /// Detail is logged, never sent.
    #[error("Erro interno no servidor")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Duplicate => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RosterError> for ApiError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::MissingUsername => Self::Validation("Username é obrigatório".into()),
            RosterError::Duplicate(_) => Self::Duplicate,
            RosterError::NotFound(_) => Self::NotFound,
            RosterError::Store(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref err) = self {
            tracing::error!(error = %format!("{err:#}"), "Request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let (status, body) =
            render(ApiError::Internal(anyhow::anyhow!("disk on fire at /var/data"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Erro interno no servidor");
    }

    #[tokio::test]
    async fn roster_errors_map_to_statuses() {
        let cases = [
            (RosterError::MissingUsername, StatusCode::BAD_REQUEST),
            (RosterError::Duplicate("a".into()), StatusCode::BAD_REQUEST),
            (RosterError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (
                RosterError::Store(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[tokio::test]
    async fn unauthorized_body_is_generic() {
        let (status, body) = render(ApiError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"error": "Não autorizado"}));
    }
}
