use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequest, Request as AxumRequest},
    http::Request,
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, FieldError};

/// [`axum::Json`] whose rejections come back as [`AppError`] in the API envelope.
pub struct Json<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: AxumRequest, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(inner)) => Ok(Json(inner)),
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "request body rejected");
                Err(match rejection {
                    JsonRejection::JsonDataError(e) => {
                        AppError::Validation(vec![FieldError::new("body", e.body_text())])
                    }
                    JsonRejection::JsonSyntaxError(e) => AppError::BadRequest(e.body_text()),
                    JsonRejection::MissingJsonContentType(_) => {
                        AppError::BadRequest("Expected a JSON request body".into())
                    }
                    JsonRejection::BytesRejection(e) => AppError::BadRequest(e.body_text()),
                    other => {
                        warn!(error = ?other, "unhandled json rejection");
                        AppError::BadRequest(other.body_text())
                    }
                })
            }
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "emailSent", skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<bool>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            email_sent: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_email_sent(mut self, sent: bool) -> Self {
        self.email_sent = Some(sent);
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            email_sent: None,
        }
    }
}

/// Client IP for rate limiting. With `trust_proxy` the first `X-Forwarded-For`
/// hop, then `X-Real-IP`, are used; otherwise only the socket peer counts.
pub fn client_ip<B>(req: &Request<B>, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(req) {
            return ip;
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip<B>(req: &Request<B>) -> Option<String> {
    let headers = req.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}
