use std::net::SocketAddr;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::warn;

use crate::{
    activities,
    api::ApiResponse,
    auth, clients,
    config::AppConfig,
    developers, email, messages,
    rate_limit::rate_limit,
    request_log::log_request,
    state::AppState,
};

/// Room for several attachments plus the text fields.
const EMAIL_UPLOAD_FILES: usize = 5;

pub fn build_app(state: AppState) -> Router {
    let max_upload = state.config.max_file_size.saturating_mul(EMAIL_UPLOAD_FILES) + 1024 * 1024;
    let api = Router::new()
        .merge(auth::router())
        .merge(clients::router())
        .merge(developers::router())
        .merge(email::router(max_upload))
        .merge(messages::router())
        .merge(activities::router())
        .route("/health", get(|| async { "ok" }));

    let router = Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), log_request));

    with_security_headers(router)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors_layer(&state.config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
        .with_state(state)
}

fn with_security_headers(router: Router<AppState>) -> Router<AppState> {
    [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::REFERRER_POLICY, "no-referrer"),
        (header::X_XSS_PROTECTION, "0"),
        (HeaderName::from_static("cross-origin-resource-policy"), "same-origin"),
    ]
    .into_iter()
    .fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ))
    })
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let Some(origin) = config.client_url.as_deref() else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(origin.trim_end_matches('/')) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(e) => {
            warn!(error = %e, "CLIENT_URL is not a valid origin; allowing any origin");
            CorsLayer::permissive()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    let mut body = ApiResponse::message("Route not found");
    body.success = false;
    (StatusCode::NOT_FOUND, Json(body))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
