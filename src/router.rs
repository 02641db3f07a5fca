//! 按运行模式组装路由表与中间件管线。
//!
//! 中间件由外到内依次为：请求追踪、panic 捕获、错误适配、安全头、
//! 令牌认证，最后才是具体处理器。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{MethodRouter, get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::auth;
use crate::config::{Mode, RECEIVE_PATH, ServerConfig, UPLOAD_FORM_PATH};
use crate::files::{self, ListingStyle};
use crate::http;
use crate::storage::Storage;
use crate::upload;

/// 构建当前模式的完整应用；路由表在此之后不再变化。
pub fn build_router(config: Arc<ServerConfig>, storage: Arc<Storage>) -> Router {
    let routes = match config.mode {
        Mode::Up => Router::new()
            .route("/", get(upload::upload_form))
            .route("/{*path}", get(upload::upload_form))
            .route(RECEIVE_PATH, receive_route()),
        Mode::Down => Router::new()
            .route("/", get(files::serve_root))
            .route("/{*path}", get(files::serve_path)),
        Mode::Both => Router::new()
            .route(UPLOAD_FORM_PATH, get(upload::upload_form))
            .route(RECEIVE_PATH, receive_route())
            .route("/", get(files::serve_root))
            .route("/{*path}", get(files::serve_path)),
    };

    info!(
        auth = !config.insecure,
        "{} the current directory for {} minutes on port {}",
        config.mode.capability(),
        config.timeout_minutes(),
        config.port
    );

    let style = ListingStyle {
        upload_banner: config.mode.shows_upload_banner(),
    };

    routes
        .layer(middleware::from_fn(auth::require_token))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(middleware::from_fn(http::report_failures))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = http::client_ip(request)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(style))
        .layer(Extension(storage))
        .layer(Extension(config))
}

fn receive_route() -> MethodRouter {
    post(upload::receive_upload).layer(DefaultBodyLimit::disable())
}
