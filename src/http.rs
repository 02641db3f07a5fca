//! HTTP 辅助工具：错误适配、安全头与地址解析。

use axum::body::Body as AxumBody;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderValue, Request};
use axum::{middleware, response::Response};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tracing::{debug, error, warn};

use crate::error::FailureReport;

/// 错误适配：记录处理器返回的失败，响应本身原样交给客户端。
///
/// 与外层的 panic 捕获一起，保证单个请求的失败不会影响监听进程。
pub async fn report_failures(request: Request<AxumBody>, next: middleware::Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    if let Some(FailureReport(reason)) = response.extensions_mut().remove::<FailureReport>() {
        let status = response.status();
        if status.is_server_error() {
            error!(%method, path, status = status.as_u16(), reason, "request failed");
        } else if status == axum::http::StatusCode::UNAUTHORIZED {
            debug!(%method, path, "credentials missing or rejected");
        } else {
            warn!(%method, path, status = status.as_u16(), reason, "request rejected");
        }
    }
    response
}

/// 添加基础安全响应头。
pub async fn add_security_headers(request: Request<AxumBody>, next: middleware::Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        axum::http::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// 取连接对端地址作为客户端 IP。
///
/// 不读取 `x-forwarded-for` 等转发头。
pub fn client_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// 探测本机在局域网中的 IPv4 地址。
///
/// UDP connect 只选择路由，不会发送任何报文。
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    use crate::error::AppError;

    fn request(path: &str) -> Request<AxumBody> {
        Request::builder()
            .uri(path)
            .body(AxumBody::empty())
            .expect("request")
    }

    async fn explode(flag: Arc<AtomicBool>) -> &'static str {
        flag.store(true, Ordering::SeqCst);
        panic!("handler exploded")
    }

    #[test]
    fn client_ip_ignores_forwarding_headers() {
        let mut req = request("/");
        assert_eq!(client_ip(&req), None);

        let peer = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 2), 51234));
        req.extensions_mut().insert(ConnectInfo(peer));
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("192.168.1.7, 10.0.0.1"));
        assert_eq!(client_ip(&req), Some(peer.ip()));
    }

    #[tokio::test]
    async fn failures_are_contained_and_reports_stripped() {
        let panicked = Arc::new(AtomicBool::new(false));
        let flag = panicked.clone();
        let app = Router::new()
            .route(
                "/fail",
                get(|| async { Err::<(), _>(AppError::Internal("boom".into())) }),
            )
            .route("/panic", get(move || explode(flag.clone())))
            .route("/ok", get(|| async { "fine" }))
            .layer(middleware::from_fn(add_security_headers))
            .layer(middleware::from_fn(report_failures))
            .layer(CatchPanicLayer::new());

        let response = app.clone().oneshot(request("/fail")).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<FailureReport>().is_none());
        assert!(response.headers().contains_key("x-content-type-options"));

        let response = app.clone().oneshot(request("/panic")).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(panicked.load(Ordering::SeqCst));

        let response = app.oneshot(request("/ok")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
