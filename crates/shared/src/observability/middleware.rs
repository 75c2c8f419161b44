//! HTTP 中间件
//!
//! 请求指标和请求 ID，配合 `tower-http` 的 `TraceLayer` 使用。

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use super::metrics;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 记录请求数和耗时
///
/// path 标签取路由模板（如 `/api/v1/notifications/{id}`），未匹配的请求记为 `unmatched`，
/// 避免按实际 URL 产生无界的标签基数。
///
/// ```ignore
/// let app = Router::new()
///     .route("/health", get(health))
///     .layer(axum::middleware::from_fn(http_metrics));
/// ```
pub async fn http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// 请求 ID 包装类型
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 透传或生成 `x-request-id`，并写回响应头
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
