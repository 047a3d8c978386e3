use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

const BASELINE: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("x-frame-options", "DENY"),
    ("content-security-policy", "frame-ancestors 'none'"),
    // Call records carry transcripts; nothing here should sit in a shared cache.
    ("cache-control", "no-store"),
];

/// Apply the security-header baseline to every response.
///
/// Headers a handler already set are left alone.
pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in BASELINE {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    async fn cacheable() -> impl IntoResponse {
        ([("cache-control", HeaderValue::from_static("max-age=60"))], "docs")
    }

    #[tokio::test]
    async fn apply_adds_baseline_without_overriding_handlers() {
        let app = Router::new()
            .route("/health", get(ok))
            .route("/docs", get(cacheable))
            .layer(middleware::from_fn(super::apply));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let headers = response.headers();
        for (name, value) in super::BASELINE {
            assert_eq!(headers.get(name).map(|v| v.to_str().unwrap()), Some(value), "{name}");
        }

        let response = app
            .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["cache-control"], "max-age=60");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }
}
