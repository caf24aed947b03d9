use crate::logs::{self, LogRange};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, error, info};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct ServerConfig {
    pub log_path: PathBuf,
    pub port: u16,
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let app = router(Arc::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Log server bound to {}", addr);
    println!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<ServerConfig>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/logs", get(logs_page))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

async fn root() -> &'static str {
    "Pong\n"
}

/// Raw query values; parsed by hand so bad input becomes a 400 body
/// instead of the extractor's plain-text rejection.
#[derive(serde::Deserialize)]
struct LogsQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn logs_page(
    State(config): State<Arc<ServerConfig>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let range = match LogRange::parse(query.from.as_deref(), query.to.as_deref()) {
        Ok(range) => range,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    debug!("Reading log lines {}..={}", range.first(), range.last());

    let path = config.log_path.clone();
    let result = tokio::task::spawn_blocking(move || logs::query_logs(&path, range)).await;

    match result {
        Ok(Ok(entries)) => Json(entries).into_response(),
        Ok(Err(e)) => {
            error!("Failed to read log lines: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read log file")
        }
        Err(e) => {
            error!("Log reader task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read log file")
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn state(log_path: PathBuf) -> State<Arc<ServerConfig>> {
        State(Arc::new(ServerConfig { log_path, port: 0 }))
    }

    fn query(from: Option<&str>, to: Option<&str>) -> Query<LogsQuery> {
        Query(LogsQuery {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_log(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("logcat.txt");
        fs::write(
            &path,
            "2024-01-01 10:00:00.1 a\n2024-01-01 10:00:02.5 b\n10:00:02.9 c\n",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_root() {
        assert_eq!(root().await, "Pong\n");
    }

    #[tokio::test]
    async fn test_logs_range() {
        let tmp = tempfile::tempdir().unwrap();
        let path = sample_log(tmp.path());

        let response = logs_page(state(path), query(Some("1"), Some("3"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!([
                { "second": 0, "entry": "2024-01-01 10:00:00.1 a", "first": true },
                { "second": 2, "entry": "2024-01-01 10:00:02.5 b", "first": true },
                { "second": 2, "entry": "10:00:02.9 c", "first": false },
            ])
        );
    }

    #[tokio::test]
    async fn test_logs_single_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = sample_log(tmp.path());

        let response = logs_page(state(path), query(Some("1"), Some("1"))).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_logs_bad_input_is_client_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = sample_log(tmp.path());

        for (from, to) in [
            (Some("2"), Some("1")),
            (Some("x"), Some("1")),
            (None, Some("5")),
            (Some("1"), None),
            (Some("0"), Some("3")),
        ] {
            let response = logs_page(state(path.clone()), query(from, to)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_logs_missing_file_is_server_error() {
        let tmp = tempfile::tempdir().unwrap();

        let response = logs_page(
            state(tmp.path().join("gone.txt")),
            query(Some("1"), Some("10")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_concurrent_queries_do_not_share_state() {
        let tmp = tempfile::tempdir().unwrap();
        let path = sample_log(tmp.path());

        let (full, tail) = tokio::join!(
            logs_page(state(path.clone()), query(Some("1"), Some("3"))),
            logs_page(state(path.clone()), query(Some("2"), Some("3"))),
        );

        let full = body_json(full).await;
        let tail = body_json(tail).await;
        assert_eq!(full[2]["second"], 2);
        assert_eq!(tail[0]["second"], 0);
        assert_eq!(tail[1]["second"], 0);
    }

    #[tokio::test]
    async fn test_router_routes_and_cors() {
        use axum::body::Body;
        use axum::http::{header, Request};
        use tower::ServiceExt;

        let tmp = tempfile::tempdir().unwrap();
        let app = router(Arc::new(ServerConfig {
            log_path: sample_log(tmp.path()),
            port: 0,
        }));

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Pong\n");

        let response = app
            .clone()
            .oneshot(
                Request::get("/logs?from=1&to=1")
                    .header(header::ORIGIN, "null")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&header::HeaderValue::from_static("*"))
        );
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let response = app
            .oneshot(
                Request::get("/logs?from=x&to=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("from"));
    }
}
