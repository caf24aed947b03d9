use crate::config::Settings;
use anyhow::{Context, Result};
use log::info;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "minAbsTSCharts")]
    min_abs_ts_charts: u64,
}

/// Client for the dashboard's session endpoints.
pub struct DashboardClient {
    client: Client,
    base_url: String,
    username: String,
    token: String,
    company_id: String,
}

impl DashboardClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.dashboard_url.trim_end_matches('/').to_string(),
            username: settings.api_username.clone(),
            token: settings.api_token.clone(),
            company_id: settings.company_id.clone(),
        })
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/v1/sessions/{}", self.base_url, session_id)
    }

    fn export_url(&self, session_id: &str) -> String {
        format!("{}/v1/sessions/export/sessions/{}", self.base_url, session_id)
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .query(&[("company", self.company_id.as_str())])
            .basic_auth(&self.username, Some(&self.token))
            .timeout(timeout)
            .send()
            .with_context(|| format!("Failed to reach {}", url))?;

        check_status(response)
    }

    /// Fetch the session's chart anchor timestamp, the zero point for
    /// screenshot offsets.
    pub fn lookup_session(&self, session_id: &str) -> Result<u64> {
        let url = self.session_url(session_id);
        info!("Looking up session {}", session_id);

        let session: SessionResponse = self
            .get(&url, LOOKUP_TIMEOUT)?
            .json()
            .context("Failed to decode session response")?;

        info!("Session anchor timestamp: {}", session.min_abs_ts_charts);
        Ok(session.min_abs_ts_charts)
    }

    /// Stream the session export bundle to `{dir}/{session_id}.zip`.
    pub fn download_export(&self, session_id: &str, dir: &Path) -> Result<PathBuf> {
        let url = self.export_url(session_id);
        let path = dir.join(format!("{}.zip", session_id));

        info!("Downloading session export to {}", path.display());

        let mut response = self.get(&url, EXPORT_TIMEOUT)?;
        let mut file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let bytes = response
            .copy_to(&mut file)
            .with_context(|| format!("Failed to download session export from {}", url))?;

        info!("Downloaded {} bytes", bytes);
        Ok(path)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        anyhow::bail!("Session not found");
    }
    if !status.is_success() {
        anyhow::bail!(
            "Dashboard request failed with status {}: {}",
            status,
            response.text().unwrap_or_else(|_| "unknown error".to_string())
        );
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Orientation;
    use std::sync::{Arc, Mutex};

    fn settings(url: &str) -> Settings {
        Settings {
            dashboard_url: url.to_string(),
            api_username: "user".to_string(),
            api_token: "token".to_string(),
            company_id: "acme".to_string(),
            session_id: "abc123".to_string(),
            orientation: Orientation::Landscape,
            port: 3333,
            sessions_dir: PathBuf::from("sessions"),
            output: PathBuf::from("output.html"),
        }
    }

    #[test]
    fn test_urls() {
        let client = DashboardClient::new(&settings("https://dash.example.com/")).unwrap();

        assert_eq!(
            client.session_url("abc123"),
            "https://dash.example.com/v1/sessions/abc123"
        );
        assert_eq!(
            client.export_url("abc123"),
            "https://dash.example.com/v1/sessions/export/sessions/abc123"
        );
    }

    #[test]
    fn test_session_response_decoding() {
        let session: SessionResponse =
            serde_json::from_str(r#"{"minAbsTSCharts": 1700000000000, "name": "run"}"#).unwrap();
        assert_eq!(session.min_abs_ts_charts, 1700000000000);
    }

    /// Requests seen by the stub dashboard: (path and query, Authorization header).
    type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

    struct Stub {
        status: axum::http::StatusCode,
        body: &'static str,
        seen: Seen,
    }

    async fn stub_handler(
        axum::extract::State(stub): axum::extract::State<Arc<Stub>>,
        uri: axum::http::Uri,
        headers: axum::http::HeaderMap,
    ) -> (axum::http::StatusCode, &'static str) {
        let auth = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        stub.seen.lock().unwrap().push((uri.to_string(), auth));
        (stub.status, stub.body)
    }

    /// Serve a canned response on 127.0.0.1 from a background runtime.
    fn spawn_dashboard(status: u16, body: &'static str) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let stub = Arc::new(Stub {
            status: axum::http::StatusCode::from_u16(status).unwrap(),
            body,
            seen: seen.clone(),
        });

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let app = axum::Router::new()
                    .fallback(stub_handler)
                    .with_state(stub);
                axum::serve(listener, app).await.unwrap();
            });
        });

        (format!("http://{}", addr), seen)
    }

    #[test]
    fn test_lookup_sends_company_and_basic_auth() {
        let (url, seen) = spawn_dashboard(200, r#"{"minAbsTSCharts": 1700000000000}"#);
        let client = DashboardClient::new(&settings(&url)).unwrap();

        assert_eq!(client.lookup_session("abc123").unwrap(), 1700000000000);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "/v1/sessions/abc123?company=acme");
        // base64("user:token")
        assert_eq!(seen[0].1.as_deref(), Some("Basic dXNlcjp0b2tlbg=="));
    }

    #[test]
    fn test_lookup_not_found() {
        let (url, _) = spawn_dashboard(404, "");
        let client = DashboardClient::new(&settings(&url)).unwrap();

        let err = client.lookup_session("abc123").unwrap_err();
        assert_eq!(err.to_string(), "Session not found");
    }

    #[test]
    fn test_lookup_server_error_carries_status_and_body() {
        let (url, _) = spawn_dashboard(500, "database on fire");
        let client = DashboardClient::new(&settings(&url)).unwrap();

        let message = client.lookup_session("abc123").unwrap_err().to_string();
        assert!(message.contains("500"));
        assert!(message.contains("database on fire"));
    }

    #[test]
    fn test_download_export_streams_to_file() {
        let (url, seen) = spawn_dashboard(200, "PK-bundle-bytes");
        let client = DashboardClient::new(&settings(&url)).unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let path = client.download_export("abc123", tmp.path()).unwrap();

        assert_eq!(path, tmp.path().join("abc123.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK-bundle-bytes");
        assert_eq!(
            seen.lock().unwrap()[0].0,
            "/v1/sessions/export/sessions/abc123?company=acme"
        );
    }

    #[test]
    fn test_download_export_not_found_writes_nothing() {
        let (url, _) = spawn_dashboard(404, "");
        let client = DashboardClient::new(&settings(&url)).unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let err = client.download_export("abc123", tmp.path()).unwrap_err();
        assert_eq!(err.to_string(), "Session not found");
        assert!(!tmp.path().join("abc123.zip").exists());
    }
}
