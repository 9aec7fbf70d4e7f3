//! HTTP client for the grid worker agent

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Client for one agent's HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client; `timeout` of `None` waits indefinitely
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid agent URL")?;
        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path)?);
        let response = send(request).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a PUT request with query parameters and no body
    pub async fn put<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let request = self.client.put(self.url(path)?).query(query);
        let response = send(request).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with query parameters and a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.url(path)?).query(query).json(body);
        let response = send(request).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a DELETE request that answers with no body
    pub async fn delete(&self, path: &str) -> Result<()> {
        send(self.client.delete(self.url(path)?)).await?;
        Ok(())
    }

    /// Fetch capacity
    pub async fn load(&self) -> Result<LoadReport> {
        self.get("server/load").await
    }

    /// Start the load generator; returns its container id
    pub async fn stress(&self, percent: u32, duration_secs: u64) -> Result<String> {
        self.put(
            "server/load",
            &[
                ("percent", percent.to_string()),
                ("timestamp", duration_secs.to_string()),
            ],
        )
        .await
    }

    pub async fn run(
        &self,
        image: &str,
        environment: &HashMap<String, String>,
        wait: bool,
    ) -> Result<RunResponse> {
        self.post(
            "docker/run",
            &[("image", image.to_string()), ("waited", wait.to_string())],
            environment,
        )
        .await
    }

    pub async fn containers(&self) -> Result<Vec<Job>> {
        self.get("docker/containers").await
    }

    pub async fn reclaim(&self) -> Result<()> {
        self.delete("docker/containers/all").await
    }

    /// Health is read even when the agent answers 503
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .client
            .get(self.url("healthz")?)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse response")
    }
}

/// Send a request, turning non-2xx answers into errors carrying the agent's message
async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.context("Failed to send request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiFailure::from_body(status.as_u16(), &body).into());
    }

    Ok(response)
}

/// A non-2xx answer from the agent
#[derive(Debug)]
pub struct ApiFailure {
    pub status: u16,
    pub message: String,
    pub failures: Vec<ReclaimFailure>,
}

impl ApiFailure {
    fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(err) => Self {
                status,
                message: err.error,
                failures: err.failures.unwrap_or_default(),
            },
            Err(_) => Self {
                status,
                message: body.to_string(),
                failures: Vec::new(),
            },
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error ({}): {}", self.status, self.message)
    }
}

impl std::error::Error for ApiFailure {}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub cpu_load: f64,
    #[serde(rename = "total_FLOPS")]
    pub total_flops: f64,
    #[serde(rename = "available_FLOPS")]
    pub available_flops: f64,
    #[serde(rename = "available_FLOPS_percentage")]
    pub available_flops_percentage: f64,
    /// GiB
    #[serde(rename = "available_RAM")]
    pub available_ram: f64,
    /// MHz
    pub current_freq: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuLoadReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuLoadReport {
    pub gpu_load: f64,
    pub gpu_load_source: String,
    #[serde(rename = "total_FLOPS")]
    pub total_flops: f64,
    #[serde(rename = "available_FLOPS")]
    pub available_flops: f64,
    #[serde(rename = "available_FLOPS_percentage")]
    pub available_flops_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub container_id: String,
    pub image: String,
    pub status: String,
    pub logs: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub image: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimFailure {
    pub container_id: String,
    pub stage: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<ReclaimFailure>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> ApiClient {
        ApiClient::new(&server.url(), Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_load_parses_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/server/load")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"cpu_load": 25.0, "total_FLOPS": 2.4e10, "available_FLOPS": 1.8e10,
                    "available_FLOPS_percentage": 75.0, "available_RAM": 1.0,
                    "current_freq": 3000.0}"#,
            )
            .create_async()
            .await;

        let report = client_for(&server).load().await.unwrap();

        mock.assert_async().await;
        assert_eq!(report.total_flops, 2.4e10);
        assert_eq!(report.available_flops_percentage, 75.0);
        assert_eq!(report.available_ram, 1.0);
        assert_eq!(report.current_freq, 3000.0);
        assert!(report.gpu.is_none());
    }

    #[tokio::test]
    async fn test_agent_url_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/agent1/server/load")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"cpu_load": 0.0, "total_FLOPS": 1.0e9, "available_FLOPS": 1.0e9,
                    "available_FLOPS_percentage": 100.0, "available_RAM": 2.0,
                    "current_freq": 1000.0}"#,
            )
            .expect(2)
            .create_async()
            .await;

        for base in [format!("{}/agent1", server.url()), format!("{}/agent1/", server.url())] {
            let client = ApiClient::new(&base, Some(Duration::from_secs(5))).unwrap();
            client.load().await.unwrap();
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stress_sends_query_and_reads_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/server/load")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("percent".into(), "70".into()),
                Matcher::UrlEncoded("timestamp".into(), "45".into()),
            ]))
            .with_status(200)
            .with_body(r#""c0ffee""#)
            .create_async()
            .await;

        let id = client_for(&server).stress(70, 45).await.unwrap();

        mock.assert_async().await;
        assert_eq!(id, "c0ffee");
    }

    #[tokio::test]
    async fn test_run_posts_environment_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/docker/run")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("image".into(), "bench:1".into()),
                Matcher::UrlEncoded("waited".into(), "true".into()),
            ]))
            .match_body(Matcher::Json(serde_json::json!({"THREADS": "8"})))
            .with_status(201)
            .with_body(
                r#"{"container_id": "abc", "image": "bench:1", "status": "exited",
                    "logs": {"gflops": 3.5}, "exit_code": 0}"#,
            )
            .create_async()
            .await;

        let mut env = HashMap::new();
        env.insert("THREADS".to_string(), "8".to_string());
        let result = client_for(&server).run("bench:1", &env, true).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, "exited");
        assert_eq!(result.logs["gflops"], 3.5);
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_reclaim_partial_failure_carries_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/docker/containers/all")
            .with_status(500)
            .with_body(
                r#"{"error": "reclaimed 1 of 2 containers; 1 failed",
                    "kind": "partial_reclamation",
                    "failures": [{"container_id": "b", "stage": "stop", "reason": "busy"}]}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server).reclaim().await.unwrap_err();
        let failure = err.downcast_ref::<ApiFailure>().unwrap();

        assert_eq!(failure.status, 500);
        assert!(failure.message.contains("1 of 2"));
        assert_eq!(failure.failures[0].container_id, "b");
    }

    #[tokio::test]
    async fn test_reclaim_no_content_is_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/docker/containers/all")
            .with_status(204)
            .create_async()
            .await;

        client_for(&server).reclaim().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_kept() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/docker/containers")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = client_for(&server).containers().await.unwrap_err();
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_health_reads_unhealthy_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status": "unhealthy", "components": {"runtime": {"status": "unhealthy",
                    "message": "daemon down", "last_check_timestamp": 1}}}"#,
            )
            .create_async()
            .await;

        let health = client_for(&server).health().await.unwrap();
        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["runtime"].message.as_deref(),
            Some("daemon down")
        );
    }
}
