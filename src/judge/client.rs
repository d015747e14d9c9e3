//! Sandbox RPC client
//!
//! Every judge worker exposes `/ping`, `/judge` and `/compile_spj`. Requests
//! carry the hashed shared token and responses come back in an
//! `{"err": .., "data": ..}` envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::{endpoints, sandbox_errors, JUDGE_SERVER_TOKEN_HEADER},
    error::JudgeError,
    judge::languages::{CompileConfig, LanguageConfig, SpjRunConfig},
    models::{CaseResult, IoMode, JudgeStatus},
};

/// Body of `POST /judge`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeRequest {
    pub language_config: LanguageConfig,
    pub src: String,
    /// Milliseconds
    pub max_cpu_time: i64,
    /// Bytes
    pub max_memory: i64,
    pub test_case_id: String,
    pub output: bool,
    pub spj_version: Option<String>,
    pub spj_config: Option<SpjRunConfig>,
    pub spj_compile_config: Option<CompileConfig>,
    pub spj_src: Option<String>,
    pub io_mode: IoMode,
}

/// Body of `POST /compile_spj`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileSpjRequest {
    pub src: String,
    pub spj_version: String,
    pub spj_compile_config: CompileConfig,
}

/// `data` of a successful `/ping`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingInfo {
    pub judger_version: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub cpu_core: Option<i32>,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
}

/// Calls into a sandbox worker reachable at `service_url`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn ping(&self, service_url: &str) -> Result<PingInfo, JudgeError>;

    /// Run a submission against every test case. `timeout` covers the whole call.
    async fn judge(
        &self,
        service_url: &str,
        request: &JudgeRequest,
        timeout: Duration,
    ) -> Result<Vec<CaseResult>, JudgeError>;

    /// Compile a special judge. A compiler failure is `JudgeError::Compile`.
    async fn compile_spj(
        &self,
        service_url: &str,
        request: &CompileSpjRequest,
    ) -> Result<(), JudgeError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    data: Value,
}

/// reqwest-backed sandbox client shared by all dispatchers
#[derive(Debug, Clone)]
pub struct HttpSandboxClient {
    http: reqwest::Client,
    token_hash: String,
    compile_timeout: Duration,
    ping_timeout: Duration,
}

impl HttpSandboxClient {
    pub fn new(
        token_hash: impl Into<String>,
        compile_timeout: Duration,
        ping_timeout: Duration,
    ) -> Result<Self, JudgeError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JudgeError::Client(format!("Unable to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_hash: token_hash.into(),
            compile_timeout,
            ping_timeout,
        })
    }

    async fn post<B>(
        &self,
        service_url: &str,
        endpoint: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Value, JudgeError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = format!("{}/{}", service_url.trim_end_matches('/'), endpoint);

        let response = self
            .http
            .post(&url)
            .header(JUDGE_SERVER_TOKEN_HEADER, &self.token_hash)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Client(format!(
                "{} answered HTTP {}: {}",
                url, status, body
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        match envelope.err {
            Some(err) => Err(classify_sandbox_error(&err, &envelope.data)),
            None => Ok(envelope.data),
        }
    }
}

#[async_trait]
impl SandboxClient for HttpSandboxClient {
    async fn ping(&self, service_url: &str) -> Result<PingInfo, JudgeError> {
        let data = self
            .post(service_url, endpoints::PING, &serde_json::json!({}), self.ping_timeout)
            .await?;
        serde_json::from_value(data)
            .map_err(|e| JudgeError::Client(format!("Malformed ping response: {}", e)))
    }

    async fn judge(
        &self,
        service_url: &str,
        request: &JudgeRequest,
        timeout: Duration,
    ) -> Result<Vec<CaseResult>, JudgeError> {
        let data = self
            .post(service_url, endpoints::JUDGE, request, timeout)
            .await?;
        normalize_cases(data)
    }

    async fn compile_spj(
        &self,
        service_url: &str,
        request: &CompileSpjRequest,
    ) -> Result<(), JudgeError> {
        let data = self
            .post(service_url, endpoints::COMPILE_SPJ, request, self.compile_timeout)
            .await?;
        match data.as_str() {
            Some("success") => Ok(()),
            _ => Err(JudgeError::Compile(data_message(&data))),
        }
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> JudgeError {
    if error.is_decode() || error.is_builder() {
        JudgeError::Client(format!("{}: {}", url, error))
    } else {
        JudgeError::Transport(format!("{}: {}", url, error))
    }
}

fn classify_sandbox_error(err: &str, data: &Value) -> JudgeError {
    let message = data_message(data);
    match err {
        sandbox_errors::COMPILE_ERROR | sandbox_errors::SPJ_COMPILE_ERROR => {
            JudgeError::Compile(message)
        }
        _ => JudgeError::Client(format!("{}: {}", err, message)),
    }
}

fn data_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestCaseName {
    Text(String),
    Number(i64),
}

impl From<TestCaseName> for String {
    fn from(name: TestCaseName) -> Self {
        match name {
            TestCaseName::Text(s) => s,
            TestCaseName::Number(n) => n.to_string(),
        }
    }
}

/// Per-case result as sandboxes actually send it
#[derive(Debug, Deserialize)]
struct RawCaseResult {
    #[serde(alias = "test_case_id", alias = "testcase")]
    test_case: TestCaseName,
    #[serde(alias = "status")]
    result: i32,
    #[serde(default, alias = "cpu", alias = "time")]
    cpu_time: i64,
    #[serde(default, alias = "real")]
    real_time: i64,
    #[serde(default, alias = "mem")]
    memory: i64,
    #[serde(default)]
    signal: i32,
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    error: i32,
    #[serde(default)]
    output_md5: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

impl From<RawCaseResult> for CaseResult {
    fn from(raw: RawCaseResult) -> Self {
        Self {
            test_case: raw.test_case.into(),
            result: JudgeStatus::from_code(raw.result).unwrap_or(JudgeStatus::SystemError),
            cpu_time: raw.cpu_time,
            real_time: raw.real_time,
            memory: raw.memory,
            signal: raw.signal,
            exit_code: raw.exit_code,
            error: raw.error,
            output_md5: raw.output_md5,
            output: raw.output,
            score: None,
        }
    }
}

/// Turn the `/judge` payload into results ordered by test case number
pub fn normalize_cases(data: Value) -> Result<Vec<CaseResult>, JudgeError> {
    let raw: Vec<RawCaseResult> = serde_json::from_value(data)
        .map_err(|e| JudgeError::Client(format!("Malformed judge response: {}", e)))?;

    let mut cases: Vec<CaseResult> = raw.into_iter().map(CaseResult::from).collect();
    cases.sort_by(|a, b| case_order(&a.test_case).cmp(&case_order(&b.test_case)));
    Ok(cases)
}

/// Numeric names first in numeric order, anything else after by name
fn case_order(name: &str) -> (bool, Option<u64>, &str) {
    let number = name.parse::<u64>().ok();
    (number.is_none(), number, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::json;

    const TOKEN_HASH: &str = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";

    fn client() -> HttpSandboxClient {
        HttpSandboxClient::new(TOKEN_HASH, Duration::from_secs(2), Duration::from_secs(2)).unwrap()
    }

    fn request() -> JudgeRequest {
        let handler = crate::judge::languages::LanguageHandler::for_language("C").unwrap();
        JudgeRequest {
            language_config: handler.language_config(&IoMode::default()),
            src: "int main(){}".to_string(),
            max_cpu_time: 1000,
            max_memory: 256 * 1024 * 1024,
            test_case_id: "tc".to_string(),
            output: false,
            spj_version: None,
            spj_config: None,
            spj_compile_config: None,
            spj_src: None,
            io_mode: IoMode::default(),
        }
    }

    /// Serve `router` on an ephemeral port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_normalize_sorts_numerically_and_maps_aliases() {
        let data = json!([
            {"test_case": "10", "result": 0, "cpu_time": 5, "real_time": 6, "memory": 100},
            {"test_case_id": 2, "result": -1, "cpu": 7, "real": 9, "mem": 300, "output_md5": "abc"},
            {"testcase": "1", "status": 42, "time": 1, "memory": 50},
        ]);

        let cases = normalize_cases(data).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.test_case.as_str()).collect();
        assert_eq!(names, ["1", "2", "10"]);

        assert_eq!(cases[0].result, JudgeStatus::SystemError);
        assert_eq!(cases[1].result, JudgeStatus::WrongAnswer);
        assert_eq!(cases[1].cpu_time, 7);
        assert_eq!(cases[1].memory, 300);
        assert_eq!(cases[1].output_md5.as_deref(), Some("abc"));
        assert_eq!(cases[2].result, JudgeStatus::Accepted);
    }

    #[test]
    fn test_normalize_puts_named_cases_after_numbered_ones() {
        let data = json!([
            {"test_case": "sample", "result": 0},
            {"test_case": "edge", "result": 0},
            {"test_case": 12, "result": 0},
            {"test_case": 1, "result": -1},
        ]);

        let cases = normalize_cases(data).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.test_case.as_str()).collect();
        assert_eq!(names, ["1", "12", "edge", "sample"]);
        assert_eq!(cases[0].result, JudgeStatus::WrongAnswer);
    }

    #[test]
    fn test_normalize_rejects_non_array() {
        let err = normalize_cases(json!({"oops": true})).unwrap_err();
        assert!(matches!(err, JudgeError::Client(_)));
    }

    #[test]
    fn test_classify_sandbox_errors() {
        assert_eq!(
            classify_sandbox_error("CompileError", &json!("main.c:1: error")),
            JudgeError::Compile("main.c:1: error".to_string())
        );
        assert!(matches!(
            classify_sandbox_error("JudgeClientError", &json!("boom")),
            JudgeError::Client(msg) if msg.contains("boom")
        ));
    }

    #[tokio::test]
    async fn test_judge_sends_token_and_parses_cases() {
        let router = Router::new().route(
            "/judge",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let token = headers
                    .get(JUDGE_SERVER_TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if token != TOKEN_HASH || body["test_case_id"] != "tc" {
                    return Json(json!({"err": "invalid-token", "data": "bad"}));
                }
                Json(json!({
                    "err": null,
                    "data": [
                        {"test_case": "2", "result": 0, "cpu_time": 3, "real_time": 4, "memory": 10},
                        {"test_case": "1", "result": 0, "cpu_time": 1, "real_time": 2, "memory": 20}
                    ]
                }))
            }),
        );
        let url = serve(router).await;

        let cases = client()
            .judge(&url, &request(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test_case, "1");
    }

    #[tokio::test]
    async fn test_judge_compile_error_and_http_failure() {
        let router = Router::new()
            .route(
                "/judge",
                post(|| async { Json(json!({"err": "CompileError", "data": "expected ';'"})) }),
            )
            .route(
                "/compile_spj",
                post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "down") }),
            );
        let url = serve(router).await;
        let client = client();

        let err = client
            .judge(&url, &request(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, JudgeError::Compile("expected ';'".to_string()));

        let spj = CompileSpjRequest {
            src: "int main(){}".to_string(),
            spj_version: "v1".to_string(),
            spj_compile_config: crate::judge::languages::LanguageHandler::for_spj("C")
                .unwrap()
                .spj_compile_config("v1")
                .unwrap(),
        };
        let err = client.compile_spj(&url, &spj).await.unwrap_err();
        assert!(matches!(err, JudgeError::Client(_)));
    }

    #[tokio::test]
    async fn test_ping_and_refused_connection() {
        let router = Router::new().route(
            "/ping",
            post(|| async {
                Json(json!({"err": null, "data": {"judger_version": "2.1.0", "cpu": 3.5, "memory": 40.0}}))
            }),
        );
        let url = serve(router).await;
        let info = client().ping(&format!("{}/", url)).await.unwrap();
        assert_eq!(info.judger_version, "2.1.0");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client().ping(&closed).await.unwrap_err();
        assert!(matches!(err, JudgeError::Transport(_)));
    }
}
