use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Result, SkAssistError};

pub const HEADER_MODEL: &str = "x-ms-sk-completion-model";
pub const HEADER_ENDPOINT: &str = "x-ms-sk-completion-endpoint";
pub const HEADER_API_KEY: &str = "x-ms-sk-completion-key";
pub const HEADER_BACKEND: &str = "x-ms-sk-completion-backend";

/// Outbound prompt payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ask {
    pub value: String,
}

/// Inbound answer payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResult {
    pub value: String,
}

/// Skill and function path segments.  The service owns the meaning of the
/// pair; nothing here restricts which names are valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRef {
    pub skill_name: String,
    pub function_name: String,
}

impl SkillRef {
    pub fn new(skill_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            function_name: function_name.into(),
        }
    }

    pub fn invoke_path(&self) -> String {
        format!(
            "/api/skills/{}/invoke/{}",
            self.skill_name, self.function_name
        )
    }
}

impl Default for SkillRef {
    fn default() -> Self {
        Self::new("Code", "Ask")
    }
}

impl std::fmt::Display for SkillRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.skill_name, self.function_name)
    }
}

// -- Invoker trait ----------------------------------------------------------

/// Anything that can run a skill function for a prompt.  The HTTP client is
/// the production implementation; tests substitute their own.
#[async_trait::async_trait]
pub trait SkillInvoker: Send + Sync {
    async fn invoke(
        &self,
        ask: &Ask,
        skill: &SkillRef,
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> Result<AskResult>;
}

// -- HTTP client ------------------------------------------------------------

/// Client for the Semantic Kernel skill service.
///
/// Connection parameters travel as request headers on every call, so one
/// client serves any number of configurations.  No retries.
pub struct SkillClient {
    client: Client,
}

struct ServiceRequest<'a, B: Serialize> {
    command_path: String,
    /// GET when unset.
    method: Option<Method>,
    body: Option<&'a B>,
    config: &'a ConnectionConfig,
    timeout: Duration,
}

impl SkillClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sk-assist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SkAssistError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get_response<T, B>(&self, request: ServiceRequest<'_, B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let ServiceRequest {
            command_path,
            method,
            body,
            config,
            timeout,
        } = request;

        let url = format!("{}{}", config.service_url()?, command_path);
        let method = method.unwrap_or(Method::GET);

        debug!(%method, url = %url, backend = ?config.completion_backend, "calling skill service");

        let mut req = self
            .client
            .request(method, &url)
            .timeout(timeout)
            .header(HEADER_ENDPOINT, config.endpoint.as_str())
            .header(HEADER_BACKEND, config.completion_backend.header_value());

        if let Some(ref model) = config.deployment_or_model_id {
            req = req.header(HEADER_MODEL, model.as_str());
        }
        if let Some(ref key) = config.api_key {
            req = req.header(HEADER_API_KEY, key.as_str());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let status_text = status_text(&resp);
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "skill service returned an error");
            return Err(SkAssistError::RemoteInvocation {
                status: status.as_u16(),
                status_text,
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            SkAssistError::ResponseFormat(format!("invalid response from skill service: {e}"))
        })
    }
}

/// Reason phrase the server actually sent, falling back to the canonical one
/// for the code and then to the bare number.
fn status_text(resp: &reqwest::Response) -> String {
    let status = resp.status();
    match resp.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string()),
    }
}

#[async_trait::async_trait]
impl SkillInvoker for SkillClient {
    async fn invoke(
        &self,
        ask: &Ask,
        skill: &SkillRef,
        config: &ConnectionConfig,
        timeout: Duration,
    ) -> Result<AskResult> {
        let result: AskResult = self
            .get_response(ServiceRequest {
                command_path: skill.invoke_path(),
                method: Some(Method::POST),
                body: Some(ask),
                config,
                timeout,
            })
            .await?;

        info!(
            skill = %skill,
            prompt_len = ask.value.len(),
            response_len = result.value.len(),
            "skill response received"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionBackend;
    use crate::error::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config_for(url: &str) -> ConnectionConfig {
        ConnectionConfig {
            api_key: Some("K".into()),
            deployment_or_model_id: Some("M".into()),
            endpoint: "E".into(),
            completion_backend: CompletionBackend::OpenAi,
            service_url: Some(url.into()),
        }
    }

    fn ask(value: &str) -> Ask {
        Ask {
            value: value.into(),
        }
    }

    #[test]
    fn invoke_path_uses_both_segments() {
        assert_eq!(
            SkillRef::new("Code", "FindProblem").invoke_path(),
            "/api/skills/Code/invoke/FindProblem"
        );
        assert_eq!(SkillRef::default(), SkillRef::new("Code", "Ask"));
    }

    #[tokio::test]
    async fn posts_ask_with_connection_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/skills/Code/invoke/Ask"))
            .and(header(HEADER_MODEL, "M"))
            .and(header(HEADER_ENDPOINT, "E"))
            .and(header(HEADER_API_KEY, "K"))
            .and(header(HEADER_BACKEND, "1"))
            .and(body_json(json!({ "value": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "hi" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SkillClient::new().unwrap();
        let result = client
            .invoke(&ask("hello"), &SkillRef::default(), &config_for(&server.uri()), TIMEOUT)
            .await
            .expect("request should succeed");
        assert_eq!(result.value, "hi");
    }

    #[tokio::test]
    async fn absent_model_and_key_are_not_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "ok" })))
            .mount(&server)
            .await;

        let mut config = config_for(&server.uri());
        config.api_key = None;
        config.deployment_or_model_id = None;

        SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config, TIMEOUT)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get(HEADER_API_KEY).is_none());
        assert!(requests[0].headers.get(HEADER_MODEL).is_none());
        assert_eq!(requests[0].headers.get(HEADER_BACKEND).unwrap(), "1");
    }

    #[tokio::test]
    async fn server_error_maps_to_status_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config_for(&server.uri()), TIMEOUT)
            .await
            .expect_err("500 should fail");

        match &err {
            SkAssistError::RemoteInvocation { status, status_text } => {
                assert_eq!(*status, 500);
                assert_eq!(status_text, "Internal Server Error");
            }
            other => panic!("expected remote invocation error, got {other:?}"),
        }
        assert_eq!(err.panel_text(), "[ERROR] Internal Server Error");
    }

    /// Serve one request with a raw HTTP/1.1 reply, for status lines wiremock
    /// cannot produce.
    async fn raw_reply_server(reply: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            // read headers, then the declared body, before replying
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < body_start + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn server_reason_phrase_is_kept() {
        let url = raw_reply_server(
            "HTTP/1.1 500 Internal Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\nboom",
        )
        .await;

        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config_for(&url), TIMEOUT)
            .await
            .expect_err("500 should fail");

        match &err {
            SkAssistError::RemoteInvocation { status, status_text } => {
                assert_eq!(*status, 500);
                assert_eq!(status_text, "Internal Error");
            }
            other => panic!("expected remote invocation error, got {other:?}"),
        }
        assert_eq!(err.panel_text(), "[ERROR] Internal Error");
    }

    #[tokio::test]
    async fn non_json_body_is_format_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config_for(&server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseFormat);
    }

    #[tokio::test]
    async fn missing_value_field_is_format_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "x" })))
            .mount(&server)
            .await;

        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config_for(&server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseFormat);
        assert!(err.to_string().contains("value"));
    }

    #[tokio::test]
    async fn slow_service_times_out_as_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "value": "late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = SkillClient::new()
            .unwrap()
            .invoke(
                &ask("x"),
                &SkillRef::default(),
                &config_for(&server.uri()),
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config_for("http://127.0.0.1:1"), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn missing_service_url_never_sends() {
        let mut config = config_for("http://unused");
        config.service_url = None;

        let err = SkillClient::new()
            .unwrap()
            .invoke(&ask("x"), &SkillRef::default(), &config, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
    }
}
