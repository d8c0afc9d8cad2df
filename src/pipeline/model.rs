//! Model client adapter: send a [`ModelRequest`] and extract the reply.
//!
//! This module is intentionally thin. Prompt wording lives in
//! [`crate::prompts`], message layout in [`crate::pipeline::compose`]; here
//! we only talk HTTP, validate the response shape and classify failures.
//!
//! ## No retries here
//!
//! The adapter makes exactly one call per [`VisionModel::complete`]. Failures
//! come back as a [`ModelError`] whose [`ModelError::retry_hint`] tells the
//! caller whether backing off or resending makes sense; the retry policy
//! itself belongs to the orchestrator.

use crate::config::GenerationConfig;
use crate::error::ModelError;
use crate::pipeline::compose::{ChatMessage, ModelRequest};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Generated text plus token usage, when the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCompletion {
    /// Raw message content, untouched.
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A vision-capable chat-completion backend.
///
/// Implemented by [`OpenRouterClient`]; tests and embedders can supply
/// their own (scripted replies, caching layers, other gateways).
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier, used for diagnostics.
    fn model_name(&self) -> &str;

    /// Perform one call. Never retries.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelCompletion, ModelError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat-completion response, with every field optional so that malformed
/// replies are classified instead of failing deserialisation.
#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Option<Vec<Option<Choice>>>,
    #[serde(default)]
    pub usage: Option<Usage>,
    /// Gateways such as OpenRouter report some upstream failures inside a
    /// 200 body.
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiErrorBody>,
}

/// Validate the response shape and pull out the generated text.
///
/// * an `error` object in the body → classified by its code, exactly like an
///   HTTP status (see [`classify_status`])
/// * no choices → [`ModelError::EmptyResponse`]
/// * first choice without a message → [`ModelError::NoMessage`]
/// * missing or whitespace-only content → [`ModelError::EmptyContent`]
///
/// On success the content is returned exactly as received.
pub fn extract_content(
    response: ChatCompletionResponse,
    model: &str,
    elapsed: Duration,
) -> Result<ModelCompletion, ModelError> {
    if let Some(err) = response.error {
        return Err(classify_code(
            err.code.as_ref().and_then(error_code),
            None,
            err.message.unwrap_or_else(|| "unspecified provider error".into()),
            model,
            elapsed,
        ));
    }

    let choice = response
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or(ModelError::EmptyResponse)?;
    let message = choice
        .and_then(|c| c.message)
        .ok_or(ModelError::NoMessage)?;
    let content = message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(ModelError::EmptyContent)?;

    let usage = response.usage.unwrap_or_default();
    Ok(ModelCompletion {
        content,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    })
}

/// Map a non-success HTTP status (and its body) to a [`ModelError`].
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    model: &str,
    elapsed: Duration,
) -> ModelError {
    let retry_after_secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    classify_code(
        Some(status.as_u16()),
        retry_after_secs,
        error_message(body),
        model,
        elapsed,
    )
}

/// 429 → rate limited, 408/504 → timeout, anything else → provider error.
fn classify_code(
    code: Option<u16>,
    retry_after_secs: Option<u64>,
    message: String,
    model: &str,
    elapsed: Duration,
) -> ModelError {
    match code {
        Some(429) => ModelError::RateLimited {
            model: model.to_string(),
            retry_after_secs,
        },
        Some(408) | Some(504) => ModelError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        },
        status => ModelError::Provider { status, message },
    }
}

/// Gateways send the in-body code as a number or a numeric string.
fn error_code(code: &serde_json::Value) -> Option<u16> {
    match code {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .and_then(|c| u16::try_from(c).ok())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty error body".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        })
}

fn classify_transport(err: &reqwest::Error, elapsed: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    } else {
        ModelError::Unknown(err.to_string())
    }
}

// ── OpenRouter / OpenAI-compatible client ────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Sends the `HTTP-Referer` and `X-Title` headers that OpenRouter uses for
/// app attribution; other gateways ignore them.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    http_referer: String,
    app_title: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenRouterClient {
    /// Build a client from the generation config.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ModelError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            http_referer: config.http_referer.clone(),
            app_title: config.app_title.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VisionModel for OpenRouterClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelCompletion, ModelError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: request.messages(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        info!(
            "Calling {} ({} images) at {}",
            self.model,
            request.image_count(),
            self.endpoint
        );
        let start = Instant::now();

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.http_referer)
            .header("X-Title", &self.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = classify_transport(&e, start.elapsed());
                warn!("Model API transport failure: {}", err);
                err
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(&e, start.elapsed()))?;
        let elapsed = start.elapsed();

        if !status.is_success() {
            let err = classify_status(status, &headers, &text, &self.model, elapsed);
            warn!("Model API error after {:?}: {}", elapsed, err);
            return Err(err);
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            ModelError::Unknown(format!("undecodable response body: {e}"))
        })?;

        let completion = extract_content(parsed, &self.model, elapsed)
            .inspect_err(|e| warn!("Model API returned unusable response: {}", e))?;

        debug!(
            "Model call: {} prompt tokens, {} completion tokens, {:?}",
            completion.prompt_tokens, completion.completion_tokens, elapsed
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compose::compose;
    use crate::pipeline::normalize::EncodedSegment;
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn parse(body: &str) -> ChatCompletionResponse {
        serde_json::from_str(body).expect("fixture is valid JSON")
    }

    fn extract(response: ChatCompletionResponse) -> Result<ModelCompletion, ModelError> {
        extract_content(response, "m", Duration::from_millis(7))
    }

    #[test]
    fn zero_choices_is_empty_response() {
        let r = parse(r#"{"id": "gen-1", "choices": []}"#);
        assert_eq!(extract(r), Err(ModelError::EmptyResponse));
    }

    #[test]
    fn missing_choices_is_empty_response() {
        let r = parse(r#"{"id": "gen-1"}"#);
        assert_eq!(extract(r), Err(ModelError::EmptyResponse));
    }

    #[test]
    fn choice_without_message_is_no_message() {
        let r = parse(r#"{"choices": [{"index": 0, "finish_reason": "stop"}]}"#);
        assert_eq!(extract(r), Err(ModelError::NoMessage));

        let r = parse(r#"{"choices": [null]}"#);
        assert_eq!(extract(r), Err(ModelError::NoMessage));
    }

    #[test]
    fn empty_string_content_is_empty_content() {
        let r = parse(r#"{"choices": [{"message": {"role": "assistant", "content": ""}}]}"#);
        assert_eq!(extract(r), Err(ModelError::EmptyContent));
    }

    #[test]
    fn null_or_blank_content_is_empty_content() {
        let r = parse(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#);
        assert_eq!(extract(r), Err(ModelError::EmptyContent));

        let r = parse(r#"{"choices": [{"message": {"content": "  \n\t"}}]}"#);
        assert_eq!(extract(r), Err(ModelError::EmptyContent));
    }

    #[test]
    fn content_is_returned_verbatim() {
        let raw = "  <html>\r\n<body>hi</body></html>\n\n";
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": raw}}],
            "usage": {"prompt_tokens": 1500, "completion_tokens": 800}
        });
        let r: ChatCompletionResponse = serde_json::from_value(body).unwrap();
        let c = extract(r).unwrap();
        assert_eq!(c.content, raw);
        assert_eq!((c.prompt_tokens, c.completion_tokens), (1500, 800));
    }

    #[test]
    fn error_in_success_body_is_provider_error() {
        let r = parse(r#"{"error": {"code": 502, "message": "upstream overloaded"}}"#);
        assert_eq!(
            extract(r),
            Err(ModelError::Provider {
                status: Some(502),
                message: "upstream overloaded".into()
            })
        );
    }

    #[test]
    fn error_in_success_body_is_classified_like_a_status() {
        let r = parse(r#"{"error": {"code": 429, "message": "rate limited upstream"}}"#);
        assert_eq!(
            extract(r),
            Err(ModelError::RateLimited {
                model: "m".into(),
                retry_after_secs: None
            })
        );

        let r = parse(r#"{"error": {"code": "504", "message": "upstream timed out"}}"#);
        assert_eq!(extract(r), Err(ModelError::Timeout { elapsed_ms: 7 }));

        let r = parse(r#"{"error": {"code": 408}}"#);
        assert_eq!(extract(r), Err(ModelError::Timeout { elapsed_ms: 7 }));
    }

    #[test]
    fn unrecognised_body_code_is_provider_error_without_status() {
        let r = parse(r#"{"error": {"code": "context_length_exceeded", "message": "too long"}}"#);
        assert_eq!(
            extract(r),
            Err(ModelError::Provider {
                status: None,
                message: "too long".into()
            })
        );
    }

    #[test]
    fn status_429_is_rate_limited_with_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("20"));
        let e = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            "",
            "m",
            Duration::from_millis(5),
        );
        assert_eq!(
            e,
            ModelError::RateLimited {
                model: "m".into(),
                retry_after_secs: Some(20)
            }
        );
    }

    #[test]
    fn gateway_timeout_is_timeout() {
        let e = classify_status(
            StatusCode::GATEWAY_TIMEOUT,
            &HeaderMap::new(),
            "",
            "m",
            Duration::from_millis(1234),
        );
        assert_eq!(e, ModelError::Timeout { elapsed_ms: 1234 });
    }

    #[test]
    fn other_status_is_provider_error_with_message() {
        let e = classify_status(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"error": {"message": "image exceeds 5 MB maximum"}}"#,
            "m",
            Duration::ZERO,
        );
        assert_eq!(
            e,
            ModelError::Provider {
                status: Some(400),
                message: "image exceeds 5 MB maximum".into()
            }
        );
    }

    #[test]
    fn non_json_error_body_is_kept_as_text() {
        let e = classify_status(
            StatusCode::UNAUTHORIZED,
            &HeaderMap::new(),
            "No auth credentials found",
            "m",
            Duration::ZERO,
        );
        assert_eq!(
            e,
            ModelError::Provider {
                status: Some(401),
                message: "No auth credentials found".into()
            }
        );
    }

    #[test]
    fn request_body_omits_unset_options() {
        let req = one_image_request();
        let body = ChatCompletionRequest {
            model: "anthropic/claude-sonnet-4",
            messages: req.messages(),
            max_tokens: None,
            temperature: None,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "anthropic/claude-sonnet-4");
        assert!(v.get("max_tokens").is_none());
        assert!(v.get("temperature").is_none());
        assert_eq!(v["messages"].as_array().map(|m| m.len()), Some(2));
    }

    #[test]
    fn client_endpoint_from_config() {
        let config = GenerationConfig::builder()
            .api_key("k")
            .base_url("http://localhost:9999/v1/")
            .build()
            .unwrap();
        let client = OpenRouterClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/chat/completions");
        assert_eq!(client.model_name(), crate::config::DEFAULT_MODEL);
    }

    // ── Local HTTP stub ──────────────────────────────────────────────────────

    fn one_image_request() -> ModelRequest {
        compose(
            &[EncodedSegment {
                index: 1,
                width: 1,
                height: 1,
                quality: 85,
                data: "AA==".into(),
            }],
            None,
        )
        .unwrap()
    }

    fn client(base_url: &str, timeout_secs: u64) -> OpenRouterClient {
        let config = GenerationConfig::builder()
            .api_key("sk-test")
            .base_url(base_url)
            .http_referer("https://page2html.test")
            .app_title("page2html tests")
            .api_timeout_secs(timeout_secs)
            .build()
            .unwrap();
        OpenRouterClient::from_config(&config).unwrap()
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    /// Read one request: headers up to the blank line, then `content-length`
    /// bytes of body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Accept one connection, answer with `response`, and hand back the
    /// raw request.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (base_url, handle)
    }

    #[tokio::test]
    async fn client_sends_auth_and_attribution_headers() {
        let body = r#"{"choices": [{"message": {"content": "<html></html>"}}],
                       "usage": {"prompt_tokens": 10, "completion_tokens": 3}}"#;
        let (base_url, server) = serve_once(http_response("200 OK", "", body)).await;

        let completion = client(&base_url, 5)
            .complete(&one_image_request())
            .await
            .unwrap();
        assert_eq!(completion.content, "<html></html>");
        assert_eq!((completion.prompt_tokens, completion.completion_tokens), (10, 3));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1\r\n"), "{raw}");
        let head = raw.to_lowercase();
        assert!(head.contains("\r\nauthorization: bearer sk-test\r\n"));
        assert!(head.contains("\r\nhttp-referer: https://page2html.test\r\n"));
        assert!(head.contains("\r\nx-title: page2html tests\r\n"));
        assert!(head.contains("\r\ncontent-type: application/json\r\n"));

        let json = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
        let sent: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(sent["model"], crate::config::DEFAULT_MODEL);
        assert_eq!(sent["messages"][1]["content"][1]["type"], "image_url");
    }

    #[tokio::test]
    async fn client_maps_429_with_retry_after() {
        let response = http_response(
            "429 Too Many Requests",
            "retry-after: 7\r\n",
            r#"{"error": {"message": "slow down"}}"#,
        );
        let (base_url, server) = serve_once(response).await;

        let err = client(&base_url, 5)
            .complete(&one_image_request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::RateLimited {
                model: crate::config::DEFAULT_MODEL.into(),
                retry_after_secs: Some(7)
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn client_maps_server_error_to_provider() {
        let response = http_response(
            "500 Internal Server Error",
            "",
            r#"{"error": {"message": "boom"}}"#,
        );
        let (base_url, server) = serve_once(response).await;

        let err = client(&base_url, 5)
            .complete(&one_image_request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::Provider {
                status: Some(500),
                message: "boom".into()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn client_maps_in_body_error_on_200() {
        let response = http_response(
            "200 OK",
            "",
            r#"{"error": {"code": 429, "message": "upstream rate limit"}}"#,
        );
        let (base_url, server) = serve_once(response).await;

        let err = client(&base_url, 5)
            .complete(&one_image_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::RateLimited { retry_after_secs: None, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn client_reports_refused_connection_as_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&base_url, 5)
            .complete(&one_image_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Unknown(_)), "{err:?}");
    }

    #[tokio::test]
    async fn client_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = client(&base_url, 1)
            .complete(&one_image_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Timeout { .. }), "{err:?}");
        server.abort();
    }
}
