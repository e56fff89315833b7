//! Resilient chat-completion client for OpenAI-compatible endpoints (OpenRouter by default).
//!
//! One call to [`ModelClient::complete`] runs a bounded sequence of attempts. Each
//! attempt has its own timeout; failures are classified by HTTP status at the response
//! and only transport-level failures (plus a single protocol violation) are retried,
//! with exponential backoff between attempts.
//!
//! NOTE: the API key and response contents are never logged; only sizes, latency and
//! token usage.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::ModelConfig;
use crate::error::{PuzzleError, Result, TransportKind};
use crate::util::trunc_for_log;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const DEFAULT_REFERER: &str = "http://localhost:3000";
const DEFAULT_TITLE: &str = "Adaptive Parsons";

/// Only this many protocol violations are retried per call.
const PROTOCOL_RETRIES: u32 = 1;

/// The single I/O boundary of puzzle generation.
#[async_trait]
pub trait Completion: Send + Sync {
  async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
  pub model: String,
  pub base_url: String,
  pub timeout: Duration,
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub referer: String,
  pub title: String,
}

impl Default for ClientSettings {
  fn default() -> Self {
    Self {
      model: DEFAULT_MODEL.into(),
      base_url: DEFAULT_BASE_URL.into(),
      timeout: DEFAULT_TIMEOUT,
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      initial_backoff: DEFAULT_INITIAL_BACKOFF,
      referer: DEFAULT_REFERER.into(),
      title: DEFAULT_TITLE.into(),
    }
  }
}

impl ClientSettings {
  /// Environment beats the config file; defaults fill whatever neither sets.
  /// Unparseable numeric variables are ignored.
  pub fn resolve(file: &ModelConfig, env: impl Fn(&str) -> Option<String>) -> Self {
    let d = Self::default();
    let num = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

    Self {
      model: env("OPENROUTER_MODEL").or_else(|| file.model.clone()).unwrap_or(d.model),
      base_url: env("OPENROUTER_BASE_URL").or_else(|| file.base_url.clone()).unwrap_or(d.base_url),
      timeout: num("LLM_TIMEOUT_SECS")
        .or(file.timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(d.timeout),
      max_attempts: num("LLM_MAX_ATTEMPTS")
        .map(|n| n.min(u32::MAX as u64) as u32)
        .or(file.max_attempts)
        .unwrap_or(d.max_attempts)
        .max(1),
      initial_backoff: num("LLM_INITIAL_BACKOFF_MS")
        .or(file.initial_backoff_ms)
        .map(Duration::from_millis)
        .unwrap_or(d.initial_backoff),
      referer: env("OPENROUTER_REFERRER").or_else(|| file.referer.clone()).unwrap_or(d.referer),
      title: env("OPENROUTER_TITLE").or_else(|| file.title.clone()).unwrap_or(d.title),
    }
  }

  /// Sleep before attempt `attempt + 1`: `initial_backoff * 2^attempt`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    self.initial_backoff.saturating_mul(1u32 << attempt.min(16))
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: "system".into(), content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".into(), content: content.into() }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletionOptions {
  pub reasoning_enabled: bool,
  pub temperature: f32,
}

impl Default for CompletionOptions {
  fn default() -> Self {
    Self { reasoning_enabled: false, temperature: 0.7 }
  }
}

#[derive(Clone)]
pub struct ModelClient {
  http: reqwest::Client,
  api_key: Option<String>,
  pub settings: ClientSettings,
}

impl ModelClient {
  /// A missing key is not an error here; `complete` reports it without touching the network.
  pub fn new(api_key: Option<String>, settings: ClientSettings) -> Self {
    let api_key = api_key.filter(|k| !k.trim().is_empty());
    Self { http: reqwest::Client::new(), api_key, settings }
  }

  /// Build from OPENROUTER_* / LLM_* variables on top of the `[model]` config section.
  pub fn from_env(file: &ModelConfig) -> Self {
    let settings = ClientSettings::resolve(file, |key| std::env::var(key).ok());
    Self::new(std::env::var("OPENROUTER_API_KEY").ok(), settings)
  }

  pub fn has_credentials(&self) -> bool {
    self.api_key.is_some()
  }

  #[instrument(
    level = "info",
    skip(self, messages, options),
    fields(model = %self.settings.model, messages = messages.len(), max_attempts = self.settings.max_attempts)
  )]
  pub async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String> {
    let api_key = self
      .api_key
      .as_deref()
      .ok_or_else(|| PuzzleError::Configuration("OPENROUTER_API_KEY is not set".into()))?;

    let request = ChatCompletionRequest {
      model: &self.settings.model,
      messages,
      temperature: options.temperature.clamp(0.0, 2.0),
      extra_body: options.reasoning_enabled.then_some(ExtraBody { reasoning: true }),
    };

    let max_attempts = self.settings.max_attempts.max(1);
    let mut protocol_failures = 0u32;
    let mut last_error: Option<PuzzleError> = None;

    for attempt in 0..max_attempts {
      let started = Instant::now();
      let outcome = match tokio::time::timeout(self.settings.timeout, self.send_once(api_key, &request)).await {
        Ok(result) => result,
        Err(_) => Err(PuzzleError::transport(
          TransportKind::Timeout,
          format!("no response within {:?}", self.settings.timeout),
        )),
      };
      let elapsed = started.elapsed();

      let err = match outcome {
        Ok(content) => {
          info!(target: "llm", attempt = attempt + 1, ?elapsed, response_len = content.len(), "Model response received");
          return Ok(content);
        }
        Err(err) => err,
      };

      let retry = match &err {
        PuzzleError::Protocol(_) => {
          protocol_failures += 1;
          protocol_failures <= PROTOCOL_RETRIES
        }
        other => other.is_retryable(),
      };

      warn!(target: "llm", attempt = attempt + 1, ?elapsed, retry, error = %err, "Model attempt failed");
      if !retry {
        return Err(err);
      }
      last_error = Some(err);

      if attempt + 1 < max_attempts {
        tokio::time::sleep(self.settings.backoff(attempt)).await;
      }
    }

    let last = last_error.unwrap_or_else(|| PuzzleError::Protocol("no attempt was made".into()));
    Err(PuzzleError::RetriesExhausted { attempts: max_attempts, last: Box::new(last) })
  }

  async fn send_once(&self, api_key: &str, request: &ChatCompletionRequest<'_>) -> Result<String> {
    let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));

    let res = self
      .http
      .post(&url)
      .header(USER_AGENT, "parsons-forge/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {api_key}"))
      .header("HTTP-Referer", &self.settings.referer)
      .header("X-Title", &self.settings.title)
      .json(request)
      .send()
      .await
      .map_err(classify_reqwest)?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_upstream_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(PuzzleError::from_status(status.as_u16(), msg));
    }

    let bytes = res.bytes().await.map_err(classify_reqwest)?;
    let body: ChatCompletionResponse = serde_json::from_slice(&bytes)
      .map_err(|e| PuzzleError::Protocol(format!("response is not a chat completion: {e}")))?;

    if let Some(usage) = &body.usage {
      info!(
        target: "llm",
        prompt_tokens = ?usage.prompt_tokens,
        completion_tokens = ?usage.completion_tokens,
        total_tokens = ?usage.total_tokens,
        "Model usage"
      );
    }

    body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message)
      .and_then(|m| m.content)
      .filter(|c| !c.trim().is_empty())
      .ok_or_else(|| PuzzleError::Protocol("response has no choices or empty message content".into()))
  }
}

#[async_trait]
impl Completion for ModelClient {
  async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String> {
    ModelClient::complete(self, messages, options).await
  }
}

fn classify_reqwest(e: reqwest::Error) -> PuzzleError {
  let kind = if e.is_timeout() { TransportKind::Timeout } else { TransportKind::Network };
  PuzzleError::transport(kind, e.to_string())
}

/// Pull `error.message` (OpenAI/OpenRouter shape) or a top-level `message` out of an error body.
fn extract_upstream_error(body: &str) -> Option<String> {
  let v: Value = serde_json::from_str(body).ok()?;
  v.pointer("/error/message")
    .or_else(|| v.get("message"))
    .and_then(Value::as_str)
    .map(str::to_string)
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  extra_body: Option<ExtraBody>,
}
#[derive(Serialize)]
struct ExtraBody { reasoning: bool }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { #[serde(default)] message: Option<ChatMessageResp> }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use axum::extract::State;
  use axum::http::{HeaderMap, StatusCode};
  use axum::response::{IntoResponse, Response};
  use axum::routing::post;
  use axum::{Json, Router};
  use tokio::net::TcpListener;

  #[derive(Clone, Copy)]
  enum Reply {
    Ok,
    Status(u16),
    Empty,
    Hang,
  }

  #[derive(Clone)]
  struct Upstream {
    script: Arc<Vec<Reply>>,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
    last_headers: Arc<Mutex<Option<HeaderMap>>>,
  }

  async fn chat(State(up): State<Upstream>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let n = up.hits.fetch_add(1, Ordering::SeqCst);
    *up.last_body.lock().unwrap() = Some(body);
    *up.last_headers.lock().unwrap() = Some(headers);
    let reply = up.script.get(n).copied().unwrap_or(Reply::Ok);
    match reply {
      Reply::Ok => Json(serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": "{\"lines\":[\"a\"]}" } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
      }))
      .into_response(),
      Reply::Status(code) => {
        let status = StatusCode::from_u16(code).unwrap();
        (status, Json(serde_json::json!({ "error": { "message": format!("upstream said {code}") } }))).into_response()
      }
      Reply::Empty => Json(serde_json::json!({ "choices": [] })).into_response(),
      Reply::Hang => {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(serde_json::json!({})).into_response()
      }
    }
  }

  async fn spawn_upstream(script: Vec<Reply>) -> (String, Upstream) {
    let up = Upstream {
      script: Arc::new(script),
      hits: Arc::new(AtomicUsize::new(0)),
      last_body: Arc::new(Mutex::new(None)),
      last_headers: Arc::new(Mutex::new(None)),
    };
    let app = Router::new().route("/chat/completions", post(chat)).with_state(up.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), up)
  }

  fn client(base_url: String) -> ModelClient {
    let settings = ClientSettings {
      base_url,
      timeout: Duration::from_millis(300),
      initial_backoff: Duration::from_millis(5),
      ..ClientSettings::default()
    };
    ModelClient::new(Some("test-key".into()), settings)
  }

  fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage::system("sys"), ChatMessage::user("hi")]
  }

  #[tokio::test]
  async fn server_errors_are_retried_until_success() {
    let (url, up) = spawn_upstream(vec![Reply::Status(503), Reply::Status(429), Reply::Ok]).await;
    let text = client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap();
    assert_eq!(text, "{\"lines\":[\"a\"]}");
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn request_shape_and_headers() {
    let (url, up) = spawn_upstream(vec![Reply::Ok]).await;
    let opts = CompletionOptions { reasoning_enabled: true, temperature: 5.0 };
    client(url).complete(&messages(), &opts).await.unwrap();

    let body = up.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], DEFAULT_MODEL);
    assert_eq!(body["temperature"], 2.0);
    assert_eq!(body["extra_body"]["reasoning"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "hi");

    let headers = up.last_headers.lock().unwrap().clone().unwrap();
    assert_eq!(headers["authorization"], "Bearer test-key");
    assert_eq!(headers["x-title"], DEFAULT_TITLE);
    assert!(headers.contains_key("http-referer"));
  }

  #[tokio::test]
  async fn reasoning_off_omits_extra_body() {
    let (url, up) = spawn_upstream(vec![Reply::Ok]).await;
    client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap();
    let body = up.last_body.lock().unwrap().clone().unwrap();
    assert!(body.get("extra_body").is_none());
  }

  #[tokio::test]
  async fn unauthorized_is_not_retried() {
    let (url, up) = spawn_upstream(vec![Reply::Status(401)]).await;
    let err = client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap_err();
    match err {
      PuzzleError::NonRetryableUpstream { status, message } => {
        assert_eq!(status, 401);
        assert_eq!(message, "upstream said 401");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(up.hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn persistent_failure_exhausts_budget() {
    let (url, up) = spawn_upstream(vec![Reply::Status(500); 5]).await;
    let err = client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap_err();
    match err {
      PuzzleError::RetriesExhausted { attempts, last } => {
        assert_eq!(attempts, 3);
        assert!(matches!(*last, PuzzleError::Transport { kind: TransportKind::Server(500), .. }));
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(up.hits.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn timeout_is_retryable() {
    let (url, up) = spawn_upstream(vec![Reply::Hang, Reply::Ok]).await;
    let text = client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap();
    assert!(text.contains("lines"));
    assert_eq!(up.hits.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn protocol_violation_is_retried_once() {
    let (url, up) = spawn_upstream(vec![Reply::Empty, Reply::Ok]).await;
    assert!(client(url).complete(&messages(), &CompletionOptions::default()).await.is_ok());
    assert_eq!(up.hits.load(Ordering::SeqCst), 2);

    let (url, up) = spawn_upstream(vec![Reply::Empty, Reply::Empty, Reply::Ok]).await;
    let err = client(url).complete(&messages(), &CompletionOptions::default()).await.unwrap_err();
    assert!(matches!(err, PuzzleError::Protocol(_)));
    assert_eq!(up.hits.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn missing_key_fails_before_network() {
    let (url, up) = spawn_upstream(vec![Reply::Ok]).await;
    let c = ModelClient::new(Some("  ".into()), ClientSettings { base_url: url, ..ClientSettings::default() });
    assert!(!c.has_credentials());
    let err = c.complete(&messages(), &CompletionOptions::default()).await.unwrap_err();
    assert!(matches!(err, PuzzleError::Configuration(_)));
    assert_eq!(up.hits.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn unreachable_host_is_network_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let c = ModelClient::new(
      Some("k".into()),
      ClientSettings {
        base_url: format!("http://{addr}"),
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        ..ClientSettings::default()
      },
    );
    let err = c.complete(&messages(), &CompletionOptions::default()).await.unwrap_err();
    match err {
      PuzzleError::RetriesExhausted { attempts: 2, last } => assert!(last.is_retryable()),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn backoff_doubles() {
    let s = ClientSettings::default();
    assert_eq!(s.backoff(0), Duration::from_secs(1));
    assert_eq!(s.backoff(1), Duration::from_secs(2));
    assert_eq!(s.backoff(2), Duration::from_secs(4));
  }

  #[test]
  fn env_overrides_file() {
    let file = ModelConfig {
      model: Some("file/model".into()),
      timeout_secs: Some(10),
      max_attempts: Some(4),
      referer: Some("https://file.example".into()),
      title: Some("File Title".into()),
      ..ModelConfig::default()
    };
    let env: HashMap<&str, &str> = [
      ("OPENROUTER_MODEL", "env/model"),
      ("LLM_INITIAL_BACKOFF_MS", "250"),
      ("LLM_MAX_ATTEMPTS", "oops"),
      ("OPENROUTER_TITLE", "Env Title"),
    ]
    .into();
    let s = ClientSettings::resolve(&file, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(s.model, "env/model");
    assert_eq!(s.timeout, Duration::from_secs(10));
    assert_eq!(s.max_attempts, 4);
    assert_eq!(s.initial_backoff, Duration::from_millis(250));
    assert_eq!(s.base_url, DEFAULT_BASE_URL);
    assert_eq!(s.title, "Env Title");
    assert_eq!(s.referer, "https://file.example");

    let env: HashMap<&str, &str> = [("OPENROUTER_REFERRER", "https://env.example")].into();
    let s = ClientSettings::resolve(&file, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(s.referer, "https://env.example");
    assert_eq!(s.title, "File Title");
  }

  #[test]
  fn zero_attempts_means_one() {
    let file = ModelConfig { max_attempts: Some(0), ..ModelConfig::default() };
    assert_eq!(ClientSettings::resolve(&file, |_| None).max_attempts, 1);
  }

  #[test]
  fn error_body_extraction() {
    assert_eq!(extract_upstream_error(r#"{"error":{"message":"bad key"}}"#).as_deref(), Some("bad key"));
    assert_eq!(extract_upstream_error(r#"{"message":"nope"}"#).as_deref(), Some("nope"));
    assert_eq!(extract_upstream_error("<html>"), None);
  }
}
