//! Qingyan assistant API client

use super::error_utils::{error_body_message, sanitize_provider_error_text};
use super::{AgentApi, ByteStream, StreamRequest, SuggestRequest};
use crate::auth::{ApiCredentials, TokenGrant, TokenSource};
use crate::config::UpstreamConfig;
use crate::error::{RelayError, RelayResult};
use crate::sse::escape_for_display;
use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

const SUGGEST_FAILED: &str = "获取推荐对话失败";

/// HTTP client for the assistant API
#[derive(Debug, Clone)]
pub struct QingyanClient {
    http: Client,
    api_root: String,
    /// Longest wait for the response head or for the next body chunk
    read_timeout: Duration,
}

impl QingyanClient {
    /// Build a client from the upstream settings
    pub fn new(config: &UpstreamConfig) -> RelayResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| RelayError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(
            http,
            &config.api_root,
            config.read_timeout(),
        ))
    }

    pub fn with_client(http: Client, api_root: &str, read_timeout: Duration) -> Self {
        Self {
            http,
            api_root: api_root.trim_end_matches('/').to_string(),
            read_timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path)
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
    api_secret: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    #[serde(default, deserialize_with = "lenient")]
    access_token: Option<String>,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<u64>,
}

impl TokenFields {
    fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Authorization response: fields under `result` are tried before top-level ones
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default, deserialize_with = "lenient")]
    result: Option<TokenFields>,
    #[serde(flatten)]
    flat: TokenFields,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> RelayResult<TokenGrant> {
        let shapes = [self.result.as_ref(), Some(&self.flat)];
        let token = shapes.iter().flatten().find_map(|s| s.token());
        let Some(token) = token else {
            return Err(RelayError::auth(
                self.message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "missing access token".to_string()),
            ));
        };
        let expires_in = shapes.iter().flatten().find_map(|s| s.expires_in);
        Ok(TokenGrant {
            access_token: token.to_string(),
            expires_in,
        })
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Lifetime as a number or a numeric string
fn seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map(|f| f as u64),
        _ => None,
    })
}

#[async_trait]
impl TokenSource for QingyanClient {
    #[instrument(skip_all, level = "debug")]
    async fn fetch_token(&self, credentials: &ApiCredentials) -> RelayResult<TokenGrant> {
        debug!("requesting access token via POST /get_token");
        let response = self
            .http
            .post(self.endpoint("get_token"))
            .json(&TokenRequest {
                api_key: &credentials.key,
                api_secret: &credentials.secret,
            })
            .send()
            .await
            .map_err(|e| RelayError::auth(format!("get_token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::auth(format!("get_token body unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(RelayError::auth(format!(
                "get_token failed: HTTP {} - {}",
                status.as_u16(),
                sanitize_provider_error_text(&body)
            )));
        }

        let response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::auth(format!("get_token returned invalid JSON: {}", e)))?;
        response.into_grant()
    }
}

#[async_trait]
impl AgentApi for QingyanClient {
    #[instrument(skip_all, fields(assistant_id = %request.assistant_id), level = "debug")]
    async fn open_stream(&self, token: &str, request: &StreamRequest) -> RelayResult<ByteStream> {
        debug!(
            has_conversation_id = request.conversation_id.is_some(),
            prompt_chars = request.prompt.chars().count(),
            "opening upstream stream"
        );

        let send = self
            .http
            .post(self.endpoint("stream"))
            .header(ACCEPT, "text/event-stream")
            .bearer_auth(token)
            .json(request)
            .send();
        let response = tokio::time::timeout(self.read_timeout, send)
            .await
            .map_err(|_| silence_error(self.read_timeout))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "upstream stream rejected");
            return Err(
                RelayError::upstream_status(format!("status {}", status.as_u16()), status.as_u16())
                    .with_context(sanitize_provider_error_text(&body)),
            );
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(RelayError::from));
        Ok(with_read_timeout(body, self.read_timeout))
    }

    #[instrument(skip_all, level = "debug")]
    async fn suggest_prompts(
        &self,
        token: &str,
        request: &SuggestRequest,
    ) -> RelayResult<Vec<String>> {
        debug!(
            has_log_id = request.log_id.is_some(),
            "calling POST /suggest/prompts"
        );

        let response = self
            .http
            .post(self.endpoint("suggest/prompts"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        trace!(status = status.as_u16(), body = %escape_for_display(&body), "suggest/prompts response");

        if !status.is_success() {
            return Err(RelayError::upstream_status(
                error_body_message(&body).unwrap_or_else(|| SUGGEST_FAILED.to_string()),
                status.as_u16(),
            ));
        }

        let list = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json.pointer("/result/list").cloned())
            .and_then(|list| match list {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();

        Ok(list
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }
}

/// End `body` with an error once it stays silent for longer than `limit`.
///
/// Only gaps between chunks are bounded; a reply that keeps producing data may
/// run for any length of time.
fn with_read_timeout<S>(body: S, limit: Duration) -> ByteStream
where
    S: Stream<Item = RelayResult<Vec<u8>>> + Send + 'static,
{
    let body = Box::pin(body);
    Box::pin(stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(limit, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => {
                warn!(limit_secs = limit.as_secs(), "upstream stream went silent");
                Some((Err(silence_error(limit)), None))
            }
        }
    }))
}

fn silence_error(limit: Duration) -> RelayError {
    RelayError::upstream_http(format!("no data from upstream for {}s", limit.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> QingyanClient {
        let http = Client::builder().no_proxy().build().expect("Failed to create HTTP client");
        QingyanClient::with_client(http, &format!("{}/", server.uri()), Duration::from_secs(5))
    }

    fn credentials() -> ApiCredentials {
        ApiCredentials::new("key-1", "secret-1")
    }

    #[tokio::test]
    async fn test_token_from_result_wrapper() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_token"))
            .and(body_json(json!({"api_key": "key-1", "api_secret": "secret-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 0,
                "result": {"access_token": "tok-wrapped", "expires_in": 7200}
            })))
            .mount(&server)
            .await;

        let grant = client(&server).fetch_token(&credentials()).await.unwrap();
        assert_eq!(grant.access_token, "tok-wrapped");
        assert_eq!(grant.expires_in, Some(7200));
    }

    #[tokio::test]
    async fn test_token_from_top_level_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {},
                "access_token": "tok-flat",
                "expires_in": "3600"
            })))
            .mount(&server)
            .await;

        let grant = client(&server).fetch_token(&credentials()).await.unwrap();
        assert_eq!(grant.access_token, "tok-flat");
        assert_eq!(grant.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "invalid api_key"})))
            .mount(&server)
            .await;

        let err = client(&server).fetch_token(&credentials()).await.unwrap_err();
        assert!(matches!(err, RelayError::Auth { ref message, .. } if message == "invalid api_key"));
    }

    #[tokio::test]
    async fn test_token_http_failure_is_sanitized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"api_secret": "secret-1"})))
            .mount(&server)
            .await;

        let err = client(&server).fetch_token(&credentials()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("HTTP 401"));
        assert!(!text.contains("secret-1"));
    }

    #[tokio::test]
    async fn test_open_stream_yields_body() {
        let server = MockServer::start().await;
        let body = "data: {\"status\":\"init\"}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/stream"))
            .and(header("Authorization", "Bearer tok"))
            .and(header("Accept", "text/event-stream"))
            .and(body_json(json!({"assistant_id": "a1", "prompt": "你好"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let request = StreamRequest {
            assistant_id: "a1".into(),
            conversation_id: None,
            prompt: "你好".into(),
        };
        let stream = client(&server).open_stream("tok", &request).await.unwrap();
        let chunks: Vec<Vec<u8>> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), body.as_bytes());
    }

    fn delayed(chunks: Vec<(u64, &'static str)>) -> impl Stream<Item = RelayResult<Vec<u8>>> + Send {
        stream::iter(chunks).then(|(delay_ms, text)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(text.as_bytes().to_vec())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_steady_stream_outlives_read_timeout() {
        // Five chunks 600ms apart run past a 1s limit in total
        let body = delayed(vec![(600, "a"), (600, "b"), (600, "c"), (600, "d"), (600, "e")]);
        let chunks: Vec<Vec<u8>> = with_read_timeout(body, Duration::from_secs(1))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"abcde");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_fails_after_read_timeout() {
        let body = delayed(vec![(100, "data: {}\n\n")]).chain(stream::pending());
        let mut guarded = with_read_timeout(body, Duration::from_secs(1));

        assert_eq!(guarded.next().await.unwrap().unwrap(), b"data: {}\n\n");
        let err = guarded.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            RelayError::UpstreamHttp {
                status_code: None,
                ..
            }
        ));
        assert!(guarded.next().await.is_none());
    }

    #[tokio::test]
    async fn test_open_stream_rejects_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let request = StreamRequest {
            assistant_id: "a1".into(),
            conversation_id: Some("c1".into()),
            prompt: "hi".into(),
        };
        let err = match client(&server).open_stream("tok", &request).await {
            Ok(_) => panic!("expected an HTTP error"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            RelayError::UpstreamHttp {
                status_code: Some(502),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_suggest_prompts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest/prompts"))
            .and(body_json(json!({"conversation_id": "c1", "log_id": "h1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"list": ["还有哪里不舒服？", 3, ""]}
            })))
            .mount(&server)
            .await;

        let request = SuggestRequest {
            conversation_id: "c1".into(),
            log_id: Some("h1".into()),
        };
        let list = client(&server).suggest_prompts("tok", &request).await.unwrap();
        assert_eq!(list, vec!["还有哪里不舒服？".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn test_suggest_prompts_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest/prompts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let request = SuggestRequest {
            conversation_id: "c1".into(),
            log_id: None,
        };
        let err = client(&server).suggest_prompts("tok", &request).await.unwrap_err();
        assert!(err.to_string().contains(SUGGEST_FAILED));
    }
}
