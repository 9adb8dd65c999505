//! HTTP client for an OpenAI-compatible provider.
//!
//! Non-streaming calls share one client with the generate timeout; streaming
//! calls use a second client with the longer stream timeout. When a model
//! catalog is attached, each request goes to the endpoint its model names.
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChatBackend, ChatMessage, CompletionRequest, OutputSchema, SpeechRequest, TextStream};
use crate::model_catalog::ModelCatalog;

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImage<'a> },
}

#[derive(Debug, Serialize)]
struct WireImage<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: WireContent<'a>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let content = if message.images.is_empty() {
            WireContent::Text(&message.content)
        } else {
            let mut parts = vec![WirePart::Text { text: &message.content }];
            parts.extend(
                message
                    .images
                    .iter()
                    .map(|url| WirePart::ImageUrl { image_url: WireImage { url } }),
            );
            WireContent::Parts(parts)
        };
        Self { role: &message.role, content }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_completion_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChatDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

/// Base URL and credential a request is sent with.
#[derive(Debug, Clone, PartialEq)]
struct ProviderTarget {
    base_url: String,
    api_key: Option<String>,
}

impl ProviderTarget {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn api_key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not configured"))
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

pub struct LLMWorker {
    fallback: ProviderTarget,
    catalog: Option<Arc<ModelCatalog>>,
    http_client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl LLMWorker {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        generate_timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        info!("LLM worker initialized with provider: {}", base_url);
        Self {
            fallback: ProviderTarget { base_url, api_key: api_key.and_then(non_blank) },
            catalog: None,
            http_client: reqwest::Client::builder()
                .timeout(generate_timeout)
                .build()
                .unwrap_or_default(),
            stream_client: reqwest::Client::builder()
                .timeout(stream_timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Route each model to the endpoint the catalog assigns it.
    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// The catalog endpoint for `model`, or the configured provider when the
    /// model has no enabled endpoint. The key comes from the endpoint's
    /// `api_key_env` variable, falling back to the configured key.
    fn target(&self, model: &str) -> ProviderTarget {
        let Some(endpoint) = self.catalog.as_ref().and_then(|c| c.endpoint_for_model(model)) else {
            return self.fallback.clone();
        };
        let api_key = endpoint
            .api_key_env
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .and_then(|name| std::env::var(name).ok())
            .and_then(non_blank)
            .or_else(|| self.fallback.api_key.clone());
        debug!("Routing {} to endpoint {}", model, endpoint.id);
        ProviderTarget {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        client: &reqwest::Client,
        target: &ProviderTarget,
        path: &str,
        body: &T,
    ) -> anyhow::Result<reqwest::Response> {
        let response = client
            .post(target.url(path))
            .bearer_auth(target.api_key()?)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM provider request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM provider returned {}: {}", status, body));
        }
        Ok(response)
    }

    async fn chat(
        &self,
        request: &CompletionRequest,
        response_format: Option<ResponseFormat<'_>>,
    ) -> anyhow::Result<String> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_completion_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            response_format,
        };
        let target = self.target(&request.model);
        let response = self.post(&self.http_client, &target, "chat/completions", &body).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ChatBackend for LLMWorker {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        debug!("LLM worker generating response with {} (non-streaming)", request.model);
        self.chat(request, None).await
    }

    async fn complete_json(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> anyhow::Result<serde_json::Value> {
        debug!("LLM worker generating {} reply with {}", schema.name, request.model);
        let format = ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: &schema.name,
                schema: &schema.schema,
                strict: true,
            },
        };
        let content = self.chat(request, Some(format)).await?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!("Reply for {} is not JSON ({}); passing text through", schema.name, e);
                Ok(serde_json::Value::String(content))
            }
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> anyhow::Result<TextStream> {
        debug!("LLM worker starting streaming response with {}", request.model);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_completion_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
            response_format: None,
        };
        let target = self.target(&request.model);
        let response = self.post(&self.stream_client, &target, "chat/completions", &body).await?;

        let byte_stream = response.bytes_stream();
        let text_stream = async_stream::try_stream! {
            // Raw bytes: a multi-byte character may straddle two network chunks.
            let mut buffer: Vec<u8> = Vec::new();
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result
                    .map_err(|e| anyhow::anyhow!("Stream read error: {}", e))?;
                buffer.extend_from_slice(&chunk);
                while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = match std::str::from_utf8(&raw) {
                        Ok(line) => line.trim(),
                        Err(e) => {
                            warn!("Skipping stream line that is not UTF-8: {}", e);
                            continue;
                        }
                    };
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(chunk) => {
                            let mut finished = false;
                            for choice in chunk.choices {
                                finished |= choice.finish_reason.is_some();
                                if let Some(text) = choice.delta.and_then(|d| d.content) {
                                    if !text.is_empty() {
                                        yield text;
                                    }
                                }
                            }
                            if finished {
                                return;
                            }
                        }
                        Err(e) => debug!("Skipping unparseable stream chunk: {}", e),
                    }
                }
            }
        };
        Ok(Box::pin(text_stream))
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> anyhow::Result<Bytes> {
        debug!(
            "Synthesizing {} chars with {} voice {} at {}x",
            request.input.chars().count(),
            request.model,
            request.voice,
            request.speed
        );
        let body = SpeechBody {
            model: &request.model,
            input: &request.input,
            voice: &request.voice,
            speed: request.speed,
            response_format: "mp3",
        };
        let target = self.target(&request.model);
        let response = self.post(&self.http_client, &target, "audio/speech", &body).await?;
        response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read synthesized audio: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mockito::Matcher;
    use serde_json::json;

    fn worker(url: &str) -> LLMWorker {
        LLMWorker::new(url, Some("test-key".into()), Duration::from_secs(5), Duration::from_secs(5))
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-5-mini".into(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            max_tokens: 200,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_trimmed_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({"model": "gpt-5-mini", "max_completion_tokens": 200, "stream": false})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Hello there!  "}}]}"#)
            .create_async()
            .await;

        let text = worker(&server.url()).complete(&request()).await.unwrap();
        assert_eq!(text, "Hello there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_json_sends_schema_and_parses_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "response_format": {"type": "json_schema", "json_schema": {"name": "tutor_reply"}}
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"{\"response\":\"Nice!\",\"hint\":\"Ask why.\"}"}}]}"#)
            .create_async()
            .await;

        let schema = OutputSchema { name: "tutor_reply".into(), schema: json!({"type": "object"}) };
        let value = worker(&server.url()).complete_json(&request(), &schema).await.unwrap();
        assert_eq!(value["response"], "Nice!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_json_passes_plain_text_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"Great! HINT: Say more."}}]}"#)
            .create_async()
            .await;

        let schema = OutputSchema { name: "tutor_reply".into(), schema: json!({"type": "object"}) };
        let value = worker(&server.url()).complete_json(&request(), &schema).await.unwrap();
        assert_eq!(value, json!("Great! HINT: Say more."));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let err = worker(&server.url()).complete(&request()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("429"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let worker = LLMWorker::new("http://127.0.0.1:9", None, Duration::from_secs(1), Duration::from_secs(1));
        let err = worker.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_until_done() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = worker(&server.url()).stream(&request()).await.unwrap();
        let parts: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(parts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_speech_returns_audio_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/speech")
            .match_body(Matcher::PartialJson(json!({"voice": "nova", "speed": 0.85, "response_format": "mp3"})))
            .with_status(200)
            .with_header("content-type", "audio/mpeg")
            .with_body(vec![0xFFu8, 0xFB, 0x90])
            .create_async()
            .await;

        let audio = worker(&server.url())
            .synthesize_speech(&SpeechRequest {
                model: "tts-1".into(),
                voice: "nova".into(),
                speed: 0.85,
                input: "hello".into(),
            })
            .await
            .unwrap();
        assert_eq!(&audio[..], &[0xFF, 0xFB, 0x90]);
        mock.assert_async().await;
    }

    /// Serve one chunked SSE response whose chunks are cut at the given byte offsets.
    async fn chunked_sse_server(body: &'static [u8], cuts: Vec<usize>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            let mut start = 0;
            for end in cuts.into_iter().chain(std::iter::once(body.len())) {
                let piece = &body[start..end];
                socket.write_all(format!("{:x}\r\n", piece.len()).as_bytes()).await.unwrap();
                socket.write_all(piece).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                start = end;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stream_keeps_characters_split_across_chunks() {
        const BODY: &str = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"café \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        // Cut inside the two bytes of 'é' and inside the three bytes of '你'.
        let cut_e = BODY.find('é').unwrap() + 1;
        let cut_ni = BODY.find('你').unwrap() + 2;
        let url = chunked_sse_server(BODY.as_bytes(), vec![cut_e, cut_ni]).await;

        let stream = worker(&url).stream(&request()).await.unwrap();
        let parts: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(parts.concat(), "café 你好");
        assert!(parts.iter().all(|p| !p.contains('\u{FFFD}')));
    }

    fn catalog_with_local_endpoint(base_url: &str, enabled: bool) -> Arc<ModelCatalog> {
        use crate::model_catalog::{CatalogDocument, EndpointDefinition, ModelDefinition};

        let mut document = CatalogDocument::default();
        document.endpoints.push(EndpointDefinition {
            id: "local".into(),
            name: "Local".into(),
            base_url: format!("{}/", base_url),
            api_key_env: Some("TUTOR_HUB_UNSET_LOCAL_KEY".into()),
            enabled,
        });
        document.models.llm.push(ModelDefinition {
            id: "local-llm".into(),
            name: "Local LLM".into(),
            endpoint: Some("local".into()),
            enabled: true,
            voices: Vec::new(),
        });
        let path = std::env::temp_dir().join("tutor-hub-unused-models.json");
        Arc::new(ModelCatalog::from_document(&path, document))
    }

    #[tokio::test]
    async fn test_catalog_endpoint_receives_its_models() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({"model": "local-llm"})))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"routed"}}]}"#)
            .create_async()
            .await;

        let worker = worker("http://127.0.0.1:9").with_catalog(catalog_with_local_endpoint(&server.url(), true));
        let mut req = request();
        req.model = "local-llm".into();
        assert_eq!(worker.complete(&req).await.unwrap(), "routed");
        mock.assert_async().await;
    }

    #[test]
    fn test_models_without_enabled_endpoint_use_configured_provider() {
        let worker = worker("http://fallback.test/v1/").with_catalog(catalog_with_local_endpoint("http://local.test", false));
        let target = worker.target("local-llm");
        assert_eq!(target.base_url, "http://fallback.test/v1");
        assert_eq!(target.api_key.as_deref(), Some("test-key"));

        assert_eq!(worker.target("not-in-catalog"), target);
    }

    #[test]
    fn test_images_are_sent_as_content_parts() {
        let plain = ChatMessage::user("hi");
        assert_eq!(serde_json::to_value(WireMessage::from(&plain)).unwrap(), json!({"role": "user", "content": "hi"}));

        let with_image = ChatMessage::user("solve this").with_image("data:image/png;base64,AAAA");
        assert_eq!(
            serde_json::to_value(WireMessage::from(&with_image)).unwrap(),
            json!({"role": "user", "content": [
                {"type": "text", "text": "solve this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ]})
        );
    }
}
