//! Language model implementations and abstractions.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{ModelConfig, Provider};
use crate::error::{AgnoError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDelta {
    Content(String),
    /// A fully assembled tool call. Providers emit these once the call's arguments are complete.
    ToolCall(ToolCall),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelDelta>> + Send>>;

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the backing model, e.g. `gpt-4o`.
    fn id(&self) -> &str;

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;

    /// Streams the completion. The default delivers the whole completion as a single delta.
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelStream> {
        let completion = self.complete_chat(messages, tools).await?;
        let mut deltas = Vec::new();
        if let Some(content) = completion.content {
            deltas.push(Ok(ModelDelta::Content(content)));
        }
        deltas.extend(
            completion
                .tool_calls
                .into_iter()
                .map(|call| Ok(ModelDelta::ToolCall(call))),
        );
        Ok(Box::pin(stream::iter(deltas)))
    }
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: Provider) -> AgnoError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgnoError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return AgnoError::LanguageModel(format!("{provider} rejected the API key: {body}"));
    }
    AgnoError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

fn parse_tool_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Client for any backend speaking the OpenAI chat-completions protocol.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: Option<f32>,
}

impl OpenAIClient {
    pub fn new(provider: Provider) -> Result<Self> {
        Self::from_config(&ModelConfig::for_provider(provider))
    }

    /// Builds a client, reading the provider's API key variable when the config has none.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = match (&cfg.api_key, cfg.provider.api_key_env()) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(var)) => Some(std::env::var(var).map_err(|_| {
                AgnoError::Config(format!(
                    "missing {} API key: set `{var}` or `model.api_key`",
                    cfg.provider
                ))
            })?),
            (None, None) => None,
        };
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| cfg.provider.default_base_url().to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .map_err(|err| AgnoError::LanguageModel(format!("http client error: {err}")))?,
            provider: cfg.provider,
            model: cfg.id.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: cfg.temperature,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string();

                let tool_calls = message.tool_call.as_ref().map(|call| {
                    vec![OpenAiToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAiFunctionCall {
                            name: call.name.clone(),
                            arguments: serialize_tool_arguments(&call.arguments),
                        },
                    }]
                });

                let content = match (&message.tool_result, &tool_calls) {
                    (Some(result), _) => Some(serialize_tool_arguments(&result.output)),
                    (None, Some(_)) => None,
                    (None, None) => Some(message.content.clone()),
                };

                OpenAiMessage {
                    role,
                    content,
                    tool_call_id: message
                        .tool_result
                        .as_ref()
                        .and_then(|result| result.tool_call_id.clone()),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }

        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let tools = self.to_openai_tools(tools);
        let payload = ChatRequest {
            model: &self.model,
            messages: self.to_openai_messages(messages),
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
            temperature: self.temperature,
            stream,
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"));
        }

        tracing::debug!(provider = %self.provider, model = %self.model, stream, "sending chat completion");
        let resp = builder.json(&payload).send().await.map_err(|err| {
            AgnoError::LanguageModel(format!("{} request error: {err}", self.provider))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, self.provider));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let resp = self.send(messages, tools, false).await?;
        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            AgnoError::LanguageModel(format!("{} response parse error: {err}", self.provider))
        })?;

        let first = body.choices.into_iter().next().ok_or_else(|| {
            AgnoError::LanguageModel(format!("{} returned no choices", self.provider))
        })?;

        let tool_calls = first
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: parse_tool_arguments(&call.function.arguments),
            })
            .collect();

        Ok(ModelCompletion {
            content: first.message.content,
            tool_calls,
        })
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelStream> {
        let resp = self.send(messages, tools, true).await?;
        let bytes = Box::pin(resp.bytes_stream());
        let provider = self.provider;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            if let Err(err) = pump_sse(bytes, provider, &tx).await {
                let _ = tx.send(Err(err)).await;
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Forwards content deltas as they arrive and emits assembled tool calls once the stream ends.
async fn pump_sse<S, B>(
    mut bytes: S,
    provider: Provider,
    tx: &mpsc::Sender<Result<ModelDelta>>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut lines = SseLineBuffer::default();
    let mut calls = ToolCallAssembler::default();
    let mut finished = false;

    'read: while let Some(chunk) = bytes.next().await {
        let chunk = chunk
            .map_err(|err| AgnoError::LanguageModel(format!("{provider} stream error: {err}")))?;
        for line in lines.push(chunk.as_ref()) {
            let Some(data) = sse_data(&line) else {
                continue;
            };
            if data == "[DONE]" {
                finished = true;
                break 'read;
            }
            let parsed: OpenAiStreamChunk = serde_json::from_str(data).map_err(|err| {
                AgnoError::LanguageModel(format!("{provider} stream parse error `{data}`: {err}"))
            })?;
            for choice in parsed.choices {
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    if tx.send(Ok(ModelDelta::Content(content))).await.is_err() {
                        return Ok(());
                    }
                }
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    calls.apply(delta);
                }
            }
        }
    }

    if !finished {
        return Err(AgnoError::LanguageModel(format!(
            "{provider} stream closed before [DONE]"
        )));
    }

    for call in calls.finish() {
        if tx.send(Ok(ModelDelta::ToolCall(call))).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Splits a byte stream into complete lines, holding partial lines across chunks.
#[derive(Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[derive(Default)]
struct ToolCallAssembler {
    calls: BTreeMap<usize, OpenAiToolCallState>,
}

impl ToolCallAssembler {
    fn apply(&mut self, delta: OpenAiDeltaToolCall) {
        let index = delta.index.unwrap_or(self.calls.len());
        let state = self.calls.entry(index).or_default();
        if let Some(id) = delta.id {
            state.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                state.name = Some(name);
            }
            if let Some(args) = function.arguments {
                state.arguments.push_str(&args);
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter_map(|state| {
                let name = state.name?;
                Some(ToolCall {
                    id: state.id,
                    name,
                    arguments: parse_tool_arguments(&state.arguments),
                })
            })
            .collect()
    }
}

/// A deterministic model used for tests and demos.
///
/// Each scripted response is either a JSON directive
/// (`{"action":"respond",...}`, `{"action":"call_tool",...}`, `{"action":"fail",...}`)
/// or plain text, which is returned as the reply.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Message lists received so far, one entry per model turn.
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn next_completion(&self, messages: &[Message]) -> Result<ModelCompletion> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let raw = self
            .responses
            .lock()
            .map_err(|_| AgnoError::LanguageModel("StubModel lock poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                AgnoError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, arguments }) => Ok(ModelCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: None,
                    name,
                    arguments,
                }],
            }),
            Ok(StubDirective::Fail { error }) => Err(AgnoError::LanguageModel(error)),
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
    Fail { error: String },
}

#[async_trait]
impl LanguageModel for StubModel {
    fn id(&self) -> &str {
        "stub-model"
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        self.next_completion(messages)
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelStream> {
        let completion = self.next_completion(messages)?;
        let mut deltas: Vec<Result<ModelDelta>> = completion
            .content
            .as_deref()
            .unwrap_or_default()
            .split_inclusive(' ')
            .map(|piece| Ok(ModelDelta::Content(piece.to_string())))
            .collect();
        deltas.extend(
            completion
                .tool_calls
                .into_iter()
                .map(|call| Ok(ModelDelta::ToolCall(call))),
        );
        Ok(Box::pin(stream::iter(deltas)))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Default)]
struct OpenAiToolCallState {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiDeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDeltaChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDeltaToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\r\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
    }

    #[test]
    fn assembles_tool_call_fragments_by_index() {
        let mut assembler = ToolCallAssembler::default();
        let fragments = [
            json!({"index": 0, "id": "call_a", "function": {"name": "read_file", "arguments": "{\"file_"}}),
            json!({"index": 0, "function": {"arguments": "name\":\"a.txt\"}"}}),
            json!({"index": 1, "id": "call_b", "function": {"name": "list_files", "arguments": ""}}),
        ];
        for fragment in fragments {
            assembler.apply(serde_json::from_value(fragment).unwrap());
        }
        let calls = assembler.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(calls[0].arguments, json!({"file_name": "a.txt"}));
        assert_eq!(calls[1].name, "list_files");
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[tokio::test]
    async fn pump_forwards_content_then_tool_calls() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c1\",\"function\":{\"name\":\"echo\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        // Split mid-line to exercise buffering.
        let (head, tail) = body.split_at(30);
        let chunks: Vec<std::result::Result<Vec<u8>, reqwest::Error>> =
            vec![Ok(head.as_bytes().to_vec()), Ok(tail.as_bytes().to_vec())];
        let (tx, mut rx) = mpsc::channel(16);
        pump_sse(stream::iter(chunks), Provider::OpenAI, &tx)
            .await
            .unwrap();
        drop(tx);

        let mut deltas = Vec::new();
        while let Some(delta) = rx.recv().await {
            deltas.push(delta.unwrap());
        }
        assert_eq!(
            deltas[..2],
            [
                ModelDelta::Content("Hel".into()),
                ModelDelta::Content("lo".into())
            ]
        );
        assert!(matches!(&deltas[2], ModelDelta::ToolCall(call) if call.name == "echo"));
        assert_eq!(deltas.len(), 3);
    }

    #[tokio::test]
    async fn pump_rejects_stream_cut_before_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n";
        let chunks: Vec<std::result::Result<Vec<u8>, reqwest::Error>> =
            vec![Ok(body.as_bytes().to_vec())];
        let (tx, mut rx) = mpsc::channel(16);
        let err = pump_sse(stream::iter(chunks), Provider::Groq, &tx)
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(err, AgnoError::LanguageModel(ref msg) if msg.contains("[DONE]")));
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            ModelDelta::Content("partial".into())
        );
    }

    #[test]
    fn tool_results_are_sent_as_tool_messages() {
        let client = OpenAIClient::from_config(&ModelConfig {
            provider: Provider::Ollama,
            id: "llama3.1:8b".into(),
            api_key: None,
            base_url: None,
            temperature: None,
        })
        .unwrap();
        let call = ToolCall {
            id: Some("call_1".into()),
            name: "echo".into(),
            arguments: json!({"text": "hi"}),
        };
        let messages = vec![
            Message::user("hi"),
            Message::tool_call(call),
            Message::tool(crate::message::ToolResult {
                tool_call_id: Some("call_1".into()),
                name: "echo".into(),
                output: json!("hi"),
            }),
        ];
        let built = client.to_openai_messages(&messages);
        assert_eq!(built[1].content, None);
        assert_eq!(built[1].tool_calls.as_ref().unwrap()[0].function.arguments, r#"{"text":"hi"}"#);
        assert_eq!(built[2].role, "tool");
        assert_eq!(built[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }

    #[tokio::test]
    async fn stub_streams_words() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"one two three"}"#.into()]);
        let deltas: Vec<ModelDelta> = model
            .stream_chat(&[Message::user("go")], &[])
            .await
            .unwrap()
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                ModelDelta::Content("one ".into()),
                ModelDelta::Content("two ".into()),
                ModelDelta::Content("three".into()),
            ]
        );
        assert_eq!(model.seen_messages().len(), 1);
    }
}
