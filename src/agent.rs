use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AgnoError, Result};
use crate::knowledge::Retriever;
use crate::llm::{LanguageModel, ModelCompletion, ModelDelta};
use crate::memory::ConversationMemory;
use crate::message::{Message, ToolCall, ToolResult};
use crate::time::current_utc_str;
use crate::tool::ToolRegistry;

const MARKDOWN_INSTRUCTION: &str = "Use markdown to format your answers.";
const CONTEXT_SNIPPETS: usize = 3;

/// Per-call switches for [`Agent::respond`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Ask the model to format its answer as markdown.
    #[serde(default)]
    pub markdown: bool,
    /// Deliver the answer incrementally instead of as one value.
    #[serde(default)]
    pub stream: bool,
    /// Echo tool invocations when printing the response.
    #[serde(default)]
    pub show_tool_calls: bool,
}

impl RunOptions {
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn with_tool_calls_shown(mut self, show: bool) -> Self {
        self.show_tool_calls = show;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// The completed outcome of one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub model: String,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolExecution>,
    pub created_at: String,
}

/// Items of a streamed run. `RunCompleted` is always the last successful item.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunContent(String),
    ToolCallStarted(ToolCall),
    ToolCallCompleted(ToolResult),
    RunCompleted(RunResponse),
}

/// A finite, single-pass stream of run events.
///
/// A failed run yields one `Err` item and then ends.
pub struct ResponseStream {
    inner: ReceiverStream<Result<RunEvent>>,
}

impl ResponseStream {
    /// Drains the stream, returning the completed response.
    pub async fn into_response(mut self) -> Result<RunResponse> {
        while let Some(event) = self.next().await {
            if let RunEvent::RunCompleted(response) = event? {
                return Ok(response);
            }
        }
        Err(AgnoError::Protocol(
            "response stream ended before the run completed".into(),
        ))
    }
}

impl Stream for ResponseStream {
    type Item = Result<RunEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub enum AgentResponse {
    Complete(RunResponse),
    Stream(ResponseStream),
}

/// An AGNO-style agent that alternates between the LLM and registered tools.
pub struct Agent {
    name: Option<String>,
    description: Option<String>,
    instructions: Vec<String>,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    retriever: Option<Arc<dyn Retriever>>,
    memory: Arc<Mutex<ConversationMemory>>,
    max_steps: usize,
    markdown: bool,
    show_tool_calls: bool,
}

impl Agent {
    pub fn new<M: LanguageModel + 'static>(model: Arc<M>) -> Self {
        Self {
            name: None,
            description: None,
            instructions: Vec::new(),
            model: model as Arc<dyn LanguageModel>,
            tools: ToolRegistry::new(),
            retriever: None,
            memory: Arc::new(Mutex::new(ConversationMemory::default())),
            max_steps: 6,
            markdown: false,
            show_tool_calls: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn with_show_tool_calls(mut self, show: bool) -> Self {
        self.show_tool_calls = show;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn model_id(&self) -> &str {
        self.model.id()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    /// Options carrying the agent's configured `markdown` and `show_tool_calls`.
    pub fn default_options(&self) -> RunOptions {
        RunOptions {
            markdown: self.markdown,
            stream: false,
            show_tool_calls: self.show_tool_calls,
        }
    }

    pub fn memory(&self) -> ConversationMemory {
        self.memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear_memory(&self) {
        *self
            .memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = ConversationMemory::default();
    }

    /// Answers `prompt`, atomically or as a stream depending on `options.stream`.
    pub async fn respond(
        &self,
        prompt: impl Into<String>,
        options: &RunOptions,
    ) -> Result<AgentResponse> {
        if options.stream {
            self.run_stream(prompt, options)
                .await
                .map(AgentResponse::Stream)
        } else {
            self.run(prompt, options).await.map(AgentResponse::Complete)
        }
    }

    pub async fn run(&self, prompt: impl Into<String>, options: &RunOptions) -> Result<RunResponse> {
        let run = self.prepare(prompt.into(), options).await?;
        run.execute(None).await
    }

    /// Starts a streamed run. Input is validated before the stream is returned.
    pub async fn run_stream(
        &self,
        prompt: impl Into<String>,
        options: &RunOptions,
    ) -> Result<ResponseStream> {
        let run = self.prepare(prompt.into(), options).await?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let outcome = run.execute(Some(&tx)).await;
            let last = match outcome {
                Ok(response) => Ok(RunEvent::RunCompleted(response)),
                Err(err) => Err(err),
            };
            let _ = tx.send(last).await;
        });
        Ok(ResponseStream {
            inner: ReceiverStream::new(rx),
        })
    }

    /// Runs the prompt and writes the answer to `out`, echoing tool calls when requested.
    pub async fn print_response<W: Write>(
        &self,
        prompt: impl Into<String>,
        options: &RunOptions,
        out: &mut W,
    ) -> Result<()> {
        match self.respond(prompt, options).await? {
            AgentResponse::Complete(response) => {
                if options.show_tool_calls && !response.tool_calls.is_empty() {
                    for execution in &response.tool_calls {
                        writeln!(out, " - Running: {}", execution.call.signature())?;
                    }
                    writeln!(out)?;
                }
                writeln!(out, "{}", response.content)?;
            }
            AgentResponse::Stream(mut stream) => {
                while let Some(event) = stream.next().await {
                    match event? {
                        RunEvent::RunContent(text) => {
                            write!(out, "{text}")?;
                            out.flush()?;
                        }
                        RunEvent::ToolCallStarted(call) if options.show_tool_calls => {
                            writeln!(out, "\n - Running: {}\n", call.signature())?;
                        }
                        RunEvent::ToolCallStarted(_) | RunEvent::ToolCallCompleted(_) => {}
                        RunEvent::RunCompleted(_) => writeln!(out)?,
                    }
                }
            }
        }
        Ok(())
    }

    async fn prepare(&self, prompt: String, options: &RunOptions) -> Result<PreparedRun> {
        if prompt.trim().is_empty() {
            return Err(AgnoError::InvalidInput("prompt must not be empty".into()));
        }

        let context = match &self.retriever {
            Some(retriever) => retriever.retrieve(&prompt, CONTEXT_SNIPPETS).await?,
            None => Vec::new(),
        };

        Ok(PreparedRun {
            agent: self.name.clone(),
            system: self.system_message(options, &context),
            prompt,
            model: Arc::clone(&self.model),
            tools: self.tools.clone(),
            memory: Arc::clone(&self.memory),
            max_steps: self.max_steps,
        })
    }

    fn system_message(&self, options: &RunOptions, context: &[String]) -> Option<Message> {
        let mut sections = Vec::new();
        if let Some(description) = &self.description {
            sections.push(description.clone());
        }

        let mut instructions = self.instructions.clone();
        if options.markdown {
            instructions.push(MARKDOWN_INSTRUCTION.to_string());
        }
        if !instructions.is_empty() {
            let lines: Vec<String> = instructions.iter().map(|i| format!("- {i}")).collect();
            sections.push(format!("## Instructions\n{}", lines.join("\n")));
        }

        if !context.is_empty() {
            let lines: Vec<String> = context.iter().map(|c| format!("- {c}")).collect();
            sections.push(format!(
                "Use the following information from the knowledge base if it helps:\n{}",
                lines.join("\n")
            ));
        }

        if sections.is_empty() {
            None
        } else {
            Some(Message::system(sections.join("\n\n")))
        }
    }
}

/// Everything a run needs, detached from the agent so it can move into a task.
struct PreparedRun {
    agent: Option<String>,
    system: Option<Message>,
    prompt: String,
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    memory: Arc<Mutex<ConversationMemory>>,
    max_steps: usize,
}

type EventSink<'a> = Option<&'a mpsc::Sender<Result<RunEvent>>>;

async fn emit(sink: EventSink<'_>, event: RunEvent) -> Result<()> {
    if let Some(tx) = sink {
        tx.send(Ok(event))
            .await
            .map_err(|_| AgnoError::Protocol("response stream dropped by consumer".into()))?;
    }
    Ok(())
}

impl PreparedRun {
    async fn execute(self, sink: EventSink<'_>) -> Result<RunResponse> {
        let history: Vec<Message> = self
            .memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        let user = Message::user(self.prompt.clone());
        let tool_descriptions = self.tools.describe();
        let mut turn: Vec<Message> = Vec::new();
        let mut executions: Vec<ToolExecution> = Vec::new();
        // Content of every turn, including text sent alongside tool calls.
        let mut transcript = String::new();

        tracing::info!(
            agent = self.agent.as_deref().unwrap_or("agent"),
            model = self.model.id(),
            streaming = sink.is_some(),
            "starting run"
        );

        for step in 0..self.max_steps {
            let mut messages: Vec<Message> = Vec::with_capacity(history.len() + turn.len() + 2);
            messages.extend(self.system.iter().cloned());
            messages.extend(history.iter().cloned());
            messages.push(user.clone());
            messages.extend(turn.iter().cloned());

            let completion = match sink {
                Some(_) => self.stream_turn(&messages, &tool_descriptions, sink).await?,
                None => {
                    self.model
                        .complete_chat(&messages, &tool_descriptions)
                        .await?
                }
            };

            if completion.tool_calls.is_empty() {
                let content = completion.content.unwrap_or_default();
                transcript.push_str(&content);
                let reply = Message::assistant(content);
                {
                    let mut memory = self
                        .memory
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    memory.push(user);
                    for message in turn {
                        memory.push(message);
                    }
                    memory.push(reply);
                }
                tracing::info!(steps = step + 1, tool_calls = executions.len(), "run completed");
                return Ok(RunResponse {
                    run_id: uuid::Uuid::new_v4().to_string(),
                    agent: self.agent,
                    model: self.model.id().to_string(),
                    content: transcript,
                    tool_calls: executions,
                    created_at: current_utc_str(),
                });
            }

            if let Some(content) = completion.content {
                transcript.push_str(&content);
                if !content.trim().is_empty() {
                    turn.push(Message::assistant(content));
                }
            }

            for (index, mut call) in completion.tool_calls.into_iter().enumerate() {
                if call.id.is_none() {
                    call.id = Some(format!("call_{step}_{index}"));
                }
                tracing::info!(tool = %call.name, "calling tool");
                emit(sink, RunEvent::ToolCallStarted(call.clone())).await?;
                turn.push(Message::tool_call(call.clone()));

                let output = self
                    .tools
                    .call(&call.name, call.arguments.clone())
                    .await
                    .map_err(|err| {
                        tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                        err
                    })?;
                let result = ToolResult {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    output,
                };
                emit(sink, RunEvent::ToolCallCompleted(result.clone())).await?;
                turn.push(Message::tool(result.clone()));
                executions.push(ToolExecution { call, result });
            }
        }

        Err(AgnoError::Protocol(
            "Agent reached the step limit without returning a response".into(),
        ))
    }

    /// Consumes one streamed model turn, forwarding content as it arrives.
    async fn stream_turn(
        &self,
        messages: &[Message],
        tools: &[crate::tool::ToolDescription],
        sink: EventSink<'_>,
    ) -> Result<ModelCompletion> {
        let mut deltas = self.model.stream_chat(messages, tools).await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        while let Some(delta) = deltas.next().await {
            match delta? {
                ModelDelta::Content(text) => {
                    content.push_str(&text);
                    emit(sink, RunEvent::RunContent(text)).await?;
                }
                ModelDelta::ToolCall(call) => tool_calls.push(call),
            }
        }
        Ok(ModelCompletion {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        })
    }
}
