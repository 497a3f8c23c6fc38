//! Reasoning loop implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voxchat_config::Settings;
use voxchat_core::{
    BrainUpdate, CancelGuard, ConversationHistory, HistoryItem, Language, LanguageModel,
    LlmEvent, Message, ToolStatus, TtsRequest, UpdateKind,
};
use voxchat_pipeline::{PlaybackQueue, SentenceChunker};
use voxchat_tools::{ToolError, ToolRegistry};

use crate::{BACKEND_ERROR_MESSAGE, EXHAUSTION_MESSAGE};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful bilingual voice assistant. \
Reply in the language the user speaks: Chinese for Chinese, English for English. \
Keep answers short and conversational; they will be spoken aloud. \
Use the available tools when a question needs live information.";

/// Tunables for the reasoning loop
#[derive(Debug, Clone)]
pub struct BrainOptions {
    pub system_prompt: String,
    pub default_language: Language,
    pub max_history: usize,
    pub max_tool_iterations: u32,
    pub tool_timeout: Duration,
    pub voice_en: String,
    pub voice_zh: String,
    pub min_chunk_chars: usize,
}

impl Default for BrainOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_language: Language::Chinese,
            max_history: 20,
            max_tool_iterations: 5,
            tool_timeout: Duration::from_secs(30),
            voice_en: "en-US-JennyNeural".to_string(),
            voice_zh: "zh-CN-XiaoxiaoNeural".to_string(),
            min_chunk_chars: 40,
        }
    }
}

impl BrainOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_language: settings.brain.default_language,
            max_history: settings.brain.max_conversation_history,
            max_tool_iterations: settings.brain.max_tool_iterations,
            tool_timeout: Duration::from_secs(settings.brain.tool_timeout_s),
            voice_en: settings.tts.voice_en.clone(),
            voice_zh: settings.tts.voice_zh.clone(),
            min_chunk_chars: settings.tts.min_chunk_chars,
        }
    }
}

/// How a turn finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
}

enum Abort {
    Cancelled,
    ChannelClosed,
}

/// A tool call being accumulated from stream fragments
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Per-session reasoning engine
pub struct Brain {
    llm: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    options: BrainOptions,
    chunker: SentenceChunker,
    history: Mutex<ConversationHistory>,
}

impl Brain {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>, options: BrainOptions) -> Self {
        let mut history = ConversationHistory::new(options.max_history);
        history.set_system(options.system_prompt.clone());
        Self {
            llm,
            tools,
            chunker: SentenceChunker::new(options.min_chunk_chars),
            options,
            history: Mutex::new(history),
        }
    }

    /// Snapshot of the history items (tests, session introspection).
    pub fn history_snapshot(&self) -> Vec<HistoryItem> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Run one full reply for `text`.
    ///
    /// Streams `BrainUpdate`s onto `updates` and enqueues the reply's TTS
    /// requests onto `playback`, each tagged with `guard` so a later cancel
    /// drains them. Observes `guard` at every suspension point; on
    /// cancellation the history is truncated to its last complete state.
    pub async fn run_turn(
        &self,
        text: &str,
        language: Language,
        mut guard: CancelGuard,
        updates: mpsc::Sender<BrainUpdate>,
        playback: &PlaybackQueue,
    ) -> TurnOutcome {
        let msg_id = uuid::Uuid::new_v4().to_string();
        self.history
            .lock()
            .push(HistoryItem::user(text, language));
        metrics::counter!("voxchat_brain_turns").increment(1);

        match self
            .reply(&msg_id, language, &mut guard, &updates, playback)
            .await
        {
            Ok(()) => TurnOutcome::Completed,
            Err(abort) => {
                if matches!(abort, Abort::ChannelClosed) {
                    tracing::debug!(msg_id = %msg_id, "update channel closed mid-turn");
                }
                self.history.lock().truncate_dangling();
                TurnOutcome::Cancelled
            }
        }
    }

    async fn reply(
        &self,
        msg_id: &str,
        language: Language,
        guard: &mut CancelGuard,
        updates: &mpsc::Sender<BrainUpdate>,
        playback: &PlaybackQueue,
    ) -> Result<(), Abort> {
        let mut turn: u32 = 0;
        let final_text = loop {
            let iteration = self.run_iteration(msg_id, turn, guard, updates).await?;

            match iteration {
                Iteration::Reply(text) => {
                    self.history.lock().push(HistoryItem::assistant(text.clone()));
                    break text;
                }
                Iteration::BackendFailed(detail) => {
                    tracing::error!(msg_id, error = %detail, "LLM failed mid-turn");
                    self.emit(
                        guard,
                        updates,
                        BrainUpdate::new(msg_id, turn, UpdateKind::Error { message: detail }),
                    )
                    .await?;
                    self.emit(
                        guard,
                        updates,
                        BrainUpdate::new(
                            msg_id,
                            turn,
                            UpdateKind::TextDelta(BACKEND_ERROR_MESSAGE.to_string()),
                        ),
                    )
                    .await?;
                    self.history
                        .lock()
                        .push(HistoryItem::assistant(BACKEND_ERROR_MESSAGE));
                    break BACKEND_ERROR_MESSAGE.to_string();
                }
                Iteration::ToolCalls { text, calls } => {
                    self.history.lock().push(HistoryItem::assistant(text));
                    self.invoke_calls(msg_id, turn, calls, guard, updates).await?;

                    turn += 1;
                    if turn >= self.options.max_tool_iterations {
                        tracing::warn!(msg_id, turn, "tool iteration cap reached");
                        self.emit(
                            guard,
                            updates,
                            BrainUpdate::new(
                                msg_id,
                                turn,
                                UpdateKind::TextDelta(EXHAUSTION_MESSAGE.to_string()),
                            ),
                        )
                        .await?;
                        self.history
                            .lock()
                            .push(HistoryItem::assistant(EXHAUSTION_MESSAGE));
                        break EXHAUSTION_MESSAGE.to_string();
                    }
                }
            }
        };

        self.emit(
            guard,
            updates,
            BrainUpdate::new(msg_id, turn, UpdateKind::TurnEnd),
        )
        .await?;

        self.speak(msg_id, &final_text, language, guard, playback)
            .await
    }

    /// Consume one LLM stream and classify its outcome.
    async fn run_iteration(
        &self,
        msg_id: &str,
        turn: u32,
        guard: &mut CancelGuard,
        updates: &mpsc::Sender<BrainUpdate>,
    ) -> Result<Iteration, Abort> {
        let messages = self.build_messages();
        let tool_defs = self.tools.definitions();
        let mut stream = self.llm.stream(messages, tool_defs);

        let mut text = String::new();
        let mut calls: BTreeMap<usize, PendingCall> = BTreeMap::new();

        loop {
            let event = {
                let mut cancel = guard.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Abort::Cancelled),
                    event = stream.next() => event,
                }
            };

            match event {
                None | Some(Ok(LlmEvent::Done)) => break,
                Some(Ok(LlmEvent::ThoughtDelta(delta))) => {
                    self.emit(
                        guard,
                        updates,
                        BrainUpdate::new(msg_id, turn, UpdateKind::Thought(delta)),
                    )
                    .await?;
                }
                Some(Ok(LlmEvent::TextDelta(delta))) => {
                    text.push_str(&delta);
                    self.emit(
                        guard,
                        updates,
                        BrainUpdate::new(msg_id, turn, UpdateKind::TextDelta(delta)),
                    )
                    .await?;
                }
                Some(Ok(LlmEvent::ToolCallDelta {
                    index,
                    id,
                    name,
                    args_chunk,
                })) => {
                    let update = match calls.entry(index) {
                        std::collections::btree_map::Entry::Vacant(entry) => {
                            let name = name.unwrap_or_default();
                            entry.insert(PendingCall {
                                id: id.unwrap_or_else(|| format!("call_{turn}_{index}")),
                                name: name.clone(),
                                arguments: args_chunk.clone(),
                            });
                            UpdateKind::ToolCallStart {
                                index,
                                name,
                                arguments_partial: args_chunk,
                            }
                        }
                        std::collections::btree_map::Entry::Occupied(mut entry) => {
                            let call = entry.get_mut();
                            if let Some(name) = name {
                                call.name = name;
                            }
                            call.arguments.push_str(&args_chunk);
                            UpdateKind::ToolCallArgsDelta {
                                index,
                                delta: args_chunk,
                            }
                        }
                    };
                    self.emit(guard, updates, BrainUpdate::new(msg_id, turn, update))
                        .await?;
                }
                Some(Err(e)) => return Ok(Iteration::BackendFailed(e.to_string())),
            }
        }

        // The argument stream for every accumulated call is now complete.
        for index in calls.keys().copied().collect::<Vec<_>>() {
            self.emit(
                guard,
                updates,
                BrainUpdate::new(
                    msg_id,
                    turn,
                    UpdateKind::ToolCallEnd {
                        index,
                        status: ToolStatus::Ok,
                    },
                ),
            )
            .await?;
        }

        if calls.is_empty() {
            Ok(Iteration::Reply(text))
        } else {
            Ok(Iteration::ToolCalls { text, calls })
        }
    }

    /// Invoke accumulated calls in declaration order.
    ///
    /// Each call's history pair is written around its invocation, so a
    /// cancel can only ever strand the one trailing `ToolCall`.
    async fn invoke_calls(
        &self,
        msg_id: &str,
        turn: u32,
        calls: BTreeMap<usize, PendingCall>,
        guard: &mut CancelGuard,
        updates: &mpsc::Sender<BrainUpdate>,
    ) -> Result<(), Abort> {
        for (index, call) in calls {
            if guard.is_cancelled() {
                return Err(Abort::Cancelled);
            }

            self.history.lock().push(HistoryItem::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            });

            metrics::counter!("voxchat_tool_calls").increment(1);
            let invocation =
                tokio::time::timeout(self.options.tool_timeout, self.tools.invoke(&call.name, &call.arguments));
            let result = {
                let mut cancel = guard.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Abort::Cancelled),
                    result = invocation => result,
                }
            };

            let (content, status) = match result {
                Err(_) => {
                    metrics::counter!("voxchat_tool_errors").increment(1);
                    (
                        format!(
                            "tool '{}' timed out after {}s",
                            call.name,
                            self.options.tool_timeout.as_secs()
                        ),
                        ToolStatus::Error,
                    )
                }
                Ok(Ok(output)) => (output, ToolStatus::Ok),
                Ok(Err(e)) => {
                    metrics::counter!("voxchat_tool_errors").increment(1);
                    let detail = match &e {
                        ToolError::Unknown(name) => format!("no such tool: {name}"),
                        other => other.to_string(),
                    };
                    tracing::warn!(msg_id, tool = %call.name, error = %detail, "tool call failed");
                    (detail, ToolStatus::Error)
                }
            };

            self.emit(
                guard,
                updates,
                BrainUpdate::new(
                    msg_id,
                    turn,
                    UpdateKind::ToolResult {
                        index,
                        content: content.clone(),
                        status,
                    },
                ),
            )
            .await?;

            self.history.lock().push(HistoryItem::ToolResult {
                id: call.id,
                content,
            });
        }
        Ok(())
    }

    /// Chunk the reply and queue it for synthesis.
    async fn speak(
        &self,
        msg_id: &str,
        text: &str,
        language: Language,
        guard: &mut CancelGuard,
        playback: &PlaybackQueue,
    ) -> Result<(), Abort> {
        let reply_language = match language {
            Language::Unknown => self.options.default_language,
            other => other,
        };
        let voice = match reply_language {
            Language::English => self.options.voice_en.clone(),
            _ => self.options.voice_zh.clone(),
        };

        for chunk in self.chunker.split(text, reply_language) {
            if guard.is_cancelled() {
                return Err(Abort::Cancelled);
            }
            let request = TtsRequest {
                text: chunk,
                language: reply_language,
                voice: voice.clone(),
                msg_id: msg_id.to_string(),
            };
            let enqueue = playback.speak(request, guard.clone());
            let mut cancel = guard.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Abort::Cancelled),
                result = enqueue => result.map_err(|_| Abort::ChannelClosed)?,
            }
        }
        Ok(())
    }

    /// History as wire messages: system first, assistant text merged with
    /// the tool calls that follow it.
    fn build_messages(&self) -> Vec<Message> {
        let history = self.history.lock();
        let mut messages = Vec::new();

        if let Some(system) = history.system() {
            messages.push(Message::system(system));
        }

        let mut iter = history.iter().peekable();
        while let Some(item) = iter.next() {
            match item {
                HistoryItem::System { text } => messages.push(Message::system(text)),
                HistoryItem::User { text, .. } => messages.push(Message::user(text)),
                HistoryItem::Assistant { text } => {
                    let mut calls = Vec::new();
                    while let Some(HistoryItem::ToolCall { id, name, arguments }) = iter.peek() {
                        calls.push(voxchat_core::AssistantToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        });
                        iter.next();
                    }
                    if calls.is_empty() {
                        messages.push(Message::assistant(text));
                    } else {
                        messages.push(Message::assistant_with_calls(text, calls));
                    }
                }
                HistoryItem::ToolCall { id, name, arguments } => {
                    // Pair whose assistant text was evicted; still valid as
                    // its own assistant message.
                    messages.push(Message::assistant_with_calls(
                        "",
                        vec![voxchat_core::AssistantToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        }],
                    ));
                }
                HistoryItem::ToolResult { id, content } => {
                    messages.push(Message::tool(content, id));
                }
            }
        }
        messages
    }

    async fn emit(
        &self,
        guard: &mut CancelGuard,
        updates: &mpsc::Sender<BrainUpdate>,
        update: BrainUpdate,
    ) -> Result<(), Abort> {
        let mut cancel = guard.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Abort::Cancelled),
            result = updates.send(update) => result.map_err(|_| Abort::ChannelClosed),
        }
    }
}

enum Iteration {
    /// Stream finished with plain text
    Reply(String),
    /// Stream finished with tool calls to run
    ToolCalls {
        text: String,
        calls: BTreeMap<usize, PendingCall>,
    },
    /// Stream failed mid-flight
    BackendFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use voxchat_core::{CancelToken, Error, EventStream, ToolDefinition};

    /// Pops one pre-scripted event list per stream() call.
    struct ScriptedLlm {
        scripts: Mutex<VecDeque<Vec<voxchat_core::Result<LlmEvent>>>>,
    }

    impl ScriptedLlm {
        fn new(scripts: Vec<Vec<voxchat_core::Result<LlmEvent>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        fn stream(&self, _messages: Vec<Message>, _tools: Vec<ToolDefinition>) -> EventStream {
            let script = self.scripts.lock().pop_front().unwrap_or_default();
            Box::pin(futures::stream::iter(script))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Fixed-output clock for deterministic tool tests.
    struct FixedTimeTool;

    #[async_trait]
    impl voxchat_tools::Tool for FixedTimeTool {
        fn name(&self) -> &str {
            "time"
        }
        fn description(&self) -> &str {
            "current time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type":"object","properties":{},"required":[]})
        }
        async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            Ok("2024-01-15 14:30:25".to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl voxchat_tools::Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type":"object","properties":{},"required":[]})
        }
        async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("done".to_string())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(FixedTimeTool);
        r.register(SlowTool);
        Arc::new(r)
    }

    fn options() -> BrainOptions {
        BrainOptions {
            min_chunk_chars: 4,
            ..Default::default()
        }
    }

    fn tool_call_script(name: &str, args: &str) -> Vec<voxchat_core::Result<LlmEvent>> {
        vec![
            Ok(LlmEvent::ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some(name.into()),
                args_chunk: String::new(),
            }),
            Ok(LlmEvent::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                args_chunk: args.into(),
            }),
            Ok(LlmEvent::Done),
        ]
    }

    async fn run(
        brain: &Brain,
        text: &str,
        language: Language,
    ) -> (TurnOutcome, Vec<BrainUpdate>, Vec<TtsRequest>) {
        let token = CancelToken::new();
        let (update_tx, mut update_rx) = mpsc::channel(256);
        let (playback, mut playback_rx) = PlaybackQueue::new(64);

        let outcome = brain
            .run_turn(text, language, token.arm(), update_tx, &playback)
            .await;

        let mut updates = Vec::new();
        while let Ok(u) = update_rx.try_recv() {
            updates.push(u);
        }
        let mut requests = Vec::new();
        while let Ok(item) = playback_rx.try_recv() {
            if let voxchat_pipeline::QueueItem::Speak(req, _) = item {
                requests.push(req);
            }
        }
        (outcome, updates, requests)
    }

    #[tokio::test]
    async fn test_text_only_reply() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![
            Ok(LlmEvent::ThoughtDelta("thinking".into())),
            Ok(LlmEvent::TextDelta("Hi".into())),
            Ok(LlmEvent::TextDelta("!".into())),
            Ok(LlmEvent::Done),
        ]]));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, requests) = run(&brain, "hello", Language::English).await;

        assert_eq!(outcome, TurnOutcome::Completed);

        // Concatenated text deltas form the reply; TurnEnd is last.
        let text: String = updates
            .iter()
            .filter_map(|u| match &u.kind {
                UpdateKind::TextDelta(d) => Some(d.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi!");
        assert!(updates.last().unwrap().is_turn_end());
        assert!(updates
            .iter()
            .any(|u| matches!(u.kind, UpdateKind::Thought(_))));

        // All updates share one msg_id.
        let msg_id = &updates[0].msg_id;
        assert!(updates.iter().all(|u| &u.msg_id == msg_id));

        // History: User then Assistant.
        let history = brain.history_snapshot();
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0], HistoryItem::User { .. }));
        assert_eq!(history[1], HistoryItem::assistant("Hi!"));

        // Reply queued for synthesis in the user's language voice.
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language, Language::English);
        assert_eq!(requests[0].voice, "en-US-JennyNeural");
    }

    #[tokio::test]
    async fn test_tool_call_round() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_call_script("time", "{}"),
            vec![
                Ok(LlmEvent::TextDelta("现在是下午两点半。".into())),
                Ok(LlmEvent::Done),
            ],
        ]));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, requests) = run(&brain, "现在几点", Language::Chinese).await;
        assert_eq!(outcome, TurnOutcome::Completed);

        // Tool lifecycle in order: Start → ArgsDelta → End → Result.
        let kinds: Vec<&UpdateKind> = updates.iter().map(|u| &u.kind).collect();
        let start = kinds
            .iter()
            .position(|k| matches!(k, UpdateKind::ToolCallStart { .. }))
            .unwrap();
        let end = kinds
            .iter()
            .position(|k| matches!(k, UpdateKind::ToolCallEnd { .. }))
            .unwrap();
        let result = kinds
            .iter()
            .position(|k| matches!(k, UpdateKind::ToolResult { .. }))
            .unwrap();
        assert!(start < end && end < result);

        // Every ToolCallEnd has its ToolResult before TurnEnd.
        let turn_end = kinds.iter().position(|k| matches!(k, UpdateKind::TurnEnd)).unwrap();
        assert!(result < turn_end);

        // The tool result carried the fixed clock output with ok status.
        assert!(updates.iter().any(|u| matches!(
            &u.kind,
            UpdateKind::ToolResult { content, status: ToolStatus::Ok, .. }
                if content == "2024-01-15 14:30:25"
        )));

        // Second iteration carries turn = 1.
        assert!(updates.iter().any(|u| u.turn == 1));

        // History: User, Assistant, ToolCall, ToolResult, Assistant.
        let history = brain.history_snapshot();
        assert!(matches!(history[2], HistoryItem::ToolCall { .. }));
        assert!(matches!(history[3], HistoryItem::ToolResult { .. }));
        assert_eq!(history[4], HistoryItem::assistant("现在是下午两点半。"));

        // Chinese voice selected.
        assert!(!requests.is_empty());
        assert_eq!(requests[0].voice, "zh-CN-XiaoxiaoNeural");
    }

    #[tokio::test]
    async fn test_malformed_tool_arguments_recover() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_call_script("time", "{not json"),
            vec![
                Ok(LlmEvent::TextDelta("Sorry, try again.".into())),
                Ok(LlmEvent::Done),
            ],
        ]));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, _) = run(&brain, "what time", Language::English).await;
        assert_eq!(outcome, TurnOutcome::Completed);

        // One error result, then the loop continued to a normal reply.
        assert!(updates.iter().any(|u| matches!(
            u.kind,
            UpdateKind::ToolResult { status: ToolStatus::Error, .. }
        )));
        let history = brain.history_snapshot();
        // The pair is matched even though invocation failed.
        assert!(matches!(history[2], HistoryItem::ToolCall { .. }));
        assert!(matches!(history[3], HistoryItem::ToolResult { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_recovers() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_call_script("teleport", "{}"),
            vec![Ok(LlmEvent::TextDelta("No such ability.".into())), Ok(LlmEvent::Done)],
        ]));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, _) = run(&brain, "beam me up", Language::English).await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(updates.iter().any(|u| matches!(
            &u.kind,
            UpdateKind::ToolResult { status: ToolStatus::Error, content, .. }
                if content.contains("teleport")
        )));
    }

    #[tokio::test]
    async fn test_iteration_cap_yields_exhaustion_message() {
        // The model asks for a tool on every iteration.
        let scripts: Vec<_> = (0..10).map(|_| tool_call_script("time", "{}")).collect();
        let llm = Arc::new(ScriptedLlm::new(scripts));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, requests) = run(&brain, "loop forever", Language::English).await;
        assert_eq!(outcome, TurnOutcome::Completed);

        let text: String = updates
            .iter()
            .filter_map(|u| match &u.kind {
                UpdateKind::TextDelta(d) => Some(d.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, EXHAUSTION_MESSAGE);
        assert!(updates.last().unwrap().is_turn_end());

        // Exactly max_tool_iterations rounds of tool results.
        let results = updates
            .iter()
            .filter(|u| matches!(u.kind, UpdateKind::ToolResult { .. }))
            .count();
        assert_eq!(results, options().max_tool_iterations as usize);

        // The synthetic reply still gets spoken.
        assert!(!requests.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_ends_turn_cleanly() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![
            Ok(LlmEvent::TextDelta("partial".into())),
            Err(Error::Llm("boom".into())),
        ]]));
        let brain = Brain::new(llm, registry(), options());

        let (outcome, updates, _) = run(&brain, "hello", Language::Chinese).await;
        assert_eq!(outcome, TurnOutcome::Completed);

        assert!(updates
            .iter()
            .any(|u| matches!(u.kind, UpdateKind::Error { .. })));
        let text: String = updates
            .iter()
            .filter_map(|u| match &u.kind {
                UpdateKind::TextDelta(d) => Some(d.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.contains(BACKEND_ERROR_MESSAGE));
        assert!(updates.last().unwrap().is_turn_end());
        assert_eq!(
            brain.history_snapshot().last(),
            Some(&HistoryItem::assistant(BACKEND_ERROR_MESSAGE))
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_tool_leaves_no_dangling_call() {
        let llm = Arc::new(ScriptedLlm::new(vec![tool_call_script("slow", "{}")]));
        let brain = Arc::new(Brain::new(llm, registry(), options()));

        let token = CancelToken::new();
        let (update_tx, _update_rx) = mpsc::channel(256);
        let (playback, _playback_rx) = PlaybackQueue::new(64);

        let guard = token.arm();
        let runner = {
            let brain = brain.clone();
            tokio::spawn(async move {
                brain
                    .run_turn("take your time", Language::English, guard, update_tx, &playback)
                    .await
            })
        };

        // Let the turn reach the slow tool, then interrupt.
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let outcome = runner.await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);

        let history = brain.history_snapshot();
        assert!(
            !matches!(history.last(), Some(HistoryItem::ToolCall { .. })),
            "history must not end on a dangling tool call: {history:?}"
        );
    }

    #[tokio::test]
    async fn test_unknown_language_falls_back_to_default_voice() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![
            Ok(LlmEvent::TextDelta("好的。".into())),
            Ok(LlmEvent::Done),
        ]]));
        let brain = Brain::new(llm, registry(), options());

        let (_, _, requests) = run(&brain, "mumble", Language::Unknown).await;
        assert_eq!(requests[0].language, Language::Chinese);
        assert_eq!(requests[0].voice, "zh-CN-XiaoxiaoNeural");
    }

    #[test]
    fn test_build_messages_merges_tool_pairs() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let brain = Brain::new(llm, registry(), options());
        {
            let mut history = brain.history.lock();
            history.push(HistoryItem::user("现在几点", Language::Chinese));
            history.push(HistoryItem::assistant(""));
            history.push(HistoryItem::ToolCall {
                id: "call_1".into(),
                name: "time".into(),
                arguments: "{}".into(),
            });
            history.push(HistoryItem::ToolResult {
                id: "call_1".into(),
                content: "14:30".into(),
            });
        }

        let messages = brain.build_messages();
        // system, user, assistant(with calls), tool
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, voxchat_core::Role::System);
        assert!(messages[2].tool_calls.as_ref().unwrap().len() == 1);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
    }
}
